//! Pipeline orchestration
//!
//! This module provides the public API for lookflux.
//! It runs the four tables of one dataset through every stage to the summary
//! table and optional window rows.

use crate::aggregate::TwoStageAggregator;
use crate::config::AnalysisConfig;
use crate::encoder::SummaryEncoder;
use crate::error::ComputeError;
use crate::join::TableJoiner;
use crate::normalizer::ConditionNormalizer;
use crate::schema::{GridIssue, TableAdapter, TableCounts, TableSource, Tables};
use crate::types::{AccuracyPoint, JoinedRecord, SummaryPayload, SummaryPoint, WindowSummary};
use crate::window::WindowSummarizer;
use serde::{Deserialize, Serialize};

/// Every intermediate table of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub dataset_name: String,
    /// Join output, one row per input sample
    pub joined: Vec<JoinedRecord>,
    /// Pass-1 rows
    pub subject_accuracy: Vec<AccuracyPoint>,
    /// Pass-2 rows
    pub summary: Vec<SummaryPoint>,
    /// Empty unless a window is configured
    pub windows: Vec<WindowSummary>,
    /// Samples dropped as filler
    pub filler_excluded: usize,
}

/// Run the full pipeline over in-memory tables.
///
/// Pipeline stages:
/// 1. Time grid check (when `grid_step_ms` is set)
/// 2. TableJoiner - Resolve every sample to its parents
/// 3. ConditionNormalizer - Drop fillers, label conditions, apply scope filters
/// 4. TwoStageAggregator - Within-unit then across-unit reduction
/// 5. WindowSummarizer - Optional per-condition window rows
pub fn run_pipeline(
    tables: &Tables,
    config: &AnalysisConfig,
) -> Result<PipelineOutput, ComputeError> {
    config.validate()?;

    if let Some(step) = config.grid_step_ms {
        TableAdapter::check_time_grid(&tables.samples, step)?;
    }

    // Stage 1: Join
    let joined = TableJoiner::join(tables)?;

    // Stage 2: Normalize conditions
    let labeled = ConditionNormalizer::normalize(joined.clone(), &config.condition_codes)?;
    let filler_excluded = joined.len() - labeled.len();
    let scoped = ConditionNormalizer::restrict_scope(labeled, config);

    // Stage 3: Aggregate
    let aggregation = TwoStageAggregator::aggregate(&scoped, config.subject_unit);

    // Stage 4: Window
    let windows = match config.window {
        Some(window) => WindowSummarizer::apply(config.window_method, &aggregation, window)?,
        None => Vec::new(),
    };

    tracing::info!(
        dataset = %config.dataset_name,
        samples = tables.samples.len(),
        analysed = scoped.len(),
        points = aggregation.summary.len(),
        windows = windows.len(),
        "pipeline complete"
    );

    Ok(PipelineOutput {
        dataset_name: config.dataset_name.clone(),
        joined,
        subject_accuracy: aggregation.subject_points,
        summary: aggregation.summary,
        windows,
        filler_excluded,
    })
}

/// Load the configured dataset from a source and run the pipeline
pub fn run_dataset(
    source: &dyn TableSource,
    config: &AnalysisConfig,
) -> Result<PipelineOutput, ComputeError> {
    config.validate()?;
    let tables = source.load_tables(&config.dataset_name)?;
    tracing::debug!(dataset = %config.dataset_name, counts = ?tables.counts(), "loaded tables");
    run_pipeline(&tables, config)
}

/// Convert a table bundle JSON document to a summary payload.
///
/// # Arguments
/// * `tables_json` - Bundle with `aoi_timepoints`, `administrations`, `trials`, `trial_types`
/// * `dataset_name` - Dataset identifier recorded in the provenance block
///
/// # Example
/// ```ignore
/// let payload = tables_to_summary_json(bundle, "swingley_aslin_2002".to_string())?;
/// ```
pub fn tables_to_summary_json(
    tables_json: String,
    dataset_name: String,
) -> Result<String, ComputeError> {
    let processor = LookingTimeProcessor::new(AnalysisConfig::new(dataset_name))?;
    processor.summarize_json(&tables_json)
}

/// Integrity report produced without aggregating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub dataset_name: String,
    pub counts: TableCounts,
    pub time_points: usize,
    /// Samples off the grid (first few only)
    pub grid_issues: Vec<GridIssue>,
    pub n_grid_issues: usize,
    pub joined: usize,
    pub labeled: usize,
    pub filler_excluded: usize,
    /// First fatal join or condition error, if any
    pub error: Option<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.n_grid_issues == 0
    }
}

const MAX_REPORTED_GRID_ISSUES: usize = 10;

/// Run the join and condition checks and report instead of failing
pub fn validate_tables(tables: &Tables, config: &AnalysisConfig) -> ValidationReport {
    let all_issues = match config.grid_step_ms {
        Some(step) => TableAdapter::validate_time_grid(&tables.samples, step),
        None => Vec::new(),
    };

    let mut report = ValidationReport {
        dataset_name: config.dataset_name.clone(),
        counts: tables.counts(),
        time_points: tables.time_points().len(),
        n_grid_issues: all_issues.len(),
        grid_issues: all_issues
            .into_iter()
            .take(MAX_REPORTED_GRID_ISSUES)
            .collect(),
        joined: 0,
        labeled: 0,
        filler_excluded: 0,
        error: None,
    };

    let joined = match TableJoiner::join(tables) {
        Ok(joined) => joined,
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };
    report.joined = joined.len();

    match ConditionNormalizer::normalize(joined, &config.condition_codes) {
        Ok(labeled) => {
            report.labeled = labeled.len();
            report.filler_excluded = report.joined - labeled.len();
        }
        Err(e) => report.error = Some(e.to_string()),
    }

    report
}

/// Processor bound to one analysis configuration.
///
/// Holds no per-run state; every call is independent.
pub struct LookingTimeProcessor {
    config: AnalysisConfig,
    encoder: SummaryEncoder,
}

impl Default for LookingTimeProcessor {
    fn default() -> Self {
        Self {
            config: AnalysisConfig::default(),
            encoder: SummaryEncoder::new(),
        }
    }
}

impl LookingTimeProcessor {
    /// Create a processor, validating the configuration
    pub fn new(config: AnalysisConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self {
            config,
            encoder: SummaryEncoder::new(),
        })
    }

    /// Replace the encoder (e.g. for a fixed instance id)
    pub fn with_encoder(mut self, encoder: SummaryEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run over in-memory tables
    pub fn process_tables(&self, tables: &Tables) -> Result<PipelineOutput, ComputeError> {
        run_pipeline(tables, &self.config)
    }

    /// Run over a table bundle JSON document
    pub fn process_json(&self, tables_json: &str) -> Result<PipelineOutput, ComputeError> {
        let tables = TableAdapter::parse_bundle(tables_json)?;
        self.process_tables(&tables)
    }

    /// Run over the configured dataset from a source
    pub fn process_source(&self, source: &dyn TableSource) -> Result<PipelineOutput, ComputeError> {
        run_dataset(source, &self.config)
    }

    /// Wrap an output in a payload
    pub fn payload(&self, output: &PipelineOutput) -> Result<SummaryPayload, ComputeError> {
        self.encoder.encode(output, self.config.subject_unit)
    }

    /// Bundle JSON in, payload JSON out
    pub fn summarize_json(&self, tables_json: &str) -> Result<String, ComputeError> {
        let output = self.process_json(tables_json)?;
        self.encoder
            .encode_to_json(&output, self.config.subject_unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JoinIntegrityError;
    use crate::types::{Condition, QualityFlag, SubjectUnit, TimeWindow, WindowMethod};
    use pretty_assertions::assert_eq;

    /// Three children; one cp, one mp and one filler trial each
    fn sample_tables_json() -> &'static str {
        r#"{
            "aoi_timepoints": [
                {"administration_id": 1, "trial_id": 11, "t_norm": 0, "aoi": "target"},
                {"administration_id": 1, "trial_id": 11, "t_norm": 25, "aoi": "target"},
                {"administration_id": 1, "trial_id": 12, "t_norm": 0, "aoi": "distractor"},
                {"administration_id": 1, "trial_id": 12, "t_norm": 25, "aoi": "target"},
                {"administration_id": 1, "trial_id": 13, "t_norm": 0, "aoi": "target"},
                {"administration_id": 2, "trial_id": 21, "t_norm": 0, "aoi": "target"},
                {"administration_id": 2, "trial_id": 21, "t_norm": 25, "aoi": "target"},
                {"administration_id": 2, "trial_id": 22, "t_norm": 0, "aoi": "target"},
                {"administration_id": 2, "trial_id": 23, "t_norm": 0, "aoi": "distractor"},
                {"administration_id": 3, "trial_id": 31, "t_norm": 0, "aoi": "distractor"},
                {"administration_id": 3, "trial_id": 31, "t_norm": 25, "aoi": "missing"},
                {"administration_id": 3, "trial_id": 32, "t_norm": 0, "aoi": "distractor"},
                {"administration_id": 3, "trial_id": 33, "t_norm": 0, "aoi": "away"}
            ],
            "administrations": [
                {"administration_id": 1, "subject_id": 100, "age": 19.0},
                {"administration_id": 2, "subject_id": 101, "age": 20.5},
                {"administration_id": 3, "subject_id": 102, "age": 22.0}
            ],
            "trials": [
                {"trial_id": 11, "trial_type_id": 1, "administration_id": 1},
                {"trial_id": 12, "trial_type_id": 2, "administration_id": 1},
                {"trial_id": 13, "trial_type_id": 3, "administration_id": 1},
                {"trial_id": 21, "trial_type_id": 1, "administration_id": 2},
                {"trial_id": 22, "trial_type_id": 2, "administration_id": 2},
                {"trial_id": 23, "trial_type_id": 3, "administration_id": 2},
                {"trial_id": 31, "trial_type_id": 1, "administration_id": 3},
                {"trial_id": 32, "trial_type_id": 2, "administration_id": 3},
                {"trial_id": 33, "trial_type_id": 3, "administration_id": 3}
            ],
            "trial_types": [
                {"trial_type_id": 1, "condition": "cp", "layout": "target_left"},
                {"trial_type_id": 2, "condition": "mp", "layout": "target_right"},
                {"trial_type_id": 3, "condition": "filler"}
            ]
        }"#
    }

    fn make_tables() -> Tables {
        TableAdapter::parse_bundle(sample_tables_json()).unwrap()
    }

    fn find(summary: &[SummaryPoint], condition: Condition, t_norm: i64) -> &SummaryPoint {
        summary
            .iter()
            .find(|p| p.condition == condition && p.t_norm == t_norm)
            .unwrap()
    }

    #[test]
    fn test_end_to_end() {
        let output = run_pipeline(&make_tables(), &AnalysisConfig::new("toy_2020")).unwrap();

        assert_eq!(output.dataset_name, "toy_2020");
        assert_eq!(output.joined.len(), 13);
        assert_eq!(output.filler_excluded, 3);
        assert_eq!(output.summary.len(), 4);
        assert!(output.windows.is_empty());

        let cp_0 = find(&output.summary, Condition::Correct, 0);
        assert!((cp_0.mean_accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(cp_0.n_subjects, 3);
        assert!(cp_0.ci_half_width.unwrap() > 0.0);

        // Administration 3 is missing at 25 ms
        let cp_25 = find(&output.summary, Condition::Correct, 25);
        assert_eq!(cp_25.mean_accuracy, Some(1.0));
        assert_eq!(cp_25.n_subjects, 2);
        assert_eq!(cp_25.n_undefined, 1);
        assert_eq!(cp_25.ci_half_width, Some(0.0));

        let mp_25 = find(&output.summary, Condition::Mispronounced, 25);
        assert_eq!(mp_25.mean_accuracy, Some(1.0));
        assert_eq!(mp_25.ci_half_width, None);
        assert!(mp_25.flags.contains(&QualityFlag::LowSupport));
    }

    #[test]
    fn test_window_methods() {
        let window = TimeWindow::new(0, 25).unwrap();

        let by_mean = AnalysisConfig::new("toy_2020").with_window(window, WindowMethod::SummaryMean);
        let output = run_pipeline(&make_tables(), &by_mean).unwrap();
        assert_eq!(output.windows.len(), 2);
        assert_eq!(output.windows[0].condition, Condition::Correct);
        assert!((output.windows[0].mean_accuracy.unwrap() - 5.0 / 6.0).abs() < 1e-9);
        assert!((output.windows[1].mean_accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-9);

        // Pooled: cp = {1.0, 1.0, 0.0}, mp = {0.5, 1.0, 0.0}
        let by_subject =
            AnalysisConfig::new("toy_2020").with_window(window, WindowMethod::SubjectReaggregate);
        let output = run_pipeline(&make_tables(), &by_subject).unwrap();
        assert!((output.windows[0].mean_accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert!((output.windows[1].mean_accuracy.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(output.windows[1].n_contributing, 3);
    }

    #[test]
    fn test_idempotent() {
        let tables = make_tables();
        let config = AnalysisConfig::new("toy_2020");

        let first = run_pipeline(&tables, &config).unwrap();
        let second = run_pipeline(&tables, &config).unwrap();
        assert_eq!(first, second);

        let first_rows = SummaryEncoder::encode_rows_ndjson(&first.summary).unwrap();
        let second_rows = SummaryEncoder::encode_rows_ndjson(&second.summary).unwrap();
        assert_eq!(first_rows, second_rows);
    }

    #[test]
    fn test_join_error_propagates() {
        let mut tables = make_tables();
        tables.samples[4].trial_id = 999;

        assert!(matches!(
            run_pipeline(&tables, &AnalysisConfig::default()),
            Err(ComputeError::JoinIntegrity(JoinIntegrityError::MissingParent { id: 999, .. }))
        ));

        let report = validate_tables(&tables, &AnalysisConfig::default());
        assert!(!report.is_valid());
        assert!(report.error.unwrap().contains("999"));
    }

    #[test]
    fn test_unknown_condition_propagates() {
        let mut tables = make_tables();
        tables.trial_types[2].condition = "novel".to_string();

        assert!(matches!(
            run_pipeline(&tables, &AnalysisConfig::default()),
            Err(ComputeError::UnknownCondition { .. })
        ));
    }

    #[test]
    fn test_grid_check_can_be_disabled() {
        let mut tables = make_tables();
        tables.samples[1].t_norm = 33;

        assert!(matches!(
            run_pipeline(&tables, &AnalysisConfig::default()),
            Err(ComputeError::IrregularTimeGrid { row: 1, .. })
        ));

        let relaxed = AnalysisConfig::default().with_grid_step(None);
        assert!(run_pipeline(&tables, &relaxed).is_ok());
    }

    #[test]
    fn test_run_dataset_from_memory() {
        let tables = make_tables();
        let config = AnalysisConfig::new("toy_2020").with_subject_unit(SubjectUnit::Subject);
        let output = run_dataset(&tables, &config).unwrap();
        assert_eq!(output.summary.len(), 4);
    }

    #[test]
    fn test_validate_tables_report() {
        let report = validate_tables(&make_tables(), &AnalysisConfig::default());
        assert!(report.is_valid());
        assert_eq!(report.counts.samples, 13);
        assert_eq!(report.time_points, 2);
        assert_eq!(report.joined, 13);
        assert_eq!(report.labeled, 10);
        assert_eq!(report.filler_excluded, 3);
    }

    #[test]
    fn test_tables_to_summary_json() {
        let json =
            tables_to_summary_json(sample_tables_json().to_string(), "toy_2020".to_string()).unwrap();

        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(payload["schema_version"], "lookflux.summary.v1");
        assert_eq!(payload["producer"]["name"], "lookflux");
        assert_eq!(payload["provenance"]["dataset_name"], "toy_2020");
        assert_eq!(payload["quality"]["n_points"], 4);
        assert_eq!(payload["quality"]["n_low_support"], 1);
    }

    #[test]
    fn test_processor() {
        let config = AnalysisConfig::new("toy_2020");
        let processor = LookingTimeProcessor::new(config.clone())
            .unwrap()
            .with_encoder(SummaryEncoder::with_instance_id("fixed".to_string()));
        assert_eq!(processor.config(), &config);

        let output = processor.process_json(sample_tables_json()).unwrap();
        let payload = processor.payload(&output).unwrap();
        assert_eq!(payload.producer.instance_id, "fixed");
        assert_eq!(payload.summary, output.summary);

        assert!(processor.summarize_json("not valid json").is_err());
        assert!(LookingTimeProcessor::new(AnalysisConfig::new("")).is_err());
    }
}
