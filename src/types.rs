//! Core types for the lookflux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: input table rows, joined records, labeled records, per-subject
//! accuracy points, and the summary table handed to plotting.

use serde::{Deserialize, Serialize};

pub type AdministrationId = u64;
pub type SubjectId = u64;
pub type TrialId = u64;
pub type TrialTypeId = u64;

/// Area-of-interest classification of a single gaze sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aoi {
    Target,
    Distractor,
    /// Looking somewhere other than either picture
    #[serde(alias = "away")]
    Other,
    /// No gaze recorded (track loss, blink, off-screen)
    Missing,
}

impl Aoi {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aoi::Target => "target",
            Aoi::Distractor => "distractor",
            Aoi::Other => "other",
            Aoi::Missing => "missing",
        }
    }

    /// Whether the sample counts toward the accuracy denominator
    pub fn is_valid(&self) -> bool {
        matches!(self, Aoi::Target | Aoi::Distractor)
    }
}

/// Canonical trial condition after filler removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Condition {
    Correct,
    Mispronounced,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Correct => "Correct",
            Condition::Mispronounced => "Mispronounced",
        }
    }
}

/// Which identifier counts as one unit of replication in pass 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectUnit {
    /// One unit per testing session
    #[default]
    Administration,
    /// One unit per child, pooling all of their sessions
    Subject,
}

impl SubjectUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectUnit::Administration => "administration",
            SubjectUnit::Subject => "subject",
        }
    }
}

/// One row of the gaze-sample (aoi_timepoints) table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub administration_id: AdministrationId,
    pub trial_id: TrialId,
    /// Often absent upstream; checked against the trial when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_type_id: Option<TrialTypeId>,
    /// Milliseconds relative to the disambiguation point
    pub t_norm: i64,
    pub aoi: Aoi,
}

/// One testing session of one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Administration {
    pub administration_id: AdministrationId,
    pub subject_id: SubjectId,
    /// Age in months
    #[serde(default)]
    pub age: Option<f64>,
}

/// One trial instance within an administration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub trial_id: TrialId,
    pub trial_type_id: TrialTypeId,
    pub administration_id: AdministrationId,
}

/// One distinct trial design
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialType {
    pub trial_type_id: TrialTypeId,
    /// Raw condition code as stored upstream
    pub condition: String,
    /// Stimulus layout descriptor (e.g. target side)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
}

/// Denormalized sample ⋈ administration ⋈ trial ⋈ trial type row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    pub administration_id: AdministrationId,
    pub subject_id: SubjectId,
    pub age: Option<f64>,
    pub trial_id: TrialId,
    pub trial_type_id: TrialTypeId,
    pub t_norm: i64,
    pub aoi: Aoi,
    pub condition_code: String,
    pub layout: Option<String>,
}

impl JoinedRecord {
    /// Identifier of the pass-1 aggregation unit
    pub fn unit_id(&self, unit: SubjectUnit) -> u64 {
        match unit {
            SubjectUnit::Administration => self.administration_id,
            SubjectUnit::Subject => self.subject_id,
        }
    }
}

/// Joined record carrying its canonical condition label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub joined: JoinedRecord,
    pub condition: Condition,
}

/// Target / valid / total sample counts for one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyTally {
    /// Samples on the target
    pub n_target: u32,
    /// Samples on target or distractor
    pub n_valid: u32,
    /// All samples, including other and missing
    pub n_samples: u32,
}

/// Pass-1 output: one unit's accuracy at one timepoint in one condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyPoint {
    pub condition: Condition,
    pub t_norm: i64,
    /// Administration or subject id, depending on `SubjectUnit`
    pub subject_id: u64,
    pub tally: AccuracyTally,
    /// `None` when the unit has no target or distractor samples here
    pub accuracy: Option<f64>,
}

/// Data quality flags attached to summary points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    /// Fewer than two subjects contributed; no confidence interval
    LowSupport,
    /// Some subjects had an undefined ratio and were left out
    UndefinedSubjectsExcluded,
    /// No subject had a defined ratio; mean is undefined
    NoValidSubjects,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::LowSupport => "low_support",
            QualityFlag::UndefinedSubjectsExcluded => "undefined_subjects_excluded",
            QualityFlag::NoValidSubjects => "no_valid_subjects",
        }
    }
}

/// Pass-2 output: group-level accuracy at one timepoint in one condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPoint {
    pub condition: Condition,
    pub t_norm: i64,
    pub mean_accuracy: Option<f64>,
    /// 95% confidence half-width; `None` under low support
    pub ci_half_width: Option<f64>,
    /// Subjects with a defined accuracy
    pub n_subjects: u32,
    /// Subjects excluded because their ratio was undefined
    pub n_undefined: u32,
    #[serde(default)]
    pub flags: Vec<QualityFlag>,
}

impl SummaryPoint {
    pub fn ci_lower(&self) -> Option<f64> {
        match (self.mean_accuracy, self.ci_half_width) {
            (Some(mean), Some(half)) => Some((mean - half).clamp(0.0, 1.0)),
            _ => None,
        }
    }

    pub fn ci_upper(&self) -> Option<f64> {
        match (self.mean_accuracy, self.ci_half_width) {
            (Some(mean), Some(half)) => Some((mean + half).clamp(0.0, 1.0)),
            _ => None,
        }
    }

    pub fn is_low_support(&self) -> bool {
        self.flags.contains(&QualityFlag::LowSupport)
    }
}

/// Inclusive range of t_norm values in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    /// Create a window, rejecting `start > end`
    pub fn new(start: i64, end: i64) -> Result<Self, crate::error::ComputeError> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), crate::error::ComputeError> {
        if self.start > self.end {
            return Err(crate::error::ComputeError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn contains(&self, t_norm: i64) -> bool {
        t_norm >= self.start && t_norm <= self.end
    }
}

/// How the window summarizer reduces a window to one value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMethod {
    /// Mean of the summary curve's defined means inside the window
    #[default]
    SummaryMean,
    /// Pool each subject's pass-1 tallies over the window, then average subjects
    SubjectReaggregate,
}

/// One condition's accuracy over a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub condition: Condition,
    pub window: TimeWindow,
    pub method: WindowMethod,
    pub mean_accuracy: Option<f64>,
    /// Timepoints (summary mean) or subjects (reaggregate) that contributed
    pub n_contributing: u32,
}

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Provenance of a summary payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryProvenance {
    pub dataset_name: String,
    pub subject_unit: SubjectUnit,
    pub computed_at_utc: String,
}

/// Payload-level quality counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryQuality {
    /// Summary points in the payload
    pub n_points: u32,
    /// Points without a confidence interval
    pub n_low_support: u32,
    /// Points without a defined mean
    pub n_undefined_means: u32,
}

/// Output document handed to plotting and reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub schema_version: String,
    pub producer: SummaryProducer,
    pub provenance: SummaryProvenance,
    pub quality: SummaryQuality,
    pub summary: Vec<SummaryPoint>,
    #[serde(default)]
    pub windows: Vec<WindowSummary>,
}
