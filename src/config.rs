//! Analysis configuration
//!
//! Everything the pipeline needs besides the four tables lives in
//! [`AnalysisConfig`], passed explicitly into each entry point.

use crate::error::ComputeError;
use crate::types::{Condition, SubjectUnit, TimeWindow, WindowMethod};
use serde::{Deserialize, Serialize};

/// Dataset analysed when none is given
pub const DEFAULT_DATASET: &str = "swingley_aslin_2002";

/// Default sampling grid of t_norm in milliseconds
pub const DEFAULT_GRID_STEP_MS: i64 = 25;

/// Raw condition codes as stored in the trial-types table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionCodes {
    /// Correct pronunciation
    pub correct: String,
    /// Mispronunciation
    pub mispronounced: String,
    /// Filler trials, dropped before aggregation
    pub filler: String,
}

impl Default for ConditionCodes {
    fn default() -> Self {
        Self {
            correct: "cp".to_string(),
            mispronounced: "mp".to_string(),
            filler: "filler".to_string(),
        }
    }
}

/// Result of looking up a raw condition code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeClass {
    Condition(Condition),
    Filler,
}

impl ConditionCodes {
    /// Classify a raw code; `None` means the code is unknown
    pub fn classify(&self, code: &str) -> Option<CodeClass> {
        if code == self.correct {
            Some(CodeClass::Condition(Condition::Correct))
        } else if code == self.mispronounced {
            Some(CodeClass::Condition(Condition::Mispronounced))
        } else if code == self.filler {
            Some(CodeClass::Filler)
        } else {
            None
        }
    }

    fn validate(&self) -> Result<(), ComputeError> {
        let codes = [&self.correct, &self.mispronounced, &self.filler];
        if codes.iter().any(|c| c.is_empty()) {
            return Err(ComputeError::InvalidConfig(
                "condition codes must not be empty".to_string(),
            ));
        }
        if self.correct == self.mispronounced
            || self.correct == self.filler
            || self.mispronounced == self.filler
        {
            return Err(ComputeError::InvalidConfig(
                "condition codes must be distinct".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inclusive age range in months
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min_months: f64,
    pub max_months: f64,
}

impl AgeRange {
    pub fn contains(&self, age: f64) -> bool {
        age >= self.min_months && age <= self.max_months
    }
}

/// Analysis configuration threaded through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Dataset identifier handed to the table source
    pub dataset_name: String,
    #[serde(default)]
    pub condition_codes: ConditionCodes,
    #[serde(default)]
    pub subject_unit: SubjectUnit,
    /// Expected t_norm spacing; `None` skips the grid check
    #[serde(default = "default_grid_step")]
    pub grid_step_ms: Option<i64>,
    /// Restrict samples to this t_norm range before aggregation
    #[serde(default)]
    pub time_range: Option<TimeWindow>,
    /// Restrict administrations to this age range
    #[serde(default)]
    pub age_range_months: Option<AgeRange>,
    /// Window summarized after aggregation
    #[serde(default)]
    pub window: Option<TimeWindow>,
    #[serde(default)]
    pub window_method: WindowMethod,
}

fn default_grid_step() -> Option<i64> {
    Some(DEFAULT_GRID_STEP_MS)
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATASET)
    }
}

impl AnalysisConfig {
    /// Create a configuration for a dataset with default settings
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            condition_codes: ConditionCodes::default(),
            subject_unit: SubjectUnit::default(),
            grid_step_ms: default_grid_step(),
            time_range: None,
            age_range_months: None,
            window: None,
            window_method: WindowMethod::default(),
        }
    }

    pub fn with_condition_codes(mut self, codes: ConditionCodes) -> Self {
        self.condition_codes = codes;
        self
    }

    pub fn with_subject_unit(mut self, unit: SubjectUnit) -> Self {
        self.subject_unit = unit;
        self
    }

    pub fn with_grid_step(mut self, step_ms: Option<i64>) -> Self {
        self.grid_step_ms = step_ms;
        self
    }

    pub fn with_time_range(mut self, range: TimeWindow) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_age_range(mut self, range: AgeRange) -> Self {
        self.age_range_months = Some(range);
        self
    }

    pub fn with_window(mut self, window: TimeWindow, method: WindowMethod) -> Self {
        self.window = Some(window);
        self.window_method = method;
        self
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.dataset_name.trim().is_empty() {
            return Err(ComputeError::InvalidConfig(
                "dataset_name must not be empty".to_string(),
            ));
        }

        self.condition_codes.validate()?;

        if let Some(step) = self.grid_step_ms {
            if step <= 0 {
                return Err(ComputeError::InvalidConfig(format!(
                    "grid_step_ms must be positive, got {}",
                    step
                )));
            }
        }

        if let Some(range) = &self.time_range {
            range.validate()?;
        }

        if let Some(window) = &self.window {
            window.validate()?;
        }

        if let Some(ages) = &self.age_range_months {
            if ages.min_months.is_nan()
                || ages.max_months.is_nan()
                || ages.min_months > ages.max_months
            {
                return Err(ComputeError::InvalidConfig(format!(
                    "age range {}..{} is empty",
                    ages.min_months, ages.max_months
                )));
            }
        }

        Ok(())
    }

    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.dataset_name, DEFAULT_DATASET);
        assert_eq!(config.grid_step_ms, Some(25));
        assert_eq!(config.subject_unit, SubjectUnit::Administration);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_json_fills_defaults() {
        let config = AnalysisConfig::from_json(r#"{"dataset_name": "pomper_saffran_2016"}"#).unwrap();
        assert_eq!(config.dataset_name, "pomper_saffran_2016");
        assert_eq!(config.condition_codes, ConditionCodes::default());
        assert_eq!(config.grid_step_ms, Some(25));
        assert_eq!(config.window_method, WindowMethod::SummaryMean);
    }

    #[test]
    fn test_json_round_trip() {
        let config = AnalysisConfig::new("swingley_aslin_2002")
            .with_subject_unit(SubjectUnit::Subject)
            .with_window(TimeWindow { start: 300, end: 2000 }, WindowMethod::SubjectReaggregate);

        let json = config.to_json().unwrap();
        let loaded = AnalysisConfig::from_json(&json).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_validation_failures() {
        let empty_name = AnalysisConfig::new("  ");
        assert!(empty_name.validate().is_err());

        let same_codes = AnalysisConfig::default().with_condition_codes(ConditionCodes {
            correct: "cp".to_string(),
            mispronounced: "cp".to_string(),
            filler: "filler".to_string(),
        });
        assert!(same_codes.validate().is_err());

        let bad_step = AnalysisConfig::default().with_grid_step(Some(0));
        assert!(bad_step.validate().is_err());

        let bad_window = AnalysisConfig::default()
            .with_window(TimeWindow { start: 10, end: 0 }, WindowMethod::SummaryMean);
        assert!(matches!(
            bad_window.validate(),
            Err(ComputeError::InvalidWindow { start: 10, end: 0 })
        ));

        let bad_ages = AnalysisConfig::default().with_age_range(AgeRange {
            min_months: 24.0,
            max_months: 18.0,
        });
        assert!(bad_ages.validate().is_err());
    }

    #[test]
    fn test_classify_codes() {
        let codes = ConditionCodes::default();
        assert_eq!(codes.classify("cp"), Some(CodeClass::Condition(Condition::Correct)));
        assert_eq!(
            codes.classify("mp"),
            Some(CodeClass::Condition(Condition::Mispronounced))
        );
        assert_eq!(codes.classify("filler"), Some(CodeClass::Filler));
        assert_eq!(codes.classify("CP"), None);
    }
}
