//! Table bundle for one dataset

use crate::types::{Administration, GazeSample, Trial, TrialType};
use serde::{Deserialize, Serialize};

/// Current input schema version
pub const TABLES_SCHEMA_VERSION: &str = "lookflux.tables.v1";

/// Upstream table names, used for file lookup and error messages
pub const SAMPLES_TABLE: &str = "aoi_timepoints";
pub const ADMINISTRATIONS_TABLE: &str = "administrations";
pub const TRIALS_TABLE: &str = "trials";
pub const TRIAL_TYPES_TABLE: &str = "trial_types";

/// The four input tables for a single dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    #[serde(rename = "aoi_timepoints", alias = "gaze_samples")]
    pub samples: Vec<GazeSample>,
    pub administrations: Vec<Administration>,
    pub trials: Vec<Trial>,
    pub trial_types: Vec<TrialType>,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub samples: usize,
    pub administrations: usize,
    pub trials: usize,
    pub trial_types: usize,
}

impl Tables {
    pub fn new(
        samples: Vec<GazeSample>,
        administrations: Vec<Administration>,
        trials: Vec<Trial>,
        trial_types: Vec<TrialType>,
    ) -> Self {
        Self {
            samples,
            administrations,
            trials,
            trial_types,
        }
    }

    pub fn counts(&self) -> TableCounts {
        TableCounts {
            samples: self.samples.len(),
            administrations: self.administrations.len(),
            trials: self.trials.len(),
            trial_types: self.trial_types.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Distinct t_norm values in ascending order
    pub fn time_points(&self) -> Vec<i64> {
        let mut points: Vec<i64> = self.samples.iter().map(|s| s.t_norm).collect();
        points.sort_unstable();
        points.dedup();
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Aoi;

    #[test]
    fn test_bundle_accepts_both_sample_names() {
        let upstream = r#"{
            "aoi_timepoints": [{"administration_id": 1, "trial_id": 10, "t_norm": 0, "aoi": "target"}],
            "administrations": [], "trials": [], "trial_types": []
        }"#;
        let aliased = r#"{
            "gaze_samples": [{"administration_id": 1, "trial_id": 10, "t_norm": 0, "aoi": "target"}],
            "administrations": [], "trials": [], "trial_types": []
        }"#;

        let a: Tables = serde_json::from_str(upstream).unwrap();
        let b: Tables = serde_json::from_str(aliased).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.samples[0].aoi, Aoi::Target);
        assert_eq!(a.samples[0].trial_type_id, None);
    }

    #[test]
    fn test_time_points_sorted_distinct() {
        let sample = |t_norm| GazeSample {
            administration_id: 1,
            trial_id: 1,
            trial_type_id: None,
            t_norm,
            aoi: Aoi::Other,
        };
        let tables = Tables::new(
            vec![sample(50), sample(-25), sample(0), sample(50)],
            vec![],
            vec![],
            vec![],
        );
        assert_eq!(tables.time_points(), vec![-25, 0, 50]);
        assert_eq!(tables.counts().samples, 4);
    }
}
