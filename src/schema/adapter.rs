//! Parsing and validation of table payloads
//!
//! Tables arrive either as a single bundle document or one file per table.
//! Per-table files may be a JSON array or NDJSON (one row per line).

use crate::error::ComputeError;
use crate::schema::tables::Tables;
use crate::types::GazeSample;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Adapter for turning raw table payloads into typed rows
pub struct TableAdapter;

impl TableAdapter {
    /// Parse a JSON string containing an array of rows
    pub fn parse_array<T: DeserializeOwned>(json: &str) -> Result<Vec<T>, ComputeError> {
        let rows: Vec<T> = serde_json::from_str(json)?;
        Ok(rows)
    }

    /// Parse NDJSON (newline-delimited JSON) rows
    pub fn parse_ndjson<T: DeserializeOwned>(ndjson: &str) -> Result<Vec<T>, ComputeError> {
        let mut rows = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(trimmed) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(rows)
    }

    /// Parse a table in either format, picking by the first non-space character
    pub fn parse_table<T: DeserializeOwned>(content: &str) -> Result<Vec<T>, ComputeError> {
        if content.trim_start().starts_with('[') {
            Self::parse_array(content)
        } else {
            Self::parse_ndjson(content)
        }
    }

    /// Parse a bundle document holding all four tables
    pub fn parse_bundle(json: &str) -> Result<Tables, ComputeError> {
        serde_json::from_str(json)
            .map_err(|e| ComputeError::ParseError(format!("Failed to parse table bundle: {}", e)))
    }

    /// Fail on the first sample whose t_norm is off the grid
    pub fn check_time_grid(samples: &[GazeSample], step_ms: i64) -> Result<(), ComputeError> {
        match Self::validate_time_grid(samples, step_ms).into_iter().next() {
            Some(issue) => Err(ComputeError::IrregularTimeGrid {
                row: issue.index,
                t_norm: issue.t_norm,
                step_ms,
            }),
            None => Ok(()),
        }
    }

    /// Collect every sample whose t_norm is off the grid
    pub fn validate_time_grid(samples: &[GazeSample], step_ms: i64) -> Vec<GridIssue> {
        if step_ms <= 0 {
            return Vec::new();
        }
        samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.t_norm.rem_euclid(step_ms) != 0)
            .map(|(index, s)| GridIssue {
                index,
                t_norm: s.t_norm,
            })
            .collect()
    }
}

/// A sample that does not sit on the expected time grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridIssue {
    pub index: usize,
    pub t_norm: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Administration, Aoi};

    fn sample(t_norm: i64) -> GazeSample {
        GazeSample {
            administration_id: 1,
            trial_id: 1,
            trial_type_id: None,
            t_norm,
            aoi: Aoi::Target,
        }
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = r#"{"administration_id": 1, "subject_id": 100, "age": 18.5}

{"administration_id": 2, "subject_id": 101}"#;

        let rows: Vec<Administration> = TableAdapter::parse_ndjson(ndjson).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].age, Some(18.5));
        assert_eq!(rows[1].age, None);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let ndjson = "{\"administration_id\": 1, \"subject_id\": 100}\nnot json";
        let err = TableAdapter::parse_ndjson::<Administration>(ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_table_detects_format() {
        let array = r#"  [{"administration_id": 1, "subject_id": 100}]"#;
        let rows: Vec<Administration> = TableAdapter::parse_table(array).unwrap();
        assert_eq!(rows.len(), 1);

        let ndjson = r#"{"administration_id": 1, "subject_id": 100}"#;
        let rows: Vec<Administration> = TableAdapter::parse_table(ndjson).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_unknown_aoi_label_rejected() {
        let json = r#"[{"administration_id": 1, "trial_id": 1, "t_norm": 0, "aoi": "left"}]"#;
        assert!(TableAdapter::parse_array::<GazeSample>(json).is_err());
    }

    #[test]
    fn test_time_grid() {
        let on_grid = vec![sample(-50), sample(-25), sample(0), sample(25)];
        assert!(TableAdapter::check_time_grid(&on_grid, 25).is_ok());

        let off_grid = vec![sample(0), sample(33), sample(-10)];
        let issues = TableAdapter::validate_time_grid(&off_grid, 25);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0], GridIssue { index: 1, t_norm: 33 });

        match TableAdapter::check_time_grid(&off_grid, 25) {
            Err(ComputeError::IrregularTimeGrid { row, t_norm, step_ms }) => {
                assert_eq!((row, t_norm, step_ms), (1, 33, 25));
            }
            other => panic!("expected grid error, got {:?}", other),
        }
    }
}
