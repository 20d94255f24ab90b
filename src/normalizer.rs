//! Condition normalization
//!
//! Drops filler trials, relabels the two test conditions to their canonical
//! names, and rejects any code outside the configured three. Also applies the
//! optional time and age scope filters from [`AnalysisConfig`].

use crate::config::{AnalysisConfig, CodeClass, ConditionCodes};
use crate::error::ComputeError;
use crate::types::{JoinedRecord, LabeledRecord};
use std::collections::BTreeSet;

/// Normalizer for raw condition codes
pub struct ConditionNormalizer;

impl ConditionNormalizer {
    /// Label joined records, dropping fillers and failing on unknown codes
    pub fn normalize(
        records: Vec<JoinedRecord>,
        codes: &ConditionCodes,
    ) -> Result<Vec<LabeledRecord>, ComputeError> {
        let total = records.len();
        let mut labeled = Vec::with_capacity(total);

        for joined in records {
            match codes.classify(&joined.condition_code) {
                Some(CodeClass::Condition(condition)) => {
                    labeled.push(LabeledRecord { joined, condition })
                }
                Some(CodeClass::Filler) => {}
                None => {
                    return Err(ComputeError::UnknownCondition {
                        code: joined.condition_code,
                        trial_type_id: joined.trial_type_id,
                    });
                }
            }
        }

        let fillers = total - labeled.len();
        if fillers > 0 {
            tracing::info!(
                filler = %codes.filler,
                excluded = fillers,
                kept = labeled.len(),
                "excluded filler samples"
            );
        }

        Ok(labeled)
    }

    /// Apply the configured t_norm range and age range
    pub fn restrict_scope(
        records: Vec<LabeledRecord>,
        config: &AnalysisConfig,
    ) -> Vec<LabeledRecord> {
        if config.time_range.is_none() && config.age_range_months.is_none() {
            return records;
        }

        let before = records.len();
        let mut ageless: BTreeSet<u64> = BTreeSet::new();

        let kept: Vec<LabeledRecord> = records
            .into_iter()
            .filter(|r| {
                config
                    .time_range
                    .map_or(true, |range| range.contains(r.joined.t_norm))
            })
            .filter(|r| match (config.age_range_months, r.joined.age) {
                (None, _) => true,
                (Some(range), Some(age)) => range.contains(age),
                (Some(_), None) => {
                    ageless.insert(r.joined.administration_id);
                    false
                }
            })
            .collect();

        if !ageless.is_empty() {
            tracing::warn!(
                administrations = ageless.len(),
                "administrations without age excluded by age filter"
            );
        }

        tracing::debug!(before, after = kept.len(), "restricted analysis scope");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgeRange;
    use crate::types::{Aoi, Condition, TimeWindow};
    use pretty_assertions::assert_eq;

    fn make_record(code: &str, t_norm: i64, age: Option<f64>) -> JoinedRecord {
        JoinedRecord {
            administration_id: 1,
            subject_id: 100,
            age,
            trial_id: 10,
            trial_type_id: 3,
            t_norm,
            aoi: Aoi::Target,
            condition_code: code.to_string(),
            layout: None,
        }
    }

    #[test]
    fn test_relabel_and_drop_filler() {
        let records = vec![
            make_record("cp", 0, None),
            make_record("filler", 0, None),
            make_record("mp", 0, None),
            make_record("filler", 25, None),
        ];

        let labeled = ConditionNormalizer::normalize(records, &ConditionCodes::default()).unwrap();
        let conditions: Vec<Condition> = labeled.iter().map(|r| r.condition).collect();
        assert_eq!(conditions, vec![Condition::Correct, Condition::Mispronounced]);
    }

    #[test]
    fn test_unknown_condition_is_error() {
        let records = vec![make_record("cp", 0, None), make_record("novel", 0, None)];

        match ConditionNormalizer::normalize(records, &ConditionCodes::default()) {
            Err(ComputeError::UnknownCondition { code, trial_type_id }) => {
                assert_eq!(code, "novel");
                assert_eq!(trial_type_id, 3);
            }
            other => panic!("expected unknown condition, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_codes() {
        let codes = ConditionCodes {
            correct: "correct".to_string(),
            mispronounced: "mispronunciation".to_string(),
            filler: "familiar".to_string(),
        };
        let records = vec![
            make_record("correct", 0, None),
            make_record("familiar", 0, None),
        ];
        let labeled = ConditionNormalizer::normalize(records, &codes).unwrap();
        assert_eq!(labeled.len(), 1);

        // Default codes are not implicitly accepted
        assert!(ConditionNormalizer::normalize(vec![make_record("cp", 0, None)], &codes).is_err());
    }

    #[test]
    fn test_restrict_scope() {
        let records = ConditionNormalizer::normalize(
            vec![
                make_record("cp", -500, Some(18.0)),
                make_record("cp", 0, Some(18.0)),
                make_record("cp", 1000, Some(30.0)),
                make_record("cp", 1000, None),
            ],
            &ConditionCodes::default(),
        )
        .unwrap();

        let unrestricted = ConditionNormalizer::restrict_scope(records.clone(), &AnalysisConfig::default());
        assert_eq!(unrestricted.len(), 4);

        let by_time = AnalysisConfig::default().with_time_range(TimeWindow { start: 0, end: 2000 });
        let kept = ConditionNormalizer::restrict_scope(records.clone(), &by_time);
        assert_eq!(kept.len(), 3);

        let by_age = AnalysisConfig::default().with_age_range(AgeRange {
            min_months: 12.0,
            max_months: 24.0,
        });
        let kept = ConditionNormalizer::restrict_scope(records, &by_age);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.joined.age == Some(18.0)));
    }
}
