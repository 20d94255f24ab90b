//! Table join
//!
//! Denormalizes gaze samples against administrations, trials and trial types
//! with strict inner-join semantics: every sample must find exactly one parent
//! row in each table, and duplicate parent keys are rejected instead of
//! fanning out.

use crate::error::{ComputeError, JoinIntegrityError};
use crate::schema::{
    Tables, ADMINISTRATIONS_TABLE, SAMPLES_TABLE, TRIALS_TABLE, TRIAL_TYPES_TABLE,
};
use crate::types::{Administration, JoinedRecord, Trial, TrialType};
use std::collections::HashMap;

/// Joiner for the four input tables
pub struct TableJoiner;

impl TableJoiner {
    /// Join samples to their administration, trial and trial type.
    ///
    /// Output rows are in input sample order, one per sample.
    pub fn join(tables: &Tables) -> Result<Vec<JoinedRecord>, ComputeError> {
        let administrations = index_unique(
            &tables.administrations,
            |a: &Administration| a.administration_id,
            ADMINISTRATIONS_TABLE,
            "administration_id",
        )?;
        let trials = index_unique(
            &tables.trials,
            |t: &Trial| t.trial_id,
            TRIALS_TABLE,
            "trial_id",
        )?;
        let trial_types = index_unique(
            &tables.trial_types,
            |t: &TrialType| t.trial_type_id,
            TRIAL_TYPES_TABLE,
            "trial_type_id",
        )?;

        // Trials must resolve on their own, whether or not any sample uses them
        for (row, trial) in tables.trials.iter().enumerate() {
            lookup(
                &administrations,
                trial.administration_id,
                ADMINISTRATIONS_TABLE,
                "administration_id",
                TRIALS_TABLE,
                row,
            )?;
            lookup(
                &trial_types,
                trial.trial_type_id,
                TRIAL_TYPES_TABLE,
                "trial_type_id",
                TRIALS_TABLE,
                row,
            )?;
        }

        let mut joined = Vec::with_capacity(tables.samples.len());

        for (row, sample) in tables.samples.iter().enumerate() {
            let administration = lookup(
                &administrations,
                sample.administration_id,
                ADMINISTRATIONS_TABLE,
                "administration_id",
                SAMPLES_TABLE,
                row,
            )?;
            let trial = lookup(
                &trials,
                sample.trial_id,
                TRIALS_TABLE,
                "trial_id",
                SAMPLES_TABLE,
                row,
            )?;

            if trial.administration_id != sample.administration_id {
                return Err(JoinIntegrityError::AdministrationMismatch {
                    row,
                    trial_id: trial.trial_id,
                    sample_administration_id: sample.administration_id,
                    trial_administration_id: trial.administration_id,
                }
                .into());
            }

            if let Some(declared) = sample.trial_type_id {
                if declared != trial.trial_type_id {
                    return Err(JoinIntegrityError::TrialTypeMismatch {
                        row,
                        trial_id: trial.trial_id,
                        sample_trial_type_id: declared,
                        trial_trial_type_id: trial.trial_type_id,
                    }
                    .into());
                }
            }

            // Resolved above when validating trials
            let trial_type = lookup(
                &trial_types,
                trial.trial_type_id,
                TRIAL_TYPES_TABLE,
                "trial_type_id",
                SAMPLES_TABLE,
                row,
            )?;

            joined.push(JoinedRecord {
                administration_id: administration.administration_id,
                subject_id: administration.subject_id,
                age: administration.age,
                trial_id: trial.trial_id,
                trial_type_id: trial_type.trial_type_id,
                t_norm: sample.t_norm,
                aoi: sample.aoi,
                condition_code: trial_type.condition.clone(),
                layout: trial_type.layout.clone(),
            });
        }

        tracing::debug!(
            samples = tables.samples.len(),
            joined = joined.len(),
            "joined gaze samples"
        );

        Ok(joined)
    }
}

/// Index rows by key, rejecting the first key (in row order) that repeats
fn index_unique<'a, T>(
    rows: &'a [T],
    key: impl Fn(&T) -> u64,
    table: &'static str,
    key_name: &'static str,
) -> Result<HashMap<u64, &'a T>, JoinIntegrityError> {
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        let id = key(row);
        if index.insert(id, row).is_some() {
            let count = rows.iter().filter(|r| key(*r) == id).count();
            return Err(JoinIntegrityError::DuplicateKey {
                table,
                key: key_name,
                id,
                count,
            });
        }
    }
    Ok(index)
}

fn lookup<'a, T>(
    index: &HashMap<u64, &'a T>,
    id: u64,
    table: &'static str,
    key: &'static str,
    referrer: &'static str,
    row: usize,
) -> Result<&'a T, JoinIntegrityError> {
    index
        .get(&id)
        .copied()
        .ok_or(JoinIntegrityError::MissingParent {
            table,
            key,
            id,
            referrer,
            row,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Aoi, GazeSample};
    use pretty_assertions::assert_eq;

    fn make_tables() -> Tables {
        let sample = |administration_id, trial_id, t_norm, aoi| GazeSample {
            administration_id,
            trial_id,
            trial_type_id: None,
            t_norm,
            aoi,
        };

        Tables {
            samples: vec![
                sample(1, 10, 0, Aoi::Target),
                sample(1, 10, 25, Aoi::Distractor),
                sample(2, 20, 0, Aoi::Missing),
                sample(2, 21, 0, Aoi::Target),
            ],
            administrations: vec![
                Administration {
                    administration_id: 1,
                    subject_id: 100,
                    age: Some(18.0),
                },
                Administration {
                    administration_id: 2,
                    subject_id: 101,
                    age: None,
                },
            ],
            trials: vec![
                Trial {
                    trial_id: 10,
                    trial_type_id: 1,
                    administration_id: 1,
                },
                Trial {
                    trial_id: 20,
                    trial_type_id: 2,
                    administration_id: 2,
                },
                Trial {
                    trial_id: 21,
                    trial_type_id: 1,
                    administration_id: 2,
                },
            ],
            trial_types: vec![
                TrialType {
                    trial_type_id: 1,
                    condition: "cp".to_string(),
                    layout: Some("left".to_string()),
                },
                TrialType {
                    trial_type_id: 2,
                    condition: "mp".to_string(),
                    layout: None,
                },
            ],
        }
    }

    #[test]
    fn test_join_completeness() {
        let tables = make_tables();
        let joined = TableJoiner::join(&tables).unwrap();

        // One record per sample, same order
        assert_eq!(joined.len(), tables.samples.len());
        for (record, sample) in joined.iter().zip(&tables.samples) {
            assert_eq!(record.administration_id, sample.administration_id);
            assert_eq!(record.trial_id, sample.trial_id);
            assert_eq!(record.t_norm, sample.t_norm);
            assert_eq!(record.aoi, sample.aoi);
        }

        assert_eq!(joined[0].subject_id, 100);
        assert_eq!(joined[0].condition_code, "cp");
        assert_eq!(joined[0].layout.as_deref(), Some("left"));
        assert_eq!(joined[2].condition_code, "mp");
        assert_eq!(joined[2].age, None);
    }

    #[test]
    fn test_missing_administration() {
        let mut tables = make_tables();
        tables.samples[3].administration_id = 9;

        let err = TableJoiner::join(&tables).unwrap_err();
        match err {
            ComputeError::JoinIntegrity(JoinIntegrityError::MissingParent {
                table, id, row, ..
            }) => {
                assert_eq!(table, ADMINISTRATIONS_TABLE);
                assert_eq!(id, 9);
                assert_eq!(row, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_trial() {
        let mut tables = make_tables();
        tables.samples[0].trial_id = 99;

        assert!(matches!(
            TableJoiner::join(&tables),
            Err(ComputeError::JoinIntegrity(JoinIntegrityError::MissingParent {
                table: TRIALS_TABLE,
                id: 99,
                ..
            }))
        ));
    }

    #[test]
    fn test_trial_with_unknown_trial_type() {
        let mut tables = make_tables();
        tables.trials[1].trial_type_id = 42;

        assert!(matches!(
            TableJoiner::join(&tables),
            Err(ComputeError::JoinIntegrity(JoinIntegrityError::MissingParent {
                table: TRIAL_TYPES_TABLE,
                referrer: TRIALS_TABLE,
                id: 42,
                row: 1,
                ..
            }))
        ));
    }

    #[test]
    fn test_duplicate_parent_key_rejected() {
        let mut tables = make_tables();
        tables.administrations.push(Administration {
            administration_id: 1,
            subject_id: 555,
            age: None,
        });

        let err = TableJoiner::join(&tables).unwrap_err();
        match err {
            ComputeError::JoinIntegrity(JoinIntegrityError::DuplicateKey {
                table, id, count, ..
            }) => {
                assert_eq!(table, ADMINISTRATIONS_TABLE);
                assert_eq!(id, 1);
                assert_eq!(count, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_administration_mismatch() {
        let mut tables = make_tables();
        // Trial 10 belongs to administration 1
        tables.samples[0].administration_id = 2;

        assert!(matches!(
            TableJoiner::join(&tables),
            Err(ComputeError::JoinIntegrity(
                JoinIntegrityError::AdministrationMismatch { row: 0, trial_id: 10, .. }
            ))
        ));
    }

    #[test]
    fn test_declared_trial_type_checked() {
        let mut tables = make_tables();
        tables.samples[0].trial_type_id = Some(1);
        assert!(TableJoiner::join(&tables).is_ok());

        tables.samples[0].trial_type_id = Some(2);
        assert!(matches!(
            TableJoiner::join(&tables),
            Err(ComputeError::JoinIntegrity(
                JoinIntegrityError::TrialTypeMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_empty_samples() {
        let mut tables = make_tables();
        tables.samples.clear();
        assert!(TableJoiner::join(&tables).unwrap().is_empty());
    }
}
