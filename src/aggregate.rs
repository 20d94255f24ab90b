//! Two-stage aggregation
//!
//! Pass 1 reduces each unit's samples to one accuracy per (condition, t_norm).
//! Pass 2 averages those per-unit accuracies across units and attaches a 95%
//! confidence half-width computed over units, not over raw samples.
//!
//! Both passes group through ordered maps, so output is sorted by
//! (condition, t_norm[, unit]) and identical from run to run.

use crate::types::{
    AccuracyPoint, AccuracyTally, Condition, LabeledRecord, QualityFlag, SubjectUnit,
    SummaryPoint,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// z value for a two-sided 95% interval
pub const CI_Z_95: f64 = 1.96;

/// Below this many defined units a point carries no interval
pub const MIN_SUBJECTS_FOR_CI: u32 = 2;

/// Output of both passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Pass-1 rows, one per (condition, t_norm, unit)
    pub subject_points: Vec<AccuracyPoint>,
    /// Pass-2 rows, one per (condition, t_norm)
    pub summary: Vec<SummaryPoint>,
}

/// Aggregator implementing the within-then-across reduction
pub struct TwoStageAggregator;

impl TwoStageAggregator {
    /// Run both passes
    pub fn aggregate(records: &[LabeledRecord], unit: SubjectUnit) -> Aggregation {
        let subject_points = Self::within_subject(records, unit);
        let summary = Self::across_subjects(&subject_points);
        Aggregation {
            subject_points,
            summary,
        }
    }

    /// Pass 1: one tally per (condition, t_norm, unit)
    pub fn within_subject(records: &[LabeledRecord], unit: SubjectUnit) -> Vec<AccuracyPoint> {
        let mut groups: BTreeMap<(Condition, i64, u64), AccuracyTally> = BTreeMap::new();

        for record in records {
            let key = (
                record.condition,
                record.joined.t_norm,
                record.joined.unit_id(unit),
            );
            groups.entry(key).or_default().add(record.joined.aoi);
        }

        let points: Vec<AccuracyPoint> = groups
            .into_iter()
            .map(|((condition, t_norm, subject_id), tally)| AccuracyPoint {
                condition,
                t_norm,
                subject_id,
                tally,
                accuracy: tally.accuracy(),
            })
            .collect();

        tracing::debug!(
            records = records.len(),
            points = points.len(),
            unit = unit.as_str(),
            "within-subject pass complete"
        );

        points
    }

    /// Pass 2: mean and half-width across units per (condition, t_norm)
    pub fn across_subjects(points: &[AccuracyPoint]) -> Vec<SummaryPoint> {
        let mut groups: BTreeMap<(Condition, i64), (Vec<f64>, u32)> = BTreeMap::new();

        for point in points {
            let entry = groups.entry((point.condition, point.t_norm)).or_default();
            match point.accuracy {
                Some(accuracy) => entry.0.push(accuracy),
                None => entry.1 += 1,
            }
        }

        let summary: Vec<SummaryPoint> = groups
            .into_iter()
            .map(|((condition, t_norm), (values, n_undefined))| {
                summarize_group(condition, t_norm, &values, n_undefined)
            })
            .collect();

        let low_support = summary.iter().filter(|p| p.is_low_support()).count();
        if low_support > 0 {
            tracing::warn!(
                points = low_support,
                min_subjects = MIN_SUBJECTS_FOR_CI,
                "summary points without confidence interval due to low support"
            );
        }

        let undefined: u32 = summary.iter().map(|p| p.n_undefined).sum();
        if undefined > 0 {
            tracing::warn!(
                excluded = undefined,
                "subject accuracies undefined (no target or distractor samples) and excluded"
            );
        }

        summary
    }
}

fn summarize_group(
    condition: Condition,
    t_norm: i64,
    values: &[f64],
    n_undefined: u32,
) -> SummaryPoint {
    let n_subjects = values.len() as u32;
    let mut flags = Vec::new();

    if n_undefined > 0 {
        flags.push(QualityFlag::UndefinedSubjectsExcluded);
    }
    if n_subjects == 0 {
        flags.push(QualityFlag::NoValidSubjects);
    }
    if n_subjects < MIN_SUBJECTS_FOR_CI {
        flags.push(QualityFlag::LowSupport);
    }

    SummaryPoint {
        condition,
        t_norm,
        mean_accuracy: mean(values),
        ci_half_width: ci_half_width(values),
        n_subjects,
        n_undefined,
        flags,
    }
}

/// Arithmetic mean, `None` when empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n − 1), `None` below two values
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// 1.96 · sd / √n over per-unit values, `None` under low support
pub fn ci_half_width(values: &[f64]) -> Option<f64> {
    if (values.len() as u32) < MIN_SUBJECTS_FOR_CI {
        return None;
    }
    let sd = sample_std_dev(values)?;
    Some(CI_Z_95 * sd / (values.len() as f64).sqrt())
}
