//! Window summaries
//!
//! Reduces a condition's accuracy curve over an inclusive t_norm window to a
//! single value. No confidence interval is computed here.

use crate::aggregate::{mean, Aggregation};
use crate::error::ComputeError;
use crate::types::{
    AccuracyPoint, AccuracyTally, Condition, SummaryPoint, TimeWindow, WindowMethod,
    WindowSummary,
};
use std::collections::{BTreeMap, BTreeSet};

/// Summarizer for time windows
pub struct WindowSummarizer;

impl WindowSummarizer {
    /// Summarize with the given method
    pub fn apply(
        method: WindowMethod,
        aggregation: &Aggregation,
        window: TimeWindow,
    ) -> Result<Vec<WindowSummary>, ComputeError> {
        match method {
            WindowMethod::SummaryMean => Self::summarize_summary(&aggregation.summary, window),
            WindowMethod::SubjectReaggregate => {
                Self::reaggregate(&aggregation.subject_points, window)
            }
        }
    }

    /// Mean of the defined summary means inside the window
    pub fn summarize_summary(
        summary: &[SummaryPoint],
        window: TimeWindow,
    ) -> Result<Vec<WindowSummary>, ComputeError> {
        window.validate()?;

        let mut by_condition: BTreeMap<Condition, Vec<f64>> = BTreeMap::new();
        for point in summary {
            let values = by_condition.entry(point.condition).or_default();
            if !window.contains(point.t_norm) {
                continue;
            }
            if let Some(m) = point.mean_accuracy {
                values.push(m);
            }
        }

        Ok(by_condition
            .into_iter()
            .map(|(condition, values)| WindowSummary {
                condition,
                window,
                method: WindowMethod::SummaryMean,
                mean_accuracy: mean(&values),
                n_contributing: values.len() as u32,
            })
            .collect())
    }

    /// Pool each unit's tallies over the window, then average the units
    pub fn reaggregate(
        points: &[AccuracyPoint],
        window: TimeWindow,
    ) -> Result<Vec<WindowSummary>, ComputeError> {
        window.validate()?;

        let mut conditions: BTreeSet<Condition> = BTreeSet::new();
        let mut pooled: BTreeMap<(Condition, u64), AccuracyTally> = BTreeMap::new();

        for point in points {
            conditions.insert(point.condition);
            if window.contains(point.t_norm) {
                pooled
                    .entry((point.condition, point.subject_id))
                    .or_default()
                    .merge(&point.tally);
            }
        }

        let mut per_condition: BTreeMap<Condition, Vec<f64>> =
            conditions.into_iter().map(|c| (c, Vec::new())).collect();
        for ((condition, _), tally) in pooled {
            if let (Some(values), Some(accuracy)) =
                (per_condition.get_mut(&condition), tally.accuracy())
            {
                values.push(accuracy);
            }
        }

        Ok(per_condition
            .into_iter()
            .map(|(condition, values)| WindowSummary {
                condition,
                window,
                method: WindowMethod::SubjectReaggregate,
                mean_accuracy: mean(&values),
                n_contributing: values.len() as u32,
            })
            .collect())
    }
}
