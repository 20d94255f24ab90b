//! Per-timepoint accuracy reduction
//!
//! Accuracy is the share of target looks among samples on either picture:
//!
//! ```text
//! accuracy = n(target) / n(target | distractor)
//! ```
//!
//! Other and missing samples are left out of both counts. A group with no
//! target or distractor samples has no accuracy at all (`None`), which is
//! distinct from an accuracy of zero.

use crate::types::{AccuracyTally, Aoi};

impl AccuracyTally {
    /// Count one sample
    pub fn add(&mut self, aoi: Aoi) {
        self.n_samples += 1;
        match aoi {
            Aoi::Target => {
                self.n_target += 1;
                self.n_valid += 1;
            }
            Aoi::Distractor => self.n_valid += 1,
            Aoi::Other | Aoi::Missing => {}
        }
    }

    /// Combine counts from another group
    pub fn merge(&mut self, other: &AccuracyTally) {
        self.n_target += other.n_target;
        self.n_valid += other.n_valid;
        self.n_samples += other.n_samples;
    }

    /// Tally a set of samples
    pub fn from_aois<I: IntoIterator<Item = Aoi>>(aois: I) -> Self {
        let mut tally = Self::default();
        for aoi in aois {
            tally.add(aoi);
        }
        tally
    }

    /// Target share of valid samples, `None` with no valid samples
    pub fn accuracy(&self) -> Option<f64> {
        if self.n_valid == 0 {
            return None;
        }
        Some(self.n_target as f64 / self.n_valid as f64)
    }

    /// Samples left out of the denominator (other + missing)
    pub fn n_excluded(&self) -> u32 {
        self.n_samples - self.n_valid
    }
}

/// Reduce a group of samples to its accuracy
pub fn reduce_accuracy<I: IntoIterator<Item = Aoi>>(aois: I) -> Option<f64> {
    AccuracyTally::from_aois(aois).accuracy()
}
