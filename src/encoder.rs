//! Summary encoding
//!
//! Wraps the summary table and window rows into a versioned payload with
//! producer, provenance and quality blocks. NDJSON row output carries no
//! timestamps or instance ids, so it is byte-identical across runs.

use crate::error::ComputeError;
use crate::pipeline::PipelineOutput;
use crate::types::{
    SubjectUnit, SummaryPayload, SummaryPoint, SummaryProducer, SummaryProvenance, SummaryQuality,
};
use crate::{LOOKFLUX_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// Current output schema version
pub const OUTPUT_SCHEMA_VERSION: &str = "lookflux.summary.v1";

/// Encoder for summary payloads
#[derive(Debug, Clone)]
pub struct SummaryEncoder {
    instance_id: String,
}

impl Default for SummaryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Flat row written by [`SummaryEncoder::encode_rows_ndjson`]
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    condition: &'a str,
    t_norm: i64,
    mean_accuracy: Option<f64>,
    ci_half_width: Option<f64>,
    ci_lower: Option<f64>,
    ci_upper: Option<f64>,
    n_subjects: u32,
    n_undefined: u32,
    flags: Vec<&'static str>,
}

impl SummaryEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode pipeline output into a payload
    pub fn encode(
        &self,
        output: &PipelineOutput,
        subject_unit: SubjectUnit,
    ) -> Result<SummaryPayload, ComputeError> {
        let producer = SummaryProducer {
            name: PRODUCER_NAME.to_string(),
            version: LOOKFLUX_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = SummaryProvenance {
            dataset_name: output.dataset_name.clone(),
            subject_unit,
            computed_at_utc: Utc::now().to_rfc3339(),
        };

        Ok(SummaryPayload {
            schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
            producer,
            provenance,
            quality: Self::build_quality(&output.summary),
            summary: output.summary.clone(),
            windows: output.windows.clone(),
        })
    }

    /// Encode to a pretty JSON string
    pub fn encode_to_json(
        &self,
        output: &PipelineOutput,
        subject_unit: SubjectUnit,
    ) -> Result<String, ComputeError> {
        let payload = self.encode(output, subject_unit)?;
        serde_json::to_string_pretty(&payload).map_err(ComputeError::JsonError)
    }

    /// One JSON line per summary point, in summary order
    pub fn encode_rows_ndjson(summary: &[SummaryPoint]) -> Result<String, ComputeError> {
        let mut out = String::new();
        for point in summary {
            let row = SummaryRow {
                condition: point.condition.as_str(),
                t_norm: point.t_norm,
                mean_accuracy: point.mean_accuracy,
                ci_half_width: point.ci_half_width,
                ci_lower: point.ci_lower(),
                ci_upper: point.ci_upper(),
                n_subjects: point.n_subjects,
                n_undefined: point.n_undefined,
                flags: point.flags.iter().map(|f| f.as_str()).collect(),
            };
            let line = serde_json::to_string(&row)
                .map_err(|e| ComputeError::EncodingError(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    fn build_quality(summary: &[SummaryPoint]) -> SummaryQuality {
        SummaryQuality {
            n_points: summary.len() as u32,
            n_low_support: summary.iter().filter(|p| p.is_low_support()).count() as u32,
            n_undefined_means: summary
                .iter()
                .filter(|p| p.mean_accuracy.is_none())
                .count() as u32,
        }
    }
}
