//! Table sources
//!
//! Retrieval is an external concern. The pipeline only sees [`TableSource`],
//! which hands back the four tables for one dataset name.

use crate::error::ComputeError;
use crate::schema::adapter::TableAdapter;
use crate::schema::tables::{
    Tables, ADMINISTRATIONS_TABLE, SAMPLES_TABLE, TRIALS_TABLE, TRIAL_TYPES_TABLE,
};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Trait for anything that can provide the tables of a dataset
pub trait TableSource {
    /// Load the four tables for `dataset_name`
    fn load_tables(&self, dataset_name: &str) -> Result<Tables, ComputeError>;
}

/// Tables already in memory serve any dataset name
impl TableSource for Tables {
    fn load_tables(&self, _dataset_name: &str) -> Result<Tables, ComputeError> {
        Ok(self.clone())
    }
}

/// Snapshot directory laid out as `<root>/<dataset>/<table>.json|.ndjson`
///
/// A `<root>/<dataset>.json` bundle file is used when the directory is absent.
#[derive(Debug, Clone)]
pub struct DirectoryTableSource {
    root: PathBuf,
}

impl DirectoryTableSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Dataset names found under the root, sorted
    pub fn list_datasets(&self) -> Result<Vec<String>, ComputeError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|n| n.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn read_table<T: DeserializeOwned>(dir: &Path, table: &str) -> Result<Vec<T>, ComputeError> {
        let json_path = dir.join(format!("{}.json", table));
        let ndjson_path = dir.join(format!("{}.ndjson", table));

        let (path, content) = if json_path.is_file() {
            let content = fs::read_to_string(&json_path)?;
            (json_path, content)
        } else if ndjson_path.is_file() {
            let content = fs::read_to_string(&ndjson_path)?;
            (ndjson_path, content)
        } else {
            return Err(ComputeError::ParseError(format!(
                "Missing table '{}' in {}",
                table,
                dir.display()
            )));
        };

        tracing::debug!(table, path = %path.display(), "reading table");
        TableAdapter::parse_table(&content).map_err(|e| {
            ComputeError::ParseError(format!("{}: {}", path.display(), e))
        })
    }
}

impl TableSource for DirectoryTableSource {
    fn load_tables(&self, dataset_name: &str) -> Result<Tables, ComputeError> {
        let dir = self.root.join(dataset_name);

        if dir.is_dir() {
            return Ok(Tables {
                samples: Self::read_table(&dir, SAMPLES_TABLE)?,
                administrations: Self::read_table(&dir, ADMINISTRATIONS_TABLE)?,
                trials: Self::read_table(&dir, TRIALS_TABLE)?,
                trial_types: Self::read_table(&dir, TRIAL_TYPES_TABLE)?,
            });
        }

        let bundle = self.root.join(format!("{}.json", dataset_name));
        if bundle.is_file() {
            let content = fs::read_to_string(&bundle)?;
            return TableAdapter::parse_bundle(&content);
        }

        Err(ComputeError::DatasetNotFound(format!(
            "{} (looked in {})",
            dataset_name,
            self.root.display()
        )))
    }
}
