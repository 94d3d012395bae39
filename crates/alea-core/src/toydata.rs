//! Toy-data store: an ordered collection of datasets with shared provenance.
//!
//! On disk a toy-data file is one JSON document:
//! `{"metadata": {...}, "names": [...] | null, "toydata": [dataset, ...]}`.

use crate::{Dataset, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Datasets sharing one generate-values provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToydataFile {
    /// File-level metadata (at least `generate_values` when written by a runner)
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Array names shared by every dataset
    #[serde(default)]
    pub names: Option<Vec<String>>,
    /// Datasets in Monte Carlo order
    pub toydata: Vec<Dataset>,
}

impl ToydataFile {
    /// Assemble a file from datasets
    pub fn new(
        toydata: Vec<Dataset>,
        names: Option<Vec<String>>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self { metadata, names, toydata }
    }

    /// Number of stored datasets
    pub fn len(&self) -> usize {
        self.toydata.len()
    }

    /// True if no dataset is stored
    pub fn is_empty(&self) -> bool {
        self.toydata.is_empty()
    }

    /// Read a toy-data file.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read toydata file {}: {}", path.display(), e),
            ))
        })?;
        let file: Self = serde_json::from_slice(&bytes)?;
        if let Some(names) = &file.names {
            for (i, ds) in file.toydata.iter().enumerate() {
                if &ds.names() != names {
                    return Err(Error::Validation(format!(
                        "toydata {} in {} has arrays {:?}, expected {:?}",
                        i,
                        path.display(),
                        ds.names(),
                        names
                    )));
                }
            }
        }
        Ok(file)
    }

    /// Write the file in one piece; a failed write leaves no partial file behind.
    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, &serde_json::to_vec_pretty(self)?)?;
        log::info!("Saved {} toydata to {}", self.toydata.len(), path.display());
        Ok(())
    }
}

/// Write `bytes` to a temporary sibling and rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}", std::process::id()));
    let tmp = std::path::PathBuf::from(tmp);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        Error::Io(e)
    })
}
