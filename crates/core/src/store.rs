use crate::chunking::sanitize_filename;
use crate::error::DocumentError;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SUMMARY_FILE: &str = "output.json";

/// Writes JSON artifacts into one output directory.
///
/// Every write lands in a temporary file next to its target and is renamed
/// into place after an fsync, so a reader never sees a half-written artifact.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the directory if needed and removes everything inside it.
    pub fn prepare(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root)?;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// `report v2.pdf` becomes `report_v2_output.json`.
    pub fn document_artifact_name(file_name: &str) -> String {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(file_name);
        format!("{}_output.json", sanitize_filename(stem))
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, DocumentError> {
        fs::create_dir_all(&self.root)?;
        let target = self.root.join(name);

        let temp = NamedTempFile::new_in(&self.root)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&target)
            .map_err(|error| DocumentError::Persist(error.to_string()))?;

        Ok(target)
    }
}
