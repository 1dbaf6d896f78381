use std::fs;
use std::path::{Path, PathBuf};

use super::models::{LedgerDocument, LEDGER_VERSION};
use crate::error::StorageError;

/// The ledger's JSON file on disk.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger document, or an empty one if the file doesn't exist yet
    pub fn load(&self) -> Result<LedgerDocument, StorageError> {
        if !self.path.exists() {
            log::debug!("No ledger file at {:?}, starting empty", self.path);
            return Ok(LedgerDocument::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        let doc: LedgerDocument =
            serde_json::from_str(&contents).map_err(|e| StorageError::Corrupted {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        if doc.version > LEDGER_VERSION {
            return Err(StorageError::Corrupted {
                path: self.path.display().to_string(),
                reason: format!(
                    "ledger version {} is newer than supported version {}",
                    doc.version, LEDGER_VERSION
                ),
            });
        }
        Ok(doc)
    }

    /// Write the whole document to a sibling temp file, then rename over the
    /// ledger file. Readers see either the old or the new document.
    pub fn save(&self, doc: &LedgerDocument) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.temp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "accounts.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = LedgerFile::new(dir.path().join("accounts.json"));
        let doc = file.load().unwrap();
        assert!(doc.accounts.is_empty());
        assert_eq!(doc.version, LEDGER_VERSION);
    }

    #[test]
    fn test_save_creates_parent_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("accounts.json");
        let file = LedgerFile::new(&path);
        file.save(&LedgerDocument::default()).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("accounts.json.tmp").exists());
    }

    #[test]
    fn test_garbage_is_reported_as_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        fs::write(&path, "{ not json").unwrap();
        let err = LedgerFile::new(&path).load().unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
    }
}
