//! Segmentation metadata storage
//!
//! Metadata is owned by the server, never by the segmentation core. The store
//! is created once at startup and shared through [`crate::AppState`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// What is remembered about one segmented PDF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfMetadata {
    pub pdf_id: String,
    pub segment_count: usize,
    pub cuts: usize,
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("PDF metadata not found: {0}")]
    NotFound(String),

    #[error("Metadata store lock poisoned")]
    Poisoned,

    #[error("Metadata file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value store of [`PdfMetadata`] keyed by PDF id
pub trait MetadataStore: Send + Sync {
    fn get(&self, pdf_id: &str) -> Result<Option<PdfMetadata>, MetadataError>;

    /// Insert or replace
    fn put(&self, metadata: PdfMetadata) -> Result<(), MetadataError>;

    /// Change the recorded cut count of an existing entry
    fn set_cuts(&self, pdf_id: &str, cuts: usize) -> Result<PdfMetadata, MetadataError>;

    /// Remove an entry, returning it if it existed
    fn remove(&self, pdf_id: &str) -> Result<Option<PdfMetadata>, MetadataError>;
}

/// Process-local store, lost on restart
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: RwLock<HashMap<String, PdfMetadata>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries(entries: HashMap<String, PdfMetadata>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn snapshot(&self) -> Result<HashMap<String, PdfMetadata>, MetadataError> {
        Ok(self.entries.read().map_err(|_| MetadataError::Poisoned)?.clone())
    }

    fn replace(&self, entries: HashMap<String, PdfMetadata>) -> Result<(), MetadataError> {
        *self.entries.write().map_err(|_| MetadataError::Poisoned)? = entries;
        Ok(())
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get(&self, pdf_id: &str) -> Result<Option<PdfMetadata>, MetadataError> {
        let entries = self.entries.read().map_err(|_| MetadataError::Poisoned)?;
        Ok(entries.get(pdf_id).cloned())
    }

    fn put(&self, metadata: PdfMetadata) -> Result<(), MetadataError> {
        let mut entries = self.entries.write().map_err(|_| MetadataError::Poisoned)?;
        entries.insert(metadata.pdf_id.clone(), metadata);
        Ok(())
    }

    fn set_cuts(&self, pdf_id: &str, cuts: usize) -> Result<PdfMetadata, MetadataError> {
        let mut entries = self.entries.write().map_err(|_| MetadataError::Poisoned)?;
        let entry = entries
            .get_mut(pdf_id)
            .ok_or_else(|| MetadataError::NotFound(pdf_id.to_string()))?;
        entry.cuts = cuts;
        Ok(entry.clone())
    }

    fn remove(&self, pdf_id: &str) -> Result<Option<PdfMetadata>, MetadataError> {
        let mut entries = self.entries.write().map_err(|_| MetadataError::Poisoned)?;
        Ok(entries.remove(pdf_id))
    }
}

/// In-memory store written through to a JSON file after every change
#[derive(Debug)]
pub struct JsonFileMetadataStore {
    path: PathBuf,
    inner: InMemoryMetadataStore,
    /// Serializes copy-write-commit sequences
    writer: Mutex<()>,
}

impl JsonFileMetadataStore {
    /// Open the store, loading existing entries if the file exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let path = path.as_ref().to_path_buf();
        let entries: HashMap<String, PdfMetadata> = if path.exists() {
            let raw = std::fs::read(&path)?;
            if raw.is_empty() {
                HashMap::new()
            } else {
                serde_json::from_slice(&raw)?
            }
        } else {
            HashMap::new()
        };

        info!(
            "Loaded {} metadata entries from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path,
            inner: InMemoryMetadataStore::with_entries(entries),
            writer: Mutex::new(()),
        })
    }

    /// Apply `change` to a copy of the entries, persist the copy, and only
    /// then make it visible
    ///
    /// A failed write leaves both the file and the in-memory view untouched.
    fn update<T>(
        &self,
        change: impl FnOnce(&mut HashMap<String, PdfMetadata>) -> Result<T, MetadataError>,
    ) -> Result<T, MetadataError> {
        let _guard = self.writer.lock().map_err(|_| MetadataError::Poisoned)?;
        let mut entries = self.inner.snapshot()?;
        let outcome = change(&mut entries)?;
        self.write_file(&entries)?;
        self.inner.replace(entries)?;
        Ok(outcome)
    }

    fn write_file(&self, entries: &HashMap<String, PdfMetadata>) -> Result<(), MetadataError> {
        let json = serde_json::to_vec_pretty(entries)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Readers never observe a partially written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!("Flushed {} metadata entries", entries.len());
        Ok(())
    }
}

impl MetadataStore for JsonFileMetadataStore {
    fn get(&self, pdf_id: &str) -> Result<Option<PdfMetadata>, MetadataError> {
        self.inner.get(pdf_id)
    }

    fn put(&self, metadata: PdfMetadata) -> Result<(), MetadataError> {
        self.update(|entries| {
            entries.insert(metadata.pdf_id.clone(), metadata);
            Ok(())
        })
    }

    fn set_cuts(&self, pdf_id: &str, cuts: usize) -> Result<PdfMetadata, MetadataError> {
        self.update(|entries| {
            let entry = entries
                .get_mut(pdf_id)
                .ok_or_else(|| MetadataError::NotFound(pdf_id.to_string()))?;
            entry.cuts = cuts;
            Ok(entry.clone())
        })
    }

    fn remove(&self, pdf_id: &str) -> Result<Option<PdfMetadata>, MetadataError> {
        if self.inner.get(pdf_id)?.is_none() {
            return Ok(None);
        }
        self.update(|entries| Ok(entries.remove(pdf_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(id: &str) -> PdfMetadata {
        PdfMetadata {
            pdf_id: id.to_string(),
            segment_count: 2,
            cuts: 2,
        }
    }

    fn exercise(store: &dyn MetadataStore) {
        assert_eq!(store.get("a.pdf").unwrap(), None);

        store.put(sample("a.pdf")).unwrap();
        assert_eq!(store.get("a.pdf").unwrap(), Some(sample("a.pdf")));

        let updated = store.set_cuts("a.pdf", 5).unwrap();
        assert_eq!(updated.cuts, 5);
        assert_eq!(updated.segment_count, 2);

        assert!(matches!(
            store.set_cuts("missing.pdf", 1),
            Err(MetadataError::NotFound(_))
        ));

        assert_eq!(store.remove("a.pdf").unwrap().map(|m| m.cuts), Some(5));
        assert_eq!(store.remove("a.pdf").unwrap(), None);
    }

    #[test]
    fn test_in_memory_store() {
        exercise(&InMemoryMetadataStore::new());
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&JsonFileMetadataStore::open(dir.path().join("metadata.json")).unwrap());
    }

    #[test]
    fn test_json_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("metadata.json");

        {
            let store = JsonFileMetadataStore::open(&path).unwrap();
            store.put(sample("kept.pdf")).unwrap();
            store.put(sample("dropped.pdf")).unwrap();
            store.remove("dropped.pdf").unwrap();
            store.set_cuts("kept.pdf", 7).unwrap();
        }

        let reopened = JsonFileMetadataStore::open(&path).unwrap();
        assert_eq!(reopened.get("dropped.pdf").unwrap(), None);
        assert_eq!(reopened.get("kept.pdf").unwrap().map(|m| m.cuts), Some(7));
    }

    #[test]
    fn test_json_file_store_failed_write_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        // The parent "directory" is a file, so every write fails
        let store = JsonFileMetadataStore::open(blocker.join("metadata.json")).unwrap();
        assert!(matches!(
            store.put(sample("a.pdf")),
            Err(MetadataError::Io(_))
        ));
        assert_eq!(store.get("a.pdf").unwrap(), None);
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let json = serde_json::to_value(sample("a.pdf")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"pdfId": "a.pdf", "segmentCount": 2, "cuts": 2})
        );
    }
}
