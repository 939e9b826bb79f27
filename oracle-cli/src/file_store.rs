//! JSON-file backed [`KvStore`] so readings and sessions survive between
//! invocations.
use chrono::{DateTime, Duration, Utc};
use oracle_engine::store::Clock;
use oracle_engine::{KvStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

type Document = BTreeMap<String, StoredEntry>;

/// Whole-document store: every call reads the file, writes rewrite it.
pub struct FileStore {
    path: PathBuf,
    clock: Clock,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(Utc::now))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Clock) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Document, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Document::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, doc: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl KvStore for FileStore {
    type Error = StoreError;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let now = (self.clock)();
        let doc = self.read()?;
        Ok(doc
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), Self::Error> {
        let now = (self.clock)();
        let mut doc = self.read()?;
        doc.retain(|_, entry| entry.is_live(now));
        let expires_at = ttl_secs.map(|secs| {
            let secs = i64::try_from(secs).unwrap_or(i64::MAX / 1000).min(i64::MAX / 1000);
            now.checked_add_signed(Duration::seconds(secs))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        doc.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        log::debug!("writing {} keys to {}", doc.len(), self.path.display());
        self.write(&doc)
    }

    fn ttl(&self, key: &str) -> Result<Option<u64>, Self::Error> {
        let now = (self.clock)();
        let doc = self.read()?;
        Ok(doc
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .and_then(|at| u64::try_from((at - now).num_seconds()).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "oracle-store-{label}-{}.json",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let store = FileStore::new(temp_path("missing"));
        assert_eq!(store.get("anything").unwrap(), None);
        assert_eq!(store.ttl("anything").unwrap(), None);
    }

    #[test]
    fn values_persist_across_instances() {
        let path = temp_path("persist");
        FileStore::new(&path).set("co:user:a", "{}", None).unwrap();
        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("co:user:a").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn expired_entries_vanish_and_are_pruned() {
        let path = temp_path("expiry");
        let secs = Arc::new(AtomicI64::new(1_700_000_000));
        let handle = Arc::clone(&secs);
        let clock: Clock = Arc::new(move || {
            DateTime::from_timestamp(handle.load(Ordering::SeqCst), 0).unwrap_or_default()
        });
        let store = FileStore::with_clock(&path, clock);
        store.set("short", "1", Some(30)).unwrap();
        assert_eq!(store.ttl("short").unwrap(), Some(30));
        secs.fetch_add(30, Ordering::SeqCst);
        assert_eq!(store.get("short").unwrap(), None);
        store.set("other", "2", None).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("short"));
    }

    #[test]
    fn corrupt_documents_are_reported() {
        let path = temp_path("corrupt");
        fs::write(&path, "not json").unwrap();
        let err = FileStore::new(&path).get("k").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
