//! Flat-file storage: archived submissions, generated PDFs and the error
//! record.
//!
//! ```text
//! <root>/
//! ├── input_data/         20240305_140709_REQ-1.xml
//! ├── output_data/        20240305_140709_REQ-1.pdf
//! ├── file_errors.json    { "<file>": "<last error>" }
//! └── app.log
//! ```
//!
//! Every write goes to a temp file in the target directory and is renamed
//! into place. The error record is the only file shared between requests;
//! its read-modify-write cycle runs under an async mutex and is retried
//! with a fixed delay.

use crate::config::{RetryPolicy, StorageConfig};
use crate::error::Xml2PdfError;
use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w.\-]+").unwrap());

/// Error record contents: file name → last error message.
pub type ErrorRecord = BTreeMap<String, String>;

/// Replace anything but word characters, `.` and `-` with `_`, and strip
/// leading dots.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `<YYYYmmdd_HHMMSS>_<UniqueID>` for archive and output files.
pub fn file_stem(unique_id: Option<&str>, at: &DateTime<FixedOffset>) -> String {
    format!(
        "{}_{}",
        at.format("%Y%m%d_%H%M%S"),
        sanitize_file_name(unique_id.unwrap_or("unknown"))
    )
}

/// Write `bytes` to `path` via a temp file in the same directory.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Run `op` up to `policy.attempts` times, sleeping `policy.delay_ms`
/// between attempts.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> std::io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!("{}: attempt {}/{} failed: {}", what, attempt, attempts, e);
                sleep(Duration::from_millis(policy.delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Storage rooted at [`StorageConfig::root`].
#[derive(Debug)]
pub struct Storage {
    config: StorageConfig,
    record_lock: Mutex<()>,
}

impl Storage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            record_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Create the directory layout.
    pub async fn prepare(&self) -> Result<(), Xml2PdfError> {
        for dir in [
            self.config.root.clone(),
            self.config.input_dir(),
            self.config.output_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| Xml2PdfError::StorageFailed { path: dir, source })?;
        }
        Ok(())
    }

    async fn put(&self, path: PathBuf, bytes: &[u8]) -> Result<PathBuf, Xml2PdfError> {
        write_atomic(&path, bytes)
            .await
            .map_err(|source| Xml2PdfError::StorageFailed {
                path: path.clone(),
                source,
            })?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Archive an accepted submission as `input_data/<stem>.xml`.
    /// `None` when archiving is disabled.
    pub async fn archive_submission(
        &self,
        stem: &str,
        xml: &[u8],
    ) -> Result<Option<PathBuf>, Xml2PdfError> {
        if !self.config.archive_submissions {
            return Ok(None);
        }
        let path = self.config.input_dir().join(format!("{}.xml", stem));
        self.put(path, xml).await.map(Some)
    }

    /// Keep a copy of a generated (or placeholder) PDF as
    /// `output_data/<stem>.pdf`. `None` when disabled.
    pub async fn store_output(
        &self,
        stem: &str,
        pdf: &[u8],
    ) -> Result<Option<PathBuf>, Xml2PdfError> {
        if !self.config.keep_outputs {
            return Ok(None);
        }
        let path = self.config.output_dir().join(format!("{}.pdf", stem));
        self.put(path, pdf).await.map(Some)
    }

    /// Current error record; empty when the file does not exist yet.
    pub async fn errors(&self) -> Result<ErrorRecord, Xml2PdfError> {
        let _guard = self.record_lock.lock().await;
        self.read_record().await
    }

    async fn read_record(&self) -> Result<ErrorRecord, Xml2PdfError> {
        let path = self.config.error_record_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Ok(ErrorRecord::new()),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => Ok(record),
                Err(e) => {
                    warn!(
                        "Error record {} is not valid JSON ({}); starting afresh",
                        path.display(),
                        e
                    );
                    Ok(ErrorRecord::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ErrorRecord::new()),
            Err(source) => Err(Xml2PdfError::StorageFailed { path, source }),
        }
    }

    async fn update_record<F>(&self, update: F) -> Result<(), Xml2PdfError>
    where
        F: Fn(&mut ErrorRecord) -> bool,
    {
        let _guard = self.record_lock.lock().await;
        let mut record = self.read_record().await?;
        if !update(&mut record) {
            return Ok(());
        }
        let path = self.config.error_record_path();
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| Xml2PdfError::Internal(format!("Error record encoding failed: {}", e)))?;
        with_retry(self.config.retry, "error record write", || {
            write_atomic(&path, &json)
        })
        .await
        .map_err(|source| Xml2PdfError::StorageFailed {
            path: path.clone(),
            source,
        })
    }

    /// Record the last error for `file`.
    pub async fn record_error(&self, file: &str, message: &str) -> Result<(), Xml2PdfError> {
        let key = sanitize_file_name(file);
        self.update_record(|record| {
            record.insert(key.clone(), message.to_string());
            true
        })
        .await?;
        info!("Recorded error for {}", file);
        Ok(())
    }

    /// Drop any recorded error for `file` after it converts successfully.
    pub async fn clear_error(&self, file: &str) -> Result<(), Xml2PdfError> {
        let key = sanitize_file_name(file);
        self.update_record(|record| record.remove(&key).is_some())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn storage(root: &Path) -> Storage {
        let mut config = StorageConfig::new(root);
        config.retry = RetryPolicy {
            attempts: 3,
            delay_ms: 1,
        };
        Storage::new(config)
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("REQ-2024/000731"), "REQ-2024_000731");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("заявка 1.xml"), "заявка_1.xml");
        assert_eq!(sanitize_file_name("   "), "unnamed");
    }

    #[test]
    fn stem_has_timestamp_and_id() {
        let at = FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 14, 7, 9)
            .unwrap();
        assert_eq!(file_stem(Some("REQ 1"), &at), "20240305_140709_REQ_1");
        assert_eq!(file_stem(None, &at), "20240305_140709_unknown");
    }

    #[tokio::test]
    async fn archives_and_stores_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        storage.prepare().await.unwrap();

        let xml = storage.archive_submission("s1", b"<a/>").await.unwrap().unwrap();
        assert_eq!(xml, dir.path().join("input_data/s1.xml"));
        assert_eq!(std::fs::read(&xml).unwrap(), b"<a/>");

        let pdf = storage.store_output("s1", b"%PDF").await.unwrap().unwrap();
        assert_eq!(pdf, dir.path().join("output_data/s1.pdf"));
        assert!(!dir.path().join("output_data/s1.pdf.tmp").exists());
    }

    #[tokio::test]
    async fn disabled_archiving_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::new(dir.path());
        config.archive_submissions = false;
        config.keep_outputs = false;
        let storage = Storage::new(config);
        assert!(storage.archive_submission("s", b"<a/>").await.unwrap().is_none());
        assert!(storage.store_output("s", b"%PDF").await.unwrap().is_none());
        assert!(!dir.path().join("input_data").exists());
    }

    #[tokio::test]
    async fn error_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        assert!(storage.errors().await.unwrap().is_empty());

        storage.record_error("a.xml", "Invalid XML format").await.unwrap();
        storage.record_error("b.xml", "Signing failed").await.unwrap();
        storage.record_error("a.xml", "Required field").await.unwrap();

        let record = storage.errors().await.unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record["a.xml"], "Required field");

        storage.clear_error("a.xml").await.unwrap();
        let record = storage.errors().await.unwrap();
        assert_eq!(record.len(), 1);
        assert!(record.contains_key("b.xml"));
    }

    #[tokio::test]
    async fn concurrent_records_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(storage(dir.path()));
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .record_error(&format!("f{i}.xml"), "boom")
                        .await
                        .unwrap()
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(storage.errors().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn corrupt_record_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file_errors.json"), "{not json").unwrap();
        let storage = storage(dir.path());
        storage.record_error("x.xml", "boom").await.unwrap();
        let record = storage.errors().await.unwrap();
        assert_eq!(record.len(), 1);
    }

    #[tokio::test]
    async fn retry_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 3,
            delay_ms: 1,
        };
        let result: std::io::Result<()> = with_retry(policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(std::io::Error::other("disk full")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(RetryPolicy::default(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(std::io::Error::other("busy"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 1);
    }
}
