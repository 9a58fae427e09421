//! Input resolution: turn a path, URL or uploaded body into a [`Submission`].
//!
//! Submissions are small XML documents, so they are read fully into memory.
//! A cheap sniff rejects obviously non-XML payloads (a PDF uploaded by
//! mistake, an HTML error page from a URL) before the parser sees them.

use crate::error::Xml2PdfError;
use std::path::PathBuf;
use tracing::{debug, info};

/// One XML submission and where it came from.
#[derive(Debug, Clone)]
pub struct Submission {
    /// File name, URL or `<upload>`; used in logs and the error record.
    pub source: String,
    pub bytes: Vec<u8>,
}

impl Submission {
    pub fn new(source: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: source.into(),
            bytes: bytes.into(),
        }
    }

    /// Final path component of the source, for archive naming.
    pub fn file_name(&self) -> &str {
        self.source
            .rsplit(['/', '\\'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("submission.xml")
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// True when the first significant byte is `<` (after an optional BOM).
pub fn looks_like_xml(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}

fn sniff(submission: Submission) -> Result<Submission, Xml2PdfError> {
    if submission.bytes.is_empty() {
        return Err(Xml2PdfError::MalformedInput {
            detail: format!("'{}' is empty", submission.source),
        });
    }
    if !looks_like_xml(&submission.bytes) {
        return Err(Xml2PdfError::MalformedInput {
            detail: format!("'{}' does not start with an XML element", submission.source),
        });
    }
    Ok(submission)
}

/// Resolve a local path or HTTP(S) URL to a submission.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Submission, Xml2PdfError> {
    let submission = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    sniff(submission)
}

/// Wrap an in-memory body (e.g. an HTTP upload).
pub fn from_bytes(source: &str, bytes: Vec<u8>) -> Result<Submission, Xml2PdfError> {
    sniff(Submission::new(source, bytes))
}

async fn read_local(path_str: &str) -> Result<Submission, Xml2PdfError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Xml2PdfError::FileNotFound { path: path.clone() }
        } else {
            Xml2PdfError::StorageFailed {
                path: path.clone(),
                source: e,
            }
        }
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(Submission::new(path_str, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Submission, Xml2PdfError> {
    info!("Downloading submission from: {}", url);
    let failed = |reason: String| Xml2PdfError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {}s", timeout_secs))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(Submission::new(url, bytes.to_vec()))
}
