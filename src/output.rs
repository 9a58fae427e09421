//! Result types returned by a conversion.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::path::PathBuf;

/// A signed document and how it was produced.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The signed PDF.
    pub pdf: Vec<u8>,
    /// `UniqueID` of the submission, when present.
    pub unique_id: Option<String>,
    /// Timestamp printed in the stamp and the signature.
    pub signed_at: DateTime<FixedOffset>,
    /// Archived copy of the submission, if storage is configured.
    pub archived_submission: Option<PathBuf>,
    /// Stored copy of the PDF, if storage is configured.
    pub stored_pdf: Option<PathBuf>,
    pub stats: ConversionStats,
}

/// Sizes and timings of one conversion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub page_count: usize,
    pub html_bytes: usize,
    pub pdf_bytes: usize,
    pub render_duration_ms: u64,
    pub overlay_duration_ms: u64,
    pub sign_duration_ms: u64,
    pub total_duration_ms: u64,
}
