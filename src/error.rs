//! Error types for the xml2pdf library.
//!
//! Every fallible operation returns [`Xml2PdfError`]. The variants are
//! grouped by the pipeline stage that produces them, and two accessors let
//! callers route errors without matching on every variant:
//!
//! * [`Xml2PdfError::class`] separates **bad input** (the submission itself
//!   is wrong; a 4xx at the HTTP boundary) from **processing failures**
//!   (rendering, signing, storage; a 5xx).
//! * [`Xml2PdfError::stage`] names the pipeline stage that failed, for logs
//!   and the error record.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the xml2pdf library.
#[derive(Debug, Error)]
pub enum Xml2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The submission could not be parsed as XML.
    #[error("Invalid XML format: {detail}")]
    MalformedInput { detail: String },

    /// A field the pipeline cannot proceed without is absent.
    #[error("Required field '{field}' not found in XML")]
    MissingRequiredField { field: String },

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The HTML template is missing or failed to render.
    #[error("Template '{template}' failed: {detail}")]
    TemplateFailed { template: String, detail: String },

    /// HTML could not be turned into PDF pages.
    #[error("Rasterization failed: {detail}")]
    RasterizationFailed { detail: String },

    /// The signature stamp could not be composited.
    #[error("Stamp overlay failed: {detail}")]
    StampFailed { detail: String },

    /// Page numbers could not be composited.
    #[error("Page numbering failed: {detail}")]
    PageNumberingFailed { detail: String },

    /// A font file could not be read or parsed.
    #[error("Font '{path}' could not be loaded: {detail}")]
    FontLoadFailed { path: PathBuf, detail: String },

    // ── Signing errors ────────────────────────────────────────────────────
    /// Certificate or private key is missing, unreadable or invalid.
    #[error("Signing credentials invalid ('{path}'): {detail}")]
    CredentialsInvalid { path: PathBuf, detail: String },

    /// The signer (library or external process) reported a failure.
    #[error("Signing failed: {detail}")]
    SigningFailed { detail: String },

    /// The external signing process exceeded its time budget.
    #[error("Signing process timed out after {secs}s")]
    SignerTimeout { secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Archiving a submission or a generated PDF failed.
    #[error("Storage write failed for '{path}': {source}")]
    StorageFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification used at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The submission is at fault. Recoverable with a placeholder document.
    BadInput,
    /// The pipeline failed on a valid submission.
    Processing,
}

/// The four failure kinds a caller can act on, plus the ambient ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedInput,
    MissingRequiredField,
    RenderFailure,
    SigningFailure,
    Io,
    Config,
    Internal,
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Parse,
    Extract,
    Template,
    Rasterize,
    Stamp,
    PageNumbers,
    Sign,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "input",
            Stage::Parse => "parse",
            Stage::Extract => "extract",
            Stage::Template => "template",
            Stage::Rasterize => "rasterize",
            Stage::Stamp => "stamp",
            Stage::PageNumbers => "page-numbers",
            Stage::Sign => "sign",
            Stage::Store => "store",
        };
        f.write_str(name)
    }
}

impl Xml2PdfError {
    /// Fine-grained kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Xml2PdfError::MalformedInput { .. } => ErrorKind::MalformedInput,
            Xml2PdfError::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
            Xml2PdfError::FileNotFound { .. } | Xml2PdfError::DownloadFailed { .. } => {
                ErrorKind::Io
            }
            Xml2PdfError::TemplateFailed { .. }
            | Xml2PdfError::RasterizationFailed { .. }
            | Xml2PdfError::StampFailed { .. }
            | Xml2PdfError::PageNumberingFailed { .. }
            | Xml2PdfError::FontLoadFailed { .. } => ErrorKind::RenderFailure,
            Xml2PdfError::CredentialsInvalid { .. }
            | Xml2PdfError::SigningFailed { .. }
            | Xml2PdfError::SignerTimeout { .. } => ErrorKind::SigningFailure,
            Xml2PdfError::StorageFailed { .. } | Xml2PdfError::OutputWriteFailed { .. } => {
                ErrorKind::Io
            }
            Xml2PdfError::InvalidConfig(_) => ErrorKind::Config,
            Xml2PdfError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Bad input vs processing failure.
    pub fn class(&self) -> ErrorClass {
        match self.kind() {
            ErrorKind::MalformedInput | ErrorKind::MissingRequiredField => ErrorClass::BadInput,
            _ => ErrorClass::Processing,
        }
    }

    /// Shorthand for `class() == ErrorClass::BadInput`.
    pub fn is_bad_input(&self) -> bool {
        self.class() == ErrorClass::BadInput
    }

    /// The pipeline stage that produced this error, when it maps to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Xml2PdfError::FileNotFound { .. } | Xml2PdfError::DownloadFailed { .. } => {
                Some(Stage::Input)
            }
            Xml2PdfError::MalformedInput { .. } => Some(Stage::Parse),
            Xml2PdfError::MissingRequiredField { .. } => Some(Stage::Extract),
            Xml2PdfError::TemplateFailed { .. } => Some(Stage::Template),
            Xml2PdfError::RasterizationFailed { .. } | Xml2PdfError::FontLoadFailed { .. } => {
                Some(Stage::Rasterize)
            }
            Xml2PdfError::StampFailed { .. } => Some(Stage::Stamp),
            Xml2PdfError::PageNumberingFailed { .. } => Some(Stage::PageNumbers),
            Xml2PdfError::CredentialsInvalid { .. }
            | Xml2PdfError::SigningFailed { .. }
            | Xml2PdfError::SignerTimeout { .. } => Some(Stage::Sign),
            Xml2PdfError::StorageFailed { .. } | Xml2PdfError::OutputWriteFailed { .. } => {
                Some(Stage::Store)
            }
            Xml2PdfError::InvalidConfig(_) | Xml2PdfError::Internal(_) => None,
        }
    }
}
