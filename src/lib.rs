//! # xml2pdf
//!
//! Convert structured XML submissions into stamped, signed PDF documents.
//!
//! ## Pipeline Overview
//!
//! ```text
//! XML
//!  │
//!  ├─ 1. Parse     owned element tree, encoding from the declaration
//!  ├─ 2. Extract   first-match fields, deposit records, polygons
//!  ├─ 3. Template  Tera HTML
//!  ├─ 4. Render    built-in layout engine or wkhtmltopdf (bounded pool)
//!  ├─ 5. Stamp     "Документ подписан электронной подписью" box
//!  ├─ 6. Number    "Страница N из M"
//!  └─ 7. Sign      detached CMS (sandbox) or external utility (csptest)
//! ```
//!
//! Failures are typed: bad input (malformed XML, missing `UniqueID`) is
//! distinguished from processing failures so callers can answer 4xx vs 5xx
//! and optionally return [`placeholder_pdf`] instead.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use xml2pdf::{convert, PipelineConfig, SignerMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .signer(SignerMode::sandbox("certs/cert.pem", "certs/key.pem", Some("12345")))
//!         .build()?;
//!     let output = convert("request.xml", &config).await?;
//!     std::fs::write("request.pdf", &output.pdf)?;
//!     eprintln!("{} pages, {} bytes", output.stats.page_count, output.stats.pdf_bytes);
//!     Ok(())
//! }
//! ```
//!
//! For a long-running process build a [`Pipeline`] once and share it; fonts
//! and the template are loaded a single time.
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `xml2pdf` binary (clap + anyhow + tracing-subscriber) |
//! | `server` | on      | The [`server`] module and `xml2pdf-server` binary (axum) |

// ── Modules ──────────────────────────────────────────────────────────────

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExternalSigner, FontConfig, PageGeometry, PageNumberOptions, PipelineConfig,
    PipelineConfigBuilder, RasterBackend, RetryPolicy, SignerMode, StampOptions, StampPolicy,
    StorageConfig, TemplateSource,
};
pub use convert::{convert, convert_sync, convert_to_file, placeholder_pdf, Pipeline};
pub use error::{ErrorClass, ErrorKind, Stage, Xml2PdfError};
pub use output::{ConversionOutput, ConversionStats};
pub use pipeline::input::Submission;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use storage::{ErrorRecord, Storage};
