//! Conversion entry points.
//!
//! [`Pipeline`] owns everything that is expensive to set up (fonts, the
//! compiled template, the rasterizer pool, signing credentials, storage)
//! and is built once per process. [`Pipeline::convert`] then runs one
//! submission through the stages in order. The free functions [`convert`], [`convert_to_file`] and
//! [`convert_sync`] build a throwaway pipeline for one-shot use.

use crate::config::PipelineConfig;
use crate::error::{Stage, Xml2PdfError};
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::extract::{extract, ExtractOptions};
use crate::pipeline::fonts::FontSet;
use crate::pipeline::input::{self, Submission};
use crate::pipeline::paginate::PageNumberer;
use crate::pipeline::render::Rasterizer;
use crate::pipeline::sign::Signer;
use crate::pipeline::stamp::Stamper;
use crate::pipeline::template::TemplateRenderer;
use crate::pipeline::xml::XmlDocument;
use crate::pipeline::placeholder;
use crate::storage::{file_stem, write_atomic, Storage};
use chrono::{DateTime, FixedOffset, Utc};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// A configured conversion pipeline.
///
/// Cheap to share behind an `Arc`; conversions run concurrently and only
/// contend on the rasterizer permits and the error record.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    offset: FixedOffset,
    template: TemplateRenderer,
    rasterizer: Rasterizer,
    stamper: Stamper,
    numberer: PageNumberer,
    signer: Signer,
    storage: Option<Storage>,
}

impl Pipeline {
    /// Load fonts and signing credentials, compile the template and set up
    /// storage.
    ///
    /// # Errors
    /// [`Xml2PdfError::InvalidConfig`], [`Xml2PdfError::FontLoadFailed`],
    /// [`Xml2PdfError::TemplateFailed`] or [`Xml2PdfError::CredentialsInvalid`].
    pub fn new(config: PipelineConfig) -> Result<Self, Xml2PdfError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            Xml2PdfError::InvalidConfig(format!(
                "UTC offset out of range: {} minutes",
                config.utc_offset_minutes
            ))
        })?;
        let fonts = FontSet::load(&config.fonts)?;
        let template = TemplateRenderer::new(&config.template)?;
        let rasterizer = Rasterizer::new(&config, fonts.clone());

        let mut stamp = config.stamp.clone();
        let mut page_numbers = config.page_numbers.clone();
        if config.geometry.running_footer {
            // The rasterizer already drew the numbers; keep the stamp above them.
            page_numbers.enabled = false;
            if stamp.ignore_text_below_pt == 0.0 {
                stamp.ignore_text_below_pt = page_numbers.y_pt + page_numbers.font_size_pt;
            }
        }
        let stamper = Stamper::new(stamp, fonts.clone());
        let numberer = PageNumberer::new(page_numbers, config.geometry.margin_right_mm, fonts);
        let signer = Signer::load(&config.signer)?;
        let storage = config.storage.clone().map(Storage::new);

        info!(
            "Pipeline ready: template '{}', {} render worker(s), stamp {:?}",
            template.name(),
            config.render_workers,
            config.stamp.policy
        );
        Ok(Self {
            config,
            offset,
            template,
            rasterizer,
            stamper,
            numberer,
            signer,
            storage,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    /// Current time in the configured offset.
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Convert raw bytes from `source` (e.g. an HTTP upload).
    pub async fn convert_bytes(
        &self,
        source: &str,
        bytes: Vec<u8>,
    ) -> Result<ConversionOutput, Xml2PdfError> {
        let submission = input::from_bytes(source, bytes);
        match submission {
            Ok(submission) => self.convert(&submission).await,
            Err(e) => {
                self.record_failure(source, &e).await;
                Err(e)
            }
        }
    }

    /// Run one submission through every stage.
    ///
    /// Nothing is written to storage before the XML parses. On failure the
    /// error is logged with its source and stage and, when storage is
    /// configured, recorded in the error record; no signed output exists.
    pub async fn convert(&self, submission: &Submission) -> Result<ConversionOutput, Xml2PdfError> {
        let result = self.run(submission).await;
        match &result {
            Ok(output) => {
                if let Some(storage) = &self.storage {
                    if let Err(e) = storage.clear_error(submission.file_name()).await {
                        warn!("Could not clear error record for {}: {}", submission.source, e);
                    }
                }
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_conversion_complete(output.stats.page_count, output.pdf.len());
                }
            }
            Err(e) => self.record_failure(submission.file_name(), e).await,
        }
        result
    }

    async fn run(&self, submission: &Submission) -> Result<ConversionOutput, Xml2PdfError> {
        let total_start = Instant::now();
        let source = submission.source.as_str();
        info!(source, bytes = submission.bytes.len(), "Starting conversion");
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_start(source);
        }
        let now = self.now();

        // ── Step 1: Parse XML ────────────────────────────────────────────
        let doc = self
            .stage(Stage::Parse, source, async {
                XmlDocument::parse(&submission.bytes)
            })
            .await?;

        // ── Step 2: Extract fields ───────────────────────────────────────
        let options = ExtractOptions {
            required_fields: &self.config.required_fields,
            test_mode: self.config.test_mode,
            signer: &self.config.signer_name,
            now,
        };
        let context = self
            .stage(Stage::Extract, source, async { extract(&doc, &options) })
            .await?;
        let unique_id = context.unique_id().map(str::to_string);
        let stem = file_stem(unique_id.as_deref(), &now);

        // ── Step 3: Archive the accepted submission ──────────────────────
        let archived_submission = match &self.storage {
            Some(storage) => {
                self.stage(Stage::Store, source, async {
                    storage.archive_submission(&stem, &submission.bytes).await
                })
                .await?
            }
            None => None,
        };

        // ── Step 4: Render HTML ──────────────────────────────────────────
        let html = self
            .stage(Stage::Template, source, async { self.template.render(&context) })
            .await?;
        let html_bytes = html.len();

        // ── Step 5: Rasterize ────────────────────────────────────────────
        let render_start = Instant::now();
        let rendered = self
            .stage(Stage::Rasterize, source, self.rasterizer.rasterize(html))
            .await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;

        // ── Step 6: Signature stamp ──────────────────────────────────────
        let overlay_start = Instant::now();
        let stamper = self.stamper.clone();
        let signer_name = self.config.signer_name.clone();
        let stamped = self
            .stage(Stage::Stamp, source, async move {
                tokio::task::spawn_blocking(move || stamper.apply(&rendered, &signer_name, &now))
                    .await
                    .map_err(|e| Xml2PdfError::Internal(format!("Stamp task panicked: {}", e)))?
            })
            .await?;

        // ── Step 7: Page numbers ─────────────────────────────────────────
        let numberer = self.numberer.clone();
        let (numbered, page_count) = self
            .stage(Stage::PageNumbers, source, async move {
                tokio::task::spawn_blocking(move || {
                    let numbered = numberer.apply(&stamped)?;
                    let pages = lopdf::Document::load_mem(&numbered)
                        .map(|d| d.get_pages().len())
                        .map_err(|e| Xml2PdfError::PageNumberingFailed {
                            detail: format!("cannot re-read numbered PDF: {}", e),
                        })?;
                    Ok((numbered, pages))
                })
                .await
                .map_err(|e| Xml2PdfError::Internal(format!("Numbering task panicked: {}", e)))?
            })
            .await?;
        let overlay_duration_ms = overlay_start.elapsed().as_millis() as u64;

        // ── Step 8: Sign ─────────────────────────────────────────────────
        let sign_start = Instant::now();
        let pdf = self
            .stage(
                Stage::Sign,
                source,
                self.signer.sign(numbered, &self.config.signer_name, now),
            )
            .await?;
        let sign_duration_ms = sign_start.elapsed().as_millis() as u64;

        // ── Step 9: Keep a copy ──────────────────────────────────────────
        let stored_pdf = match &self.storage {
            Some(storage) => {
                self.stage(Stage::Store, source, async {
                    storage.store_output(&stem, &pdf).await
                })
                .await?
            }
            None => None,
        };

        let stats = ConversionStats {
            page_count,
            html_bytes,
            pdf_bytes: pdf.len(),
            render_duration_ms,
            overlay_duration_ms,
            sign_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            source,
            unique_id = unique_id.as_deref().unwrap_or("-"),
            pages = stats.page_count,
            bytes = stats.pdf_bytes,
            "Conversion complete in {}ms",
            stats.total_duration_ms
        );

        Ok(ConversionOutput {
            pdf,
            unique_id,
            signed_at: now,
            archived_submission,
            stored_pdf,
            stats,
        })
    }

    /// Run one stage with timing, logging and progress events.
    async fn stage<T, F>(&self, stage: Stage, source: &str, fut: F) -> Result<T, Xml2PdfError>
    where
        F: Future<Output = Result<T, Xml2PdfError>>,
    {
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_stage_start(stage);
        }
        let start = Instant::now();
        match fut.await {
            Ok(value) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                debug!(source, %stage, elapsed_ms, "Stage complete");
                if let Some(cb) = cb {
                    cb.on_stage_complete(stage, elapsed_ms);
                }
                Ok(value)
            }
            Err(e) => {
                error!(source, %stage, class = ?e.class(), "Stage failed: {}", e);
                if let Some(cb) = cb {
                    cb.on_stage_error(stage, &e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Record a failed submission in the error record. Storage problems are
    /// logged, never propagated over the original error.
    pub async fn record_failure(&self, file: &str, err: &Xml2PdfError) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.record_error(file, &err.to_string()).await {
                error!("Could not update error record for {}: {}", file, e);
            }
        }
    }

    /// Build the error placeholder and keep a copy in storage.
    pub async fn placeholder_for(&self, file: &str) -> Result<Vec<u8>, Xml2PdfError> {
        let pdf = placeholder::placeholder_pdf()?;
        if let Some(storage) = &self.storage {
            let stem = format!("{}_error", file_stem(Some(file), &self.now()));
            storage.store_output(&stem, &pdf).await?;
        }
        Ok(pdf)
    }
}

/// The one-page error document returned in place of a PDF for bad input.
pub fn placeholder_pdf() -> Result<Vec<u8>, Xml2PdfError> {
    placeholder::placeholder_pdf()
}

/// Convert an XML file or URL to a signed PDF.
///
/// # Errors
/// Input, bad-input and processing errors as [`Xml2PdfError`].
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<ConversionOutput, Xml2PdfError> {
    let input_str = input_str.as_ref();
    let pipeline = Pipeline::new(config.clone())?;
    let submission = match input::resolve_input(input_str, config.download_timeout_secs).await {
        Ok(submission) => submission,
        Err(e) => {
            error!(source = input_str, "Input failed: {}", e);
            pipeline.record_failure(input_str, &e).await;
            return Err(e);
        }
    };
    pipeline.convert(&submission).await
}

/// Convert and write the signed PDF to `output_path`.
///
/// Uses atomic write (temp file + rename); nothing is written on failure.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<ConversionOutput, Xml2PdfError> {
    let output = convert(input_str, config).await?;
    let path = output_path.as_ref();
    write_atomic(path, &output.pdf)
        .await
        .map_err(|e| Xml2PdfError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    info!("Wrote {} bytes to {}", output.pdf.len(), path.display());
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<ConversionOutput, Xml2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Xml2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Default output path for an input: same stem, `.pdf` extension, current
/// directory for URLs.
pub fn default_output_path(input_str: &str) -> PathBuf {
    let name = input_str
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("document.xml");
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    if input::is_url(input_str) {
        PathBuf::from(format!("{}.pdf", stem))
    } else {
        Path::new(input_str).with_extension("pdf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_path_replaces_extension() {
        assert_eq!(
            default_output_path("/data/in/req.xml"),
            PathBuf::from("/data/in/req.pdf")
        );
        assert_eq!(
            default_output_path("https://x.test/a/req.xml?x=1"),
            PathBuf::from("req.pdf")
        );
    }

    #[test]
    fn placeholder_is_pdf() {
        assert!(placeholder_pdf().unwrap().starts_with(b"%PDF"));
    }
}
