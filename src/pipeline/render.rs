//! HTML → PDF rasterization.
//!
//! Two backends, chosen by [`RasterBackend`]:
//!
//! * **Builtin**: [`layout`](crate::pipeline::layout) plus `printpdf`.
//!   Pure CPU work, so it runs under `tokio::task::spawn_blocking`.
//! * **wkhtmltopdf**: an external process with an enforced timeout.
//!
//! Both are gated by a semaphore sized from `render_workers`, so a burst of
//! uploads cannot start more rasterizations than there are workers.

use crate::config::{PageGeometry, PageNumberOptions, PipelineConfig, RasterBackend};
use crate::error::Xml2PdfError;
use crate::pipeline::draw::write_pdf;
use crate::pipeline::fonts::FontSet;
use crate::pipeline::layout::{add_running_footer, layout, parse_html};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Renders HTML to PDF bytes.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    backend: RasterBackend,
    geometry: PageGeometry,
    footer: Option<PageNumberOptions>,
    fonts: FontSet,
    asset_base: PathBuf,
    permits: Arc<Semaphore>,
}

impl Rasterizer {
    pub fn new(config: &PipelineConfig, fonts: FontSet) -> Self {
        let footer = config
            .geometry
            .running_footer
            .then(|| config.page_numbers.clone());
        Self {
            backend: config.raster.clone(),
            geometry: config.geometry.clone(),
            footer,
            fonts,
            asset_base: config
                .asset_base
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            permits: Arc::new(Semaphore::new(config.render_workers.max(1))),
        }
    }

    /// Rasterize one HTML document.
    ///
    /// # Errors
    /// [`Xml2PdfError::RasterizationFailed`] for layout or backend failures.
    pub async fn rasterize(&self, html: String) -> Result<Vec<u8>, Xml2PdfError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Xml2PdfError::Internal(format!("Render pool closed: {}", e)))?;

        match &self.backend {
            RasterBackend::Builtin => {
                let geometry = self.geometry.clone();
                let fonts = self.fonts.clone();
                let footer = self.footer.clone();
                tokio::task::spawn_blocking(move || {
                    render_builtin(&html, &geometry, &fonts, footer.as_ref())
                })
                .await
                .map_err(|e| Xml2PdfError::Internal(format!("Render task panicked: {}", e)))?
            }
            RasterBackend::Wkhtmltopdf {
                binary,
                timeout_secs,
            } => {
                render_wkhtmltopdf(
                    binary,
                    *timeout_secs,
                    &html,
                    &self.asset_base,
                    &self.geometry,
                    self.footer.as_ref(),
                )
                .await
            }
        }
    }
}

/// Blocking implementation of the built-in backend.
pub fn render_builtin(
    html: &str,
    geometry: &PageGeometry,
    fonts: &FontSet,
    footer: Option<&PageNumberOptions>,
) -> Result<Vec<u8>, Xml2PdfError> {
    let blocks = parse_html(html)?;
    let mut pages = layout(&blocks, geometry, fonts);
    if let Some(numbers) = footer {
        add_running_footer(&mut pages, geometry, fonts, numbers);
    }
    let bytes = write_pdf("document", &pages, fonts).map_err(|e| match e {
        Xml2PdfError::Internal(detail) => Xml2PdfError::RasterizationFailed { detail },
        other => other,
    })?;
    info!(
        "Rasterized {} block(s) onto {} page(s), {} bytes",
        blocks.len(),
        pages.len(),
        bytes.len()
    );
    Ok(bytes)
}

async fn render_wkhtmltopdf(
    binary: &Path,
    timeout_secs: u64,
    html: &str,
    asset_base: &Path,
    geometry: &PageGeometry,
    footer: Option<&PageNumberOptions>,
) -> Result<Vec<u8>, Xml2PdfError> {
    let failed = |detail: String| Xml2PdfError::RasterizationFailed { detail };

    // The HTML sits in the asset directory so relative references resolve.
    let source = tempfile::Builder::new()
        .prefix(".render-")
        .suffix(".html")
        .tempfile_in(asset_base)
        .or_else(|_| tempfile::Builder::new().suffix(".html").tempfile())
        .map_err(|e| failed(format!("cannot create HTML temp file: {}", e)))?;
    tokio::fs::write(source.path(), html)
        .await
        .map_err(|e| failed(format!("cannot write HTML temp file: {}", e)))?;
    let out_dir = tempfile::tempdir().map_err(|e| failed(e.to_string()))?;
    let out_path = out_dir.path().join("out.pdf");

    let mut cmd = Command::new(binary);
    cmd.arg("--quiet")
        .arg("--enable-local-file-access")
        .args(["--encoding", "utf-8"])
        .args(["--dpi", "400"])
        .args(["--page-width", &format!("{}mm", geometry.width_mm)])
        .args(["--page-height", &format!("{}mm", geometry.height_mm)])
        .args(["--margin-top", &format!("{}mm", geometry.margin_top_mm)])
        .args(["--margin-right", &format!("{}mm", geometry.margin_right_mm)])
        .args(["--margin-bottom", &format!("{}mm", geometry.margin_bottom_mm)])
        .args(["--margin-left", &format!("{}mm", geometry.margin_left_mm)]);
    if let Some(numbers) = footer {
        let label = numbers.format.replace("{page}", "[page]").replace("{total}", "[topage]");
        cmd.args(["--footer-center", &label])
            .args(["--footer-font-size", &format!("{}", numbers.font_size_pt)]);
    }
    cmd.arg(source.path())
        .arg(&out_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {} for {}", binary.display(), source.path().display());
    let child = cmd
        .spawn()
        .map_err(|e| failed(format!("cannot start '{}': {}", binary.display(), e)))?;
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
        .await
        .map_err(|_| failed(format!("wkhtmltopdf timed out after {}s", timeout_secs)))?
        .map_err(|e| failed(e.to_string()))?;

    if !output.status.success() {
        return Err(failed(format!(
            "wkhtmltopdf exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let bytes = tokio::fs::read(&out_path)
        .await
        .map_err(|e| failed(format!("no output produced: {}", e)))?;
    if !bytes.starts_with(b"%PDF") {
        return Err(failed("output is not a PDF".into()));
    }
    info!("wkhtmltopdf produced {} bytes", bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::builder().render_workers(1).build().unwrap()
    }

    #[tokio::test]
    async fn builtin_renders_pdf() {
        let r = Rasterizer::new(&config(), FontSet::builtin());
        let pdf = r
            .rasterize("<h1>Title</h1><p>Body text</p>".into())
            .await
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        let doc = lopdf::Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[tokio::test]
    async fn running_footer_is_drawn() {
        let mut config = config();
        config.geometry.running_footer = true;
        config.page_numbers.format = "Page {page} of {total}".into();
        let r = Rasterizer::new(&config, FontSet::builtin());
        let pdf = r.rasterize("<p>x</p>".into()).await.unwrap();
        let doc = lopdf::Document::load_mem(&pdf).unwrap();
        let shown = shown_bytes(&doc);
        assert!(
            shown.windows(11).any(|w| w == b"Page 1 of 1"),
            "got {:?}",
            String::from_utf8_lossy(&shown)
        );
    }

    /// Bytes of every string shown on the first page.
    fn shown_bytes(doc: &lopdf::Document) -> Vec<u8> {
        let page = *doc.get_pages().values().next().unwrap();
        let content = lopdf::content::Content::decode(&doc.get_page_content(page).unwrap()).unwrap();
        let mut out = Vec::new();
        for op in content.operations {
            for operand in &op.operands {
                match operand {
                    lopdf::Object::String(bytes, _) => out.extend_from_slice(bytes),
                    lopdf::Object::Array(items) => {
                        for item in items {
                            if let lopdf::Object::String(bytes, _) = item {
                                out.extend_from_slice(bytes);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        out
    }

    #[tokio::test]
    async fn missing_wkhtmltopdf_is_rasterization_failure() {
        let mut config = config();
        config.raster = RasterBackend::Wkhtmltopdf {
            binary: PathBuf::from("/nonexistent/wkhtmltopdf"),
            timeout_secs: 5,
        };
        let dir = tempfile::tempdir().unwrap();
        config.asset_base = Some(dir.path().to_path_buf());
        let r = Rasterizer::new(&config, FontSet::builtin());
        let err = r.rasterize("<p>x</p>".into()).await.unwrap_err();
        assert!(matches!(err, Xml2PdfError::RasterizationFailed { .. }));
    }
}
