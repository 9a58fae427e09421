//! HTML rendering of the extracted context with Tera.
//!
//! Templates are compiled once when the pipeline is built; rendering per
//! request only binds the context. Optional groups render as blank
//! sections because absent fields serialise to `null`/empty lists, which
//! Tera treats as falsy in `{% if %}` and prints as the empty string.

use crate::config::TemplateSource;
use crate::error::Xml2PdfError;
use crate::pipeline::extract::ExtractedContext;
use std::error::Error as _;
use tera::{Context, Tera};
use tracing::debug;

/// Name of the template compiled into the library.
pub const EMBEDDED_TEMPLATE_NAME: &str = "document.html";

const EMBEDDED_TEMPLATE: &str = include_str!("../../templates/document.html");

/// A compiled template ready to render submissions.
#[derive(Debug)]
pub struct TemplateRenderer {
    tera: Tera,
    name: String,
}

impl TemplateRenderer {
    /// Compile the configured template.
    ///
    /// # Errors
    /// [`Xml2PdfError::TemplateFailed`] when the directory cannot be loaded,
    /// the named template is not in it, or any template has a syntax error.
    pub fn new(source: &TemplateSource) -> Result<Self, Xml2PdfError> {
        match source {
            TemplateSource::Embedded => {
                let mut tera = Tera::default();
                tera.add_raw_template(EMBEDDED_TEMPLATE_NAME, EMBEDDED_TEMPLATE)
                    .map_err(|e| template_error(EMBEDDED_TEMPLATE_NAME, &e))?;
                Ok(Self {
                    tera,
                    name: EMBEDDED_TEMPLATE_NAME.to_string(),
                })
            }
            TemplateSource::Directory { dir, name } => {
                let glob = format!("{}/**/*.html", dir.display());
                let tera = Tera::new(&glob).map_err(|e| template_error(name, &e))?;
                if !tera.get_template_names().any(|n| n == name) {
                    return Err(Xml2PdfError::TemplateFailed {
                        template: name.clone(),
                        detail: format!("not found in '{}'", dir.display()),
                    });
                }
                debug!("Loaded template '{}' from {}", name, dir.display());
                Ok(Self {
                    tera,
                    name: name.clone(),
                })
            }
        }
    }

    /// Render one submission to a complete HTML string.
    pub fn render(&self, context: &ExtractedContext) -> Result<String, Xml2PdfError> {
        let ctx = Context::from_serialize(context).map_err(|e| template_error(&self.name, &e))?;
        let html = self
            .tera
            .render(&self.name, &ctx)
            .map_err(|e| template_error(&self.name, &e))?;
        debug!("Rendered '{}' → {} bytes of HTML", self.name, html.len());
        Ok(html)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Tera nests the useful message in the source chain; flatten it.
fn template_error(template: &str, err: &tera::Error) -> Xml2PdfError {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        detail.push_str(": ");
        detail.push_str(&inner.to_string());
        source = inner.source();
    }
    Xml2PdfError::TemplateFailed {
        template: template.to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::{DepositRecord, Polygon};
    use std::fs;

    fn context() -> ExtractedContext {
        ExtractedContext {
            inv: Some("REQ-1".into()),
            name: Some("Иванов <Иван>".into()),
            signer: "ТЕСТ".into(),
            ..ExtractedContext::default()
        }
    }

    #[test]
    fn embedded_template_renders_with_blank_groups() {
        let renderer = TemplateRenderer::new(&TemplateSource::Embedded).unwrap();
        let html = renderer.render(&context()).unwrap();
        assert!(html.contains("REQ-1"));
        assert!(html.contains("отсутствуют"), "empty deposit section expected");
        assert!(!html.contains("Контур"));
    }

    #[test]
    fn values_are_escaped() {
        let renderer = TemplateRenderer::new(&TemplateSource::Embedded).unwrap();
        let html = renderer.render(&context()).unwrap();
        assert!(html.contains("Иванов &lt;Иван&gt;"));
    }

    #[test]
    fn deposits_and_polygons_render() {
        let mut ctx = context();
        ctx.deposit_info_list = Some(vec![DepositRecord {
            name: Some("Северное".into()),
            cad_num: None,
            licenses: "A, B".into(),
            last_change_date: "01.01.2024 00:00:00".into(),
        }]);
        ctx.polygons = vec![Polygon { points: vec![] }];
        let renderer = TemplateRenderer::new(&TemplateSource::Embedded).unwrap();
        let html = renderer.render(&ctx).unwrap();
        assert!(html.contains("Северное"));
        assert!(html.contains("Контур 1"));
    }

    #[test]
    fn missing_directory_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("other.html"), "<p>{{ inv }}</p>").unwrap();
        let err = TemplateRenderer::new(&TemplateSource::Directory {
            dir: dir.path().to_path_buf(),
            name: "document.html".into(),
        })
        .unwrap_err();
        assert!(matches!(err, Xml2PdfError::TemplateFailed { .. }));
    }

    #[test]
    fn syntax_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("document.html"), "<p>{% if inv %}</p>").unwrap();
        let err = TemplateRenderer::new(&TemplateSource::Directory {
            dir: dir.path().to_path_buf(),
            name: "document.html".into(),
        })
        .unwrap_err();
        assert!(matches!(err, Xml2PdfError::TemplateFailed { .. }));
    }

    #[test]
    fn directory_template_is_loaded_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("custom.html"), "<p class=\"custom\">{{ inv }} {{ signer }}</p>").unwrap();
        let renderer = TemplateRenderer::new(&TemplateSource::Directory {
            dir: dir.path().to_path_buf(),
            name: "custom.html".into(),
        })
        .unwrap();
        assert_eq!(renderer.name(), "custom.html");
        let html = renderer.render(&context()).unwrap();
        assert!(html.starts_with("<p class=\"custom\">"), "got {html}");
        assert!(html.contains("REQ-1") && html.contains("ТЕСТ"), "got {html}");
    }
}
