//! Configuration types for XML-to-PDF conversion.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share a config between the CLI, the upload server and
//! tests, and to log exactly what a run was configured with.

use crate::error::Xml2PdfError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Signer display name used when test mode is on.
pub const TEST_SIGNER_NAME: &str = "ТЕСТ";

/// Passphrase of the bundled sandbox credentials in test mode.
pub const TEST_SIGNER_PASSPHRASE: &str = "12345";

/// Configuration for an XML-to-PDF conversion.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use xml2pdf::{PipelineConfig, SignerMode, StampPolicy};
///
/// let config = PipelineConfig::builder()
///     .signer_name("Иванов И. И.")
///     .stamp_policy(StampPolicy::EveryPage)
///     .signer(SignerMode::sandbox("certs/cert.pem", "certs/key.pem", Some("secret")))
///     .build()
///     .unwrap();
/// assert_eq!(config.stamp.policy, StampPolicy::EveryPage);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Name printed in the signature stamp. Default: `ТЕСТ`.
    pub signer_name: String,

    /// Test mode. Exposed to the template as `test` and selects the
    /// sandbox signer in the binaries. Default: true.
    pub test_mode: bool,

    /// How the final PDF is signed.
    pub signer: SignerMode,

    /// XML tags that must be present (non-empty) for a submission to be
    /// accepted. Default: `["UniqueID"]`.
    pub required_fields: Vec<String>,

    /// Where the HTML template comes from. Default: the embedded template.
    pub template: TemplateSource,

    /// Base directory for resolving relative asset references in the
    /// rendered HTML. Default: current directory.
    pub asset_base: Option<PathBuf>,

    /// HTML-to-PDF backend. Default: [`RasterBackend::Builtin`].
    pub raster: RasterBackend,

    /// Page size and margins of the rendered document.
    pub geometry: PageGeometry,

    /// Fonts for the rendered document, the stamp and page numbers.
    pub fonts: FontConfig,

    /// Maximum concurrent rasterizations. Default: available parallelism.
    pub render_workers: usize,

    /// Signature stamp placement and policy.
    pub stamp: StampOptions,

    /// Running page-number overlay.
    pub page_numbers: PageNumberOptions,

    /// UTC offset (minutes) for timestamps printed in the stamp and the
    /// signature dictionary. Default: 180 (Moscow time).
    pub utc_offset_minutes: i32,

    /// Flat-file archive of submissions and generated PDFs. Default: None.
    pub storage: Option<StorageConfig>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            signer_name: TEST_SIGNER_NAME.to_string(),
            test_mode: true,
            signer: SignerMode::default(),
            required_fields: vec!["UniqueID".to_string()],
            template: TemplateSource::default(),
            asset_base: None,
            raster: RasterBackend::default(),
            geometry: PageGeometry::default(),
            fonts: FontConfig::default(),
            render_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            stamp: StampOptions::default(),
            page_numbers: PageNumberOptions::default(),
            utc_offset_minutes: 180,
            storage: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("signer_name", &self.signer_name)
            .field("test_mode", &self.test_mode)
            .field("signer", &self.signer)
            .field("required_fields", &self.required_fields)
            .field("template", &self.template)
            .field("raster", &self.raster)
            .field("geometry", &self.geometry)
            .field("fonts", &self.fonts)
            .field("render_workers", &self.render_workers)
            .field("stamp", &self.stamp)
            .field("page_numbers", &self.page_numbers)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("storage", &self.storage)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn signer_name(mut self, name: impl Into<String>) -> Self {
        self.config.signer_name = name.into();
        self
    }

    pub fn test_mode(mut self, on: bool) -> Self {
        self.config.test_mode = on;
        self
    }

    pub fn signer(mut self, signer: SignerMode) -> Self {
        self.config.signer = signer;
        self
    }

    pub fn required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn template(mut self, source: TemplateSource) -> Self {
        self.config.template = source;
        self
    }

    pub fn asset_base(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.asset_base = Some(dir.into());
        self
    }

    pub fn raster(mut self, backend: RasterBackend) -> Self {
        self.config.raster = backend;
        self
    }

    pub fn geometry(mut self, geometry: PageGeometry) -> Self {
        self.config.geometry = geometry;
        self
    }

    pub fn fonts(mut self, fonts: FontConfig) -> Self {
        self.config.fonts = fonts;
        self
    }

    pub fn render_workers(mut self, n: usize) -> Self {
        self.config.render_workers = n.max(1);
        self
    }

    pub fn stamp(mut self, stamp: StampOptions) -> Self {
        self.config.stamp = stamp;
        self
    }

    pub fn stamp_policy(mut self, policy: StampPolicy) -> Self {
        self.config.stamp.policy = policy;
        self
    }

    pub fn page_numbers(mut self, options: PageNumberOptions) -> Self {
        self.config.page_numbers = options;
        self
    }

    pub fn utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.config.utc_offset_minutes = minutes;
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = Some(storage);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Xml2PdfError> {
        let c = &self.config;
        if c.signer_name.trim().is_empty() {
            return Err(Xml2PdfError::InvalidConfig(
                "Signer name must not be empty".into(),
            ));
        }
        if c.render_workers == 0 {
            return Err(Xml2PdfError::InvalidConfig(
                "Render workers must be ≥ 1".into(),
            ));
        }
        // UTC offsets beyond ±18h are rejected by chrono::FixedOffset.
        if c.utc_offset_minutes.abs() >= 18 * 60 {
            return Err(Xml2PdfError::InvalidConfig(format!(
                "UTC offset out of range: {} minutes",
                c.utc_offset_minutes
            )));
        }
        c.geometry.validate()?;
        c.stamp.validate(&c.geometry)?;
        c.page_numbers.validate()?;
        c.signer.validate()?;
        if let RasterBackend::Wkhtmltopdf { timeout_secs, .. } = &c.raster {
            if *timeout_secs == 0 {
                return Err(Xml2PdfError::InvalidConfig(
                    "wkhtmltopdf timeout must be > 0".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Signing ──────────────────────────────────────────────────────────────

/// Selects how the final document is signed.
#[derive(Clone, Serialize, Deserialize)]
pub enum SignerMode {
    /// Library signing with a local certificate and PKCS#8 key (PEM).
    Sandbox {
        certificate: PathBuf,
        private_key: PathBuf,
        #[serde(skip_serializing, default)]
        passphrase: Option<String>,
    },
    /// An external signing utility run as a subprocess.
    External(ExternalSigner),
}

impl SignerMode {
    pub fn sandbox(
        certificate: impl Into<PathBuf>,
        private_key: impl Into<PathBuf>,
        passphrase: Option<&str>,
    ) -> Self {
        SignerMode::Sandbox {
            certificate: certificate.into(),
            private_key: private_key.into(),
            passphrase: passphrase.map(str::to_string),
        }
    }

    fn validate(&self) -> Result<(), Xml2PdfError> {
        match self {
            SignerMode::Sandbox {
                certificate,
                private_key,
                ..
            } => {
                if certificate.as_os_str().is_empty() || private_key.as_os_str().is_empty() {
                    return Err(Xml2PdfError::InvalidConfig(
                        "Sandbox signer needs both a certificate and a key path".into(),
                    ));
                }
            }
            SignerMode::External(ext) => {
                if ext.program.as_os_str().is_empty() {
                    return Err(Xml2PdfError::InvalidConfig(
                        "External signer program must not be empty".into(),
                    ));
                }
                if ext.timeout_secs == 0 {
                    return Err(Xml2PdfError::InvalidConfig(
                        "External signer timeout must be > 0".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for SignerMode {
    fn default() -> Self {
        SignerMode::sandbox(
            "certs/cert.pem",
            "certs/private_key.pem",
            Some(TEST_SIGNER_PASSPHRASE),
        )
    }
}

impl fmt::Debug for SignerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerMode::Sandbox {
                certificate,
                private_key,
                passphrase,
            } => f
                .debug_struct("Sandbox")
                .field("certificate", certificate)
                .field("private_key", private_key)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            SignerMode::External(ext) => f.debug_tuple("External").field(ext).finish(),
        }
    }
}

/// External signing utility invocation.
///
/// The command line is `<program> <args...> -in <input> -out <output>
/// -my <certificate_store> -add`; the passphrase is written to the child's
/// stdin followed by a newline and never appears in the argument list.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExternalSigner {
    /// Signing utility. Default: `csptest`.
    pub program: PathBuf,
    /// Leading arguments. Default: `["-sfsign", "-sign"]`.
    pub args: Vec<String>,
    /// Certificate store reference passed via `-my`.
    pub certificate_store: String,
    /// Key container passphrase, delivered over stdin.
    #[serde(skip_serializing, default)]
    pub passphrase: Option<String>,
    /// Hard limit on the process run time. Default: 60.
    pub timeout_secs: u64,
}

impl ExternalSigner {
    pub fn new(certificate_store: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("csptest"),
            args: vec!["-sfsign".to_string(), "-sign".to_string()],
            certificate_store: certificate_store.into(),
            passphrase: None,
            timeout_secs: 60,
        }
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl fmt::Debug for ExternalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSigner")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("certificate_store", &self.certificate_store)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Source of the HTML template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum TemplateSource {
    /// The template compiled into the library (default).
    #[default]
    Embedded,
    /// A named template inside a directory of Tera templates.
    Directory { dir: PathBuf, name: String },
}

/// HTML-to-PDF backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum RasterBackend {
    /// In-process layout engine drawn with printpdf (default).
    #[default]
    Builtin,
    /// The `wkhtmltopdf` executable.
    Wkhtmltopdf { binary: PathBuf, timeout_secs: u64 },
}

/// Page size and margins, in millimetres.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width_mm: f32,
    pub height_mm: f32,
    pub margin_top_mm: f32,
    pub margin_right_mm: f32,
    pub margin_bottom_mm: f32,
    pub margin_left_mm: f32,
    /// Body text size in points. Default: 10.
    pub font_size_pt: f32,
    /// Draw `Страница N из M` in the rasterizer's own footer. Default: false;
    /// the page-number stage normally does this.
    pub running_footer: bool,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
            margin_top_mm: 5.0,
            margin_right_mm: 20.0,
            margin_bottom_mm: 20.0,
            margin_left_mm: 10.0,
            font_size_pt: 10.0,
            running_footer: false,
        }
    }
}

impl PageGeometry {
    fn validate(&self) -> Result<(), Xml2PdfError> {
        if self.width_mm <= 0.0 || self.height_mm <= 0.0 {
            return Err(Xml2PdfError::InvalidConfig(format!(
                "Page size must be positive, got {}x{} mm",
                self.width_mm, self.height_mm
            )));
        }
        let margins = [
            self.margin_top_mm,
            self.margin_right_mm,
            self.margin_bottom_mm,
            self.margin_left_mm,
        ];
        if margins.iter().any(|m| *m < 0.0) {
            return Err(Xml2PdfError::InvalidConfig("Margins must be ≥ 0".into()));
        }
        if self.margin_left_mm + self.margin_right_mm >= self.width_mm
            || self.margin_top_mm + self.margin_bottom_mm >= self.height_mm
        {
            return Err(Xml2PdfError::InvalidConfig(
                "Margins leave no printable area".into(),
            ));
        }
        if !(4.0..=72.0).contains(&self.font_size_pt) {
            return Err(Xml2PdfError::InvalidConfig(format!(
                "Font size must be 4–72 pt, got {}",
                self.font_size_pt
            )));
        }
        Ok(())
    }

    pub fn width_pt(&self) -> f32 {
        mm_to_pt(self.width_mm)
    }

    pub fn height_pt(&self) -> f32 {
        mm_to_pt(self.height_mm)
    }
}

/// Millimetres to PDF points.
pub fn mm_to_pt(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

/// TrueType fonts used for rendering. Missing fonts fall back to a
/// discovered system font and then to built-in Helvetica, which cannot
/// render Cyrillic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontConfig {
    pub regular: Option<PathBuf>,
    pub bold: Option<PathBuf>,
    /// Look for DejaVu Sans / Arial in the usual system locations.
    pub discover_system: bool,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            regular: None,
            bold: None,
            discover_system: true,
        }
    }
}

impl FontConfig {
    /// `Roboto-Regular.ttf` / `Roboto-Bold.ttf` inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            regular: Some(dir.join("Roboto-Regular.ttf")),
            bold: Some(dir.join("Roboto-Bold.ttf")),
            discover_system: true,
        }
    }
}

// ── Overlays ─────────────────────────────────────────────────────────────

/// Which pages receive the signature stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StampPolicy {
    /// Only the last page (default).
    #[default]
    LastPage,
    /// Every page.
    EveryPage,
}

/// Signature stamp geometry, in points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampOptions {
    pub policy: StampPolicy,
    pub width_pt: f32,
    pub height_pt: f32,
    /// Fixed distance from the bottom edge used when the page has no text or
    /// no room below it. Default: 30.
    pub bottom_offset_pt: f32,
    /// Gap between the lowest text line and the stamp box. Default: 10.
    pub gap_pt: f32,
    /// Text below this height (e.g. a running footer) is ignored when
    /// measuring. Default: 0.
    pub ignore_text_below_pt: f32,
    pub title_size_pt: f32,
    pub body_size_pt: f32,
}

impl Default for StampOptions {
    fn default() -> Self {
        Self {
            policy: StampPolicy::LastPage,
            width_pt: 300.0,
            height_pt: 60.0,
            bottom_offset_pt: 30.0,
            gap_pt: 10.0,
            ignore_text_below_pt: 0.0,
            title_size_pt: 10.0,
            body_size_pt: 9.0,
        }
    }
}

impl StampOptions {
    fn validate(&self, geometry: &PageGeometry) -> Result<(), Xml2PdfError> {
        if self.width_pt <= 0.0 || self.height_pt <= 0.0 {
            return Err(Xml2PdfError::InvalidConfig(
                "Stamp dimensions must be positive".into(),
            ));
        }
        if self.width_pt > geometry.width_pt() {
            return Err(Xml2PdfError::InvalidConfig(format!(
                "Stamp width {}pt exceeds page width {:.0}pt",
                self.width_pt,
                geometry.width_pt()
            )));
        }
        if self.bottom_offset_pt < 0.0 || self.gap_pt < 0.0 {
            return Err(Xml2PdfError::InvalidConfig(
                "Stamp offsets must be ≥ 0".into(),
            ));
        }
        Ok(())
    }
}

/// Running page-number overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageNumberOptions {
    pub enabled: bool,
    /// `{page}` and `{total}` are substituted. Default: `Страница {page} из {total}`.
    pub format: String,
    pub font_size_pt: f32,
    /// Left edge of the text. `None` right-aligns it at the right margin.
    pub x_pt: Option<f32>,
    /// Baseline height from the bottom edge. Default: 20.
    pub y_pt: f32,
}

impl Default for PageNumberOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            format: "Страница {page} из {total}".to_string(),
            font_size_pt: 9.0,
            x_pt: None,
            y_pt: 20.0,
        }
    }
}

impl PageNumberOptions {
    fn validate(&self) -> Result<(), Xml2PdfError> {
        if self.enabled && !self.format.contains("{page}") {
            return Err(Xml2PdfError::InvalidConfig(
                "Page number format must contain {page}".into(),
            ));
        }
        if self.font_size_pt <= 0.0 {
            return Err(Xml2PdfError::InvalidConfig(
                "Page number font size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Render the label for one page.
    pub fn label(&self, page: usize, total: usize) -> String {
        self.format
            .replace("{page}", &page.to_string())
            .replace("{total}", &total.to_string())
    }
}

// ── Storage ──────────────────────────────────────────────────────────────

/// Flat-file storage layout under a single root directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    /// Archive every accepted submission under `input_data/`. Default: true.
    pub archive_submissions: bool,
    /// Keep a copy of every generated PDF under `output_data/`. Default: true.
    pub keep_outputs: bool,
    /// Retry policy for error-record writes.
    pub retry: RetryPolicy,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            archive_submissions: true,
            keep_outputs: true,
            retry: RetryPolicy::default(),
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input_data")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output_data")
    }

    pub fn error_record_path(&self) -> PathBuf {
        self.root.join("file_errors.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("app.log")
    }
}

/// Bounded retry-with-delay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Default: 3.
    pub attempts: u32,
    /// Delay between attempts in milliseconds. Default: 100.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.signer_name, TEST_SIGNER_NAME);
        assert!(config.test_mode);
        assert_eq!(config.required_fields, vec!["UniqueID".to_string()]);
        assert_eq!(config.stamp.policy, StampPolicy::LastPage);
        assert!(config.render_workers >= 1);
    }

    #[test]
    fn empty_signer_name_rejected() {
        let err = PipelineConfig::builder().signer_name("  ").build().unwrap_err();
        assert!(matches!(err, Xml2PdfError::InvalidConfig(_)));
    }

    #[test]
    fn page_number_format_needs_placeholder() {
        let options = PageNumberOptions {
            format: "Page".into(),
            ..PageNumberOptions::default()
        };
        let err = PipelineConfig::builder()
            .page_numbers(options)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("{page}"));
    }

    #[test]
    fn page_number_label() {
        let options = PageNumberOptions::default();
        assert_eq!(options.label(2, 5), "Страница 2 из 5");
    }

    #[test]
    fn external_signer_zero_timeout_rejected() {
        let signer = SignerMode::External(ExternalSigner::new("store").timeout_secs(0));
        assert!(PipelineConfig::builder().signer(signer).build().is_err());
    }

    #[test]
    fn debug_redacts_passphrases() {
        let signer = SignerMode::External(ExternalSigner::new("store").passphrase("hunter2"));
        let text = format!("{:?}", signer);
        assert!(!text.contains("hunter2"), "got: {text}");
        let sandbox = SignerMode::sandbox("c.pem", "k.pem", Some("hunter2"));
        assert!(!format!("{:?}", sandbox).contains("hunter2"));
    }

    #[test]
    fn margins_must_leave_room() {
        let geometry = PageGeometry {
            margin_left_mm: 150.0,
            margin_right_mm: 100.0,
            ..PageGeometry::default()
        };
        assert!(PipelineConfig::builder().geometry(geometry).build().is_err());
    }

    #[test]
    fn storage_layout() {
        let storage = StorageConfig::new("/mnt");
        assert_eq!(storage.input_dir(), PathBuf::from("/mnt/input_data"));
        assert_eq!(storage.output_dir(), PathBuf::from("/mnt/output_data"));
        assert_eq!(
            storage.error_record_path(),
            PathBuf::from("/mnt/file_errors.json")
        );
    }

    #[test]
    fn a4_in_points() {
        let g = PageGeometry::default();
        assert!((g.width_pt() - 595.28).abs() < 0.1);
        assert!((g.height_pt() - 841.89).abs() < 0.1);
    }
}
