//! Shared plumbing for the `xml2pdf` and `xml2pdf-server` binaries.
//!
//! Both binaries read the same pipeline flags (each with an environment
//! fallback) and install the same tracing subscriber.

use crate::config::{
    ExternalSigner, FontConfig, PageGeometry, PipelineConfig, RasterBackend, SignerMode,
    StampPolicy, StorageConfig, TemplateSource, TEST_SIGNER_NAME, TEST_SIGNER_PASSPHRASE,
};
use crate::progress::ProgressCallback;
use crate::Xml2PdfError;
use clap::{ArgAction, Args, ValueEnum};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Pipeline flags common to both binaries.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Test mode: sandbox signer, signer name "ТЕСТ", passphrase "12345".
    #[arg(long, env = "TEST_MODE", default_value_t = true, action = ArgAction::Set)]
    pub test_mode: bool,

    /// Name shown in the stamp; also the certificate store for the external signer.
    #[arg(long, env = "SIGNER_NAME")]
    pub signer_name: Option<String>,

    /// Passphrase for the signing key.
    #[arg(long, env = "SIGNER_PASSWORD", hide_env_values = true)]
    pub signer_password: Option<String>,

    /// Sandbox certificate (PEM).
    #[arg(long, env = "SANDBOX_CERT", default_value = "certs/cert.pem")]
    pub sandbox_cert: PathBuf,

    /// Sandbox private key (PKCS#8 PEM, optionally encrypted).
    #[arg(long, env = "SANDBOX_KEY", default_value = "certs/private_key.pem")]
    pub sandbox_key: PathBuf,

    /// External signing utility used outside test mode.
    #[arg(long, env = "SIGNER_PROGRAM", default_value = "csptest")]
    pub signer_program: PathBuf,

    /// External signer timeout in seconds.
    #[arg(long, env = "SIGNER_TIMEOUT", default_value_t = 60)]
    pub signer_timeout: u64,

    /// Directory holding a custom `document.html` template.
    #[arg(long, env = "TEMPLATE_DIR")]
    pub template_dir: Option<PathBuf>,

    /// Directory with Roboto-Regular.ttf / Roboto-Bold.ttf.
    #[arg(long, env = "FONT_DIR")]
    pub font_dir: Option<PathBuf>,

    /// Render through wkhtmltopdf at this path instead of the built-in engine.
    #[arg(long, env = "WKHTMLTOPDF")]
    pub wkhtmltopdf: Option<PathBuf>,

    /// Let the renderer draw page numbers in the footer.
    #[arg(long, env = "RUNNING_FOOTER")]
    pub running_footer: bool,

    /// Pages that receive the signature stamp.
    #[arg(long, env = "STAMP_PAGES", value_enum, default_value = "last")]
    pub stamp_pages: StampPagesArg,

    /// Storage root for input_data/, output_data/, file_errors.json and app.log.
    #[arg(long, env = "STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// UTC offset in minutes for printed timestamps.
    #[arg(long, env = "UTC_OFFSET_MINUTES", default_value_t = 180, allow_negative_numbers = true)]
    pub utc_offset_minutes: i32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "XML2PDF_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    pub download_timeout: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StampPagesArg {
    Last,
    Every,
}

impl From<StampPagesArg> for StampPolicy {
    fn from(v: StampPagesArg) -> Self {
        match v {
            StampPagesArg::Last => StampPolicy::LastPage,
            StampPagesArg::Every => StampPolicy::EveryPage,
        }
    }
}

impl PipelineArgs {
    /// Map flags to a validated [`PipelineConfig`].
    pub fn to_config(
        &self,
        progress: Option<ProgressCallback>,
    ) -> Result<PipelineConfig, Xml2PdfError> {
        let (signer_name, signer) = if self.test_mode {
            let passphrase = self
                .signer_password
                .as_deref()
                .unwrap_or(TEST_SIGNER_PASSPHRASE);
            (
                TEST_SIGNER_NAME.to_string(),
                SignerMode::sandbox(&self.sandbox_cert, &self.sandbox_key, Some(passphrase)),
            )
        } else {
            let name = self.signer_name.clone().ok_or_else(|| {
                Xml2PdfError::InvalidConfig("SIGNER_NAME is required outside test mode".into())
            })?;
            let mut external = ExternalSigner::new(name.clone())
                .program(&self.signer_program)
                .timeout_secs(self.signer_timeout);
            if let Some(ref pw) = self.signer_password {
                external = external.passphrase(pw.clone());
            }
            (name, SignerMode::External(external))
        };

        let geometry = PageGeometry {
            running_footer: self.running_footer,
            ..PageGeometry::default()
        };

        let mut builder = PipelineConfig::builder()
            .test_mode(self.test_mode)
            .signer_name(signer_name)
            .signer(signer)
            .geometry(geometry)
            .stamp_policy(self.stamp_pages.into())
            .utc_offset_minutes(self.utc_offset_minutes)
            .download_timeout_secs(self.download_timeout);

        if let Some(ref dir) = self.template_dir {
            builder = builder.template(TemplateSource::Directory {
                dir: dir.clone(),
                name: "document.html".to_string(),
            });
            builder = builder.asset_base(dir.clone());
        }
        if let Some(ref dir) = self.font_dir {
            builder = builder.fonts(FontConfig::from_dir(dir));
        }
        if let Some(ref binary) = self.wkhtmltopdf {
            builder = builder.raster(RasterBackend::Wkhtmltopdf {
                binary: binary.clone(),
                timeout_secs: 120,
            });
        }
        if let Some(ref root) = self.storage_dir {
            builder = builder.storage(StorageConfig::new(root));
        }
        if let Some(cb) = progress {
            builder = builder.progress_callback(cb);
        }
        builder.build()
    }

    /// `app.log` under the storage root, when storage is configured.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.storage_dir
            .as_ref()
            .map(|root| StorageConfig::new(root).log_path())
    }
}

/// Install the global subscriber: stderr always, plus `log_file` when given.
///
/// `RUST_LOG` overrides `default_filter`. A log file that cannot be opened
/// is reported on stderr and skipped.
pub fn init_tracing(default_filter: &str, log_file: Option<&Path>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = log_file.and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        pipeline: PipelineArgs,
    }

    #[test]
    fn test_mode_uses_sandbox_signer() {
        let cli = TestCli::parse_from(["xml2pdf", "--test-mode", "true"]);
        let config = cli.pipeline.to_config(None).unwrap();
        assert_eq!(config.signer_name, TEST_SIGNER_NAME);
        match config.signer {
            SignerMode::Sandbox { passphrase, .. } => {
                assert_eq!(passphrase.as_deref(), Some(TEST_SIGNER_PASSPHRASE))
            }
            other => panic!("expected sandbox signer, got {:?}", other),
        }
    }

    #[test]
    fn production_mode_requires_signer_name() {
        let cli = TestCli::parse_from(["xml2pdf", "--test-mode", "false"]);
        let err = cli.pipeline.to_config(None).unwrap_err();
        assert!(matches!(err, Xml2PdfError::InvalidConfig(_)));
    }

    #[test]
    fn production_mode_uses_external_signer() {
        let cli = TestCli::parse_from([
            "xml2pdf",
            "--test-mode",
            "false",
            "--signer-name",
            "Иванов",
            "--signer-password",
            "pw",
            "--stamp-pages",
            "every",
        ]);
        let config = cli.pipeline.to_config(None).unwrap();
        assert_eq!(config.signer_name, "Иванов");
        assert_eq!(config.stamp.policy, StampPolicy::EveryPage);
        match config.signer {
            SignerMode::External(ext) => {
                assert_eq!(ext.certificate_store, "Иванов");
                assert_eq!(ext.passphrase.as_deref(), Some("pw"));
            }
            other => panic!("expected external signer, got {:?}", other),
        }
    }

    #[test]
    fn storage_dir_sets_log_path() {
        let cli = TestCli::parse_from(["xml2pdf", "--storage-dir", "/srv/data"]);
        assert_eq!(cli.pipeline.log_path(), Some(PathBuf::from("/srv/data/app.log")));
    }
}
