//! Upload server binary for xml2pdf.
//!
//! Serves the Basic-auth protected upload endpoint around one shared
//! pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use xml2pdf::cli::{init_tracing, PipelineArgs};
use xml2pdf::server::{self, Credentials, ServerOptions};
use xml2pdf::Pipeline;

/// HTTP service that turns uploaded XML into signed PDF.
#[derive(Parser, Debug)]
#[command(name = "xml2pdf-server", version, color = clap::ColorChoice::Auto)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Basic-auth user name.
    #[arg(long, env = "USERNAME")]
    username: String,

    /// Basic-auth password.
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    password: String,

    /// Answer bad input with the placeholder PDF instead of a JSON error.
    #[arg(long, env = "PLACEHOLDER_ON_BAD_INPUT")]
    placeholder_on_bad_input: bool,

    /// Directory served under /static.
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Maximum upload size in MiB.
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 20)]
    max_upload_mb: usize,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "XML2PDF_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(
        if cli.verbose { "debug" } else { "info,tower_http=info" },
        cli.pipeline.log_path().as_deref(),
    );

    let config = cli
        .pipeline
        .to_config(None)
        .context("Invalid configuration")?;
    let pipeline = Pipeline::new(config).context("Failed to initialise pipeline")?;
    if let Some(storage) = pipeline.storage() {
        storage
            .prepare()
            .await
            .context("Failed to prepare storage directories")?;
        info!("Storage root {}", storage.config().root.display());
    }

    let mut options = ServerOptions::new(Credentials::new(cli.username, cli.password));
    options.placeholder_on_bad_input = cli.placeholder_on_bad_input;
    options.static_dir = cli.static_dir;
    options.body_limit = cli.max_upload_mb * 1024 * 1024;

    let app = server::router(Arc::new(pipeline), options);
    server::serve(cli.bind, app)
        .await
        .with_context(|| format!("Server on {} failed", cli.bind))
}
