//! HTTP upload service.
//!
//! Routes (all but `/health` behind Basic auth):
//!
//! | Method | Path                  | Purpose                                 |
//! |--------|-----------------------|-----------------------------------------|
//! | GET    | `/`                   | Upload form                             |
//! | POST   | `/upload`, `/upload/` | Multipart `file` or raw XML → signed PDF |
//! | GET    | `/errors`             | Error record as JSON                    |
//! | GET    | `/health`             | Liveness                                |
//! | GET    | `/static/*`           | Optional static directory               |

pub mod auth;
pub mod error;
pub mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use auth::Credentials;

use crate::convert::Pipeline;

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Answer bad input with the placeholder PDF instead of a JSON error.
    pub placeholder_on_bad_input: bool,
}

/// Server settings that are not part of the pipeline.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub credentials: Credentials,
    pub placeholder_on_bad_input: bool,
    pub static_dir: Option<PathBuf>,
    /// Maximum request body in bytes. Default: 20 MiB.
    pub body_limit: usize,
}

impl ServerOptions {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            placeholder_on_bad_input: false,
            static_dir: None,
            body_limit: 20 * 1024 * 1024,
        }
    }
}

/// Build the service router around a shared pipeline.
pub fn router(pipeline: Arc<Pipeline>, options: ServerOptions) -> Router {
    let state = AppState {
        pipeline,
        placeholder_on_bad_input: options.placeholder_on_bad_input,
    };

    let protected = Router::new()
        .route("/", get(handlers::index))
        .route("/upload", post(handlers::upload))
        .route("/upload/", post(handlers::upload))
        .route("/errors", get(handlers::errors))
        .route_layer(middleware::from_fn_with_state(
            options.credentials,
            auth::require_basic_auth,
        ));

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected);
    if let Some(dir) = options.static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(options.body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
        })
        .await
}
