//! HTTP transport: `POST /overlay` plus static serving of finished GIFs.

mod config;
mod error;
mod routes;

use std::sync::Arc;

use anyhow::Context as _;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::{OUTPUTS_ROUTE, OverlayResponse, router};

use crate::text::FontBook;

/// Shared, read-only state handed to every request.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub fonts: Arc<FontBook>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let fonts = Arc::new(FontBook::new(config.fonts.clone()));
        Self {
            config: Arc::new(config),
            fonts,
        }
    }
}

/// Create the working directories and serve until Ctrl-C.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    config.ensure_dirs().await?;

    let addr = config.bind_addr();
    let state = AppState::new(config);
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(
        %addr,
        base_url = %state.config.base_url,
        uploads = %state.config.uploads_dir.display(),
        outputs = %state.config.outputs_dir.display(),
        "server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
