//! Blockfit service
//!
//! Serves fixed-partition allocation simulations over HTTP.

mod api;
mod http;
mod server;
mod settings;
mod stats;

use anyhow::{Context, Result};
use api::AppState;
use blockfit_core::Allocator;
use settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::resolve(std::env::args_os().nth(1).map(PathBuf::from))
        .context("loading settings")?;

    tracing_subscriber::fmt()
        .with_max_level(settings.log_level()?)
        .init();

    tracing::info!("Blockfit v{}", blockfit_core::VERSION);

    let allocator = Allocator::new();
    tracing::info!(blocks = allocator.template().len(), "block template loaded");
    let state = Arc::new(AppState::new(allocator));

    let listener = TcpListener::bind(&settings.bind_address)
        .await
        .with_context(|| format!("binding {}", settings.bind_address))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    let limits = server::ConnectionLimits {
        max_body_bytes: settings.max_body_bytes,
        read_timeout: settings.read_timeout(),
    };

    server::serve(listener, state, limits, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
        }
    })
    .await?;

    tracing::info!("server stopped");
    Ok(())
}
