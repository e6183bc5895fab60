//! Exercise Bank · Backend
//!
//! - Axum HTTP API for the college → course → knowledge point → exercise catalog
//! - Rule-driven paper assembly plus manual paper curation
//! - WebSocket stream of mutation events (`/ws`)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   BANK_CONFIG_PATH  : path to TOML config (server, pagination, storage)
//!   BANK_DATA_PATH    : JSON snapshot file; memory only when unset
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod store;
mod events;
mod state;
mod protocol;
mod filter;
mod rules;
mod assembler;
mod membership;
mod catalog;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::load_config_from_env;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = load_config_from_env();
  let port = config.server.port;

  // Shared state: store (loaded from snapshot if configured), config, notifier.
  let state = Arc::new(AppState::new(config).await?);

  let app = build_router(state.clone());

  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "exercise_bank", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "exercise_bank", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "exercise_bank", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "exercise_bank", "Shutdown signal received");
}
