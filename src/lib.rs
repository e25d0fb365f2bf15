pub mod config;
pub mod detection;
pub mod dom;
pub mod errors;
pub mod fill;
pub mod host;
pub mod profile;
pub mod remote;
pub mod session;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::dom::Document;
use crate::profile::{JsonFileStore, ProfileStore};
use crate::session::{Collaborators, PageSession};

/// Host entry point: one page session driven by JSON lines on stdin/stdout.
pub fn run() {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load config; using defaults");
            AppConfig::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let store: Arc<dyn ProfileStore> = Arc::new(JsonFileStore::from_config(&config.storage));
        let (collaborators, inbound) = match Collaborators::connect(&config.backend) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!(error = %e, "backend misconfigured; running local-only");
                (Collaborators::default(), None)
            }
        };

        let session = Arc::new(PageSession::new(
            Document::new("about:blank"),
            &config,
            store,
            collaborators,
        ));
        if let Some(inbound) = inbound {
            session.spawn_inbound(inbound);
        }

        tracing::info!(session = %session.id(), "FormPilot host ready");
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = host::serve(session, stdin, tokio::io::stdout()).await {
            tracing::error!(error = %e, "host loop failed");
        }
        tracing::info!("FormPilot host exited");
    });
}
