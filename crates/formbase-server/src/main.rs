//! # formbase-server
//!
//! HTTP server for the Formbase form-definition platform.
//!
//! This binary provides:
//! - **Form persistence API** (axum): create/update forms with their
//!   ordered field lists, title uniqueness checks, deletion
//! - **Versioning**: numbered immutable snapshots with publish/rollback
//! - **Drafts**: author-scoped working copies with periodic cleanup
//! - **Templates and categories**: reusable field sets and lookup data
//! - **Submission intake** with `doNotStore` redaction

mod api;
mod config;
mod error;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use formbase_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,formbase_server=debug")),
        )
        .init();

    info!("Starting Formbase server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        max_fields = config.max_fields,
        draft_max_age_days = config.draft_max_age_days,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Open the database
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let db = Arc::new(Mutex::new(db));

    let app_state = AppState {
        db: db.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic draft cleanup (hourly).  The reap itself is idempotent, so
    // missing a tick or running alongside an external cron is harmless.
    let cleanup_db = db.clone();
    let draft_max_age_days = config.draft_max_age_days;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let db = cleanup_db.lock().await;
            if let Err(e) = db.cleanup_old_drafts(draft_max_age_days) {
                tracing::warn!(error = %e, "draft cleanup failed");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
