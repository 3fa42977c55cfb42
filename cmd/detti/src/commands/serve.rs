//! HTTP server command.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Args;
use tracing::{info, warn};

use detti_kv::DettiDb;

use super::open_db;
use crate::{server, Cli};

/// Serve the database over HTTP.
///
/// Listens on server.host:server.port from the configuration unless
/// overridden. Stops on Ctrl-C or SIGTERM after in-flight writes finish.
#[derive(Args)]
pub struct ServeCommand {
    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long, short = 'p')]
    port: Option<u16>,
}

impl ServeCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let (mut cfg, db) = open_db(cli)?;
        if let Some(host) = &self.host {
            cfg.server.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }

        let db = Arc::new(db);
        let app = server::router(Arc::clone(&db), &cfg.server)?;

        let addr = cfg.server.addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(
            "detti: serving {} on http://{} (auth {})",
            db.path().display(),
            listener.local_addr()?,
            if cfg.server.auth_enabled() { "on" } else { "off" }
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&db)))
        .await?;

        db.shutdown();
        info!("detti: stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C or SIGTERM after closing the store to mutations.
async fn shutdown_signal(db: Arc<DettiDb>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("detti: cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("detti: cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("detti: shutdown requested");
    if let Err(e) = tokio::task::spawn_blocking(move || db.shutdown()).await {
        warn!("detti: shutdown task failed: {}", e);
    }
}
