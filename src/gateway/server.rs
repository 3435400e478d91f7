//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use url::Url;

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::{Error, Result};

/// BFF gateway server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Parsed upstream base URL
    upstream: Url,
}

impl Gateway {
    /// Create a new gateway, validating the upstream base URL.
    pub fn new(config: Config) -> Result<Self> {
        let upstream = Url::parse(&config.upstream.base_url)
            .map_err(|e| Error::Config(format!("Invalid upstream base URL: {e}")))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Upstream base URL must be http(s): {upstream}"
            )));
        }

        Ok(Self { config, upstream })
    }

    /// Run the gateway until shutdown
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let http = reqwest::Client::builder()
            .connect_timeout(self.config.upstream.connect_timeout)
            .timeout(self.config.upstream.request_timeout)
            .build()?;

        let state = Arc::new(AppState {
            upstream: self.upstream.clone(),
            http,
        });

        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("BOARD BFF v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(upstream = %self.upstream, "Forwarding to upstream");
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
