//! Board BFF Gateway Library
//!
//! Backend-for-frontend gateway for the board application. Two subsystems:
//!
//! - **Reverse proxy**: a stateless catch-all forwarder that relays any
//!   inbound request to the configured upstream API, streaming bodies in both
//!   directions and mirroring the upstream response verbatim.
//! - **Authenticated client**: an HTTP client wrapper that injects the current
//!   bearer token, classifies 401 responses as an expired credential, runs a
//!   single-flight token refresh, and replays each failed request at most once.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;

pub use error::{Error, RefreshError, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
