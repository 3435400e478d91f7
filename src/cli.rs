//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// BFF gateway for the board app - authenticated reverse proxy
#[derive(Parser, Debug)]
#[command(name = "board-bff")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "BOARD_BFF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "BOARD_BFF_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "BOARD_BFF_HOST")]
    pub host: Option<String>,

    /// Upstream base URL to forward to
    #[arg(long, env = "BOARD_BFF_UPSTREAM")]
    pub upstream: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "BOARD_BFF_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "BOARD_BFF_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::parse_from([
            "board-bff",
            "--port",
            "9999",
            "--upstream",
            "http://api:8080",
        ]);
        assert_eq!(cli.port, Some(9999));
        assert_eq!(cli.upstream.as_deref(), Some("http://api:8080"));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
