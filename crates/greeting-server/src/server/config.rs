use anyhow::bail;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use super::telemetry::parse_log_level;

/// Port used when `PORT` is unset or empty.
pub const DEFAULT_PORT: &str = "50051";

/// Runtime configuration for the `greeting-server` binary.
///
/// Every value can come from a CLI flag or the matching environment variable.
/// Both are read as raw strings so that an empty variable behaves exactly
/// like an unset one.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "greeting-server",
    version,
    about = "A gRPC server with request logging and graceful shutdown"
)]
pub struct CliArgs {
    /// TCP port to listen on, on all interfaces.
    ///
    /// Environment variable: `PORT` (default `50051`)
    #[arg(long, env = "PORT")]
    pub port: Option<String>,

    /// Minimum severity that gets logged: `ERROR`, `WARN`, `INFO` or `DEBUG`.
    /// Unrecognised values fall back to `INFO`.
    ///
    /// Environment variable: `LOG_LEVEL`
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl CliArgs {
    pub fn log_level(&self) -> LevelFilter {
        parse_log_level(self.log_level.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address in `:port` form, i.e. all interfaces.
    pub listen_addr: String,
    pub log_level: LevelFilter,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let log_level = args.log_level();
        let port = match args.port.as_deref() {
            None | Some("") => DEFAULT_PORT,
            Some(port) => port,
        };

        if port.parse::<u16>().is_err() {
            bail!("PORT must be a TCP port number between 0 and 65535, got {port:?}");
        }

        Ok(Self {
            listen_addr: format!(":{port}"),
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(port: Option<&str>, log_level: Option<&str>) -> CliArgs {
        CliArgs {
            port: port.map(str::to_owned),
            log_level: log_level.map(str::to_owned),
        }
    }

    #[test]
    fn unset_or_empty_port_uses_default() {
        for port in [None, Some("")] {
            let config = ServerConfig::try_from(args(port, None)).unwrap();
            assert_eq!(config.listen_addr, ":50051");
        }
    }

    #[test]
    fn explicit_port_is_used() {
        let config = ServerConfig::try_from(args(Some("0"), None)).unwrap();
        assert_eq!(config.listen_addr, ":0");

        let config = ServerConfig::try_from(args(Some("8080"), None)).unwrap();
        assert_eq!(config.listen_addr, ":8080");
    }

    #[test]
    fn invalid_port_is_rejected() {
        for port in ["http", "65536", "-1", " 80"] {
            assert!(
                ServerConfig::try_from(args(Some(port), None)).is_err(),
                "PORT={port:?} should be rejected"
            );
        }
    }

    #[test]
    fn log_level_falls_back_to_info() {
        let config = ServerConfig::try_from(args(None, Some("verbose"))).unwrap();
        assert_eq!(config.log_level, LevelFilter::INFO);

        let config = ServerConfig::try_from(args(None, Some("DEBUG"))).unwrap();
        assert_eq!(config.log_level, LevelFilter::DEBUG);
    }

    #[test]
    fn flags_parse() {
        let args =
            CliArgs::try_parse_from(["greeting-server", "--port", "7000", "--log-level", "WARN"])
                .unwrap();
        let config = ServerConfig::try_from(args).unwrap();
        assert_eq!(config.listen_addr, ":7000");
        assert_eq!(config.log_level, LevelFilter::WARN);
    }
}
