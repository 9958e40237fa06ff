//! Configuration management for the Tickvault server.
//!
//! Settings are layered from, in increasing precedence:
//! 1. Defaults embedded in the binary (`config/default.toml`)
//! 2. System-wide configuration file (`/etc/tickvault/config.toml`)
//! 3. A file passed with `--config`
//! 4. Environment variables prefixed with `TICKVAULT_`, nested keys joined
//!    with `__` (for example `TICKVAULT_SERVER__PORT=9000`)
//! 5. Command-line arguments

use clap::Parser;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const DEFAULT_CONFIG_PATH: &str = "/etc/tickvault/config.toml";

/// Command-line arguments.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to bind the UDP socket to
    #[arg(long, env = "TICKVAULT_SERVER_HOST")]
    pub host: Option<String>,

    /// UDP port to listen on
    #[arg(long, env = "TICKVAULT_SERVER_PORT")]
    pub port: Option<u16>,

    /// Largest datagram accepted, in bytes
    #[arg(long)]
    pub recv_buffer_size: Option<usize>,

    /// Largest reply sent, in bytes
    #[arg(long)]
    pub max_datagram_size: Option<usize>,

    /// Default log filter, e.g. "info" or "tickvault=debug"
    #[arg(long, env = "TICKVAULT_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Socket and datagram limits.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub recv_buffer_size: usize,
    pub max_datagram_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                recv_buffer_size: 65535,
                max_datagram_size: 65507,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Settings {
    /// Loads configuration from all available sources.
    pub fn new(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if std::fs::metadata(DEFAULT_CONFIG_PATH).map(|m| m.is_file()).unwrap_or(false) {
            builder = builder.add_source(File::from(PathBuf::from(DEFAULT_CONFIG_PATH)));
        }

        if let Some(ref path) = cli.config {
            builder = builder.add_source(File::from(path.clone()));
        }

        builder = builder.add_source(
            Environment::with_prefix("TICKVAULT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(ref host) = cli.host {
            builder = builder.set_override("server.host", host.as_str())?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port as i64)?;
        }
        if let Some(size) = cli.recv_buffer_size {
            builder = builder.set_override("server.recv_buffer_size", size as u64)?;
        }
        if let Some(size) = cli.max_datagram_size {
            builder = builder.set_override("server.max_datagram_size", size as u64)?;
        }
        if let Some(ref level) = cli.log_level {
            builder = builder.set_override("logging.level", level.as_str())?;
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.bind_address(), "127.0.0.1:8080");
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_embedded_defaults_match() {
        let settings = Settings::new(&CliArgs::default()).unwrap();
        assert_eq!(settings.server.max_datagram_size, 65507);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = CliArgs::parse_from(["tickvault", "--port", "9999", "--max-datagram-size", "512"]);
        let settings = Settings::new(&cli).unwrap();
        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.server.max_datagram_size, 512);
    }

    #[test]
    fn test_environment_override() {
        std::env::set_var("TICKVAULT_SERVER__RECV_BUFFER_SIZE", "2048");
        let settings = Settings::new(&CliArgs::default()).unwrap();
        assert_eq!(settings.server.recv_buffer_size, 2048);
        std::env::remove_var("TICKVAULT_SERVER__RECV_BUFFER_SIZE");
    }
}
