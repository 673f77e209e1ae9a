//! Command-line interface.
//!
//! # Example
//!
//! ```bash
//! ferrule-json                       # stdin/stdout
//! ferrule-json --tcp --port 2087     # first client on 127.0.0.1:2087
//! ferrule-json --config server.yaml --log-level debug
//! ferrule-json --write-config server.yaml   # dump the defaults and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use ferrule::ServerConfig;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 2087;

/// ferrule-json - a JSON language server
///
/// Validates JSON documents as they are edited and offers bracket and
/// quote completions. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "ferrule-json")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Serve over stdin/stdout (the default)
    #[arg(long, conflicts_with = "tcp")]
    pub stdio: bool,

    /// Listen on TCP and serve the first client that connects
    #[arg(long)]
    pub tcp: bool,

    /// Address to bind in TCP mode
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind in TCP mode
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, overriding RUST_LOG and the configuration file
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Write the effective configuration to FILE and exit without serving
    #[arg(long, value_name = "FILE")]
    pub write_config: Option<PathBuf>,
}

/// How the server talks to its client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// stdin/stdout
    Stdio,
    /// A single TCP connection
    Tcp {
        /// Address to bind
        host: String,
        /// Port to bind
        port: u16,
    },
}

impl Cli {
    /// Parse arguments from an iterator
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// The selected transport.
    #[must_use]
    pub fn transport(&self) -> Transport {
        if self.tcp {
            Transport::Tcp {
                host: self.host.clone(),
                port: self.port,
            }
        } else {
            Transport::Stdio
        }
    }

    /// Load `--config`, or build the default configuration.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not validate.
    pub async fn load_config(&self) -> ferrule::Result<ServerConfig> {
        match &self.config {
            Some(path) => ServerConfig::load(path).await,
            None => Ok(ServerConfig::new(
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
            )),
        }
    }

    /// Save `config` to the `--write-config` path, if one was given, and
    /// return that path.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub async fn write_config(&self, config: &ServerConfig) -> ferrule::Result<Option<PathBuf>> {
        let Some(path) = &self.write_config else {
            return Ok(None);
        };
        config.save(path).await?;
        Ok(Some(path.clone()))
    }
}
