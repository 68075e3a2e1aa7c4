pub mod call;
pub mod config;
pub mod listen;

use std::path::Path;

use clap::{Parser, Subcommand};
use mage_domain::config::MageConfig;

/// mage — talk to a MAGE application server.
#[derive(Debug, Parser)]
#[command(name = "mage", version, about)]
pub struct Cli {
    /// Emit logs as JSON lines instead of compact text.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Call a remote procedure and print its result.
    Call {
        /// Method name, e.g. `user.login`.
        method: String,
        /// Parameters as a JSON document (object or array).
        params: Option<String>,
        /// Session key sent as `X-MAGE-SESSION`.
        #[arg(long)]
        session: Option<String>,
    },
    /// Poll the message stream and print events as JSON lines until Ctrl-C.
    Listen {
        /// `longpolling` or `shortpolling` (defaults to the configured one).
        #[arg(long)]
        transport: Option<String>,
        /// Session key to poll for (defaults to the configured one).
        #[arg(long)]
        session: Option<String>,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `MAGE_CONFIG` (or
/// `mage.toml` by default). Returns the parsed [`MageConfig`] and the
/// path that was used.
pub fn load_config() -> anyhow::Result<(MageConfig, String)> {
    let config_path = std::env::var("MAGE_CONFIG").unwrap_or_else(|_| "mage.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

/// Parse `path` if it exists, otherwise return defaults.
pub fn load_config_from(path: impl AsRef<Path>) -> anyhow::Result<MageConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(MageConfig::default());
    }
    MageConfig::load(path).map_err(|e| anyhow::anyhow!("loading {}: {e}", path.display()))
}
