use clap::Parser;
use tracing_subscriber::EnvFilter;

use mage_cli::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Call {
            method,
            params,
            session,
        } => {
            init_tracing(cli.json_logs);
            let (config, _) = mage_cli::cli::load_config()?;
            mage_cli::cli::call::run(&config, method, params, session).await
        }
        Command::Listen { transport, session } => {
            init_tracing(cli.json_logs);
            let (config, _) = mage_cli::cli::load_config()?;
            mage_cli::cli::listen::run(&config, transport, session).await
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = mage_cli::cli::load_config()?;
            let valid = mage_cli::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _config_path) = mage_cli::cli::load_config()?;
            mage_cli::cli::config::show(&config)
        }
        Command::Version => {
            println!("mage {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize stderr tracing, JSON or compact.
///
/// `RUST_LOG` overrides the default `info,mage_rpc=debug` filter.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mage_rpc=debug"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
