//! `mage listen` — print message stream events until interrupted.

use std::sync::Arc;

use mage_domain::config::{MageConfig, PollTransport};
use mage_rpc::MageClientBuilder;
use serde_json::{json, Value};

/// One output line for a received event.
pub fn event_line(name: &str, payload: Option<&Value>) -> String {
    json!({ "event": name, "payload": payload }).to_string()
}

pub async fn run(
    config: &MageConfig,
    transport: Option<String>,
    session: Option<String>,
) -> anyhow::Result<()> {
    let transport = match transport {
        Some(raw) => raw.parse::<PollTransport>()?,
        None => config.polling.transport,
    };

    let mut builder = MageClientBuilder::from_config(config);
    if let Some(key) = session {
        builder = builder.session_key(key);
    }
    let client = builder.build()?;

    client.add_observer(Arc::new(|name: &str, payload: Option<&Value>| {
        println!("{}", event_line(name, payload));
    }));

    client.start_polling(transport)?;
    tracing::info!(%transport, url = %client.url(), "listening for events, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("received SIGINT, stopping poller");
    client.stop_polling().await;
    Ok(())
}
