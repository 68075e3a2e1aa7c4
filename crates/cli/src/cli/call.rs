//! `mage call` — one remote call, result on stdout.

use std::sync::Arc;

use mage_domain::config::MageConfig;
use mage_rpc::MageClientBuilder;
use serde_json::Value;

/// Parse the optional params document. Absent params are sent as none.
pub fn parse_params(raw: Option<&str>) -> anyhow::Result<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => {
            serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("params are not valid JSON: {e}"))
        }
    }
}

pub async fn run(
    config: &MageConfig,
    method: String,
    params: Option<String>,
    session: Option<String>,
) -> anyhow::Result<()> {
    let params = parse_params(params.as_deref())?;

    let mut builder = MageClientBuilder::from_config(config);
    if let Some(key) = session {
        builder = builder.session_key(key);
    }
    let client = builder.build()?;

    // Inline events go to stderr so stdout stays a single JSON document.
    client.add_observer(Arc::new(|name: &str, payload: Option<&Value>| match payload {
        Some(p) => eprintln!("event {name} {p}"),
        None => eprintln!("event {name}"),
    }));

    tracing::debug!(method = %method, url = %client.url(), "calling");
    let result = client.call(&method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
