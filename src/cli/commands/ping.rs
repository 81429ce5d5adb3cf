use anyhow::Context;
use serde_json::{json, Value};
use std::time::Instant;

use crate::cli::OutputFormat;
use crate::config;

/// GETs the health action of a running server and reports the verdict.
pub async fn handle(url: Option<String>, output_format: OutputFormat) -> anyhow::Result<()> {
    let server = &config::config().server;
    let base = url.unwrap_or_else(|| {
        // The bind address is not a dialable address.
        let host = if server.host == "0.0.0.0" { "localhost" } else { server.host.as_str() };
        format!("http://{}:{}", host, server.port)
    });
    let prefix = server.api_prefix.trim_end_matches('/');
    let target = format!("{}{}/system/health", base.trim_end_matches('/'), prefix);

    let started = Instant::now();
    let response = reqwest::get(&target).await.with_context(|| format!("cannot reach {target}"))?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let elapsed = started.elapsed().as_millis();

    match output_format {
        OutputFormat::Json => {
            let report = json!({
                "url": target,
                "status": status.as_u16(),
                "elapsedMs": elapsed,
                "body": body,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("{target} -> {status} ({elapsed} ms)");
            if let Some(data) = body.pointer("/data") {
                println!("{data}");
            }
        }
    }
    Ok(())
}
