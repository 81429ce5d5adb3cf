use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::config;

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Print the effective configuration with secrets redacted")]
    Show,
}

pub async fn handle(cmd: ConfigCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => show(output_format),
    }
}

fn show(output_format: OutputFormat) -> anyhow::Result<()> {
    let value = redacted()?;
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
        OutputFormat::Text => print!("{}", serde_yaml::to_string(&value)?),
    }
    Ok(())
}

/// Effective configuration as a value tree, with secret fields blanked so
/// the output is safe to paste into a bug report.
fn redacted() -> anyhow::Result<Value> {
    let mut value = serde_json::to_value(config::config())?;
    for pointer in ["/database/password", "/security/jwt_secret"] {
        if let Some(secret) = value.pointer_mut(pointer) {
            if secret.as_str().is_some_and(|s| !s.is_empty()) {
                *secret = json!("<redacted>");
            }
        }
    }
    Ok(value)
}
