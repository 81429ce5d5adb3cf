use anyhow::Context;
use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use crate::cli::OutputFormat;
use crate::controllers;
use crate::routes::{self, ControllerRegistry, ValidatedRoutes};

#[derive(Subcommand)]
pub enum RoutesCommands {
    #[command(about = "Validate the route table and report everything skipped")]
    Check {
        #[arg(long, help = "Route table path (defaults to the configured lookup)")]
        file: Option<PathBuf>,
    },

    #[command(about = "List every binding the route table produces")]
    List {
        #[arg(long, help = "Route table path (defaults to the configured lookup)")]
        file: Option<PathBuf>,
    },
}

pub async fn handle(cmd: RoutesCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        RoutesCommands::Check { file } => check(file, output_format),
        RoutesCommands::List { file } => list(file, output_format),
    }
}

fn load(file: Option<PathBuf>) -> anyhow::Result<(PathBuf, ValidatedRoutes)> {
    let path = file.unwrap_or_else(routes::resolve_path);
    let table = routes::load(&path)
        .with_context(|| format!("cannot load route table from {}", path.display()))?;
    Ok((path, table.validate()))
}

fn check(file: Option<PathBuf>, output_format: OutputFormat) -> anyhow::Result<()> {
    let (path, validated) = load(file)?;

    // Only built-in handlers are visible here; entries an embedding
    // application would register show up as unbound, so they are warnings
    // rather than failures.
    let mut builtin = ControllerRegistry::new();
    controllers::register_all(&mut builtin);
    let unbound = builtin.unbound(&validated);

    match output_format {
        OutputFormat::Json => {
            let report = json!({
                "file": path.display().to_string(),
                "bindings": validated.binding_count(),
                "skipped": &validated.skipped,
                "unboundAgainstBuiltins": &unbound,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("route table: {}", path.display());
            println!("bindings: {}", validated.binding_count());
            for reason in &validated.skipped {
                println!("skipped: {reason}");
            }
            for entry in &unbound {
                println!("unbound against built-ins: {entry}");
            }
        }
    }
    Ok(())
}

fn list(file: Option<PathBuf>, output_format: OutputFormat) -> anyhow::Result<()> {
    let (path, validated) = load(file)?;

    match output_format {
        OutputFormat::Json => {
            let api: Vec<_> = validated
                .api
                .iter()
                .map(|b| {
                    json!({
                        "methods": &b.url.methods,
                        "path": &b.url.path,
                        "controller": &b.controller,
                        "action": &b.action,
                        "custom": &b.custom,
                    })
                })
                .collect();
            let website: Vec<_> = validated
                .website
                .iter()
                .map(|b| {
                    json!({
                        "methods": &b.url.methods,
                        "path": &b.url.path,
                        "controller": &b.controller,
                        "template": &b.template,
                        "custom": &b.custom,
                    })
                })
                .collect();
            let redirect: Vec<_> = validated
                .redirect
                .iter()
                .map(|b| json!({ "methods": &b.url.methods, "path": &b.url.path, "target": &b.target }))
                .collect();
            let report = json!({
                "file": path.display().to_string(),
                "api": api,
                "website": website,
                "redirect": redirect,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            for b in &validated.api {
                let handler = match (&b.custom, &b.action) {
                    (Some(custom), _) => format!("{custom} (custom)"),
                    (None, Some(action)) => action.clone(),
                    (None, None) => "-".to_string(),
                };
                println!("{} {} -> {}#{}", b.url.methods.join(","), b.url.path, b.controller, handler);
            }
            for b in &validated.website {
                match &b.custom {
                    Some(custom) => println!(
                        "{} {} -> {}#{} (custom)",
                        b.url.methods.join(","),
                        b.url.path,
                        b.controller,
                        custom
                    ),
                    None => println!("{} {} -> render {}", b.url.methods.join(","), b.url.path, b.template),
                }
            }
            for b in &validated.redirect {
                println!("{} {} -> redirect {}", b.url.methods.join(","), b.url.path, b.target);
            }
        }
    }
    Ok(())
}
