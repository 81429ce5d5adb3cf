pub mod dispatch;
pub mod registry;

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub use dispatch::{build_router, AppState};
pub use registry::ControllerRegistry;

/// Resolution root for controller keys that don't start with `/`.
pub const CONTROLLERS_ROOT: &str = "/controllers/";

/// Route table location: `PLINTH_ROUTES` wins, then `config/routes.yaml`,
/// then `config/routes.json`.
pub const ROUTES_ENV: &str = "PLINTH_ROUTES";
pub const DEFAULT_YAML_PATH: &str = "config/routes.yaml";
pub const DEFAULT_JSON_PATH: &str = "config/routes.json";

const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Route table not found: {0}")]
    Missing(String),

    #[error("Route table unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Route table parse failed: {0}")]
    Parse(String),

    #[error("Invalid route url: {0}")]
    InvalidUrl(String),
}

/// The three route sections as they come off disk. Entry fields are all
/// optional so one malformed entry never sinks the parse; validation sorts
/// the entries out afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteTable {
    #[serde(default)]
    pub api: BTreeMap<String, Vec<ApiEntry>>,
    #[serde(default)]
    pub website: BTreeMap<String, Vec<WebsiteEntry>>,
    #[serde(default)]
    pub redirect: Vec<RedirectEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub custom: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebsiteEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub custom: Option<String>,
    #[serde(default)]
    pub parameter: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedirectEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

/// A parsed `"METHOD /path"` url. Several methods may share one path
/// (`"get,post /x"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUrl {
    pub methods: Vec<String>,
    pub path: String,
}

/// Splits a route url on space, `#`, and comma: every token before the
/// path is an HTTP method.
pub fn parse_url(raw: &str) -> Result<RouteUrl, RouteError> {
    let tokens: Vec<&str> = raw
        .split(|c| c == ' ' || c == '#' || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    let (path, methods) = match tokens.split_last() {
        Some((path, methods)) => (*path, methods),
        None => return Err(RouteError::InvalidUrl(format!("empty url: {raw:?}"))),
    };
    if !path.starts_with('/') {
        return Err(RouteError::InvalidUrl(format!("no path in {raw:?}")));
    }
    if methods.is_empty() {
        return Err(RouteError::InvalidUrl(format!("no method in {raw:?}")));
    }

    let mut parsed: Vec<String> = Vec::with_capacity(methods.len());
    for method in methods {
        let upper = method.to_ascii_uppercase();
        if !METHODS.contains(&upper.as_str()) {
            return Err(RouteError::InvalidUrl(format!("unknown method {method:?} in {raw:?}")));
        }
        if !parsed.contains(&upper) {
            parsed.push(upper);
        }
    }
    Ok(RouteUrl { methods: parsed, path: path.to_string() })
}

/// Controller keys starting with `/` are taken verbatim; anything else
/// lives under the controllers root.
pub fn resolve_controller_key(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("{CONTROLLERS_ROOT}{key}")
    }
}

#[derive(Debug, Clone)]
pub struct ApiBinding {
    pub controller: String,
    pub url: RouteUrl,
    pub action: Option<String>,
    pub custom: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebsiteBinding {
    pub controller: String,
    pub url: RouteUrl,
    pub template: String,
    pub custom: Option<String>,
    pub parameter: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct RedirectBinding {
    pub url: RouteUrl,
    pub target: String,
}

/// The table after per-entry validation: well-formed bindings with resolved
/// controller keys, plus the reasons for everything that was dropped.
#[derive(Debug, Clone, Default)]
pub struct ValidatedRoutes {
    pub api: Vec<ApiBinding>,
    pub website: Vec<WebsiteBinding>,
    pub redirect: Vec<RedirectBinding>,
    pub skipped: Vec<String>,
}

impl ValidatedRoutes {
    pub fn binding_count(&self) -> usize {
        self.api.len() + self.website.len() + self.redirect.len()
    }
}

impl RouteTable {
    /// Per-entry validation: a malformed entry is logged and skipped, the
    /// rest of the table survives. Whether the named handlers exist is the
    /// dispatcher's startup check, not this one.
    pub fn validate(&self) -> ValidatedRoutes {
        let mut out = ValidatedRoutes::default();

        for (key, entries) in &self.api {
            let controller = resolve_controller_key(key);
            for entry in entries {
                let url = match required_url(&entry.url, "api", key, &mut out.skipped) {
                    Some(url) => url,
                    None => continue,
                };
                if entry.action.is_none() && entry.custom.is_none() {
                    skip(&mut out.skipped, format!("api entry {key} {}: no action or custom", url.path));
                    continue;
                }
                out.api.push(ApiBinding {
                    controller: controller.clone(),
                    url,
                    action: entry.action.clone(),
                    custom: entry.custom.clone(),
                });
            }
        }

        for (key, entries) in &self.website {
            let controller = resolve_controller_key(key);
            for entry in entries {
                let url = match required_url(&entry.url, "website", key, &mut out.skipped) {
                    Some(url) => url,
                    None => continue,
                };
                let template = match &entry.template {
                    Some(template) if !template.is_empty() => template.clone(),
                    _ => {
                        skip(&mut out.skipped, format!("website entry {key} {}: no template", url.path));
                        continue;
                    }
                };
                out.website.push(WebsiteBinding {
                    controller: controller.clone(),
                    url,
                    template,
                    custom: entry.custom.clone(),
                    parameter: entry.parameter.clone(),
                });
            }
        }

        for entry in &self.redirect {
            let url = match required_url(&entry.url, "redirect", "-", &mut out.skipped) {
                Some(url) => url,
                None => continue,
            };
            let target = match &entry.target {
                Some(target) if !target.is_empty() => target.clone(),
                _ => {
                    skip(&mut out.skipped, format!("redirect entry {}: no target", url.path));
                    continue;
                }
            };
            out.redirect.push(RedirectBinding { url, target });
        }

        out
    }
}

fn required_url(
    url: &Option<String>,
    section: &str,
    key: &str,
    skipped: &mut Vec<String>,
) -> Option<RouteUrl> {
    let raw = match url {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            skip(skipped, format!("{section} entry in {key}: no url"));
            return None;
        }
    };
    match parse_url(raw) {
        Ok(url) => Some(url),
        Err(error) => {
            skip(skipped, format!("{section} entry in {key}: {error}"));
            None
        }
    }
}

fn skip(skipped: &mut Vec<String>, reason: String) {
    warn!(target: "app", "route skipped: {}", reason);
    skipped.push(reason);
}

/// Route table location honoring the environment override and the
/// YAML-before-JSON preference.
pub fn resolve_path() -> PathBuf {
    if let Ok(custom) = std::env::var(ROUTES_ENV) {
        return PathBuf::from(custom);
    }
    let yaml = PathBuf::from(DEFAULT_YAML_PATH);
    if yaml.exists() {
        return yaml;
    }
    let json = PathBuf::from(DEFAULT_JSON_PATH);
    if json.exists() {
        return json;
    }
    yaml
}

pub fn load(path: &Path) -> Result<RouteTable, RouteError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RouteError::Missing(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    parse(&raw)
}

/// Parses table content: YAML first, JSON as the fallback. The YAML error
/// is the one reported when both fail.
pub fn parse(raw: &str) -> Result<RouteTable, RouteError> {
    match serde_yaml::from_str(raw) {
        Ok(table) => Ok(table),
        Err(yaml_error) => {
            serde_json::from_str(raw).map_err(|_| RouteError::Parse(yaml_error.to_string()))
        }
    }
}
