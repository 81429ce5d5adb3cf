use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid template name: {0}")]
    InvalidName(String),

    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a template name and a parameter bag into a page. The shipped
/// implementation is file-backed; anything heavier plugs in here.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        template: &str,
        params: &Map<String, Value>,
    ) -> Result<String, RenderError>;
}

/// Renders `<views>/<template>.html` with `{{path}}` placeholder
/// substitution. Paths resolve dot-separated through the bag; an
/// unresolved placeholder renders empty.
pub struct FileRenderer {
    views: PathBuf,
}

impl FileRenderer {
    pub fn new(views: impl Into<PathBuf>) -> Self {
        Self { views: views.into() }
    }
}

#[async_trait]
impl PageRenderer for FileRenderer {
    async fn render(
        &self,
        template: &str,
        params: &Map<String, Value>,
    ) -> Result<String, RenderError> {
        if !is_valid_template_name(template) {
            return Err(RenderError::InvalidName(template.to_string()));
        }
        let path = self.views.join(format!("{template}.html"));
        let source = match fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RenderError::NotFound(template.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(substitute(&source, params))
    }
}

/// Template names resolve inside the views directory only: a restricted
/// charset, no `..`, no absolute paths.
fn is_valid_template_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.starts_with('/')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/'))
}

fn substitute(source: &str, params: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                out.push_str(&lookup(params, after[..close].trim()));
                rest = &after[close + 2..];
            }
            None => {
                // Unterminated placeholder passes through verbatim
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn lookup(params: &Map<String, Value>, path: &str) -> String {
    let mut segments = path.split('.');
    let first = match segments.next() {
        Some(s) if !s.is_empty() => s,
        _ => return String::new(),
    };
    let mut current = match params.get(first) {
        Some(value) => value,
        None => return String::new(),
    };
    for segment in segments {
        current = match current.get(segment) {
            Some(value) => value,
            None => return String::new(),
        };
    }
    match current {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
