use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::error;

use crate::config;
use crate::database::ConnectionRegistry;
use crate::error::ApiError;
use crate::session::Principal;

/// Per-request state handed to controllers: the merged parameter bag, the
/// optional session principal, and the connection registry.
///
/// Identity precedence is fixed: an explicit override set on the context
/// wins, then the session principal, then nothing (`lang` falls back to the
/// configured default). Parameters never impersonate anyone.
#[derive(Clone)]
pub struct RequestContext {
    registry: Arc<ConnectionRegistry>,
    params: Map<String, Value>,
    principal: Option<Principal>,
    uid: Option<String>,
    code: Option<String>,
    lang: Option<String>,
}

impl RequestContext {
    /// Context for an HTTP request. The bag is built by merging query,
    /// body, then path parameters; later layers overwrite earlier ones.
    pub fn bind(
        registry: Arc<ConnectionRegistry>,
        query: Map<String, Value>,
        body: Map<String, Value>,
        path: Map<String, Value>,
        principal: Option<Principal>,
    ) -> Self {
        let mut params = query;
        for (key, value) in body {
            params.insert(key, value);
        }
        for (key, value) in path {
            params.insert(key, value);
        }
        Self {
            registry,
            params,
            principal,
            uid: None,
            code: None,
            lang: None,
        }
    }

    /// Context for system-initiated work, with the identity given outright.
    pub fn create(
        registry: Arc<ConnectionRegistry>,
        uid: Option<&str>,
        code: Option<&str>,
        lang: Option<&str>,
    ) -> Self {
        Self {
            registry,
            params: Map::new(),
            principal: None,
            uid: uid.map(str::to_string),
            code: code.map(str::to_string),
            lang: lang.map(str::to_string),
        }
    }

    /// Same identity and tenant, fresh parameter bag seeded from `extra`.
    pub fn copy(&self, extra: Map<String, Value>) -> Self {
        Self {
            registry: self.registry.clone(),
            params: extra,
            principal: self.principal.clone(),
            uid: self.uid.clone(),
            code: self.code.clone(),
            lang: self.lang.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn user(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid
            .as_deref()
            .or_else(|| self.principal.as_ref().map(|p| p.uid.as_str()))
    }

    pub fn code(&self) -> Option<&str> {
        self.code
            .as_deref()
            .or_else(|| self.principal.as_ref().and_then(|p| p.code.as_deref()))
    }

    pub fn lang(&self) -> &str {
        self.lang
            .as_deref()
            .or_else(|| self.principal.as_ref().and_then(|p| p.lang.as_deref()))
            .unwrap_or(&config::config().server.default_lang)
    }

    pub fn set_uid(&mut self, uid: impl Into<String>) {
        self.uid = Some(uid.into());
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = Some(code.into());
    }

    pub fn set_lang(&mut self, lang: impl Into<String>) {
        self.lang = Some(lang.into());
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn add_param(&mut self, name: impl Into<String>, value: Value) {
        self.params.insert(name.into(), value);
    }

    pub fn remove_param(&mut self, name: &str) -> Option<Value> {
        self.params.remove(name)
    }

    pub fn extend_params(&mut self, extra: Map<String, Value>) {
        for (key, value) in extra {
            self.params.insert(key, value);
        }
    }

    /// String view of a parameter. Scalars stringify; structured values
    /// don't.
    pub fn param_str(&self, name: &str) -> Option<String> {
        match self.param(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Integer view of a parameter; numeric strings coerce.
    pub fn param_i64(&self, name: &str) -> Option<i64> {
        match self.param(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Failure funnel: logs the error against the acting identity and hands
    /// it back for the envelope.
    pub fn raise(&self, err: ApiError) -> ApiError {
        error!(target: "app", "{} (uid: {})", err, self.uid().unwrap_or("-"));
        err
    }
}
