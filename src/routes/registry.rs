use axum::response::Response;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{resolve_controller_key, ValidatedRoutes};
use crate::context::RequestContext;
use crate::error::ApiError;

pub type ActionFuture = Pin<Box<dyn Future<Output = Result<Value, ApiError>> + Send>>;
pub type ActionFn = Arc<dyn Fn(RequestContext) -> ActionFuture + Send + Sync>;

pub type CustomFuture = Pin<Box<dyn Future<Output = Response> + Send>>;
pub type CustomFn = Arc<dyn Fn(RequestContext) -> CustomFuture + Send + Sync>;

/// Startup-time handler table: every handler a route can name is
/// registered here before the route table is read, so a table entry naming
/// something unknown fails the boot instead of a request.
///
/// Actions run through the envelope; customs answer with a raw `Response`.
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    actions: HashMap<(String, String), ActionFn>,
    customs: HashMap<(String, String), CustomFn>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action under a controller key. Non-absolute keys
    /// resolve under the controllers root, same as the route table side.
    pub fn action<F, Fut>(&mut self, controller: &str, name: &str, handler: F) -> &mut Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        self.actions.insert(
            (resolve_controller_key(controller), name.to_string()),
            Arc::new(move |ctx| Box::pin(handler(ctx)) as ActionFuture),
        );
        self
    }

    pub fn custom<F, Fut>(&mut self, controller: &str, name: &str, handler: F) -> &mut Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.customs.insert(
            (resolve_controller_key(controller), name.to_string()),
            Arc::new(move |ctx| Box::pin(handler(ctx)) as CustomFuture),
        );
        self
    }

    /// Lookup by resolved controller key.
    pub fn find_action(&self, controller: &str, name: &str) -> Option<ActionFn> {
        self.actions.get(&(controller.to_string(), name.to_string())).cloned()
    }

    pub fn find_custom(&self, controller: &str, name: &str) -> Option<CustomFn> {
        self.customs.get(&(controller.to_string(), name.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.actions.len() + self.customs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.customs.is_empty()
    }

    /// Registered handlers as `controller#name` strings, sorted.
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .actions
            .keys()
            .map(|(c, n)| format!("{c}#{n}"))
            .chain(self.customs.keys().map(|(c, n)| format!("{c}#{n} (custom)")))
            .collect();
        names.sort();
        names
    }

    /// Every validated binding that doesn't resolve to a registered
    /// handler. An api entry resolves through its custom first, its action
    /// second; a website entry's named custom must exist outright.
    pub fn unbound(&self, routes: &ValidatedRoutes) -> Vec<String> {
        let mut missing = Vec::new();

        for binding in &routes.api {
            let custom_ok = binding
                .custom
                .as_ref()
                .is_some_and(|n| self.find_custom(&binding.controller, n).is_some());
            if custom_ok {
                continue;
            }
            let action_ok = binding
                .action
                .as_ref()
                .is_some_and(|n| self.find_action(&binding.controller, n).is_some());
            if action_ok {
                continue;
            }
            missing.push(format!(
                "api {} in {}: no registered handler (action {:?}, custom {:?})",
                binding.url.path, binding.controller, binding.action, binding.custom
            ));
        }

        for binding in &routes.website {
            if let Some(custom) = &binding.custom {
                if self.find_custom(&binding.controller, custom).is_none() {
                    missing.push(format!(
                        "website {} in {}: custom {:?} not registered",
                        binding.url.path, binding.controller, custom
                    ));
                }
            }
        }

        missing
    }
}
