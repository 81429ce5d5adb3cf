use axum::{
    extract::{Path, Query},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{on, MethodFilter, MethodRouter},
    Extension, Json, Router,
};
use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use super::registry::{ActionFn, ControllerRegistry, CustomFn};
use super::ValidatedRoutes;
use crate::config;
use crate::context::RequestContext;
use crate::database::ConnectionRegistry;
use crate::error::{ApiError, SystemError};
use crate::render::PageRenderer;
use crate::response;
use crate::session::{self, Principal};
use crate::supervisor::FaultHandle;

/// Everything a mounted route needs at request time.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub controllers: Arc<ControllerRegistry>,
    pub renderer: Arc<dyn PageRenderer>,
    pub faults: FaultHandle,
}

/// Builds the full router from a validated route table. Every binding is
/// resolved against the controller registry here, before the server takes
/// traffic; anything unresolvable (or mounted twice) is collected and
/// returned as one configuration error.
pub fn build_router(state: AppState, routes: &ValidatedRoutes) -> Result<Router, ApiError> {
    let server = &config::config().server;
    let mut router = Router::new();
    let mut bound: HashSet<(String, String)> = HashSet::new();
    let mut problems: Vec<String> = Vec::new();

    for binding in &routes.api {
        let path = prefix_join(&server.api_prefix, &binding.url.path);
        let Some(filter) = claim(&mut bound, &mut problems, &path, &binding.url.methods) else {
            continue;
        };
        // A registered custom wins over the action; an entry naming neither
        // successfully is a configuration error, not a 404 at request time.
        if let Some(name) = &binding.custom {
            if let Some(handler) = state.controllers.find_custom(&binding.controller, name) {
                let route =
                    custom_route(filter, state.clone(), binding.controller.clone(), name.clone(), handler);
                router = router.route(&path, route);
                continue;
            }
        }
        if let Some(name) = &binding.action {
            if let Some(handler) = state.controllers.find_action(&binding.controller, name) {
                let route =
                    action_route(filter, state.clone(), binding.controller.clone(), name.clone(), handler);
                router = router.route(&path, route);
                continue;
            }
        }
        problems.push(format!(
            "api route {}: no registered handler in {} (action {:?}, custom {:?})",
            path, binding.controller, binding.action, binding.custom
        ));
    }

    for binding in &routes.website {
        let path = prefix_join(&server.web_prefix, &binding.url.path);
        let Some(filter) = claim(&mut bound, &mut problems, &path, &binding.url.methods) else {
            continue;
        };
        if let Some(name) = &binding.custom {
            match state.controllers.find_custom(&binding.controller, name) {
                Some(handler) => {
                    let route = custom_route(
                        filter,
                        state.clone(),
                        binding.controller.clone(),
                        name.clone(),
                        handler,
                    );
                    router = router.route(&path, route);
                }
                None => problems.push(format!(
                    "website route {}: custom {:?} not registered in {}",
                    path, name, binding.controller
                )),
            }
            continue;
        }
        let route = template_route(filter, state.clone(), binding.template.clone(), binding.parameter.clone());
        router = router.route(&path, route);
    }

    for binding in &routes.redirect {
        let path = prefix_join(&server.web_prefix, &binding.url.path);
        let Some(filter) = claim(&mut bound, &mut problems, &path, &binding.url.methods) else {
            continue;
        };
        router = router.route(&path, redirect_route(filter, binding.target.clone()));
    }

    if !problems.is_empty() {
        return Err(SystemError::Config(format!("route table: {}", problems.join("; "))).into());
    }

    Ok(router
        .fallback(not_found)
        .layer(middleware::from_fn(session::session_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http()))
}

/// Claims every (path, method) pair for one route and folds the methods
/// into a single filter. A pair claimed twice is recorded as a problem and
/// the route stays unmounted; axum panics on overlapping method routes,
/// and a panic is not the report we want for a config mistake.
fn claim(
    bound: &mut HashSet<(String, String)>,
    problems: &mut Vec<String>,
    path: &str,
    methods: &[String],
) -> Option<MethodFilter> {
    let mut filter: Option<MethodFilter> = None;
    for method in methods {
        if !bound.insert((path.to_string(), method.clone())) {
            problems.push(format!("duplicate route: {method} {path}"));
            return None;
        }
        match method_filter(method) {
            Some(next) => {
                filter = Some(match filter {
                    Some(folded) => folded.or(next),
                    None => next,
                })
            }
            None => {
                problems.push(format!("unsupported method {method} for {path}"));
                return None;
            }
        }
    }
    filter
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    match method {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "DELETE" => Some(MethodFilter::DELETE),
        "PATCH" => Some(MethodFilter::PATCH),
        "HEAD" => Some(MethodFilter::HEAD),
        "OPTIONS" => Some(MethodFilter::OPTIONS),
        _ => None,
    }
}

fn prefix_join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else if path == "/" {
        prefix.to_string()
    } else {
        format!("{prefix}{path}")
    }
}

/// Assembles the request context from the extractors. Extraction never
/// rejects: a malformed body or query string simply contributes nothing
/// to the parameter bag.
fn bind_context(
    state: &AppState,
    path: Option<Path<HashMap<String, String>>>,
    query: Option<Query<HashMap<String, String>>>,
    principal: Option<Extension<Principal>>,
    body: Option<Json<Value>>,
) -> RequestContext {
    let query_bag: Map<String, Value> = query
        .map(|Query(map)| map.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
        .unwrap_or_default();
    let body_bag = match body {
        Some(Json(Value::Object(map))) => map,
        _ => Map::new(),
    };
    let path_bag: Map<String, Value> = path
        .map(|Path(map)| map.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
        .unwrap_or_default();
    RequestContext::bind(
        state.registry.clone(),
        query_bag,
        body_bag,
        path_bag,
        principal.map(|Extension(principal)| principal),
    )
}

fn action_route(
    filter: MethodFilter,
    state: AppState,
    controller: String,
    action: String,
    handler: ActionFn,
) -> MethodRouter {
    on(
        filter,
        move |path: Option<Path<HashMap<String, String>>>,
              query: Option<Query<HashMap<String, String>>>,
              principal: Option<Extension<Principal>>,
              body: Option<Json<Value>>| {
            let state = state.clone();
            let controller = controller.clone();
            let action = action.clone();
            let handler = handler.clone();
            async move {
                let ctx = bind_context(&state, path, query, principal, body);
                let uid = ctx.uid().unwrap_or("-").to_string();
                info!(target: "operation", "begin: {}#{} (uid: {})", controller, action, uid);
                let outcome = AssertUnwindSafe(handler(ctx)).catch_unwind().await;
                let reply = match outcome {
                    Ok(result) => response::send(result),
                    Err(payload) => {
                        state.faults.report(format!(
                            "panic in {}#{}: {}",
                            controller,
                            action,
                            panic_message(payload.as_ref())
                        ));
                        ApiError::internal_server_error("Internal Server Error").into_response()
                    }
                };
                info!(target: "operation", "finish: {}#{} (uid: {})", controller, action, uid);
                reply
            }
        },
    )
}

fn custom_route(
    filter: MethodFilter,
    state: AppState,
    controller: String,
    name: String,
    handler: CustomFn,
) -> MethodRouter {
    on(
        filter,
        move |path: Option<Path<HashMap<String, String>>>,
              query: Option<Query<HashMap<String, String>>>,
              principal: Option<Extension<Principal>>,
              body: Option<Json<Value>>| {
            let state = state.clone();
            let controller = controller.clone();
            let name = name.clone();
            let handler = handler.clone();
            async move {
                let ctx = bind_context(&state, path, query, principal, body);
                let uid = ctx.uid().unwrap_or("-").to_string();
                info!(target: "operation", "begin: {}#{} (uid: {})", controller, name, uid);
                let reply = match AssertUnwindSafe(handler(ctx)).catch_unwind().await {
                    Ok(response) => response,
                    Err(payload) => {
                        state.faults.report(format!(
                            "panic in {}#{}: {}",
                            controller,
                            name,
                            panic_message(payload.as_ref())
                        ));
                        ApiError::internal_server_error("Internal Server Error").into_response()
                    }
                };
                info!(target: "operation", "finish: {}#{} (uid: {})", controller, name, uid);
                reply
            }
        },
    )
}

fn template_route(
    filter: MethodFilter,
    state: AppState,
    template: String,
    parameter: Map<String, Value>,
) -> MethodRouter {
    on(
        filter,
        move |path: Option<Path<HashMap<String, String>>>,
              query: Option<Query<HashMap<String, String>>>,
              principal: Option<Extension<Principal>>,
              body: Option<Json<Value>>| {
            let state = state.clone();
            let template = template.clone();
            let parameter = parameter.clone();
            async move {
                let ctx = bind_context(&state, path, query, principal, body);
                let bag = website_bag(&ctx, &parameter);
                match AssertUnwindSafe(state.renderer.render(&template, &bag)).catch_unwind().await {
                    Ok(Ok(page)) => Html(page).into_response(),
                    Ok(Err(error)) => {
                        warn!(target: "app", "render failed for {}: {}", template, error);
                        ApiError::internal_server_error("Internal Server Error").into_response()
                    }
                    Err(payload) => {
                        state.faults.report(format!(
                            "panic rendering {}: {}",
                            template,
                            panic_message(payload.as_ref())
                        ));
                        ApiError::internal_server_error("Internal Server Error").into_response()
                    }
                }
            }
        },
    )
}

fn redirect_route(filter: MethodFilter, target: String) -> MethodRouter {
    on(filter, move || {
        let target = target.clone();
        async move { Redirect::to(&target).into_response() }
    })
}

async fn not_found() -> Response {
    ApiError::not_found("Not Found").into_response()
}

/// The bag handed to a template: request parameters under `param`, the
/// authenticated principal under `user`, application metadata under
/// `info`, and the entry's static parameters merged at the top level.
fn website_bag(ctx: &RequestContext, statics: &Map<String, Value>) -> Map<String, Value> {
    let mut bag = Map::new();
    bag.insert("param".to_string(), Value::Object(ctx.params().clone()));
    bag.insert(
        "user".to_string(),
        ctx.user().map(|principal| json!(principal)).unwrap_or(Value::Null),
    );
    bag.insert("info".to_string(), application_info());
    for (key, value) in statics {
        bag.insert(key.clone(), value.clone());
    }
    bag
}

pub fn application_info() -> Value {
    let server = &config::config().server;
    json!({
        "application": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "host": format!("{}:{}", server.host, server.port),
        "time": Utc::now().to_rfc3339(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
