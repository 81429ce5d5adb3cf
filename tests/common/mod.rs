// Shared plumbing for the integration suites: an in-process router driven
// through tower's oneshot, so no port, binary, or database is needed.
#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use plinth_api::config::AppConfig;
use plinth_api::database::ConnectionRegistry;
use plinth_api::render::FileRenderer;
use plinth_api::routes::{self, AppState, ControllerRegistry};
use plinth_api::supervisor::{fault_channel, FaultMonitor};

pub fn state(controllers: ControllerRegistry, views: &str) -> (AppState, FaultMonitor) {
    let (faults, monitor) = fault_channel();
    let state = AppState {
        registry: Arc::new(ConnectionRegistry::new(AppConfig::development().database)),
        controllers: Arc::new(controllers),
        renderer: Arc::new(FileRenderer::new(views)),
        faults,
    };
    (state, monitor)
}

pub fn build(state: AppState, table_yaml: &str) -> Router {
    let table = routes::parse(table_yaml).expect("route table parses");
    routes::build_router(state, &table.validate()).expect("route table binds")
}

pub fn router(controllers: ControllerRegistry, table_yaml: &str) -> Router {
    let (state, _monitor) = state(controllers, "views");
    build(state, table_yaml)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("router is infallible")
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

pub async fn read_text(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

pub async fn get_json(app: &Router, path_and_query: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(path_and_query)
        .body(Body::empty())
        .expect("request");
    read_json(send(app, request).await).await
}

pub async fn get_json_with_bearer(app: &Router, path: &str, token: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(path)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request");
    read_json(send(app, request).await).await
}

pub async fn post_json(app: &Router, path_and_query: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path_and_query)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    read_json(send(app, request).await).await
}
