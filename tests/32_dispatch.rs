mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use serde_json::{json, Value};
use std::time::Duration;

use plinth_api::error::{ApiError, PersistenceError};
use plinth_api::response::ApiData;
use plinth_api::routes::ControllerRegistry;
use plinth_api::session::{issue_token, Principal};

const TABLE: &str = r#"
api:
  echo:
    - url: "post /echo/:name"
      action: merge
    - url: "get /whoami"
      action: whoami
    - url: "get /missing"
      action: missing
    - url: "get /forbidden"
      action: forbidden
    - url: "get /boom"
      action: boom
    - url: "get /both"
      action: plain
      custom: raw
    - url: "get /typed"
      custom: typed
redirect:
  - url: "get /old"
    target: /new
"#;

#[derive(serde::Serialize)]
struct ServiceStatus {
    name: &'static str,
    healthy: bool,
}

fn controllers() -> ControllerRegistry {
    let mut controllers = ControllerRegistry::new();
    controllers
        .action("echo", "merge", |ctx| async move {
            let mut out = ctx.params().clone();
            out.insert("callerUid".to_string(), json!(ctx.uid()));
            Ok(Value::Object(out))
        })
        .action("echo", "whoami", |ctx| async move {
            Ok(json!({ "uid": ctx.uid(), "lang": ctx.lang() }))
        })
        .action("echo", "missing", |_ctx| async { Err(PersistenceError::not_exist().into()) })
        .action("echo", "forbidden", |_ctx| async { Err(ApiError::forbidden("Forbidden")) })
        .action("echo", "boom", |_ctx| async { panic!("kaboom") })
        .action("echo", "plain", |_ctx| async { Ok(json!("plain")) })
        .custom("echo", "raw", |_ctx| async {
            ([(header::CONTENT_TYPE, "text/plain")], "raw-output").into_response()
        })
        .custom("echo", "typed", |_ctx| async {
            ApiData(ServiceStatus { name: "echo", healthy: true }).into_response()
        });
    controllers
}

#[tokio::test]
async fn success_envelope_and_param_precedence() {
    let app = common::router(controllers(), TABLE);

    let (status, body) = common::post_json(
        &app,
        "/echo/path-wins?name=query-wins&q=1",
        &json!({ "name": "body-wins", "b": 2 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apiVersion"], "1.0");
    // Path beats body beats query; untouched keys keep their source types.
    assert_eq!(body["data"]["name"], "path-wins");
    assert_eq!(body["data"]["q"], "1");
    assert_eq!(body["data"]["b"], 2);
    assert_eq!(body["data"]["callerUid"], Value::Null);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn domain_error_rides_http_200() {
    let app = common::router(controllers(), TABLE);

    let (status, body) = common::get_json(&app, "/missing").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apiVersion"], "1.0");
    assert_eq!(body["error"]["code"], "D1004");
    assert_eq!(body["error"]["message"], "Not Exist");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn transport_error_sets_http_status() {
    let app = common::router(controllers(), TABLE);

    let (status, body) = common::get_json(&app, "/forbidden").await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], 403);
    assert_eq!(body["error"]["message"], "Forbidden");
}

#[tokio::test]
async fn unknown_path_falls_back_to_envelope_404() {
    let app = common::router(controllers(), TABLE);

    let (status, body) = common::get_json(&app, "/nowhere").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["apiVersion"], "1.0");
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn redirect_route_answers_303() {
    let app = common::router(controllers(), TABLE);

    let request = Request::builder().uri("/old").body(Body::empty()).unwrap();
    let response = common::send(&app, request).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/new");
}

#[tokio::test]
async fn custom_handler_wins_over_action() {
    let app = common::router(controllers(), TABLE);

    let request = Request::builder().uri("/both").body(Body::empty()).unwrap();
    let (status, text) = common::read_text(common::send(&app, request).await).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "raw-output");
}

#[tokio::test]
async fn custom_handler_can_reuse_the_envelope() {
    let app = common::router(controllers(), TABLE);

    let (status, body) = common::get_json(&app, "/typed").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apiVersion"], "1.0");
    assert_eq!(body["data"]["name"], "echo");
    assert_eq!(body["data"]["healthy"], true);
}

#[tokio::test]
async fn panic_becomes_500_and_reaches_the_monitor() {
    let (state, mut monitor) = common::state(controllers(), "views");
    let app = common::build(state, TABLE);

    let (status, body) = common::get_json(&app, "/boom").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], 500);
    assert_eq!(body["error"]["message"], "Internal Server Error");

    let fault = tokio::time::timeout(Duration::from_secs(1), monitor.wait())
        .await
        .expect("fault report arrives")
        .expect("fault channel open");
    assert!(fault.contains("echo#boom"), "unexpected fault description: {fault}");
    assert!(fault.contains("kaboom"));
}

#[tokio::test]
async fn bearer_token_feeds_the_context_identity() {
    let app = common::router(controllers(), TABLE);
    let principal = Principal {
        uid: "u-9".to_string(),
        code: None,
        lang: Some("fr".to_string()),
    };
    let token = issue_token(&principal).expect("dev secret present");

    let (status, body) = common::get_json_with_bearer(&app, "/whoami", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["uid"], "u-9");
    assert_eq!(body["data"]["lang"], "fr");

    // Anonymous request: no uid, language falls back to the default.
    let (_, body) = common::get_json(&app, "/whoami").await;
    assert_eq!(body["data"]["uid"], Value::Null);
    assert_eq!(body["data"]["lang"], "en");
}

#[tokio::test]
async fn garbage_token_is_ignored_not_rejected() {
    let app = common::router(controllers(), TABLE);

    let (status, body) = common::get_json_with_bearer(&app, "/whoami", "not-a-jwt").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["uid"], Value::Null);
}
