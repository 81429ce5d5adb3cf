//! Built-in `system` controller: service health and identity.

use serde_json::{json, Value};
use tracing::warn;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::routes::dispatch::application_info;
use crate::routes::ControllerRegistry;

pub fn register(controllers: &mut ControllerRegistry) {
    controllers
        .action("system", "health", health)
        .action("system", "info", info);
}

/// Liveness probe. Always answers 200 so load balancers can read the
/// body; the database verdict is carried inside the payload.
pub async fn health(ctx: RequestContext) -> Result<Value, ApiError> {
    let database = match probe(&ctx).await {
        Ok(()) => "up",
        Err(error) => {
            warn!(target: "app", "health probe failed: {}", error);
            "down"
        }
    };
    Ok(json!({
        "status": if database == "up" { "ok" } else { "degraded" },
        "database": database,
    }))
}

/// Application identity plus the live pool table, one entry per tenant.
pub async fn info(ctx: RequestContext) -> Result<Value, ApiError> {
    let pools: Vec<Value> = ctx
        .registry()
        .stats()
        .await
        .into_iter()
        .map(|(database, generation)| json!({ "database": database, "generation": generation }))
        .collect();

    let mut body = application_info();
    body["pools"] = Value::Array(pools);
    Ok(body)
}

async fn probe(ctx: &RequestContext) -> Result<(), ApiError> {
    let pool = ctx
        .registry()
        .get(ctx.code())
        .await
        .map_err(|error| ApiError::internal_server_error(error.to_string()))?;
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|error| ApiError::internal_server_error(error.to_string()))?;
    Ok(())
}
