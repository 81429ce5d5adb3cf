use std::future::IntoFuture;
use std::sync::Arc;
use tracing::{error, info};

use plinth_api::config;
use plinth_api::controllers;
use plinth_api::database::ConnectionRegistry;
use plinth_api::error::SystemError;
use plinth_api::render::FileRenderer;
use plinth_api::routes::{self, AppState, ControllerRegistry};
use plinth_api::supervisor::fault_channel;

#[tokio::main]
async fn main() {
    // Load .env first so the config singleton sees its overrides.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    info!(target: "app", "starting plinth-api in {:?} mode", config.environment);

    // Report every configuration problem in one pass, then refuse to start.
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!(target: "app", "config: {}", problem);
        }
        std::process::exit(1);
    }

    let registry = Arc::new(ConnectionRegistry::new(config.database.clone()));

    let mut controller_table = ControllerRegistry::new();
    controllers::register_all(&mut controller_table);

    let path = routes::resolve_path();
    let table = match routes::load(&path) {
        Ok(table) => table,
        Err(error) => {
            let fatal = SystemError::Config(format!(
                "cannot load route table from {}: {}",
                path.display(),
                error
            ));
            error!(target: "app", "{} {}", fatal.code(), fatal);
            std::process::exit(1);
        }
    };
    let validated = table.validate();
    info!(
        target: "app",
        "route table {}: {} bindings, {} skipped",
        path.display(),
        validated.binding_count(),
        validated.skipped.len()
    );

    let (faults, mut monitor) = fault_channel();
    let state = AppState {
        registry: registry.clone(),
        controllers: Arc::new(controller_table),
        renderer: Arc::new(FileRenderer::new(&config.server.views)),
        faults,
    };

    let app = match routes::build_router(state, &validated) {
        Ok(app) => app,
        Err(error) => {
            error!(target: "app", "{} {}", error.code(), error);
            std::process::exit(1);
        }
    };

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(target: "app", "failed to bind {}: {}", bind_addr, error);
            std::process::exit(1);
        }
    };
    info!(target: "app", "listening on http://{}", bind_addr);

    // A reported fault stops the whole process; a clean restart beats
    // limping on with unknown in-process damage.
    let fault = tokio::select! {
        result = axum::serve(listener, app).into_future() => match result {
            Ok(()) => None,
            Err(error) => Some(format!("server error: {error}")),
        },
        _ = tokio::signal::ctrl_c() => None,
        description = monitor.wait() => description,
    };

    registry.shutdown().await;

    if let Some(description) = fault {
        error!(target: "app", "shutting down after fault: {}", description);
        std::process::exit(1);
    }
    info!(target: "app", "shutdown complete");
}
