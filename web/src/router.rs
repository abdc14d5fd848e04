use crate::{controller::health_check_controller, socket, AppState};
use axum::{
    http::{HeaderValue, Method},
    routing::{any, get},
    Router,
};
use log::*;
use service::config::Config;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .merge(health_routes())
        .merge(socket_routes(app_state))
        .layer(cors)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

// Every method is routed to the socket handler so that any plain HTTP request gets the
// "expected upgrade" response instead of a 405.
fn socket_routes(app_state: AppState) -> Router {
    let socket_path = app_state.config.socket_path().to_string();
    Router::new()
        .route(&socket_path, any(socket::handler::socket_handler))
        .with_state(app_state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin}: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
}
