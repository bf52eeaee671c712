pub mod admin;
pub mod ads;
pub mod forum;
pub mod listings;
pub mod messages;
pub mod payments;
pub mod reviews;
pub mod rewards;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::realtime::socket::ws_handler;
use crate::state::AppState;

/// Headroom for multipart framing and the non-file fields of a request.
const BODY_OVERHEAD: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .merge(users::router())
        .merge(listings::router())
        .merge(messages::router())
        .merge(reviews::router())
        .merge(forum::router())
        .merge(rewards::router())
        .merge(ads::router())
        .merge(payments::router())
        .merge(admin::router());

    let body_limit = request_body_limit(&state.config);

    Router::new()
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(state.config.uploads_path()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Large enough for a full batch of listing images.
fn request_body_limit(config: &Config) -> usize {
    config.storage.max_upload_bytes * crate::listings::MAX_IMAGES as usize + BODY_OVERHEAD
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if config.server.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_limit_covers_a_full_image_batch() {
        let config = Config::default();
        assert!(request_body_limit(&config) > config.storage.max_upload_bytes * 10);
    }
}
