use crate::state::AppState;
use crate::{api, logging};
use axum::middleware;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// Layers, outermost first: request logging, signature check (when a key
/// is set), response compression, request decompression, routes.
pub fn build_http_app(state: AppState) -> Router {
    let hasher = state.hasher.clone();
    let mut app = api::routes()
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new());
    if let Some(hasher) = hasher {
        app = app.layer(middleware::from_fn_with_state(
            hasher,
            crate::middleware::hash_middleware,
        ));
    }
    app.layer(middleware::from_fn(logging::request_logging))
}
