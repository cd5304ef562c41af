//! API routes

pub mod health;
pub mod uploads;
pub mod users;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public user routes (no session required)
    let public_user_routes = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/refresh-token", post(users::refresh_token));

    // Protected user routes (session required)
    let protected_user_routes = Router::new()
        .route("/logout", post(users::logout))
        .route("/change-password", post(users::change_password))
        .route("/current-user", get(users::current_user))
        .route("/update-account", patch(users::update_account))
        .route("/update-avatar", patch(users::update_avatar))
        .route("/update-coverimage", patch(users::update_cover_image))
        .route("/c/:username", get(users::channel_profile))
        .route("/watch-history", get(users::watch_history))
        .route("/watch-history/:video_id", post(users::record_watch))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let user_routes = Router::new()
        .merge(public_user_routes)
        .merge(protected_user_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1/users", user_routes)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
