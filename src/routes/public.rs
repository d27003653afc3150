use crate::{AppState, handlers::auth};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: the health probe and the session
/// lifecycle. Login and refresh set the `accessToken` / `refreshToken` cookies,
/// logout expires them.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Monitoring and load balancer probe. Returns "ok" as soon as the server runs.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/login
        // Email + password exchange. Rejects deactivated users and organizations.
        .route("/api/auth/login", post(auth::login))
        // POST /api/auth/refresh
        // New token pair from the refresh cookie (or `refresh_token` in the body).
        .route("/api/auth/refresh", post(auth::refresh))
        // POST /api/auth/logout
        .route("/api/auth/logout", post(auth::logout))
}
