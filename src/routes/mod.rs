/// Router Module Index
///
/// Routing is split by audience. Every protected router is mounted behind the
/// authentication layer in `create_router`; role checks happen in the handlers
/// through the `AuthUser` guards.

/// Health check and session endpoints (`/health`, `/api/auth/*`).
pub mod public;

/// Platform operator routes, mounted at `/api/globalAdmin`.
pub mod global_admin;

/// Organization admin routes, mounted at `/api/admin`.
pub mod admin;

/// Learner routes, mounted at `/api/user`.
pub mod user;
