use crate::{AppState, handlers::organizations};
use axum::{
    Router,
    routing::{get, post},
};

/// Global Admin Router Module
///
/// Tenant management for platform operators. Every handler calls
/// `require_global_admin`, so organization admins and learners get a 403.
pub fn global_admin_routes() -> Router<AppState> {
    Router::new()
        // GET, POST /organizations
        // Paginated listing (search on name and slug) and tenant creation.
        .route(
            "/organizations",
            get(organizations::list_organizations).post(organizations::create_organization),
        )
        // GET, PUT, DELETE /organizations/{id}
        // Deleting cascades every record the organization owns.
        .route(
            "/organizations/{id}",
            get(organizations::get_organization)
                .put(organizations::update_organization)
                .delete(organizations::delete_organization),
        )
        // POST /organizations/{id}/admins
        // Bootstraps the first admin of a tenant.
        .route(
            "/organizations/{id}/admins",
            post(organizations::create_org_admin),
        )
        // GET /dashboard
        .route("/dashboard", get(organizations::platform_dashboard))
        // GET /activity
        // Audit trail across every organization.
        .route("/activity", get(organizations::list_all_activity))
}
