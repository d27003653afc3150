use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// ActivityLog
///
/// Audit trail entry written after every successful mutation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ActivityLog {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    /// Verb in `entity.action` form, e.g. `assessment.created`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: serde_json::Value,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(
        organization_id: Option<Uuid>,
        actor_id: Option<Uuid>,
        entity_type: &str,
        action: &str,
        entity_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            actor_id,
            action: format!("{entity_type}.{action}"),
            entity_type: entity_type.to_string(),
            entity_id,
            details,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ActivityFilter {
    pub entity_type: Option<String>,
}
