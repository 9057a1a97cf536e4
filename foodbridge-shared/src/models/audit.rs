//! Audit trail for administrative actions
//!
//! Verification decisions, trust changes, account activation and deletion,
//! and forced status changes are recorded here with the acting user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Audit action names
pub mod actions {
    pub const USER_VERIFY: &str = "user.verify";
    pub const USER_TRUST_UPDATE: &str = "user.trust_update";
    pub const USER_ACTIVATE: &str = "user.activate";
    pub const USER_DEACTIVATE: &str = "user.deactivate";
    pub const USER_DELETE: &str = "user.delete";
    pub const DONATION_VERIFY: &str = "donation.verify";
    pub const DONATION_FORCE_STATUS: &str = "donation.force_status";
    pub const DONATION_DELETE: &str = "donation.delete";
}

/// Audited resource types
pub mod resource_types {
    pub const USER: &str = "user";
    pub const DONATION: &str = "donation";
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,

    /// None once the acting account is deleted
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Input for a new audit entry
#[derive(Debug, Clone)]
pub struct NewAuditLog<'a> {
    pub actor_id: Uuid,
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<Uuid>,
    pub details: JsonValue,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
}

impl AuditFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE TRUE");
        if let Some(action) = &self.action {
            builder.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(resource_type) = &self.resource_type {
            builder
                .push(" AND resource_type = ")
                .push_bind(resource_type.clone());
        }
        if let Some(resource_id) = self.resource_id {
            builder.push(" AND resource_id = ").push_bind(resource_id);
        }
        if let Some(actor_id) = self.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id);
        }
    }
}

impl AuditLog {
    pub async fn record(pool: &PgPool, entry: NewAuditLog<'_>) -> Result<Self, sqlx::Error> {
        let log = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (actor_id, action, resource_type, resource_id, details)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, actor_id, action, resource_type, resource_id, details, created_at
            "#,
        )
        .bind(entry.actor_id)
        .bind(entry.action)
        .bind(entry.resource_type)
        .bind(entry.resource_id)
        .bind(entry.details)
        .fetch_one(pool)
        .await?;

        tracing::debug!(
            action = entry.action,
            resource_type = entry.resource_type,
            actor_id = %entry.actor_id,
            "Audit log recorded"
        );

        Ok(log)
    }

    /// Lists entries newest first
    pub async fn list(
        pool: &PgPool,
        filter: &AuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, actor_id, action, resource_type, resource_id, details, created_at \
             FROM audit_logs",
        );
        filter.push_where(&mut builder);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let logs = builder.build_query_as::<AuditLog>().fetch_all(pool).await?;

        Ok(logs)
    }

    pub async fn count(pool: &PgPool, filter: &AuditFilter) -> Result<i64, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        filter.push_where(&mut builder);

        let (count,): (i64,) = builder.build_query_as().fetch_one(pool).await?;

        Ok(count)
    }
}
