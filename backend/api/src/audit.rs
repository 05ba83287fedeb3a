//! Audit emitter — best-effort trail of every mutating action.
//!
//! Emission is an "emit, don't await" boundary: the row insert runs on a
//! spawned task so it can never roll back or delay the primary state
//! transition. Failures are logged, not surfaced.

use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::warn;

pub const ENTITY_CONTRACT: &str = "contract";
pub const ENTITY_MILESTONE: &str = "milestone";

/// One audit record; `metadata` carries operation-specific context (amounts,
/// links, termination reasons, resolutions).
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: String,
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: String,
    pub metadata: Value,
}

/// Fire-and-forget emission.
pub fn emit(pool: &SqlitePool, event: AuditEvent) {
    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = record(&pool, &event).await {
            warn!(
                "audit emission failed: action={} entity={}/{}: {e}",
                event.action, event.entity, event.entity_id
            );
        }
    });
}

async fn record(pool: &SqlitePool, event: &AuditEvent) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (actor_id, action, entity, entity_id, metadata, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&event.actor_id)
    .bind(event.action)
    .bind(event.entity)
    .bind(&event.entity_id)
    .bind(event.metadata.to_string())
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}
