//! Dispute arbitration surface — the single privileged caller of the
//! contract state machine.
//!
//! These handlers are the only place an [`AdminAuthority`] capability is
//! minted; the two-party guard in the engine never sees a role.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use contract_engine::{AdminAuthority, ContractStatus, EngineError, Resolution};

use crate::api::{ApiState, ContractsResponse};
use crate::audit::{self, AuditEvent, ENTITY_CONTRACT};
use crate::auth::{self, Caller};
use crate::db;
use crate::errors::{ApiError, Result};

/// Authenticate and require the admin role, yielding the arbitration
/// capability.
async fn require_admin(state: &ApiState, headers: &HeaderMap) -> Result<(Caller, AdminAuthority)> {
    let caller = auth::authenticate(&state.client, &state.config, headers).await?;
    if !caller.is_admin() {
        return Err(ApiError::Engine(EngineError::Forbidden(
            "admin role required",
        )));
    }
    let authority = AdminAuthority::new(caller.id.clone());
    Ok((caller, authority))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub resolution: Resolution,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub id: String,
    pub status: ContractStatus,
    pub resolution: Resolution,
}

/// `GET /admin/disputes` — every contract awaiting arbitration.
pub async fn list_disputes(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    require_admin(&state, &headers).await?;
    let contracts = db::list_disputed(&state.pool).await?;
    Ok(Json(ContractsResponse {
        count: contracts.len(),
        contracts,
    }))
}

/// `POST /admin/disputes/:id/resolve` — Disputed → Completed (release) or
/// Cancelled (refund).
pub async fn resolve_dispute(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Result<impl IntoResponse> {
    let (caller, authority) = require_admin(&state, &headers).await?;
    let id = uuid::Uuid::parse_str(&id)
        .map_err(|_| ApiError::NotFound("contract not found".to_string()))?;
    let mut contract = db::fetch_contract(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("contract not found".to_string()))?;

    let ts = chrono::Utc::now().timestamp();
    contract.resolve_dispute(&authority, body.resolution, ts)?;
    db::set_contract_status(
        &state.pool,
        id,
        &[ContractStatus::Disputed],
        contract.status,
        ts,
    )
    .await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "dispute_resolved",
            entity: ENTITY_CONTRACT,
            entity_id: id.to_string(),
            metadata: serde_json::json!({
                "resolution": body.resolution,
                "finalStatus": contract.status.as_str(),
            }),
        },
    );

    Ok(Json(ResolveResponse {
        id: id.to_string(),
        status: contract.status,
        resolution: body.resolution,
    }))
}
