//! Axum REST API handlers for the two-party contract surface.
//!
//! Every mutating handler follows the same shape:
//!
//! 1. resolve the caller through the identity collaborator;
//! 2. load the contract aggregate;
//! 3. apply the engine operation to the loaded copy — this runs every
//!    validation, ownership and status check before any persisted state is
//!    touched;
//! 4. persist through a conditional write that re-checks the stored status
//!    at commit time (concurrency backstop);
//! 5. emit an audit event, fire-and-forget;
//! 6. respond with the reloaded aggregate.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::Engine as _;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use contract_engine::{
    Contract, ContractStatus, EngineError, MilestoneEdit, MilestoneInput, PaymentMethod,
};

use crate::audit::{self, AuditEvent, ENTITY_CONTRACT, ENTITY_MILESTONE};
use crate::auth::{self, Caller};
use crate::config::Config;
use crate::db::{self, ContractSummary};
use crate::errors::{ApiError, Result};
use crate::storage;

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub client: Client,
    pub config: Config,
}

fn now() -> i64 {
    Utc::now().timestamp()
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneRequest {
    pub title: String,
    pub amount: i64,
    pub due_date: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContractRequest {
    pub developer_id: String,
    pub job_id: Option<String>,
    #[serde(default)]
    pub milestones: Vec<MilestoneRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetailsRequest {
    pub method: String,
    pub account_name: Option<String>,
    pub details: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMilestoneRequest {
    pub title: Option<String>,
    pub amount: Option<i64>,
    pub due_date: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub submission_link: String,
    pub submission_note: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverRequest {
    pub final_link: String,
    /// Optional binary deliverable, base64-encoded.
    pub file_base64: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateRequest {
    pub reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractResponse {
    #[serde(flatten)]
    pub contract: Contract,
    /// Recomputed milestone sum, reported next to the delta-maintained
    /// `totalAmount` so divergence is visible to callers.
    pub milestone_total: i64,
}

#[derive(Serialize)]
pub struct ContractsResponse {
    pub count: usize,
    pub contracts: Vec<ContractSummary>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

fn contract_response(contract: Contract) -> Json<ContractResponse> {
    let milestone_total = contract.milestone_sum();
    if milestone_total != contract.total_amount {
        warn!(
            "ledger divergence on contract {}: total_amount={} milestone_sum={}",
            contract.id, contract.total_amount, milestone_total
        );
    }
    Json(ContractResponse {
        contract,
        milestone_total,
    })
}

// ─────────────────────────────────────────────────────────
// Shared helpers
// ─────────────────────────────────────────────────────────

async fn caller(state: &ApiState, headers: &HeaderMap) -> Result<Caller> {
    auth::authenticate(&state.client, &state.config, headers).await
}

fn parse_contract_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| ApiError::NotFound("contract not found".to_string()))
}

fn parse_milestone_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| ApiError::Engine(EngineError::MilestoneNotFound))
}

async fn load_contract(state: &ApiState, id: Uuid) -> Result<Contract> {
    db::fetch_contract(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("contract not found".to_string()))
}

async fn reload(state: &ApiState, id: Uuid) -> Result<Json<ContractResponse>> {
    Ok(contract_response(load_contract(state, id).await?))
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /contracts` — employer creates a contract plus initial milestones.
pub async fn create_contract(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<CreateContractRequest>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;

    let milestones = body
        .milestones
        .into_iter()
        .map(|m| MilestoneInput {
            title: m.title,
            amount: m.amount,
            due_date: m.due_date,
        })
        .collect();

    let contract = Contract::create(
        caller.id.clone(),
        body.developer_id,
        body.job_id,
        milestones,
        now(),
    )?;
    db::insert_contract(&state.pool, &contract).await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "contract_created",
            entity: ENTITY_CONTRACT,
            entity_id: contract.id.to_string(),
            metadata: serde_json::json!({
                "totalAmount": contract.total_amount,
                "milestones": contract.milestones.len(),
            }),
        },
    );

    Ok((StatusCode::CREATED, contract_response(contract)))
}

/// `GET /contracts` — admin sees all; a party sees its own contracts.
pub async fn list_contracts(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;

    let contracts = if caller.is_admin() {
        db::list_all(&state.pool).await?
    } else {
        db::list_for_party(&state.pool, &caller.id).await?
    };

    Ok(Json(ContractsResponse {
        count: contracts.len(),
        contracts,
    }))
}

/// `GET /contracts/:id` — readable by the two parties and admins only.
pub async fn get_contract(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let contract = load_contract(&state, id).await?;

    if !caller.is_admin() && !contract.is_party(&caller.id) {
        return Err(ApiError::Engine(EngineError::Forbidden(
            "only a contract party may view this contract",
        )));
    }

    Ok(contract_response(contract))
}

/// `POST /contracts/:id/payment-details` — developer sets the payment
/// snapshot. Informational only; gates nothing.
pub async fn set_payment_details(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PaymentDetailsRequest>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mut contract = load_contract(&state, id).await?;

    let method = PaymentMethod::parse(&body.method).ok_or_else(|| {
        ApiError::Engine(EngineError::Validation(format!(
            "unknown payment method: {}",
            body.method
        )))
    })?;

    let ts = now();
    contract.set_payment_details(&caller.id, method, body.account_name, &body.details, ts)?;
    let details = contract
        .payment_details
        .as_ref()
        .ok_or_else(|| ApiError::Data("payment details missing after set".to_string()))?;
    db::set_payment_details(&state.pool, id, details, ts).await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "payment_details_set",
            entity: ENTITY_CONTRACT,
            entity_id: id.to_string(),
            metadata: serde_json::json!({ "method": method.as_str() }),
        },
    );

    reload(&state, id).await
}

/// `POST /contracts/:id/milestones` — employer appends a pending milestone.
pub async fn add_milestone(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MilestoneRequest>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mut contract = load_contract(&state, id).await?;

    let ts = now();
    let milestone_id =
        contract.add_milestone(&caller.id, &body.title, body.amount, body.due_date, ts)?;
    let milestone = contract
        .milestone(milestone_id)
        .ok_or_else(|| ApiError::Data("milestone missing after add".to_string()))?;
    db::add_milestone(&state.pool, id, milestone, ts).await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "milestone_added",
            entity: ENTITY_MILESTONE,
            entity_id: milestone_id.to_string(),
            metadata: serde_json::json!({
                "contractId": id.to_string(),
                "amount": milestone.amount,
            }),
        },
    );

    Ok((StatusCode::CREATED, reload(&state, id).await?))
}

/// `PATCH /contracts/:id/milestones/:mid` — employer edits a pending
/// milestone; an amount change moves the ledger by the delta.
pub async fn edit_milestone(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((id, mid)): Path<(String, String)>,
    Json(body): Json<EditMilestoneRequest>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mid = parse_milestone_id(&mid)?;
    let mut contract = load_contract(&state, id).await?;

    let old_amount = contract
        .milestone(mid)
        .ok_or(ApiError::Engine(EngineError::MilestoneNotFound))?
        .amount;

    let ts = now();
    contract.edit_milestone(
        &caller.id,
        mid,
        MilestoneEdit {
            title: body.title,
            amount: body.amount,
            due_date: body.due_date,
        },
        ts,
    )?;
    let milestone = contract
        .milestone(mid)
        .ok_or_else(|| ApiError::Data("milestone missing after edit".to_string()))?;
    db::update_milestone(&state.pool, id, milestone, old_amount, ts).await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "milestone_edited",
            entity: ENTITY_MILESTONE,
            entity_id: mid.to_string(),
            metadata: serde_json::json!({
                "contractId": id.to_string(),
                "amount": milestone.amount,
            }),
        },
    );

    reload(&state, id).await
}

/// `DELETE /contracts/:id/milestones/:mid` — employer removes a pending
/// milestone, decrementing the ledger.
pub async fn delete_milestone(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((id, mid)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mid = parse_milestone_id(&mid)?;
    let mut contract = load_contract(&state, id).await?;

    let amount = contract
        .milestone(mid)
        .ok_or(ApiError::Engine(EngineError::MilestoneNotFound))?
        .amount;

    let ts = now();
    contract.delete_milestone(&caller.id, mid, ts)?;
    db::delete_milestone(&state.pool, id, mid, amount, ts).await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "milestone_deleted",
            entity: ENTITY_MILESTONE,
            entity_id: mid.to_string(),
            metadata: serde_json::json!({
                "contractId": id.to_string(),
                "amount": amount,
            }),
        },
    );

    reload(&state, id).await
}

/// `POST /contracts/:id/milestones/:mid/submit` — developer: Pending → Submitted.
pub async fn submit_milestone(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((id, mid)): Path<(String, String)>,
    Json(body): Json<SubmitRequest>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mid = parse_milestone_id(&mid)?;
    let mut contract = load_contract(&state, id).await?;

    let ts = now();
    contract.submit_milestone(
        &caller.id,
        mid,
        &body.submission_link,
        body.submission_note.as_deref(),
        ts,
    )?;
    let milestone = contract
        .milestone(mid)
        .ok_or_else(|| ApiError::Data("milestone missing after submit".to_string()))?;
    db::mark_submitted(
        &state.pool,
        id,
        mid,
        milestone.submission_link.as_deref().unwrap_or_default(),
        milestone.submission_note.as_deref(),
        ts,
    )
    .await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "milestone_submitted",
            entity: ENTITY_MILESTONE,
            entity_id: mid.to_string(),
            metadata: serde_json::json!({ "contractId": id.to_string() }),
        },
    );

    reload(&state, id).await
}

/// `POST /contracts/:id/milestones/:mid/release` — employer attests review
/// and off-platform payment: Submitted → Released.
pub async fn release_milestone(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((id, mid)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mid = parse_milestone_id(&mid)?;
    let mut contract = load_contract(&state, id).await?;

    let ts = now();
    contract.release_milestone(&caller.id, mid, ts)?;
    db::mark_released(&state.pool, id, mid, ts).await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "milestone_released",
            entity: ENTITY_MILESTONE,
            entity_id: mid.to_string(),
            metadata: serde_json::json!({ "contractId": id.to_string() }),
        },
    );

    reload(&state, id).await
}

/// `POST /contracts/:id/milestones/:mid/deliver` — developer: Released →
/// Delivered, with an optional binary deliverable.
///
/// The storage upload runs *before* any row is mutated; if it fails the
/// milestone stays `Released` and the caller resubmits.
pub async fn deliver_milestone(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path((id, mid)): Path<(String, String)>,
    Json(body): Json<DeliverRequest>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mid = parse_milestone_id(&mid)?;
    let mut contract = load_contract(&state, id).await?;

    // Run every engine check first so a doomed request never uploads.
    let ts = now();
    contract.deliver_milestone(&caller.id, mid, &body.final_link, None, ts)?;

    let file_url = match body.file_base64.as_deref() {
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|_| {
                    ApiError::Engine(EngineError::Validation(
                        "file payload is not valid base64".to_string(),
                    ))
                })?;
            let file_name = body.file_name.as_deref().unwrap_or("deliverable");
            let public_id = format!("{id}-{mid}");
            Some(
                storage::upload(
                    &state.client,
                    &state.config,
                    bytes,
                    file_name,
                    Some(public_id.as_str()),
                )
                .await?,
            )
        }
        None => None,
    };

    let milestone = contract
        .milestone(mid)
        .ok_or_else(|| ApiError::Data("milestone missing after deliver".to_string()))?;
    db::mark_delivered(
        &state.pool,
        id,
        mid,
        milestone.final_link.as_deref().unwrap_or_default(),
        file_url.as_deref(),
        ts,
    )
    .await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "milestone_delivered",
            entity: ENTITY_MILESTONE,
            entity_id: mid.to_string(),
            metadata: serde_json::json!({
                "contractId": id.to_string(),
                "fileUploaded": file_url.is_some(),
            }),
        },
    );

    reload(&state, id).await
}

/// `POST /contracts/:id/dispute` — either party: Active | Disputed → Disputed.
pub async fn dispute_contract(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mut contract = load_contract(&state, id).await?;

    let ts = now();
    contract.dispute(&caller.id, ts)?;
    db::set_contract_status(
        &state.pool,
        id,
        &[ContractStatus::Active, ContractStatus::Disputed],
        ContractStatus::Disputed,
        ts,
    )
    .await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "contract_disputed",
            entity: ENTITY_CONTRACT,
            entity_id: id.to_string(),
            metadata: serde_json::json!({}),
        },
    );

    reload(&state, id).await
}

/// `POST /contracts/:id/complete` — employer: Active → Completed, only once
/// every milestone is Delivered.
pub async fn complete_contract(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mut contract = load_contract(&state, id).await?;

    let ts = now();
    contract.complete(&caller.id, ts)?;
    db::complete_contract(&state.pool, id, ts).await?;

    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "contract_completed",
            entity: ENTITY_CONTRACT,
            entity_id: id.to_string(),
            metadata: serde_json::json!({}),
        },
    );

    reload(&state, id).await
}

/// `POST /contracts/:id/terminate` — employer: Active | Disputed → Cancelled.
/// The optional reason is audit metadata only.
pub async fn terminate_contract(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<TerminateRequest>>,
) -> Result<impl IntoResponse> {
    let caller = caller(&state, &headers).await?;
    let id = parse_contract_id(&id)?;
    let mut contract = load_contract(&state, id).await?;

    let ts = now();
    contract.terminate(&caller.id, ts)?;
    db::set_contract_status(
        &state.pool,
        id,
        &[ContractStatus::Active, ContractStatus::Disputed],
        ContractStatus::Cancelled,
        ts,
    )
    .await?;

    let reason = body.and_then(|Json(b)| b.reason);
    audit::emit(
        &state.pool,
        AuditEvent {
            actor_id: caller.id,
            action: "contract_terminated",
            entity: ENTITY_CONTRACT,
            entity_id: id.to_string(),
            metadata: serde_json::json!({ "reason": reason }),
        },
    );

    reload(&state, id).await
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
