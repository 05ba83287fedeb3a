//! Database layer — migrations, aggregate load/save, and the conditional
//! writes that make transitions safe under concurrency.
//!
//! Two rules hold for every mutating query:
//!
//! * Status transitions are conditional updates keyed on the expected
//!   current status (`... WHERE status = ?expected`). Zero rows affected
//!   means another request advanced the row first; the caller gets
//!   `InvalidTransition` instead of a silent overwrite.
//! * `total_amount` is only ever moved by atomic
//!   `SET total_amount = total_amount + ?delta` statements inside the same
//!   transaction as the milestone row change, so concurrent ledger updates
//!   cannot lose an increment.

use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;
use uuid::Uuid;

use contract_engine::{
    Contract, ContractStatus, EngineError, Milestone, MilestoneStatus, PaymentDetails,
    PaymentMethod,
};

use crate::errors::{ApiError, Result};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

fn conflict(what: &str) -> ApiError {
    ApiError::Engine(EngineError::InvalidTransition(format!(
        "{what} was changed by a concurrent request"
    )))
}

// ─────────────────────────────────────────────────────────
// Row shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct ContractRow {
    id: String,
    job_id: Option<String>,
    employer_id: String,
    developer_id: String,
    status: String,
    total_amount: i64,
    payment_method: Option<String>,
    payment_account_name: Option<String>,
    payment_details: Option<String>,
    payment_updated_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct MilestoneRow {
    id: String,
    title: String,
    amount: i64,
    due_date: Option<i64>,
    status: String,
    submission_link: Option<String>,
    submission_note: Option<String>,
    final_link: Option<String>,
    final_file_url: Option<String>,
}

/// Listing shape: a contract without its milestone collection.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContractSummary {
    pub id: String,
    pub job_id: Option<String>,
    pub employer_id: String,
    pub developer_id: String,
    pub status: String,
    pub total_amount: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| ApiError::Data(format!("invalid uuid in row: {s}")))
}

impl ContractRow {
    fn into_contract(self, milestones: Vec<Milestone>) -> Result<Contract> {
        let status = ContractStatus::parse(&self.status)
            .ok_or_else(|| ApiError::Data(format!("unknown contract status: {}", self.status)))?;

        let payment_details = match (self.payment_method, self.payment_details) {
            (Some(method), Some(details)) => Some(PaymentDetails {
                method: PaymentMethod::parse(&method).ok_or_else(|| {
                    ApiError::Data(format!("unknown payment method: {method}"))
                })?,
                account_name: self.payment_account_name,
                details,
                updated_at: self.payment_updated_at.unwrap_or(self.updated_at),
            }),
            _ => None,
        };

        Ok(Contract {
            id: parse_uuid(&self.id)?,
            job_id: self.job_id,
            employer_id: self.employer_id,
            developer_id: self.developer_id,
            status,
            total_amount: self.total_amount,
            payment_details,
            milestones,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl MilestoneRow {
    fn into_milestone(self) -> Result<Milestone> {
        Ok(Milestone {
            id: parse_uuid(&self.id)?,
            title: self.title,
            amount: self.amount,
            due_date: self.due_date,
            status: MilestoneStatus::parse(&self.status)
                .ok_or_else(|| ApiError::Data(format!("unknown milestone status: {}", self.status)))?,
            submission_link: self.submission_link,
            submission_note: self.submission_note,
            final_link: self.final_link,
            final_file_url: self.final_file_url,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Aggregate reads
// ─────────────────────────────────────────────────────────

/// Load a contract with its milestones in creation order.
pub async fn fetch_contract(pool: &SqlitePool, id: Uuid) -> Result<Option<Contract>> {
    let row: Option<ContractRow> = sqlx::query_as(
        r#"
        SELECT id, job_id, employer_id, developer_id, status, total_amount,
               payment_method, payment_account_name, payment_details,
               payment_updated_at, created_at, updated_at
        FROM   contracts
        WHERE  id = ?1
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let milestone_rows: Vec<MilestoneRow> = sqlx::query_as(
        r#"
        SELECT id, title, amount, due_date, status, submission_link,
               submission_note, final_link, final_file_url
        FROM   milestones
        WHERE  contract_id = ?1
        ORDER  BY position ASC
        "#,
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    let milestones = milestone_rows
        .into_iter()
        .map(MilestoneRow::into_milestone)
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(row.into_contract(milestones)?))
}

const SUMMARY_COLUMNS: &str = "id, job_id, employer_id, developer_id, status, \
                               total_amount, created_at, updated_at";

/// All contracts, newest first (admin view).
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<ContractSummary>> {
    let rows = sqlx::query_as::<_, ContractSummary>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM contracts ORDER BY created_at DESC, id ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Contracts where the caller is employer or developer, newest first.
pub async fn list_for_party(pool: &SqlitePool, actor_id: &str) -> Result<Vec<ContractSummary>> {
    let rows = sqlx::query_as::<_, ContractSummary>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM contracts \
         WHERE employer_id = ?1 OR developer_id = ?1 \
         ORDER BY created_at DESC, id ASC"
    ))
    .bind(actor_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// All contracts awaiting arbitration.
pub async fn list_disputed(pool: &SqlitePool) -> Result<Vec<ContractSummary>> {
    let rows = sqlx::query_as::<_, ContractSummary>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM contracts \
         WHERE status = ?1 ORDER BY updated_at ASC, id ASC"
    ))
    .bind(ContractStatus::Disputed.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Aggregate writes
// ─────────────────────────────────────────────────────────

/// Persist a freshly created contract with its initial milestones.
pub async fn insert_contract(pool: &SqlitePool, contract: &Contract) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO contracts
            (id, job_id, employer_id, developer_id, status, total_amount,
             created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(contract.id.to_string())
    .bind(&contract.job_id)
    .bind(&contract.employer_id)
    .bind(&contract.developer_id)
    .bind(contract.status.as_str())
    .bind(contract.total_amount)
    .bind(contract.created_at)
    .bind(contract.updated_at)
    .execute(&mut *tx)
    .await?;

    for (position, m) in contract.milestones.iter().enumerate() {
        insert_milestone_row(&mut tx, contract.id, m, position as i64).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn insert_milestone_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    contract_id: Uuid,
    m: &Milestone,
    position: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO milestones
            (id, contract_id, position, title, amount, due_date, status,
             submission_link, submission_note, final_link, final_file_url)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(m.id.to_string())
    .bind(contract_id.to_string())
    .bind(position)
    .bind(&m.title)
    .bind(m.amount)
    .bind(m.due_date)
    .bind(m.status.as_str())
    .bind(&m.submission_link)
    .bind(&m.submission_note)
    .bind(&m.final_link)
    .bind(&m.final_file_url)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Overwrite the payment snapshot (last write wins).
pub async fn set_payment_details(
    pool: &SqlitePool,
    contract_id: Uuid,
    details: &PaymentDetails,
    now: i64,
) -> Result<()> {
    let rows = sqlx::query(
        r#"
        UPDATE contracts
        SET    payment_method = ?1, payment_account_name = ?2,
               payment_details = ?3, payment_updated_at = ?4, updated_at = ?5
        WHERE  id = ?6
        "#,
    )
    .bind(details.method.as_str())
    .bind(&details.account_name)
    .bind(&details.details)
    .bind(details.updated_at)
    .bind(now)
    .bind(contract_id.to_string())
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(ApiError::NotFound("contract not found".to_string()));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Ledger-affecting milestone writes
// ─────────────────────────────────────────────────────────

/// Append a milestone, incrementing the ledger atomically. The contract row
/// update is conditional on the contract still being `active`.
pub async fn add_milestone(
    pool: &SqlitePool,
    contract_id: Uuid,
    milestone: &Milestone,
    now: i64,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query(
        r#"
        UPDATE contracts
        SET    total_amount = total_amount + ?1, updated_at = ?2
        WHERE  id = ?3 AND status = ?4
        "#,
    )
    .bind(milestone.amount)
    .bind(now)
    .bind(contract_id.to_string())
    .bind(ContractStatus::Active.as_str())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(conflict("contract status"));
    }

    sqlx::query(
        r#"
        INSERT INTO milestones
            (id, contract_id, position, title, amount, due_date, status)
        VALUES (?1, ?2,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM milestones WHERE contract_id = ?2),
                ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(milestone.id.to_string())
    .bind(contract_id.to_string())
    .bind(&milestone.title)
    .bind(milestone.amount)
    .bind(milestone.due_date)
    .bind(milestone.status.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Persist an edit to a still-`pending` milestone. The ledger delta is
/// `milestone.amount - old_amount`, and the milestone update is conditional
/// on the row still carrying `old_amount`: a writer holding a stale snapshot
/// matches zero rows instead of applying a delta computed against an amount
/// that no longer exists.
pub async fn update_milestone(
    pool: &SqlitePool,
    contract_id: Uuid,
    milestone: &Milestone,
    old_amount: i64,
    now: i64,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query(
        r#"
        UPDATE milestones
        SET    title = ?1, amount = ?2, due_date = ?3
        WHERE  id = ?4 AND contract_id = ?5 AND status = ?6 AND amount = ?7
        "#,
    )
    .bind(&milestone.title)
    .bind(milestone.amount)
    .bind(milestone.due_date)
    .bind(milestone.id.to_string())
    .bind(contract_id.to_string())
    .bind(MilestoneStatus::Pending.as_str())
    .bind(old_amount)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(conflict("milestone state"));
    }

    sqlx::query(
        "UPDATE contracts SET total_amount = total_amount + ?1, updated_at = ?2 WHERE id = ?3",
    )
    .bind(milestone.amount - old_amount)
    .bind(now)
    .bind(contract_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Delete a still-`pending` milestone and decrement the ledger by `amount`.
/// Conditional on the row still carrying `amount`, for the same stale-
/// snapshot reason as [`update_milestone`].
pub async fn delete_milestone(
    pool: &SqlitePool,
    contract_id: Uuid,
    milestone_id: Uuid,
    amount: i64,
    now: i64,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query(
        "DELETE FROM milestones WHERE id = ?1 AND contract_id = ?2 AND status = ?3 AND amount = ?4",
    )
    .bind(milestone_id.to_string())
    .bind(contract_id.to_string())
    .bind(MilestoneStatus::Pending.as_str())
    .bind(amount)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(conflict("milestone state"));
    }

    sqlx::query(
        "UPDATE contracts SET total_amount = total_amount - ?1, updated_at = ?2 WHERE id = ?3",
    )
    .bind(amount)
    .bind(now)
    .bind(contract_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Milestone workflow transitions (check-then-set)
// ─────────────────────────────────────────────────────────

/// `Pending → Submitted`, storing the submission link and note.
pub async fn mark_submitted(
    pool: &SqlitePool,
    contract_id: Uuid,
    milestone_id: Uuid,
    link: &str,
    note: Option<&str>,
    now: i64,
) -> Result<()> {
    let rows = sqlx::query(
        r#"
        UPDATE milestones
        SET    status = ?1, submission_link = ?2, submission_note = ?3
        WHERE  id = ?4 AND contract_id = ?5 AND status = ?6
        "#,
    )
    .bind(MilestoneStatus::Submitted.as_str())
    .bind(link)
    .bind(note)
    .bind(milestone_id.to_string())
    .bind(contract_id.to_string())
    .bind(MilestoneStatus::Pending.as_str())
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(conflict("milestone status"));
    }
    touch_contract(pool, contract_id, now).await
}

/// `Submitted → Released`.
pub async fn mark_released(
    pool: &SqlitePool,
    contract_id: Uuid,
    milestone_id: Uuid,
    now: i64,
) -> Result<()> {
    let rows = sqlx::query(
        "UPDATE milestones SET status = ?1 WHERE id = ?2 AND contract_id = ?3 AND status = ?4",
    )
    .bind(MilestoneStatus::Released.as_str())
    .bind(milestone_id.to_string())
    .bind(contract_id.to_string())
    .bind(MilestoneStatus::Submitted.as_str())
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(conflict("milestone status"));
    }
    touch_contract(pool, contract_id, now).await
}

/// `Released → Delivered`, storing the final link and any uploaded file URL.
/// Callers must complete the storage upload before invoking this.
pub async fn mark_delivered(
    pool: &SqlitePool,
    contract_id: Uuid,
    milestone_id: Uuid,
    final_link: &str,
    final_file_url: Option<&str>,
    now: i64,
) -> Result<()> {
    let rows = sqlx::query(
        r#"
        UPDATE milestones
        SET    status = ?1, final_link = ?2, final_file_url = ?3
        WHERE  id = ?4 AND contract_id = ?5 AND status = ?6
        "#,
    )
    .bind(MilestoneStatus::Delivered.as_str())
    .bind(final_link)
    .bind(final_file_url)
    .bind(milestone_id.to_string())
    .bind(contract_id.to_string())
    .bind(MilestoneStatus::Released.as_str())
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(conflict("milestone status"));
    }
    touch_contract(pool, contract_id, now).await
}

async fn touch_contract(pool: &SqlitePool, contract_id: Uuid, now: i64) -> Result<()> {
    sqlx::query("UPDATE contracts SET updated_at = ?1 WHERE id = ?2")
        .bind(now)
        .bind(contract_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Contract status transitions (check-then-set)
// ─────────────────────────────────────────────────────────

/// Conditionally move a contract from one of `allowed_from` to `to`.
pub async fn set_contract_status(
    pool: &SqlitePool,
    contract_id: Uuid,
    allowed_from: &[ContractStatus],
    to: ContractStatus,
    now: i64,
) -> Result<()> {
    // The allowed-from set is at most two statuses in practice.
    let placeholders = (0..allowed_from.len())
        .map(|i| format!("?{}", i + 4))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE contracts SET status = ?1, updated_at = ?2 \
         WHERE id = ?3 AND status IN ({placeholders})"
    );

    let mut query = sqlx::query(&sql)
        .bind(to.as_str())
        .bind(now)
        .bind(contract_id.to_string());
    for from in allowed_from {
        query = query.bind(from.as_str());
    }

    let rows = query.execute(pool).await?.rows_affected();
    if rows == 0 {
        return Err(conflict("contract status"));
    }
    Ok(())
}

/// `Active → Completed`, additionally guarded in SQL against any milestone
/// that is not yet `delivered`.
pub async fn complete_contract(pool: &SqlitePool, contract_id: Uuid, now: i64) -> Result<()> {
    let rows = sqlx::query(
        r#"
        UPDATE contracts
        SET    status = ?1, updated_at = ?2
        WHERE  id = ?3 AND status = ?4
          AND  NOT EXISTS (
                 SELECT 1 FROM milestones
                 WHERE  contract_id = ?3 AND status != ?5
               )
        "#,
    )
    .bind(ContractStatus::Completed.as_str())
    .bind(now)
    .bind(contract_id.to_string())
    .bind(ContractStatus::Active.as_str())
    .bind(MilestoneStatus::Delivered.as_str())
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(conflict("contract status"));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use contract_engine::MilestoneInput;
    use sqlx::sqlite::SqlitePoolOptions;

    const EMPLOYER: &str = "employer-1";
    const DEVELOPER: &str = "developer-1";
    const NOW: i64 = 1_700_000_000;

    async fn test_pool() -> SqlitePool {
        // A single connection keeps the in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn input(title: &str, amount: i64) -> MilestoneInput {
        MilestoneInput {
            title: title.to_string(),
            amount,
            due_date: None,
        }
    }

    async fn seeded_contract(pool: &SqlitePool) -> Contract {
        let contract = Contract::create(
            EMPLOYER,
            DEVELOPER,
            Some("job-7".to_string()),
            vec![input("Design", 500), input("Build", 1500)],
            NOW,
        )
        .unwrap();
        insert_contract(pool, &contract).await.unwrap();
        contract
    }

    async fn milestone_sum(pool: &SqlitePool, contract_id: Uuid) -> i64 {
        let (sum,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0) FROM milestones WHERE contract_id = ?1",
        )
        .bind(contract_id.to_string())
        .fetch_one(pool)
        .await
        .unwrap();
        sum
    }

    #[tokio::test]
    async fn insert_then_fetch_round_trips_the_aggregate() {
        let pool = test_pool().await;
        let contract = seeded_contract(&pool).await;

        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded, contract);
    }

    #[tokio::test]
    async fn fetch_missing_contract_is_none() {
        let pool = test_pool().await;
        assert!(fetch_contract(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conditional_transition_rejects_the_second_writer() {
        let pool = test_pool().await;
        let contract = seeded_contract(&pool).await;
        let mid = contract.milestones[0].id;

        mark_submitted(&pool, contract.id, mid, "https://preview.example.com", None, NOW)
            .await
            .unwrap();

        // A concurrent duplicate submit sees zero matched rows.
        let err = mark_submitted(&pool, contract.id, mid, "https://again.example.com", None, NOW)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Engine(EngineError::InvalidTransition(_))
        ));

        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(
            loaded.milestone(mid).unwrap().submission_link.as_deref(),
            Some("https://preview.example.com")
        );
    }

    #[tokio::test]
    async fn ledger_deltas_stay_consistent_with_milestone_rows() {
        let pool = test_pool().await;
        let mut contract = seeded_contract(&pool).await;

        // Add through the engine, then persist with the atomic delta.
        let added = contract
            .add_milestone(EMPLOYER, "Deploy", 800, None, NOW)
            .unwrap();
        let milestone = contract.milestone(added).unwrap().clone();
        add_milestone(&pool, contract.id, &milestone, NOW).await.unwrap();

        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_amount, 2800);
        assert_eq!(milestone_sum(&pool, contract.id).await, 2800);

        // Edit the amount down.
        update_milestone(
            &pool,
            contract.id,
            &Milestone {
                amount: 600,
                ..milestone.clone()
            },
            800,
            NOW,
        )
        .await
        .unwrap();

        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_amount, 2600);
        assert_eq!(milestone_sum(&pool, contract.id).await, 2600);

        // Delete it again.
        delete_milestone(&pool, contract.id, added, 600, NOW).await.unwrap();

        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_amount, 2000);
        assert_eq!(milestone_sum(&pool, contract.id).await, 2000);
        assert_eq!(loaded.milestones.len(), 2);
    }

    #[tokio::test]
    async fn stale_amount_writes_lose_the_race_and_move_no_money() {
        let pool = test_pool().await;
        let contract = seeded_contract(&pool).await;
        let milestone = contract.milestones[0].clone();

        // Two writers loaded the same snapshot (amount 500). The first edit
        // lands; the second still carries the old amount in its guard and
        // must match zero rows instead of applying its stale delta.
        update_milestone(
            &pool,
            contract.id,
            &Milestone {
                amount: 800,
                ..milestone.clone()
            },
            500,
            NOW,
        )
        .await
        .unwrap();

        let err = update_milestone(
            &pool,
            contract.id,
            &Milestone {
                amount: 1000,
                ..milestone.clone()
            },
            500,
            NOW,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Engine(EngineError::InvalidTransition(_))
        ));

        // A delete computed from the same stale snapshot loses too.
        let err = delete_milestone(&pool, contract.id, milestone.id, 500, NOW)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Engine(EngineError::InvalidTransition(_))
        ));

        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_amount, 2300);
        assert_eq!(milestone_sum(&pool, contract.id).await, 2300);

        // With the current amount in hand the delete goes through cleanly.
        delete_milestone(&pool, contract.id, milestone.id, 800, NOW)
            .await
            .unwrap();
        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_amount, 1500);
        assert_eq!(milestone_sum(&pool, contract.id).await, 1500);
    }

    #[tokio::test]
    async fn add_milestone_requires_active_contract() {
        let pool = test_pool().await;
        let contract = seeded_contract(&pool).await;

        set_contract_status(
            &pool,
            contract.id,
            &[ContractStatus::Active, ContractStatus::Disputed],
            ContractStatus::Disputed,
            NOW,
        )
        .await
        .unwrap();

        let milestone = Milestone {
            id: Uuid::new_v4(),
            title: "Extra".to_string(),
            amount: 100,
            due_date: None,
            status: MilestoneStatus::Pending,
            submission_link: None,
            submission_note: None,
            final_link: None,
            final_file_url: None,
        };
        let err = add_milestone(&pool, contract.id, &milestone, NOW).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Engine(EngineError::InvalidTransition(_))
        ));

        // The failed transaction must not have moved the ledger.
        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_amount, 2000);
        assert_eq!(loaded.milestones.len(), 2);
    }

    #[tokio::test]
    async fn delete_non_pending_milestone_is_rejected() {
        let pool = test_pool().await;
        let contract = seeded_contract(&pool).await;
        let mid = contract.milestones[0].id;

        mark_submitted(&pool, contract.id, mid, "https://preview.example.com", None, NOW)
            .await
            .unwrap();

        let err = delete_milestone(&pool, contract.id, mid, 500, NOW).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Engine(EngineError::InvalidTransition(_))
        ));
        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_amount, 2000);
        assert_eq!(loaded.milestones.len(), 2);
    }

    #[tokio::test]
    async fn complete_guards_against_undelivered_milestones() {
        let pool = test_pool().await;
        let contract = seeded_contract(&pool).await;

        let err = complete_contract(&pool, contract.id, NOW).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Engine(EngineError::InvalidTransition(_))
        ));

        // Walk both milestones to Delivered, then completion goes through.
        for m in &contract.milestones {
            mark_submitted(&pool, contract.id, m.id, "https://preview.example.com", None, NOW)
                .await
                .unwrap();
            mark_released(&pool, contract.id, m.id, NOW).await.unwrap();
            mark_delivered(&pool, contract.id, m.id, "https://prod.example.com", None, NOW)
                .await
                .unwrap();
        }

        complete_contract(&pool, contract.id, NOW).await.unwrap();
        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ContractStatus::Completed);

        // Terminal: a second completion matches nothing.
        let err = complete_contract(&pool, contract.id, NOW).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Engine(EngineError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn listings_are_scoped_to_the_party() {
        let pool = test_pool().await;
        let contract = seeded_contract(&pool).await;

        let other = Contract::create("employer-2", "developer-2", None, vec![], NOW + 10).unwrap();
        insert_contract(&pool, &other).await.unwrap();

        let all = list_all(&pool).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = list_for_party(&pool, EMPLOYER).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, contract.id.to_string());

        let dev_view = list_for_party(&pool, "developer-2").await.unwrap();
        assert_eq!(dev_view.len(), 1);
        assert_eq!(dev_view[0].id, other.id.to_string());

        assert!(list_for_party(&pool, "stranger").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disputed_listing_and_resolution_path() {
        let pool = test_pool().await;
        let contract = seeded_contract(&pool).await;

        assert!(list_disputed(&pool).await.unwrap().is_empty());

        set_contract_status(
            &pool,
            contract.id,
            &[ContractStatus::Active, ContractStatus::Disputed],
            ContractStatus::Disputed,
            NOW,
        )
        .await
        .unwrap();

        let disputed = list_disputed(&pool).await.unwrap();
        assert_eq!(disputed.len(), 1);

        // Refund resolution.
        set_contract_status(
            &pool,
            contract.id,
            &[ContractStatus::Disputed],
            ContractStatus::Cancelled,
            NOW,
        )
        .await
        .unwrap();

        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ContractStatus::Cancelled);

        // Cancelled is terminal: no further dispute.
        let err = set_contract_status(
            &pool,
            contract.id,
            &[ContractStatus::Active, ContractStatus::Disputed],
            ContractStatus::Disputed,
            NOW,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Engine(EngineError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn payment_snapshot_overwrites() {
        let pool = test_pool().await;
        let contract = seeded_contract(&pool).await;

        let details = PaymentDetails {
            method: PaymentMethod::BankTransfer,
            account_name: Some("Jane Dev".to_string()),
            details: "IBAN XX00 1234".to_string(),
            updated_at: NOW,
        };
        set_payment_details(&pool, contract.id, &details, NOW).await.unwrap();

        let replacement = PaymentDetails {
            method: PaymentMethod::MobileMoney,
            account_name: None,
            details: "+233 555 000".to_string(),
            updated_at: NOW + 60,
        };
        set_payment_details(&pool, contract.id, &replacement, NOW + 60)
            .await
            .unwrap();

        let loaded = fetch_contract(&pool, contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.payment_details, Some(replacement));
    }
}
