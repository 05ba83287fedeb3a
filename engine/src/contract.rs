//! Contract state machine: creation, dispute, completion, termination and
//! admin arbitration.
//!
//! A contract is created `Active` (the `Draft` variant is reserved). The
//! terminal statuses `Completed` and `Cancelled` admit no further
//! transition; `Disputed` is re-enterable and can only be left through
//! employer termination or admin resolution.

use uuid::Uuid;

use crate::authz::AdminAuthority;
use crate::error::{EngineError, Result};
use crate::milestone::{checked_total, new_milestone};
use crate::types::{
    Contract, ContractStatus, MilestoneInput, PaymentDetails, PaymentMethod, Resolution,
};

impl Contract {
    /// Create a new contract with zero or more initial milestones.
    ///
    /// Every input milestone must carry a non-empty title and a positive
    /// amount; `total_amount` starts as their sum and the contract starts
    /// `Active`.
    pub fn create(
        employer_id: impl Into<String>,
        developer_id: impl Into<String>,
        job_id: Option<String>,
        milestones: Vec<MilestoneInput>,
        now: i64,
    ) -> Result<Contract> {
        let milestones = milestones
            .into_iter()
            .map(new_milestone)
            .collect::<Result<Vec<_>>>()?;
        let total_amount = milestones
            .iter()
            .try_fold(0i64, |acc, m| checked_total(acc, m.amount))?;

        Ok(Contract {
            id: Uuid::new_v4(),
            job_id,
            employer_id: employer_id.into(),
            developer_id: developer_id.into(),
            status: ContractStatus::Active,
            total_amount,
            payment_details: None,
            milestones,
            created_at: now,
            updated_at: now,
        })
    }

    /// Either party raises a dispute: `Active | Disputed → Disputed`.
    pub fn dispute(&mut self, actor_id: &str, now: i64) -> Result<()> {
        self.require_party(actor_id)?;

        match self.status {
            ContractStatus::Active | ContractStatus::Disputed => {}
            ContractStatus::Draft | ContractStatus::Completed | ContractStatus::Cancelled => {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot dispute a {} contract",
                    self.status
                )))
            }
        }

        self.status = ContractStatus::Disputed;
        self.updated_at = now;
        Ok(())
    }

    /// Employer closes out the contract: `Active → Completed`, permitted
    /// only once every milestone is `Delivered`.
    pub fn complete(&mut self, actor_id: &str, now: i64) -> Result<()> {
        self.require_employer(actor_id)?;

        match self.status {
            ContractStatus::Active => {}
            ContractStatus::Draft
            | ContractStatus::Completed
            | ContractStatus::Cancelled
            | ContractStatus::Disputed => {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot complete a {} contract",
                    self.status
                )))
            }
        }

        if !self.all_delivered() {
            return Err(EngineError::InvalidTransition(
                "cannot complete while milestones remain undelivered".to_string(),
            ));
        }

        self.status = ContractStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    /// Employer unilaterally terminates: `Active | Disputed → Cancelled`.
    ///
    /// The optional reason travels only as audit metadata and is not part of
    /// the contract record.
    pub fn terminate(&mut self, actor_id: &str, now: i64) -> Result<()> {
        self.require_employer(actor_id)?;

        match self.status {
            ContractStatus::Active | ContractStatus::Disputed => {}
            ContractStatus::Draft | ContractStatus::Completed | ContractStatus::Cancelled => {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot terminate a {} contract",
                    self.status
                )))
            }
        }

        self.status = ContractStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Admin arbitration: `Disputed → Completed` (release) or `Cancelled`
    /// (refund). The single transition that bypasses the two-party guard,
    /// gated on holding an [`AdminAuthority`] capability instead.
    pub fn resolve_dispute(
        &mut self,
        _admin: &AdminAuthority,
        resolution: Resolution,
        now: i64,
    ) -> Result<()> {
        match self.status {
            ContractStatus::Disputed => {}
            ContractStatus::Draft
            | ContractStatus::Active
            | ContractStatus::Completed
            | ContractStatus::Cancelled => {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot resolve a {} contract, only disputed contracts are arbitrable",
                    self.status
                )))
            }
        }

        self.status = match resolution {
            Resolution::Release => ContractStatus::Completed,
            Resolution::Refund => ContractStatus::Cancelled,
        };
        self.updated_at = now;
        Ok(())
    }

    /// Developer overwrites the informational payment snapshot.
    pub fn set_payment_details(
        &mut self,
        actor_id: &str,
        method: PaymentMethod,
        account_name: Option<String>,
        details: &str,
        now: i64,
    ) -> Result<()> {
        self.require_developer(actor_id)?;

        let details = details.trim();
        if details.is_empty() {
            return Err(EngineError::Validation(
                "payment details must not be blank".to_string(),
            ));
        }

        self.payment_details = Some(PaymentDetails {
            method,
            account_name: account_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            details: details.to_string(),
            updated_at: now,
        });
        self.updated_at = now;
        Ok(())
    }
}
