//! Milestone state machine and the amount ledger.
//!
//! All operations mutate the owning [`Contract`] aggregate in memory and
//! uphold two invariants:
//!
//! * a milestone's status never regresses and never skips a state;
//! * `total_amount` moves by the exact delta of every add/edit/delete, so
//!   under single-writer use it equals the milestone sum.
//!
//! Each transition matches exhaustively on the *current* status before
//! applying the change, so adding a status forces every call site to be
//! revisited by the compiler.

use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::types::{Contract, ContractStatus, Milestone, MilestoneEdit, MilestoneInput, MilestoneStatus};

/// Validate and trim a milestone title.
pub(crate) fn normalized_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(
            "milestone title must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Upper bound on a single milestone amount. Keeps ledger sums far away
/// from i64 overflow under any realistic milestone count.
pub(crate) const MAX_MILESTONE_AMOUNT: i64 = 1_000_000_000_000;

/// Milestone amounts are strictly positive and bounded.
pub(crate) fn validated_amount(amount: i64) -> Result<i64> {
    if amount <= 0 {
        return Err(EngineError::Validation(
            "milestone amount must be greater than zero".to_string(),
        ));
    }
    if amount > MAX_MILESTONE_AMOUNT {
        return Err(EngineError::Validation(format!(
            "milestone amount must not exceed {MAX_MILESTONE_AMOUNT}"
        )));
    }
    Ok(amount)
}

/// Move the ledger by `delta`, failing instead of wrapping.
pub(crate) fn checked_total(total: i64, delta: i64) -> Result<i64> {
    total.checked_add(delta).ok_or_else(|| {
        EngineError::Validation("contract total amount would overflow".to_string())
    })
}

fn normalized_link(link: &str, field: &str) -> Result<String> {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// Build a fresh `Pending` milestone from caller input.
pub(crate) fn new_milestone(input: MilestoneInput) -> Result<Milestone> {
    Ok(Milestone {
        id: Uuid::new_v4(),
        title: normalized_title(&input.title)?,
        amount: validated_amount(input.amount)?,
        due_date: input.due_date,
        status: MilestoneStatus::Pending,
        submission_link: None,
        submission_note: None,
        final_link: None,
        final_file_url: None,
    })
}

impl Contract {
    fn require_active(&self) -> Result<()> {
        match self.status {
            ContractStatus::Active => Ok(()),
            ContractStatus::Draft
            | ContractStatus::Completed
            | ContractStatus::Cancelled
            | ContractStatus::Disputed => Err(EngineError::InvalidTransition(format!(
                "contract is {} and cannot be modified",
                self.status
            ))),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Ledger-affecting mutations (employer, contract Active)
    // ─────────────────────────────────────────────────────────

    /// Append a new `Pending` milestone and increment the ledger.
    ///
    /// Returns the id assigned to the new milestone.
    pub fn add_milestone(
        &mut self,
        actor_id: &str,
        title: &str,
        amount: i64,
        due_date: Option<i64>,
        now: i64,
    ) -> Result<Uuid> {
        self.require_employer(actor_id)?;
        self.require_active()?;

        let milestone = new_milestone(MilestoneInput {
            title: title.to_string(),
            amount,
            due_date,
        })?;
        let id = milestone.id;

        self.total_amount = checked_total(self.total_amount, milestone.amount)?;
        self.milestones.push(milestone);
        self.updated_at = now;
        Ok(id)
    }

    /// Edit a `Pending` milestone; an amount change adjusts the ledger by
    /// `new - old`.
    pub fn edit_milestone(
        &mut self,
        actor_id: &str,
        milestone_id: Uuid,
        edit: MilestoneEdit,
        now: i64,
    ) -> Result<()> {
        self.require_employer(actor_id)?;

        // Validate everything before any field is written.
        let title = edit.title.as_deref().map(normalized_title).transpose()?;
        let amount = edit.amount.map(validated_amount).transpose()?;

        let milestone = self
            .milestone(milestone_id)
            .ok_or(EngineError::MilestoneNotFound)?;

        match milestone.status {
            MilestoneStatus::Pending => {}
            MilestoneStatus::Submitted | MilestoneStatus::Released | MilestoneStatus::Delivered => {
                return Err(EngineError::InvalidTransition(format!(
                    "only pending milestones may be edited, current status is {}",
                    milestone.status
                )))
            }
        }

        // Settle the ledger move before touching any field, so an overflow
        // leaves the milestone unchanged.
        let delta = amount.map(|a| a - milestone.amount).unwrap_or(0);
        let new_total = checked_total(self.total_amount, delta)?;

        let milestone = self
            .milestone_mut(milestone_id)
            .ok_or(EngineError::MilestoneNotFound)?;
        if let Some(title) = title {
            milestone.title = title;
        }
        if let Some(amount) = amount {
            milestone.amount = amount;
        }
        if let Some(due_date) = edit.due_date {
            milestone.due_date = Some(due_date);
        }

        self.total_amount = new_total;
        self.updated_at = now;
        Ok(())
    }

    /// Remove a `Pending` milestone and decrement the ledger by its amount.
    pub fn delete_milestone(&mut self, actor_id: &str, milestone_id: Uuid, now: i64) -> Result<()> {
        self.require_employer(actor_id)?;

        let milestone = self
            .milestone(milestone_id)
            .ok_or(EngineError::MilestoneNotFound)?;

        match milestone.status {
            MilestoneStatus::Pending => {}
            MilestoneStatus::Submitted | MilestoneStatus::Released | MilestoneStatus::Delivered => {
                return Err(EngineError::InvalidTransition(format!(
                    "only pending milestones may be deleted, current status is {}",
                    milestone.status
                )))
            }
        }

        let new_total = checked_total(self.total_amount, -milestone.amount)?;
        self.milestones.retain(|m| m.id != milestone_id);
        self.total_amount = new_total;
        self.updated_at = now;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Workflow transitions (forward-only)
    // ─────────────────────────────────────────────────────────

    /// Developer submits work: `Pending → Submitted`.
    pub fn submit_milestone(
        &mut self,
        actor_id: &str,
        milestone_id: Uuid,
        submission_link: &str,
        submission_note: Option<&str>,
        now: i64,
    ) -> Result<()> {
        self.require_developer(actor_id)?;
        let link = normalized_link(submission_link, "submission link")?;

        let milestone = self
            .milestone_mut(milestone_id)
            .ok_or(EngineError::MilestoneNotFound)?;

        match milestone.status {
            MilestoneStatus::Pending => {}
            MilestoneStatus::Submitted | MilestoneStatus::Released | MilestoneStatus::Delivered => {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot submit a {} milestone",
                    milestone.status
                )))
            }
        }

        milestone.status = MilestoneStatus::Submitted;
        milestone.submission_link = Some(link);
        milestone.submission_note = submission_note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.updated_at = now;
        Ok(())
    }

    /// Employer attests review and off-platform payment:
    /// `Submitted → Released`. No funds move inside the system.
    pub fn release_milestone(&mut self, actor_id: &str, milestone_id: Uuid, now: i64) -> Result<()> {
        self.require_employer(actor_id)?;

        let milestone = self
            .milestone_mut(milestone_id)
            .ok_or(EngineError::MilestoneNotFound)?;

        match milestone.status {
            MilestoneStatus::Submitted => {}
            MilestoneStatus::Pending | MilestoneStatus::Released | MilestoneStatus::Delivered => {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot release a {} milestone",
                    milestone.status
                )))
            }
        }

        milestone.status = MilestoneStatus::Released;
        self.updated_at = now;
        Ok(())
    }

    /// Developer hands off the final artifact: `Released → Delivered`.
    ///
    /// `final_file_url` is the storage collaborator's URL for an optional
    /// binary upload; the upload must have succeeded *before* this is called
    /// so a failed upload leaves the milestone `Released`.
    pub fn deliver_milestone(
        &mut self,
        actor_id: &str,
        milestone_id: Uuid,
        final_link: &str,
        final_file_url: Option<String>,
        now: i64,
    ) -> Result<()> {
        self.require_developer(actor_id)?;
        let link = normalized_link(final_link, "final link")?;

        let milestone = self
            .milestone_mut(milestone_id)
            .ok_or(EngineError::MilestoneNotFound)?;

        match milestone.status {
            MilestoneStatus::Released => {}
            MilestoneStatus::Pending | MilestoneStatus::Submitted | MilestoneStatus::Delivered => {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot deliver a {} milestone",
                    milestone.status
                )))
            }
        }

        milestone.status = MilestoneStatus::Delivered;
        milestone.final_link = Some(link);
        milestone.final_file_url = final_file_url;
        self.updated_at = now;
        Ok(())
    }
}
