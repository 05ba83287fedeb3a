//! # Types
//!
//! Shared data structures for the contract & milestone lifecycle engine.
//!
//! ## Design decisions
//!
//! ### Status as a Finite-State Machine
//!
//! [`MilestoneStatus`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! Pending ──► Submitted ──► Released ──► Delivered
//! ```
//!
//! No step may be skipped and no step may be retaken; every transition
//! function checks the current status immediately before applying the change.
//!
//! [`ContractStatus`] composes the milestone machine:
//!
//! ```text
//! Active ──► Completed          (all milestones Delivered, employer)
//! Active ──► Disputed ──► Completed | Cancelled   (admin resolution)
//! Active | Disputed ──► Cancelled (employer termination)
//! ```
//!
//! `Draft` is reserved: the variant exists so exhaustive matches account for
//! it, but no operation currently produces it. `Completed` and `Cancelled`
//! are terminal.
//!
//! ### Stable child ids
//!
//! Milestones are owned children of exactly one contract and carry a UUIDv4
//! assigned at creation. Business logic never leans on storage-layer
//! auto-id semantics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Reserved; unreachable from current operations.
    Draft,
    /// Work in progress; milestones may be added and advanced.
    Active,
    /// All work delivered, or a dispute resolved as release. Terminal.
    Completed,
    /// Terminated by the employer, or a dispute resolved as refund. Terminal.
    Cancelled,
    /// Contested; awaiting admin arbitration.
    Disputed,
}

impl ContractStatus {
    /// Short identifier string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Disputed => "disputed",
        }
    }

    /// Parse a stored identifier back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "disputed" => Some(Self::Disputed),
            _ => None,
        }
    }

    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a milestone, strictly forward-moving.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    /// Awaiting work; the only status in which edits and deletion are legal.
    Pending,
    /// Developer submitted work for employer review.
    Submitted,
    /// Employer attested off-platform payment for the reviewed work.
    Released,
    /// Developer handed off the final artifact. Terminal.
    Delivered,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Released => "released",
            Self::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "submitted" => Some(Self::Submitted),
            "released" => Some(Self::Released),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the developer wishes to be paid off-platform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    MobileMoney,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankTransfer => "bank_transfer",
            Self::MobileMoney => "mobile_money",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bank_transfer" => Some(Self::BankTransfer),
            "mobile_money" => Some(Self::MobileMoney),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Admin decision ending a dispute.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Work stands; contract moves to `Completed`.
    Release,
    /// Work refunded off-platform; contract moves to `Cancelled`.
    Refund,
}

/// Informational payment-method snapshot, last-write-wins.
///
/// Gates nothing in the milestone state machine and moves no funds; it tells
/// the employer how to pay off-platform before calling release.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub method: PaymentMethod,
    pub account_name: Option<String>,
    pub details: String,
    /// Unix epoch seconds of the last overwrite.
    pub updated_at: i64,
}

/// A single payable unit of work, owned by exactly one contract.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: Uuid,
    pub title: String,
    /// Strictly positive, whole currency units.
    pub amount: i64,
    /// Advisory only; triggers no automatic state change.
    pub due_date: Option<i64>,
    pub status: MilestoneStatus,
    pub submission_link: Option<String>,
    pub submission_note: Option<String>,
    pub final_link: Option<String>,
    pub final_file_url: Option<String>,
}

/// Caller-supplied fields for a new milestone.
#[derive(Clone, Debug)]
pub struct MilestoneInput {
    pub title: String,
    pub amount: i64,
    pub due_date: Option<i64>,
}

/// Partial update for a `Pending` milestone; `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct MilestoneEdit {
    pub title: Option<String>,
    pub amount: Option<i64>,
    pub due_date: Option<i64>,
}

/// Agreement between one employer and one developer organizing paid work
/// into milestones. The contract and its milestones form one unit of
/// consistency; milestones are never referenced outside their parent.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: Uuid,
    pub job_id: Option<String>,
    pub employer_id: String,
    pub developer_id: String,
    pub status: ContractStatus,
    /// Running total maintained by deltas on milestone add/edit/delete.
    /// Intended to equal the milestone sum; see [`Contract::milestone_sum`].
    pub total_amount: i64,
    pub payment_details: Option<PaymentDetails>,
    pub milestones: Vec<Milestone>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Contract {
    /// Sum of current milestone amounts, recomputed from the list.
    ///
    /// Callers must not assume perfect agreement with `total_amount`; the
    /// ledger is delta-maintained and divergence is surfaced, not forced.
    pub fn milestone_sum(&self) -> i64 {
        self.milestones.iter().map(|m| m.amount).sum()
    }

    /// True when every milestone is `Delivered` (vacuously true when empty).
    pub fn all_delivered(&self) -> bool {
        self.milestones
            .iter()
            .all(|m| m.status == MilestoneStatus::Delivered)
    }

    pub fn milestone(&self, id: Uuid) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id == id)
    }

    pub(crate) fn milestone_mut(&mut self, id: Uuid) -> Option<&mut Milestone> {
        self.milestones.iter_mut().find(|m| m.id == id)
    }
}
