//! # Contract & Milestone Lifecycle Engine
//!
//! Domain core of the freelance-marketplace backend: the mechanism by which
//! an employer and a developer agree on paid milestones, move work through
//! review / payment / delivery stages, and resolve disagreements.
//!
//! | Concern         | Module                                   |
//! |-----------------|------------------------------------------|
//! | Entities, enums | [`types`]                                |
//! | Milestone FSM + amount ledger | [`milestone`]              |
//! | Contract FSM + arbitration    | [`contract`]               |
//! | Authorization guard           | [`authz`]                  |
//! | Error taxonomy                | [`error`]                  |
//!
//! The crate is pure: no I/O, no async, no storage. The HTTP service in
//! `backend/api` loads a [`Contract`] aggregate, applies an operation here
//! (which performs every validation, authorization and status check), and
//! then persists the outcome with conditional updates that re-check the
//! stored status at commit time.
//!
//! No real money moves anywhere in this engine: `release` is a human
//! attestation that payment happened off-platform, and the amount ledger is
//! a running total, not an accounting system.

pub mod authz;
pub mod contract;
pub mod error;
pub mod milestone;
pub mod types;

#[cfg(test)]
mod invariants;

pub use authz::AdminAuthority;
pub use error::{EngineError, Result};
pub use types::{
    Contract, ContractStatus, Milestone, MilestoneEdit, MilestoneInput, MilestoneStatus,
    PaymentDetails, PaymentMethod, Resolution,
};
