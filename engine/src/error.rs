//! Engine error taxonomy.
//!
//! Every mutating operation fails with exactly one of these before any state
//! is touched; the first failing check short-circuits.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or missing input (empty title, non-positive amount, blank
    /// submission link, ...).
    #[error("{0}")]
    Validation(String),

    /// The caller is not the party this operation designates.
    #[error("{0}")]
    Forbidden(&'static str),

    /// The milestone id does not resolve within its contract.
    #[error("milestone not found")]
    MilestoneNotFound,

    /// The current status does not permit the requested transition.
    #[error("{0}")]
    InvalidTransition(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
