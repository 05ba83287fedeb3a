//! Authorization guard.
//!
//! Every mutating operation declares the exact identity permitted:
//! employer-only, developer-only, either-party, or admin-only. Party checks
//! are opaque string comparisons against the two owner fields and run before
//! any state is read for mutation purposes.
//!
//! Admin arbitration deliberately does *not* flow through the party guard:
//! it is modeled as a distinct [`AdminAuthority`] capability so the bypass
//! path is auditable and testable in isolation, rather than an inline
//! `role == admin` special case.

use crate::error::{EngineError, Result};
use crate::types::Contract;

impl Contract {
    /// Require the caller to be the contract's employer.
    pub fn require_employer(&self, actor_id: &str) -> Result<()> {
        if actor_id == self.employer_id {
            Ok(())
        } else {
            Err(EngineError::Forbidden(
                "only the contract employer may perform this action",
            ))
        }
    }

    /// Require the caller to be the contract's developer.
    pub fn require_developer(&self, actor_id: &str) -> Result<()> {
        if actor_id == self.developer_id {
            Ok(())
        } else {
            Err(EngineError::Forbidden(
                "only the contract developer may perform this action",
            ))
        }
    }

    /// Require the caller to be one of the two contract parties.
    pub fn require_party(&self, actor_id: &str) -> Result<()> {
        if actor_id == self.employer_id || actor_id == self.developer_id {
            Ok(())
        } else {
            Err(EngineError::Forbidden(
                "only a contract party may perform this action",
            ))
        }
    }

    /// Whether `actor_id` may read this contract (either party; admins are
    /// granted access by the caller holding an [`AdminAuthority`]).
    pub fn is_party(&self, actor_id: &str) -> bool {
        actor_id == self.employer_id || actor_id == self.developer_id
    }
}

/// Capability held only by an arbitrating admin.
///
/// Constructing one is the HTTP layer's responsibility (it alone talks to
/// the identity collaborator); the engine trusts the capability, not a role
/// string.
#[derive(Clone, Debug)]
pub struct AdminAuthority {
    admin_id: String,
}

impl AdminAuthority {
    pub fn new(admin_id: impl Into<String>) -> Self {
        Self {
            admin_id: admin_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.admin_id
    }
}
