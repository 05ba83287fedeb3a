#![allow(dead_code)]

//! Invariant assertion helpers shared by the unit tests.

use crate::types::{Contract, ContractStatus, MilestoneStatus};

/// INV-1: under single-writer use the delta-maintained ledger equals the
/// recomputed milestone sum.
pub fn assert_ledger_consistent(contract: &Contract) {
    assert_eq!(
        contract.total_amount,
        contract.milestone_sum(),
        "INV-1 violated: total_amount {} != milestone sum {}",
        contract.total_amount,
        contract.milestone_sum()
    );
}

/// INV-2: milestone amounts are strictly positive.
pub fn assert_amounts_positive(contract: &Contract) {
    for m in &contract.milestones {
        assert!(
            m.amount > 0,
            "INV-2 violated: milestone {} has non-positive amount {}",
            m.id,
            m.amount
        );
    }
}

/// INV-3: milestone status transition validity. Strictly forward, no skips:
///   Pending -> Submitted -> Released -> Delivered
pub fn assert_valid_milestone_transition(from: MilestoneStatus, to: MilestoneStatus) {
    let valid = matches!(
        (from, to),
        (MilestoneStatus::Pending, MilestoneStatus::Submitted)
            | (MilestoneStatus::Submitted, MilestoneStatus::Released)
            | (MilestoneStatus::Released, MilestoneStatus::Delivered)
    );
    assert!(
        valid,
        "INV-3 violated: invalid milestone transition from {from:?} to {to:?}"
    );
}

/// INV-4: contract status transition validity.
///   Active   -> Completed | Cancelled | Disputed
///   Disputed -> Disputed | Completed | Cancelled
///   Completed / Cancelled are terminal; Draft is unreachable.
pub fn assert_valid_contract_transition(from: ContractStatus, to: ContractStatus) {
    let valid = matches!(
        (from, to),
        (ContractStatus::Active, ContractStatus::Completed)
            | (ContractStatus::Active, ContractStatus::Cancelled)
            | (ContractStatus::Active, ContractStatus::Disputed)
            | (ContractStatus::Disputed, ContractStatus::Disputed)
            | (ContractStatus::Disputed, ContractStatus::Completed)
            | (ContractStatus::Disputed, ContractStatus::Cancelled)
    );
    assert!(
        valid,
        "INV-4 violated: invalid contract transition from {from:?} to {to:?}"
    );
}

/// INV-5: a completed contract has no undelivered milestone unless it was
/// completed through dispute resolution.
pub fn assert_completed_all_delivered(contract: &Contract) {
    if contract.status == ContractStatus::Completed {
        assert!(
            contract.all_delivered(),
            "INV-5 violated: completed contract {} has undelivered milestones",
            contract.id
        );
    }
}

/// Run every stateless invariant against a contract snapshot.
pub fn assert_all(contract: &Contract) {
    assert_ledger_consistent(contract);
    assert_amounts_positive(contract);
}
