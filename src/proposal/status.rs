//! Status aggregation
//!
//! Derives a proposal's status from the root of its approval tree.

use super::ProposalStatus;
use crate::step::Step;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPolicy {
    /// Let a fully approved tree move a cancelled proposal to approved
    pub resurrect_cancelled: bool,
}

impl StatusPolicy {
    /// Status a proposal should hold given its current status and root step.
    ///
    /// No root, or an approved root, means approved. Anything else is
    /// pending, except that cancelled is sticky.
    pub fn recompute(&self, current: ProposalStatus, root: Option<&Step>) -> ProposalStatus {
        let satisfied = root.map_or(true, Step::is_approved);
        match (current, satisfied) {
            (ProposalStatus::Cancelled, true) if self.resurrect_cancelled => ProposalStatus::Approved,
            (ProposalStatus::Cancelled, _) => ProposalStatus::Cancelled,
            (_, true) => ProposalStatus::Approved,
            (_, false) => ProposalStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{GroupKind, StepStatus};

    fn root(status: StepStatus) -> Step {
        let mut step = Step::composite(GroupKind::Serial, 1);
        step.status = status;
        step
    }

    #[test]
    fn test_missing_root_is_approved() {
        let policy = StatusPolicy::default();
        assert_eq!(policy.recompute(ProposalStatus::Pending, None), ProposalStatus::Approved);
    }

    #[test]
    fn test_root_status_drives_proposal() {
        let policy = StatusPolicy::default();
        let approved = root(StepStatus::Approved);
        let actionable = root(StepStatus::Actionable);

        assert_eq!(
            policy.recompute(ProposalStatus::Pending, Some(&approved)),
            ProposalStatus::Approved
        );
        assert_eq!(
            policy.recompute(ProposalStatus::Approved, Some(&actionable)),
            ProposalStatus::Pending
        );
        assert_eq!(
            policy.recompute(ProposalStatus::Pending, Some(&root(StepStatus::Pending))),
            ProposalStatus::Pending
        );
    }

    #[test]
    fn test_cancelled_is_sticky_by_default() {
        let policy = StatusPolicy::default();
        assert_eq!(
            policy.recompute(ProposalStatus::Cancelled, Some(&root(StepStatus::Actionable))),
            ProposalStatus::Cancelled
        );
        assert_eq!(
            policy.recompute(ProposalStatus::Cancelled, Some(&root(StepStatus::Approved))),
            ProposalStatus::Cancelled
        );
        assert_eq!(policy.recompute(ProposalStatus::Cancelled, None), ProposalStatus::Cancelled);
    }

    #[test]
    fn test_full_approval_can_resurrect_cancelled() {
        let policy = StatusPolicy {
            resurrect_cancelled: true,
        };
        assert_eq!(
            policy.recompute(ProposalStatus::Cancelled, Some(&root(StepStatus::Approved))),
            ProposalStatus::Approved
        );
        assert_eq!(
            policy.recompute(ProposalStatus::Cancelled, Some(&root(StepStatus::Actionable))),
            ProposalStatus::Cancelled
        );
    }
}
