//! Approver policies
//!
//! A policy turns request attributes into an ordered list of tiered
//! approvers. Consecutive approvers sharing a tier approve in parallel;
//! tiers approve serially.

mod mailboxes;
mod work_order;

pub use mailboxes::{MailboxRole, Mailboxes, OrganizationCodes};
pub use work_order::{ExpenseType, WorkOrder, WorkOrderPolicy};

use crate::error::ApiResult;
use crate::manager::DesiredShape;
use crate::step::Identity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TieredApprover {
    pub identity: Identity,
    pub tier: u32,
}

impl TieredApprover {
    pub fn new(identity: impl Into<Identity>, tier: u32) -> Self {
        Self {
            identity: identity.into(),
            tier,
        }
    }
}

/// What a policy wants for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub approvers: Vec<TieredApprover>,
    /// Notification-only recipients
    pub observers: Vec<Identity>,
}

impl PolicyDecision {
    pub fn approvals(approvers: Vec<TieredApprover>) -> Self {
        Self {
            approvers,
            observers: Vec::new(),
        }
    }

    /// No approvals; everyone listed is only notified
    pub fn bypass(observers: Vec<Identity>) -> Self {
        let mut unique: Vec<Identity> = Vec::with_capacity(observers.len());
        for observer in observers {
            if !unique.contains(&observer) {
                unique.push(observer);
            }
        }
        Self {
            approvers: Vec::new(),
            observers: unique,
        }
    }

    pub fn approver_identities(&self) -> Vec<&Identity> {
        self.approvers.iter().map(|a| &a.identity).collect()
    }

    /// Serial chain of tiers; a tier with several approvers becomes a
    /// parallel block. `None` when no approval is required.
    pub fn desired_shape(&self) -> Option<DesiredShape> {
        let mut tiers: Vec<(u32, Vec<DesiredShape>)> = Vec::new();
        for approver in &self.approvers {
            let leaf = DesiredShape::approver(approver.identity.clone());
            match tiers.last_mut() {
                Some((tier, members)) if *tier == approver.tier => members.push(leaf),
                _ => tiers.push((approver.tier, vec![leaf])),
            }
        }
        if tiers.is_empty() {
            return None;
        }

        let members = tiers
            .into_iter()
            .filter_map(|(_, mut members)| match members.len() {
                0 => None,
                1 => members.pop(),
                _ => Some(DesiredShape::parallel(members)),
            })
            .collect();
        Some(DesiredShape::serial(members))
    }
}

/// Computes who must approve a request
pub trait ApproverPolicy: Send + Sync {
    type Request;

    fn decide(&self, request: &Self::Request) -> ApiResult<PolicyDecision>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_desired_shape_groups_tiers() {
        let decision = PolicyDecision::approvals(vec![
            TieredApprover::new("ao", 0),
            TieredApprover::new("b1", 1),
            TieredApprover::new("b2", 1),
            TieredApprover::new("final", 2),
        ]);
        assert_eq!(
            decision.desired_shape(),
            Some(DesiredShape::serial(vec![
                DesiredShape::approver("ao"),
                DesiredShape::parallel_of(["b1", "b2"]),
                DesiredShape::approver("final"),
            ]))
        );
    }

    #[test]
    fn test_empty_decision_has_no_shape() {
        assert_eq!(PolicyDecision::default().desired_shape(), None);
    }

    #[test]
    fn test_bypass_deduplicates_observers() {
        let decision = PolicyDecision::bypass(vec![
            Identity::from("ao"),
            Identity::from("budget"),
            Identity::from("ao"),
        ]);
        assert!(decision.approvers.is_empty());
        assert_eq!(
            decision.observers,
            vec![Identity::from("ao"), Identity::from("budget")]
        );
        assert_eq!(decision.desired_shape(), None);
    }
}
