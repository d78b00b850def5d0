//! Proposal data models
//!
//! A proposal is the business request routed through an approval tree.

use super::StatusPolicy;
use crate::error::{validation_error, ApiResult};
use crate::step::{Identity, Step, StepKind};
use crate::tree::ApprovalTree;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Proposal status, derived from the approval tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Waiting on at least one approval
    Pending,
    /// Every required approval is in
    Approved,
    /// Withdrawn; not reverted by tree changes
    Cancelled,
}

impl Default for ProposalStatus {
    fn default() -> Self {
        ProposalStatus::Pending
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: Uuid,
    pub requester: Identity,
    pub status: ProposalStatus,
    /// Approval steps; the tree root is the proposal's root step
    pub tree: ApprovalTree,
    /// Notification-only recipients
    pub observers: Vec<Identity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(requester: Identity) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requester,
            status: ProposalStatus::Pending,
            tree: ApprovalTree::new(),
            observers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn root_step(&self) -> Option<&Step> {
        self.tree.root()
    }

    pub fn is_serial(&self) -> bool {
        self.root_step()
            .is_some_and(|s| s.kind() == StepKind::Serial)
    }

    pub fn is_parallel(&self) -> bool {
        self.root_step()
            .is_some_and(|s| s.kind() == StepKind::Parallel)
    }

    pub fn individual_steps(&self) -> Vec<&Step> {
        self.tree.individual_steps()
    }

    pub fn approvers(&self) -> Vec<Identity> {
        self.tree.approvers()
    }

    pub fn currently_actionable_assignees(&self) -> Vec<Identity> {
        self.tree.currently_actionable_assignees()
    }

    /// Identities that may never be assigned a step
    pub fn ineligible_approvers(&self) -> Vec<Identity> {
        vec![self.requester.clone()]
    }

    /// Add a notification-only recipient. The requester may observe.
    ///
    /// Returns false if already present.
    pub fn add_observer(&mut self, observer: Identity) -> ApiResult<bool> {
        if observer.is_blank() {
            return Err(validation_error("Observer cannot be blank"));
        }
        if self.observers.contains(&observer) {
            return Ok(false);
        }
        self.observers.push(observer);
        self.updated_at = Utc::now();
        Ok(true)
    }

    /// Everyone who hears about this proposal: requester, approvers, then
    /// observers, without duplicates
    pub fn subscribers(&self) -> Vec<Identity> {
        let mut out: Vec<Identity> = Vec::new();
        let all = std::iter::once(self.requester.clone())
            .chain(self.approvers())
            .chain(self.observers.iter().cloned());
        for identity in all {
            if !out.contains(&identity) {
                out.push(identity);
            }
        }
        out
    }

    pub fn cancel(&mut self) {
        self.status = ProposalStatus::Cancelled;
        self.updated_at = Utc::now();
    }

    /// Recompute status from the approval tree; returns the new status
    pub fn reset_status(&mut self, policy: &StatusPolicy) -> ProposalStatus {
        let status = policy.recompute(self.status, self.tree.root());
        if status != self.status {
            self.status = status;
            self.updated_at = Utc::now();
        }
        status
    }
}
