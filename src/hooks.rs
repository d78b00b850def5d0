//! Collaborator hooks
//!
//! The engine never talks to mail, webhooks or token services directly.
//! Transitions record notifications in an [`Outbox`]; the outbox is delivered
//! to an [`ApprovalHooks`] implementation once the mutation has committed.
//! Artifact revocation is the one synchronous call, because its failure must
//! abort a restart.

use crate::error::{HookError, RevocationError};
use crate::step::Step;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Cross-cutting events emitted by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEvent {
    /// An individual step was approved
    StepApproved,
    /// A composite step had all of its children approved
    StepCompleted,
}

impl DomainEvent {
    pub fn name(self) -> &'static str {
        match self {
            DomainEvent::StepApproved => "step_approved",
            DomainEvent::StepCompleted => "step_completed",
        }
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// External side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    StepApproved(Step),
    BranchAlreadySatisfied(Step),
    Event(DomainEvent, Step),
}

/// Collaborators invoked around step transitions.
///
/// Every method has a default so implementors only override what they
/// deliver. The default revocation reports that no artifact exists.
pub trait ApprovalHooks: Send + Sync {
    fn notify_step_approved(&self, _step: &Step) -> Result<(), HookError> {
        Ok(())
    }

    fn notify_branch_already_satisfied(&self, _step: &Step) -> Result<(), HookError> {
        Ok(())
    }

    fn revoke_external_artifact(&self, _step: &Step) -> Result<(), RevocationError> {
        Err(RevocationError::NotFound)
    }

    fn dispatch_domain_event(&self, _event: DomainEvent, _step: &Step) -> Result<(), HookError> {
        Ok(())
    }
}

/// Notifications collected during one mutation
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Notification>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) {
        self.pending.push(notification);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.pending
    }

    /// Hand every notification to the collaborators.
    ///
    /// Failures are logged and dropped: the transition that produced them
    /// has already been committed.
    pub fn deliver(self, hooks: &dyn ApprovalHooks) {
        for notification in self.pending {
            let result = match &notification {
                Notification::StepApproved(step) => hooks.notify_step_approved(step),
                Notification::BranchAlreadySatisfied(step) => {
                    hooks.notify_branch_already_satisfied(step)
                }
                Notification::Event(event, step) => hooks.dispatch_domain_event(*event, step),
            };
            if let Err(e) = result {
                warn!("Notification {} failed: {}", notification_label(&notification), e);
            }
        }
    }
}

fn notification_label(notification: &Notification) -> String {
    match notification {
        Notification::StepApproved(step) => format!("step_approved({})", step.id),
        Notification::BranchAlreadySatisfied(step) => format!("already_satisfied({})", step.id),
        Notification::Event(event, step) => format!("{}({})", event, step.id),
    }
}

/// Hooks that only log; the default collaborator wiring
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl ApprovalHooks for TracingHooks {
    fn notify_step_approved(&self, step: &Step) -> Result<(), HookError> {
        info!(
            step_id = %step.id,
            completed_by = ?step.completed_by().map(|i| i.as_str()),
            "Step approved"
        );
        Ok(())
    }

    fn notify_branch_already_satisfied(&self, step: &Step) -> Result<(), HookError> {
        debug!(step_id = %step.id, "Branch already satisfied");
        Ok(())
    }

    fn dispatch_domain_event(&self, event: DomainEvent, step: &Step) -> Result<(), HookError> {
        info!(step_id = %step.id, event = %event, "Domain event");
        Ok(())
    }
}
