//! Application state management
//!
//! Wires settings, collaborators and the approval service together.

use crate::config::Settings;
use crate::hooks::{ApprovalHooks, TracingHooks};
use crate::policy::WorkOrderPolicy;
use crate::proposal::ApprovalService;
use std::sync::Arc;

/// Application state shared across tasks
pub struct AppState {
    pub settings: Settings,

    /// Proposal service (has internal locking)
    pub service: ApprovalService,

    /// Work order approver policy built from the configured mailboxes
    pub policy: WorkOrderPolicy,
}

impl AppState {
    /// Create state with the logging collaborators
    pub fn new(settings: Settings) -> Self {
        Self::with_hooks(settings, Arc::new(TracingHooks))
    }

    pub fn with_hooks(settings: Settings, hooks: Arc<dyn ApprovalHooks>) -> Self {
        let service = ApprovalService::new(hooks, settings.status);
        let policy = WorkOrderPolicy::new(settings.mailboxes.clone(), settings.organizations.clone());
        Self {
            settings,
            service,
            policy,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ExpenseType, MailboxRole, WorkOrder};
    use crate::proposal::ProposalStatus;
    use crate::step::Identity;

    #[tokio::test]
    async fn test_state_evaluates_work_order() {
        let mut settings = Settings::default();
        settings.mailboxes.set(MailboxRole::Ba80Budget, "ba80@example.gov");
        let state: SharedState = Arc::new(AppState::new(settings));

        let order = WorkOrder {
            requester: Identity::from("requester@example.gov"),
            approving_official: Identity::from("ao@example.gov"),
            expense_type: ExpenseType::Ba80,
            organization: None,
            emergency: false,
        };
        let proposal = state.service.create_proposal(order.requester.clone()).await.unwrap();
        let outcome = state
            .service
            .apply_policy(proposal.id, &state.policy, &order)
            .await
            .unwrap();
        assert!(outcome.changed);

        let proposal = state.service.get(proposal.id).await.unwrap();
        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert_eq!(
            proposal.currently_actionable_assignees(),
            vec![Identity::from("ao@example.gov")]
        );
    }
}
