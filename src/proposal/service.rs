//! Approval service
//!
//! In-memory owner of proposals. Every tree mutation runs under the owning
//! proposal's mutex, on a copy of the proposal that replaces the live one
//! only on success. Notifications go out after the lock is released.

use super::{Proposal, ProposalStatus, StatusPolicy};
use crate::error::{not_found_error, validation_error, ApiResult};
use crate::hooks::{ApprovalHooks, Outbox};
use crate::manager::{Delegations, DesiredShape, ReconcileContext, ReconcileOutcome, StepManager};
use crate::policy::ApproverPolicy;
use crate::step::{Identity, Step, StepId};
use crate::tree::ApprovalTree;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Thread-safe proposal service
pub struct ApprovalService {
    proposals: RwLock<HashMap<Uuid, Arc<Mutex<Proposal>>>>,
    /// Step id to owning proposal id
    step_index: RwLock<HashMap<StepId, Uuid>>,
    delegations: RwLock<Delegations>,
    hooks: Arc<dyn ApprovalHooks>,
    status_policy: StatusPolicy,
}

impl ApprovalService {
    pub fn new(hooks: Arc<dyn ApprovalHooks>, status_policy: StatusPolicy) -> Self {
        Self {
            proposals: RwLock::new(HashMap::new()),
            step_index: RwLock::new(HashMap::new()),
            delegations: RwLock::new(Delegations::new()),
            hooks,
            status_policy,
        }
    }

    pub fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    // =========================================================================
    // PROPOSALS
    // =========================================================================

    /// Open a proposal with no approval tree yet
    pub async fn create_proposal(&self, requester: Identity) -> ApiResult<Proposal> {
        if requester.is_blank() {
            return Err(validation_error("Requester cannot be blank"));
        }
        let proposal = Proposal::new(requester);
        let id = proposal.id;
        self.proposals
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(proposal.clone())));
        info!(proposal_id = %id, requester = %proposal.requester, "Proposal created");
        Ok(proposal)
    }

    /// Get a snapshot of a proposal
    pub async fn get(&self, id: Uuid) -> ApiResult<Proposal> {
        let handle = self.handle(id).await?;
        let proposal = handle.lock().await;
        Ok(proposal.clone())
    }

    pub async fn count(&self) -> usize {
        self.proposals.read().await.len()
    }

    pub async fn cancel(&self, id: Uuid) -> ApiResult<Proposal> {
        let handle = self.handle(id).await?;
        let mut proposal = handle.lock().await;
        proposal.cancel();
        info!(proposal_id = %id, "Proposal cancelled");
        Ok(proposal.clone())
    }

    /// Re-derive a proposal's status from its tree
    pub async fn recompute_status(&self, id: Uuid) -> ApiResult<ProposalStatus> {
        let handle = self.handle(id).await?;
        let mut proposal = handle.lock().await;
        Ok(proposal.reset_status(&self.status_policy))
    }

    /// Assignees who can approve right now, by position then creation order
    pub async fn currently_actionable_assignees(&self, id: Uuid) -> ApiResult<Vec<Identity>> {
        Ok(self.get(id).await?.currently_actionable_assignees())
    }

    /// Every leaf assignee in tree order
    pub async fn approvers(&self, id: Uuid) -> ApiResult<Vec<Identity>> {
        Ok(self.get(id).await?.approvers())
    }

    /// Add a notification-only recipient; false if already observing
    pub async fn add_observer(&self, id: Uuid, observer: Identity) -> ApiResult<bool> {
        let handle = self.handle(id).await?;
        let mut proposal = handle.lock().await;
        let added = proposal.add_observer(observer.clone())?;
        if added {
            debug!(proposal_id = %id, observer = %observer, "Observer added");
        }
        Ok(added)
    }

    /// Subscribers who are not acting as a delegate for one of the
    /// proposal's approvers
    pub async fn subscribers_except_delegates(&self, id: Uuid) -> ApiResult<Vec<Identity>> {
        let proposal = self.get(id).await?;
        let delegates = self.delegates_of_approvers(&proposal).await;
        Ok(proposal
            .subscribers()
            .into_iter()
            .filter(|s| !delegates.contains(s))
            .collect())
    }

    // =========================================================================
    // TREE MUTATIONS
    // =========================================================================

    /// Reconcile a proposal's tree against a desired shape
    pub async fn reconcile(
        &self,
        id: Uuid,
        desired: Option<DesiredShape>,
    ) -> ApiResult<ReconcileOutcome> {
        let handle = self.handle(id).await?;
        let mut proposal = handle.lock().await;

        let mut working = proposal.clone();
        let (outcome, outbox) = self.reconcile_locked(&mut working, desired).await?;
        *proposal = working;
        drop(proposal);

        outbox.deliver(self.hooks.as_ref());
        Ok(outcome)
    }

    /// Evaluate a policy and reconcile the proposal with its decision.
    ///
    /// Observers are merged without duplicates, so applying the same
    /// policy again changes nothing.
    pub async fn apply_policy<P: ApproverPolicy>(
        &self,
        id: Uuid,
        policy: &P,
        request: &P::Request,
    ) -> ApiResult<ReconcileOutcome> {
        let decision = policy.decide(request)?;

        let handle = self.handle(id).await?;
        let mut proposal = handle.lock().await;

        let mut working = proposal.clone();
        for observer in decision.observers.iter().cloned() {
            if working.add_observer(observer.clone())? {
                debug!(proposal_id = %id, observer = %observer, "Observer added");
            }
        }
        let (outcome, outbox) = self
            .reconcile_locked(&mut working, decision.desired_shape())
            .await?;
        *proposal = working;
        drop(proposal);

        outbox.deliver(self.hooks.as_ref());
        Ok(outcome)
    }

    /// Approve an actionable individual step on behalf of `completer`
    pub async fn approve(&self, step_id: StepId, completer: Identity) -> ApiResult<Step> {
        let id = self.proposal_for_step(step_id).await?;
        let handle = self.handle(id).await?;
        let mut proposal = handle.lock().await;

        let mut tree = proposal.tree.clone();
        let mut outbox = Outbox::new();
        tree.approve(step_id, completer, self.hooks.as_ref(), &mut outbox)?;
        let step = tree.step(step_id)?.clone();
        proposal.tree = tree;
        proposal.updated_at = Utc::now();
        let status = proposal.reset_status(&self.status_policy);
        drop(proposal);

        debug!(proposal_id = %id, status = %status, "Proposal status after approval");
        outbox.deliver(self.hooks.as_ref());
        Ok(step)
    }

    /// Restart a step and its subtree, then re-initialize from the root.
    ///
    /// Returns the step as it stands after re-initialization.
    pub async fn restart(&self, step_id: StepId) -> ApiResult<Step> {
        let id = self.proposal_for_step(step_id).await?;
        let handle = self.handle(id).await?;
        let mut proposal = handle.lock().await;

        let mut tree = proposal.tree.clone();
        let mut outbox = Outbox::new();
        tree.restart(step_id, self.hooks.as_ref())?;
        reinitialize(&mut tree, self.hooks.as_ref(), &mut outbox)?;
        let step = tree.step(step_id)?.clone();
        proposal.tree = tree;
        proposal.updated_at = Utc::now();
        proposal.reset_status(&self.status_policy);
        drop(proposal);

        outbox.deliver(self.hooks.as_ref());
        Ok(step)
    }

    /// Restart the whole tree, revoking every outstanding artifact
    pub async fn restart_proposal(&self, id: Uuid) -> ApiResult<Proposal> {
        let handle = self.handle(id).await?;
        let mut proposal = handle.lock().await;

        let mut tree = proposal.tree.clone();
        let mut outbox = Outbox::new();
        if let Some(root) = tree.root_id() {
            tree.restart(root, self.hooks.as_ref())?;
        }
        reinitialize(&mut tree, self.hooks.as_ref(), &mut outbox)?;
        proposal.tree = tree;
        proposal.updated_at = Utc::now();
        proposal.reset_status(&self.status_policy);
        info!(proposal_id = %id, "Proposal restarted");
        let snapshot = proposal.clone();
        drop(proposal);

        outbox.deliver(self.hooks.as_ref());
        Ok(snapshot)
    }

    // =========================================================================
    // DELEGATION
    // =========================================================================

    /// Let `delegate` act for `principal`; false if already registered
    pub async fn add_delegate(&self, principal: Identity, delegate: Identity) -> ApiResult<bool> {
        if principal.is_blank() || delegate.is_blank() {
            return Err(validation_error("Delegation identities cannot be blank"));
        }
        if principal == delegate {
            return Err(validation_error(format!(
                "{} cannot delegate to themselves",
                principal
            )));
        }
        let added = self
            .delegations
            .write()
            .await
            .add(principal.clone(), delegate.clone());
        if added {
            info!(principal = %principal, delegate = %delegate, "Delegate added");
        }
        Ok(added)
    }

    /// False if the delegation was not registered
    pub async fn remove_delegate(&self, principal: &Identity, delegate: &Identity) -> bool {
        let removed = self.delegations.write().await.remove(principal, delegate);
        if removed {
            info!(principal = %principal, delegate = %delegate, "Delegate removed");
        }
        removed
    }

    /// Whether `identity` may act for any approver on the proposal
    pub async fn is_delegate(&self, id: Uuid, identity: &Identity) -> ApiResult<bool> {
        let proposal = self.get(id).await?;
        let delegates = self.delegates_of_approvers(&proposal).await;
        Ok(delegates.contains(identity))
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn handle(&self, id: Uuid) -> ApiResult<Arc<Mutex<Proposal>>> {
        self.proposals
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found_error(format!("Proposal {} not found", id)))
    }

    async fn proposal_for_step(&self, step_id: StepId) -> ApiResult<Uuid> {
        self.step_index
            .read()
            .await
            .get(&step_id)
            .copied()
            .ok_or_else(|| not_found_error(format!("Step {} not found", step_id)))
    }

    async fn delegates_of_approvers(&self, proposal: &Proposal) -> HashSet<Identity> {
        let delegations = self.delegations.read().await;
        let delegates: HashSet<Identity> = proposal
            .approvers()
            .iter()
            .flat_map(|approver| delegations.delegates_of(approver))
            .cloned()
            .collect();
        delegates
    }

    /// Reconcile a working copy; the caller holds the proposal lock
    async fn reconcile_locked(
        &self,
        proposal: &mut Proposal,
        desired: Option<DesiredShape>,
    ) -> ApiResult<(ReconcileOutcome, Outbox)> {
        let delegations = self.delegations.read().await.clone();
        let ctx = ReconcileContext {
            requester: &proposal.requester,
            delegations: &delegations,
            hooks: self.hooks.as_ref(),
        };
        let result = StepManager::reconcile(&proposal.tree, desired, &ctx)?;

        if result.outcome.changed {
            self.reindex(proposal.id, &proposal.tree, &result.tree).await;
            proposal.tree = result.tree;
            proposal.updated_at = Utc::now();
        }
        let status = proposal.reset_status(&self.status_policy);
        debug!(proposal_id = %proposal.id, status = %status, "Proposal reconciled");
        Ok((result.outcome, result.outbox))
    }

    async fn reindex(&self, id: Uuid, old: &ApprovalTree, new: &ApprovalTree) {
        let mut index = self.step_index.write().await;
        for step in old.steps() {
            index.remove(&step.id);
        }
        for step in new.steps() {
            index.insert(step.id, id);
        }
    }
}

/// Run `initialize` from the root, if there is one
fn reinitialize(
    tree: &mut ApprovalTree,
    hooks: &dyn ApprovalHooks,
    outbox: &mut Outbox,
) -> ApiResult<()> {
    if let Some(root) = tree.root_id() {
        tree.initialize(root, hooks, outbox)?;
    }
    Ok(())
}
