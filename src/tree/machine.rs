//! Step state machine
//!
//! | event        | pending    | actionable | approved                    |
//! |--------------|------------|------------|-----------------------------|
//! | `initialize` | actionable | (no-op)    | (no-op, announce satisfied) |
//! | `approve`    | error      | approved   | error                       |
//! | `restart`    | pending    | pending    | pending                     |
//!
//! Groups never receive `approve`; their status is a fold over their children
//! recomputed on every child transition.
//!
//! A failed revocation can leave the tree partly transitioned. Callers that
//! need all-or-nothing semantics run transitions on a copy and swap it in.

use super::ApprovalTree;
use crate::error::{ApiResult, AppError, RevocationError};
use crate::hooks::{ApprovalHooks, DomainEvent, Notification, Outbox};
use crate::step::{Identity, StepId, StepKind, StepStatus};
use chrono::Utc;
use tracing::{debug, info};

impl ApprovalTree {
    /// `initialize`: make a step (and whatever it governs) actionable
    pub fn initialize(
        &mut self,
        id: StepId,
        hooks: &dyn ApprovalHooks,
        outbox: &mut Outbox,
    ) -> ApiResult<StepStatus> {
        match self.step(id)?.kind() {
            StepKind::Individual => self.initialize_leaf(id, outbox),
            StepKind::Parallel => {
                for child in self.ordered_children(id) {
                    self.initialize(child, hooks, outbox)?;
                }
                self.settle(id, outbox)
            }
            StepKind::Serial => {
                self.walk_serial(id, true, hooks, outbox)?;
                self.settle(id, outbox)
            }
        }
    }

    fn initialize_leaf(&mut self, id: StepId, outbox: &mut Outbox) -> ApiResult<StepStatus> {
        let step = self.step_mut(id)?;
        match step.status {
            StepStatus::Pending => {
                step.status = StepStatus::Actionable;
                step.touch();
                debug!(step_id = %id, assignee = ?step.assignee().map(|a| a.as_str()), "Step actionable");
            }
            StepStatus::Actionable => {}
            StepStatus::Approved => {
                outbox.push(Notification::BranchAlreadySatisfied(step.clone()));
            }
        }
        Ok(step.status)
    }

    /// `approve`: record the approval of an actionable leaf and let the
    /// owning groups react
    pub fn approve(
        &mut self,
        id: StepId,
        completer: Identity,
        hooks: &dyn ApprovalHooks,
        outbox: &mut Outbox,
    ) -> ApiResult<()> {
        let step = self.step(id)?;
        if step.is_composite() || !step.is_actionable() {
            return Err(AppError::InvalidTransition {
                step: id,
                status: step.status,
                event: "approve",
            });
        }

        let step = self.step_mut(id)?;
        let now = Utc::now();
        step.status = StepStatus::Approved;
        step.approved_at = Some(now);
        step.updated_at = now;
        step.set_completer(Some(completer));
        info!(
            step_id = %id,
            completed_by = ?step.completed_by().map(|c| c.as_str()),
            "Step approved"
        );
        outbox.push(Notification::StepApproved(step.clone()));
        outbox.push(Notification::Event(DomainEvent::StepApproved, step.clone()));

        let parent = step.parent;
        self.propagate_satisfied(parent, hooks, outbox)
    }

    /// `restart`: return a step and its whole subtree to pending.
    ///
    /// Outstanding artifacts are revoked before anything transitions; if a
    /// present artifact refuses to revoke the error is returned and no
    /// status changes. Re-initializing from the root is the caller's call.
    pub fn restart(&mut self, id: StepId, hooks: &dyn ApprovalHooks) -> ApiResult<()> {
        self.step(id)?;
        let members = self.subtree(id);

        for member in &members {
            if self.step(*member)?.kind() == StepKind::Individual {
                self.revoke(*member, hooks)?;
            }
        }

        for member in &members {
            let step = self.step_mut(*member)?;
            step.status = StepStatus::Pending;
            step.approved_at = None;
            step.set_completer(None);
            step.touch();
        }
        info!(step_id = %id, steps = members.len(), "Step restarted");

        for ancestor in self.ancestors(id) {
            self.refold(ancestor)?;
        }
        Ok(())
    }

    /// Ask the collaborator to revoke a step's external artifact.
    ///
    /// A missing artifact is the common case and is not an error.
    pub(crate) fn revoke(&self, id: StepId, hooks: &dyn ApprovalHooks) -> ApiResult<()> {
        let step = self.step(id)?;
        match hooks.revoke_external_artifact(step) {
            Ok(()) => {
                debug!(step_id = %id, "Artifact revoked");
                Ok(())
            }
            Err(RevocationError::NotFound) => Ok(()),
            Err(RevocationError::Failed(reason)) => Err(AppError::Revocation { step: id, reason }),
        }
    }

    /// Initialize the first open child of a serial group and park every
    /// open child after it.
    ///
    /// With `announce_satisfied` off, already approved children are skipped
    /// without a notification; used when advancing after an approval.
    fn walk_serial(
        &mut self,
        id: StepId,
        announce_satisfied: bool,
        hooks: &dyn ApprovalHooks,
        outbox: &mut Outbox,
    ) -> ApiResult<()> {
        let mut open_found = false;
        for child in self.ordered_children(id) {
            if open_found {
                self.park(child, hooks)?;
                continue;
            }
            let status = if !announce_satisfied && self.step(child)?.is_approved() {
                StepStatus::Approved
            } else {
                self.initialize(child, hooks, outbox)?
            };
            if status != StepStatus::Approved {
                open_found = true;
            }
        }
        Ok(())
    }

    /// Return actionable leaves under `id` to pending, keeping approvals
    fn park(&mut self, id: StepId, hooks: &dyn ApprovalHooks) -> ApiResult<()> {
        if self.step(id)?.kind() == StepKind::Individual {
            if self.step(id)?.is_actionable() {
                self.revoke(id, hooks)?;
                let step = self.step_mut(id)?;
                step.status = StepStatus::Pending;
                step.touch();
                debug!(step_id = %id, "Step parked until its turn");
            }
            return Ok(());
        }
        for child in self.ordered_children(id) {
            self.park(child, hooks)?;
        }
        self.refold(id)
    }

    /// Walk up from a satisfied child, advancing serial groups and
    /// completing groups whose children are all approved
    fn propagate_satisfied(
        &mut self,
        mut parent: Option<StepId>,
        hooks: &dyn ApprovalHooks,
        outbox: &mut Outbox,
    ) -> ApiResult<()> {
        while let Some(group) = parent {
            let before = self.step(group)?.status;
            if self.step(group)?.kind() == StepKind::Serial {
                self.walk_serial(group, false, hooks, outbox)?;
            }
            let after = self.settle(group, outbox)?;
            if after != StepStatus::Approved || before == StepStatus::Approved {
                break;
            }
            parent = self.step(group)?.parent;
        }
        Ok(())
    }

    /// Recompute a group's status, emitting completion on entry to approved
    fn settle(&mut self, id: StepId, outbox: &mut Outbox) -> ApiResult<StepStatus> {
        let derived = self.derived_status(id)?;
        let step = self.step_mut(id)?;
        if step.status == derived {
            return Ok(derived);
        }
        step.status = derived;
        step.touch();
        if derived == StepStatus::Approved {
            step.approved_at = Some(step.updated_at);
            info!(step_id = %id, kind = ?step.kind(), "Group completed");
            outbox.push(Notification::Event(DomainEvent::StepCompleted, step.clone()));
        } else {
            step.approved_at = None;
        }
        Ok(derived)
    }

    /// Recompute a group's status without side effects
    fn refold(&mut self, id: StepId) -> ApiResult<()> {
        let derived = self.derived_status(id)?;
        let step = self.step_mut(id)?;
        if step.status != derived {
            step.status = derived;
            if derived != StepStatus::Approved {
                step.approved_at = None;
            }
            step.touch();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::hooks::testing::RecordingHooks;
    use crate::hooks::Outbox;
    use crate::step::{GroupKind, Identity, LeafRole, StepId, StepStatus};
    use crate::tree::ApprovalTree;

    fn id(s: &str) -> Identity {
        Identity::from(s)
    }

    fn build(kind: GroupKind, names: &[&str]) -> (ApprovalTree, StepId, Vec<StepId>) {
        let mut tree = ApprovalTree::new();
        let root = tree.create_root(kind);
        let leaves = names
            .iter()
            .map(|n| tree.add_individual(root, id(n), LeafRole::Approval).unwrap())
            .collect();
        (tree, root, leaves)
    }

    fn status(tree: &ApprovalTree, step: StepId) -> StepStatus {
        tree.step(step).unwrap().status
    }

    fn assert_serial_invariant(tree: &ApprovalTree, root: StepId) {
        let children = tree.ordered_children(root);
        let actionable: Vec<_> = children
            .iter()
            .filter(|c| tree.step(**c).unwrap().is_actionable())
            .collect();
        assert!(actionable.len() <= 1, "more than one actionable serial child");
        let first_open = children.iter().find(|c| !tree.step(**c).unwrap().is_approved());
        if let Some(step) = actionable.first() {
            assert_eq!(Some(*step), first_open);
        }
    }

    #[test]
    fn test_initialize_serial_only_first_actionable() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Serial, &["a", "b", "c"]);
        let mut outbox = Outbox::new();

        let result = tree.initialize(root, &hooks, &mut outbox).unwrap();
        assert_eq!(result, StepStatus::Actionable);
        assert_eq!(status(&tree, leaves[0]), StepStatus::Actionable);
        assert_eq!(status(&tree, leaves[1]), StepStatus::Pending);
        assert_eq!(status(&tree, leaves[2]), StepStatus::Pending);
        assert_eq!(tree.count_with_status(StepStatus::Actionable), 2);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_initialize_parallel_all_actionable() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Parallel, &["a", "b", "c"]);
        let mut outbox = Outbox::new();

        tree.initialize(root, &hooks, &mut outbox).unwrap();
        for leaf in &leaves {
            assert_eq!(status(&tree, *leaf), StepStatus::Actionable);
        }
        assert_eq!(tree.count_with_status(StepStatus::Actionable), 4);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, _) = build(GroupKind::Parallel, &["a", "b"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        let snapshot = tree.clone();

        tree.initialize(root, &hooks, &mut outbox).unwrap();
        assert_eq!(tree, snapshot);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_initialize_approved_leaf_announces_satisfied() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Serial, &["a", "b"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        tree.approve(leaves[0], id("a"), &hooks, &mut outbox).unwrap();

        let mut outbox = Outbox::new();
        let result = tree.initialize(leaves[0], &hooks, &mut outbox).unwrap();
        assert_eq!(result, StepStatus::Approved);
        assert_eq!(outbox.len(), 1);
        outbox.deliver(&hooks);
        assert_eq!(hooks.count("satisfied:"), 1);
    }

    #[test]
    fn test_serial_approval_advances_one_at_a_time() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Serial, &["a", "b", "c"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        assert_serial_invariant(&tree, root);

        for (i, leaf) in leaves.iter().enumerate() {
            tree.approve(*leaf, id("x"), &hooks, &mut outbox).unwrap();
            assert_serial_invariant(&tree, root);
            if let Some(next) = leaves.get(i + 1) {
                assert_eq!(status(&tree, *next), StepStatus::Actionable);
                assert_eq!(status(&tree, root), StepStatus::Actionable);
            }
        }

        let root_step = tree.step(root).unwrap();
        assert!(root_step.is_approved());
        assert!(root_step.approved_at.is_some());
        outbox.deliver(&hooks);
        assert_eq!(hooks.count("approved:"), 3);
        assert_eq!(hooks.count("event:step_approved"), 3);
        assert_eq!(hooks.count("event:step_completed"), 1);
        assert_eq!(hooks.count("satisfied:"), 0);
    }

    #[test]
    fn test_parallel_completes_when_all_approved() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Parallel, &["a", "b"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();

        tree.approve(leaves[1], id("b"), &hooks, &mut outbox).unwrap();
        assert_eq!(status(&tree, root), StepStatus::Actionable);
        assert_eq!(status(&tree, leaves[0]), StepStatus::Actionable);

        tree.approve(leaves[0], id("a"), &hooks, &mut outbox).unwrap();
        assert_eq!(status(&tree, root), StepStatus::Approved);
    }

    #[test]
    fn test_approve_requires_actionable() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Serial, &["a", "b"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        let before = tree.clone();

        let err = tree.approve(leaves[1], id("b"), &hooks, &mut outbox).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition { status: StepStatus::Pending, event: "approve", .. }
        ));
        assert_eq!(tree, before);

        let err = tree.approve(root, id("b"), &hooks, &mut outbox).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        tree.approve(leaves[0], id("a"), &hooks, &mut outbox).unwrap();
        let err = tree.approve(leaves[0], id("a"), &hooks, &mut outbox).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition { status: StepStatus::Approved, .. }
        ));
    }

    #[test]
    fn test_approve_records_completer() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Parallel, &["a"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        tree.approve(leaves[0], id("delegate"), &hooks, &mut outbox).unwrap();

        let leaf = tree.step(leaves[0]).unwrap();
        assert_eq!(leaf.completed_by(), Some(&id("delegate")));
        assert_eq!(leaf.assignee(), Some(&id("a")));
        assert!(leaf.approved_at.is_some());
    }

    #[test]
    fn test_restart_revokes_artifact() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Parallel, &["a", "b"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        hooks.issue_artifact(leaves[0]);

        tree.restart(leaves[0], &hooks).unwrap();
        assert!(!hooks.has_artifact(leaves[0]));
        assert_eq!(status(&tree, leaves[0]), StepStatus::Pending);
        // the sibling is still actionable so the group is too
        assert_eq!(status(&tree, root), StepStatus::Actionable);
    }

    #[test]
    fn test_restart_handles_missing_artifact() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Serial, &["a"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        tree.approve(leaves[0], id("a"), &hooks, &mut outbox).unwrap();

        tree.restart(leaves[0], &hooks).unwrap();
        let leaf = tree.step(leaves[0]).unwrap();
        assert!(leaf.is_pending());
        assert!(leaf.approved_at.is_none());
        assert!(leaf.completer().is_none());
        assert_eq!(status(&tree, root), StepStatus::Pending);
        assert!(tree.step(root).unwrap().approved_at.is_none());
    }

    #[test]
    fn test_restart_fails_when_artifact_stuck() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Parallel, &["a", "b"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        hooks.jam_artifact(leaves[1]);
        let before = tree.clone();

        let err = tree.restart(root, &hooks).unwrap_err();
        assert!(matches!(err, AppError::Revocation { step, .. } if step == leaves[1]));
        assert_eq!(tree, before);
    }

    #[test]
    fn test_restart_group_cascades_then_root_reinitializes() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Serial, &["a", "b"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        tree.approve(leaves[0], id("a"), &hooks, &mut outbox).unwrap();

        tree.restart(root, &hooks).unwrap();
        assert_eq!(tree.count_with_status(StepStatus::Pending), 3);

        tree.initialize(root, &hooks, &mut outbox).unwrap();
        assert_eq!(status(&tree, leaves[0]), StepStatus::Actionable);
        assert_eq!(status(&tree, leaves[1]), StepStatus::Pending);
    }

    #[test]
    fn test_restarting_earlier_serial_leaf_parks_later_one() {
        let hooks = RecordingHooks::new();
        let (mut tree, root, leaves) = build(GroupKind::Serial, &["a", "b"]);
        let mut outbox = Outbox::new();
        tree.initialize(root, &hooks, &mut outbox).unwrap();
        tree.approve(leaves[0], id("a"), &hooks, &mut outbox).unwrap();
        hooks.issue_artifact(leaves[1]);

        tree.restart(leaves[0], &hooks).unwrap();
        tree.initialize(root, &hooks, &mut outbox).unwrap();

        assert_eq!(status(&tree, leaves[0]), StepStatus::Actionable);
        assert_eq!(status(&tree, leaves[1]), StepStatus::Pending);
        assert!(!hooks.has_artifact(leaves[1]));
        assert_serial_invariant(&tree, root);
    }

    #[test]
    fn test_serial_of_parallel_groups() {
        let hooks = RecordingHooks::new();
        let mut tree = ApprovalTree::new();
        let root = tree.create_root(GroupKind::Serial);
        let official = tree.add_individual(root, id("ao"), LeafRole::Approval).unwrap();
        let budget = tree.add_group(root, GroupKind::Parallel).unwrap();
        let b1 = tree.add_individual(budget, id("b1"), LeafRole::Approval).unwrap();
        let b2 = tree.add_individual(budget, id("b2"), LeafRole::Approval).unwrap();
        let buyer = tree.add_individual(root, id("buyer"), LeafRole::Purchase).unwrap();
        let mut outbox = Outbox::new();

        tree.initialize(root, &hooks, &mut outbox).unwrap();
        assert_eq!(tree.currently_actionable_assignees(), vec![id("ao")]);

        tree.approve(official, id("ao"), &hooks, &mut outbox).unwrap();
        assert_eq!(tree.currently_actionable_assignees(), vec![id("b1"), id("b2")]);
        assert_eq!(status(&tree, budget), StepStatus::Actionable);

        tree.approve(b2, id("b2"), &hooks, &mut outbox).unwrap();
        assert_eq!(tree.currently_actionable_assignees(), vec![id("b1")]);

        tree.approve(b1, id("b1"), &hooks, &mut outbox).unwrap();
        assert_eq!(status(&tree, budget), StepStatus::Approved);
        assert_eq!(tree.currently_actionable_assignees(), vec![id("buyer")]);

        tree.approve(buyer, id("buyer"), &hooks, &mut outbox).unwrap();
        assert!(tree.root().unwrap().is_approved());
    }
}
