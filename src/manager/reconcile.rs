//! Tree reconciliation
//!
//! Rebuilds a live approval tree into a desired shape while keeping the
//! progress of every leaf whose assignee is still wanted.
//!
//! The rebuild happens on a copy. The caller gets the new tree back and
//! swaps it in, so a failed reconciliation leaves the live tree untouched.
//!
//! Revocations are the exception: they reach the collaborator as they run.
//! Artifacts of deleted leaves are revoked last, after the new tree has
//! initialized. If one revocation fails, any made before it stay revoked.

use super::{Delegations, DesiredShape};
use crate::error::ApiResult;
use crate::hooks::{ApprovalHooks, Outbox};
use crate::step::{validate_assignee, GroupKind, Identity, LeafRole, Step, StepId, StepKind};
use crate::tree::ApprovalTree;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

/// Inputs reconciliation needs beyond the two trees
pub struct ReconcileContext<'a> {
    /// Requester of the owning proposal; never a valid assignee
    pub requester: &'a Identity,
    pub delegations: &'a Delegations,
    pub hooks: &'a dyn ApprovalHooks,
}

/// Summary of a reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// False when the tree already had the desired shape
    pub changed: bool,
    pub root: Option<StepId>,
    pub created: Vec<StepId>,
    pub preserved: Vec<StepId>,
    pub deleted: Vec<StepId>,
}

/// Result of a successful reconciliation, not yet committed
#[derive(Debug)]
pub struct Reconciliation {
    pub tree: ApprovalTree,
    pub outcome: ReconcileOutcome,
    /// Notifications to deliver once `tree` is committed
    pub outbox: Outbox,
}

/// Builds and reconciles approval trees
pub struct StepManager;

impl StepManager {
    /// Reconcile `current` against `desired`.
    ///
    /// `None` (or a shape with no approvers) removes the whole tree.
    pub fn reconcile(
        current: &ApprovalTree,
        desired: Option<DesiredShape>,
        ctx: &ReconcileContext<'_>,
    ) -> ApiResult<Reconciliation> {
        let desired = desired.and_then(DesiredShape::normalized);
        if let Some(shape) = &desired {
            for assignee in shape.assignees() {
                validate_assignee(assignee, ctx.requester)?;
            }
        }

        let mut builder = Builder::new(current, ctx.delegations);
        let root = match &desired {
            Some(shape) => {
                builder.claim_leaves(shape);
                let root = builder.build(shape, true)?;
                builder.place(root, None, 0)?;
                Some(root)
            }
            None => None,
        };

        let Builder {
            mut next,
            keep,
            created,
            preserved,
            ..
        } = builder;
        next.set_root(root);

        let mut deleted = Vec::new();
        let mut deleted_leaves = Vec::new();
        for step in current.steps() {
            if keep.contains(&step.id) {
                continue;
            }
            if step.kind() == StepKind::Individual {
                deleted_leaves.push(step.id);
            }
            next.remove(step.id);
            deleted.push(step.id);
        }

        if next == *current {
            debug!(root = ?root, "Approval tree already in desired shape");
            return Ok(Reconciliation {
                tree: current.clone(),
                outcome: ReconcileOutcome {
                    changed: false,
                    root,
                    created: Vec::new(),
                    preserved,
                    deleted: Vec::new(),
                },
                outbox: Outbox::new(),
            });
        }

        let mut outbox = Outbox::new();
        if let Some(root) = root {
            next.initialize(root, ctx.hooks, &mut outbox)?;
        }
        for id in deleted_leaves {
            current.revoke(id, ctx.hooks)?;
        }

        info!(
            root = ?root,
            created = created.len(),
            preserved = preserved.len(),
            deleted = deleted.len(),
            "Approval tree reconciled"
        );

        Ok(Reconciliation {
            tree: next,
            outcome: ReconcileOutcome {
                changed: true,
                root,
                created,
                preserved,
                deleted,
            },
            outbox,
        })
    }

    /// Replace the tree with a serial chain of approvers
    pub fn add_initial_steps<I, T>(
        current: &ApprovalTree,
        assignees: I,
        ctx: &ReconcileContext<'_>,
    ) -> ApiResult<Reconciliation>
    where
        I: IntoIterator<Item = T>,
        T: Into<Identity>,
    {
        Self::reconcile(current, Some(DesiredShape::serial_of(assignees)), ctx)
    }
}

struct Builder<'a> {
    current: &'a ApprovalTree,
    delegations: &'a Delegations,
    next: ApprovalTree,
    /// Unclaimed leaves by assignee and role, in creation order
    pool: HashMap<(Identity, LeafRole), VecDeque<StepId>>,
    /// Existing leaf for each desired leaf, depth first
    claims: VecDeque<Option<StepId>>,
    keep: HashSet<StepId>,
    created: Vec<StepId>,
    preserved: Vec<StepId>,
}

impl<'a> Builder<'a> {
    fn new(current: &'a ApprovalTree, delegations: &'a Delegations) -> Self {
        let mut leaves: Vec<&Step> = current
            .steps()
            .filter(|s| s.kind() == StepKind::Individual)
            .collect();
        leaves.sort_by_key(|s| s.sequence);

        let mut pool: HashMap<(Identity, LeafRole), VecDeque<StepId>> = HashMap::new();
        for leaf in leaves {
            if let (Some(assignee), Some(role)) = (leaf.assignee(), leaf.role()) {
                pool.entry((assignee.clone(), role))
                    .or_default()
                    .push_back(leaf.id);
            }
        }

        Self {
            current,
            delegations,
            next: current.clone(),
            pool,
            claims: VecDeque::new(),
            keep: HashSet::new(),
            created: Vec::new(),
            preserved: Vec::new(),
        }
    }

    /// Match every desired leaf to an existing one. Exact assignee matches
    /// across the whole shape come first; delegates only get what is left.
    fn claim_leaves(&mut self, shape: &DesiredShape) {
        let leaves = shape.leaves();
        let mut claims: Vec<Option<StepId>> = leaves
            .iter()
            .map(|(assignee, role)| self.claim_exact(assignee, *role))
            .collect();
        for (slot, (assignee, role)) in claims.iter_mut().zip(&leaves) {
            if slot.is_none() {
                *slot = self.claim_delegated(assignee, *role);
            }
        }
        self.claims = claims.into();
    }

    fn build(&mut self, shape: &DesiredShape, is_root: bool) -> ApiResult<StepId> {
        match shape {
            DesiredShape::Approver { assignee, role } => {
                if let Some(id) = self.claims.pop_front().flatten() {
                    self.keep.insert(id);
                    self.preserved.push(id);
                    return Ok(id);
                }
                let sequence = self.next.next_sequence();
                let id = self
                    .next
                    .insert(Step::individual(assignee.clone(), *role, sequence));
                debug!(step_id = %id, assignee = %assignee, "New approval step");
                self.keep.insert(id);
                self.created.push(id);
                Ok(id)
            }
            DesiredShape::Group { kind, members } => {
                let mut children = Vec::with_capacity(members.len());
                for member in members {
                    children.push(self.build(member, false)?);
                }

                let id = match self.claim_group(*kind, &children, is_root) {
                    Some(id) => {
                        self.keep.insert(id);
                        self.preserved.push(id);
                        id
                    }
                    None => {
                        let sequence = self.next.next_sequence();
                        let id = self.next.insert(Step::composite(*kind, sequence));
                        self.keep.insert(id);
                        self.created.push(id);
                        id
                    }
                };

                for (position, child) in children.iter().enumerate() {
                    self.place(*child, Some(id), position as u32)?;
                }
                let group = self.next.step_mut(id)?;
                if group.children() != children.as_slice() {
                    if let Some(slot) = group.children_mut() {
                        *slot = children;
                    }
                    group.touch();
                }
                Ok(id)
            }
        }
    }

    fn claim_exact(&mut self, assignee: &Identity, role: LeafRole) -> Option<StepId> {
        self.pool
            .get_mut(&(assignee.clone(), role))
            .and_then(|q| q.pop_front())
    }

    /// Take the oldest unclaimed leaf held by a delegate of `assignee`
    fn claim_delegated(&mut self, assignee: &Identity, role: LeafRole) -> Option<StepId> {
        let delegations = self.delegations;
        let current = self.current;
        let key = self
            .pool
            .iter()
            .filter(|((holder, r), _)| *r == role && delegations.is_delegate(assignee, holder))
            .filter_map(|(key, queue)| queue.front().map(|id| (key, *id)))
            .min_by_key(|(_, id)| current.get(*id).map(|s| s.sequence))
            .map(|(key, _)| key.clone())?;
        let id = self.pool.get_mut(&key).and_then(|q| q.pop_front())?;
        debug!(step_id = %id, principal = %assignee, delegate = %key.0, "Matched step held by delegate");
        Some(id)
    }

    /// Reuse the old group of one of `children` (or the old root) when it
    /// has the same kind and has not been claimed yet
    fn claim_group(&self, kind: GroupKind, children: &[StepId], is_root: bool) -> Option<StepId> {
        let mut candidates: Vec<StepId> = children
            .iter()
            .filter_map(|child| self.current.get(*child).and_then(|s| s.parent))
            .collect();
        if is_root {
            candidates.extend(self.current.root_id());
        }
        candidates.into_iter().find(|candidate| {
            !self.keep.contains(candidate)
                && self.current.get(*candidate).and_then(Step::group_kind) == Some(kind)
        })
    }

    fn place(&mut self, id: StepId, parent: Option<StepId>, position: u32) -> ApiResult<()> {
        let step = self.next.step_mut(id)?;
        if step.parent != parent || step.position != position {
            step.parent = parent;
            step.position = position;
            step.touch();
        }
        Ok(())
    }
}
