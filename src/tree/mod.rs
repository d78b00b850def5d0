//! Approval tree
//!
//! Arena of steps owned by one proposal. Composites own their children by
//! id; the `parent` field on each step is a back-reference used to notify the
//! owning group when a child is satisfied.

mod machine;

use crate::error::{not_found_error, validation_error, ApiResult};
use crate::step::{GroupKind, Identity, LeafRole, Step, StepBody, StepId, StepKind, StepStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalTree {
    root: Option<StepId>,
    steps: BTreeMap<StepId, Step>,
    next_sequence: u64,
}

impl ApprovalTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_id(&self) -> Option<StepId> {
        self.root
    }

    pub fn root(&self) -> Option<&Step> {
        self.root.and_then(|id| self.steps.get(&id))
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        self.steps.get(&id)
    }

    /// Look up a step, failing with `NotFound`
    pub fn step(&self, id: StepId) -> ApiResult<&Step> {
        self.steps
            .get(&id)
            .ok_or_else(|| not_found_error(format!("Step {} not found", id)))
    }

    pub(crate) fn step_mut(&mut self, id: StepId) -> ApiResult<&mut Step> {
        self.steps
            .get_mut(&id)
            .ok_or_else(|| not_found_error(format!("Step {} not found", id)))
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.steps.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    /// Steps with the given status, composites included
    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.steps.values().filter(|s| s.status == status).count()
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    pub(crate) fn insert(&mut self, step: Step) -> StepId {
        let id = step.id;
        self.steps.insert(id, step);
        id
    }

    pub(crate) fn remove(&mut self, id: StepId) -> Option<Step> {
        if self.root == Some(id) {
            self.root = None;
        }
        self.steps.remove(&id)
    }

    pub(crate) fn set_root(&mut self, root: Option<StepId>) {
        self.root = root;
    }

    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Start a tree with an empty group as its root, replacing any existing tree
    pub fn create_root(&mut self, kind: GroupKind) -> StepId {
        self.steps.clear();
        self.root = None;
        let sequence = self.next_sequence();
        let id = self.insert(Step::composite(kind, sequence));
        self.root = Some(id);
        id
    }

    /// Append a pending individual leaf to a group
    pub fn add_individual(
        &mut self,
        parent: StepId,
        assignee: Identity,
        role: LeafRole,
    ) -> ApiResult<StepId> {
        let sequence = self.next_sequence();
        self.attach(parent, Step::individual(assignee, role, sequence))
    }

    /// Append an empty nested group to a group
    pub fn add_group(&mut self, parent: StepId, kind: GroupKind) -> ApiResult<StepId> {
        let sequence = self.next_sequence();
        self.attach(parent, Step::composite(kind, sequence))
    }

    fn attach(&mut self, parent: StepId, mut step: Step) -> ApiResult<StepId> {
        let owner = self.step_mut(parent)?;
        let position = owner.children().len() as u32;
        let children = owner
            .children_mut()
            .ok_or_else(|| validation_error("Individual steps cannot own children"))?;
        children.push(step.id);
        step.parent = Some(parent);
        step.position = position;
        Ok(self.insert(step))
    }

    // =========================================================================
    // TRAVERSAL
    // =========================================================================

    /// Children of a step ordered by position, then creation order
    pub fn ordered_children(&self, id: StepId) -> Vec<StepId> {
        let Some(step) = self.steps.get(&id) else {
            return Vec::new();
        };
        let mut children: Vec<&Step> = step
            .children()
            .iter()
            .filter_map(|child| self.steps.get(child))
            .collect();
        children.sort_by_key(|s| s.sort_key());
        children.into_iter().map(|s| s.id).collect()
    }

    /// Pre-order walk of a subtree in sibling order
    pub fn subtree(&self, id: StepId) -> Vec<StepId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.steps.contains_key(&current) {
                continue;
            }
            out.push(current);
            let mut children = self.ordered_children(current);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Ancestors of a step, nearest first
    pub fn ancestors(&self, id: StepId) -> Vec<StepId> {
        let mut out = Vec::new();
        let mut current = self.steps.get(&id).and_then(|s| s.parent);
        while let Some(parent) = current {
            out.push(parent);
            current = self.steps.get(&parent).and_then(|s| s.parent);
        }
        out
    }

    /// Individual leaves in tree order
    pub fn individual_steps(&self) -> Vec<&Step> {
        match self.root {
            Some(root) => self
                .subtree(root)
                .into_iter()
                .filter_map(|id| self.steps.get(&id))
                .filter(|s| s.kind() == StepKind::Individual)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Assignees of every leaf, in tree order
    pub fn approvers(&self) -> Vec<Identity> {
        self.individual_steps()
            .into_iter()
            .filter_map(|s| s.assignee().cloned())
            .collect()
    }

    /// Leaves that can be approved right now, in tree order
    pub fn actionable_leaves(&self) -> Vec<&Step> {
        self.individual_steps()
            .into_iter()
            .filter(|s| s.is_actionable())
            .collect()
    }

    /// Who should be prompted next.
    ///
    /// Ordered by ascending position, then creation order, at every level.
    pub fn currently_actionable_assignees(&self) -> Vec<Identity> {
        self.actionable_leaves()
            .into_iter()
            .filter_map(|s| s.assignee().cloned())
            .collect()
    }

    /// Status a group should hold given its children
    pub fn derived_status(&self, id: StepId) -> ApiResult<StepStatus> {
        let step = self.step(id)?;
        let status = match step.body {
            StepBody::Individual { .. } => step.status,
            StepBody::Parallel { .. } => {
                let children: Vec<&Step> = step
                    .children()
                    .iter()
                    .filter_map(|c| self.steps.get(c))
                    .collect();
                if children.iter().all(|c| c.is_approved()) {
                    StepStatus::Approved
                } else if children.iter().any(|c| c.is_actionable()) {
                    StepStatus::Actionable
                } else {
                    StepStatus::Pending
                }
            }
            StepBody::Serial { .. } => {
                let first_open = self
                    .ordered_children(id)
                    .into_iter()
                    .filter_map(|c| self.steps.get(&c))
                    .find(|c| !c.is_approved());
                match first_open {
                    None => StepStatus::Approved,
                    Some(child) if child.is_actionable() => StepStatus::Actionable,
                    Some(_) => StepStatus::Pending,
                }
            }
        };
        Ok(status)
    }
}
