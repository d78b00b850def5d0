//! Step data models
//!
//! A step is one node of a proposal's approval tree: either an individual
//! approver leaf or a serial/parallel group owning child steps.

use crate::error::{validation_error, ApiResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Step identifier
pub type StepId = Uuid;

/// Identity of a principal (requester, approver, delegate, observer)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Step status in the approval state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Waiting for its turn
    Pending,
    /// Approval can be taken now
    Actionable,
    /// Satisfied
    Approved,
}

impl Default for StepStatus {
    fn default() -> Self {
        StepStatus::Pending
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Actionable => "actionable",
            StepStatus::Approved => "approved",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Individual,
    Serial,
    Parallel,
}

impl StepKind {
    pub fn is_composite(self) -> bool {
        !matches!(self, StepKind::Individual)
    }
}

/// Composite flavour: ordered or unordered children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Serial,
    Parallel,
}

impl From<GroupKind> for StepKind {
    fn from(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Serial => StepKind::Serial,
            GroupKind::Parallel => StepKind::Parallel,
        }
    }
}

/// What an individual leaf asks of its assignee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafRole {
    Approval,
    Purchase,
}

impl Default for LeafRole {
    fn default() -> Self {
        LeafRole::Approval
    }
}

/// Variant-specific step data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepBody {
    Individual {
        assignee: Identity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completer: Option<Identity>,
        #[serde(default)]
        role: LeafRole,
    },
    Serial {
        children: Vec<StepId>,
    },
    Parallel {
        children: Vec<StepId>,
    },
}

/// One node of an approval tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,
    /// Owning composite; back-reference only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<StepId>,
    /// Order among siblings of a serial parent
    pub position: u32,
    pub status: StepStatus,
    /// Creation order within the tree, tie-breaker for ordering
    pub sequence: u64,
    #[serde(flatten)]
    pub body: StepBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Step {
    fn with_body(body: StepBody, sequence: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent: None,
            position: 0,
            status: StepStatus::Pending,
            sequence,
            body,
            approved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a pending individual leaf
    pub fn individual(assignee: Identity, role: LeafRole, sequence: u64) -> Self {
        Self::with_body(
            StepBody::Individual {
                assignee,
                completer: None,
                role,
            },
            sequence,
        )
    }

    /// Create an empty pending composite of the given kind
    pub fn composite(kind: GroupKind, sequence: u64) -> Self {
        let body = match kind {
            GroupKind::Serial => StepBody::Serial { children: Vec::new() },
            GroupKind::Parallel => StepBody::Parallel { children: Vec::new() },
        };
        Self::with_body(body, sequence)
    }

    /// Composite flavour, `None` for individual leaves
    pub fn group_kind(&self) -> Option<GroupKind> {
        match self.body {
            StepBody::Serial { .. } => Some(GroupKind::Serial),
            StepBody::Parallel { .. } => Some(GroupKind::Parallel),
            StepBody::Individual { .. } => None,
        }
    }

    pub fn kind(&self) -> StepKind {
        match self.body {
            StepBody::Individual { .. } => StepKind::Individual,
            StepBody::Serial { .. } => StepKind::Serial,
            StepBody::Parallel { .. } => StepKind::Parallel,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.kind().is_composite()
    }

    pub fn assignee(&self) -> Option<&Identity> {
        match &self.body {
            StepBody::Individual { assignee, .. } => Some(assignee),
            _ => None,
        }
    }

    pub fn completer(&self) -> Option<&Identity> {
        match &self.body {
            StepBody::Individual { completer, .. } => completer.as_ref(),
            _ => None,
        }
    }

    /// Who performed the approval: the completer, falling back to the assignee
    pub fn completed_by(&self) -> Option<&Identity> {
        self.completer().or_else(|| self.assignee())
    }

    pub fn role(&self) -> Option<LeafRole> {
        match &self.body {
            StepBody::Individual { role, .. } => Some(*role),
            _ => None,
        }
    }

    pub fn children(&self) -> &[StepId] {
        match &self.body {
            StepBody::Serial { children } | StepBody::Parallel { children } => children,
            StepBody::Individual { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<StepId>> {
        match &mut self.body {
            StepBody::Serial { children } | StepBody::Parallel { children } => Some(children),
            StepBody::Individual { .. } => None,
        }
    }

    pub(crate) fn set_completer(&mut self, value: Option<Identity>) {
        if let StepBody::Individual { completer, .. } = &mut self.body {
            *completer = value;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }

    pub fn is_actionable(&self) -> bool {
        self.status == StepStatus::Actionable
    }

    pub fn is_approved(&self) -> bool {
        self.status == StepStatus::Approved
    }

    /// Ordering key among siblings: position, then creation order
    pub fn sort_key(&self) -> (u32, u64) {
        (self.position, self.sequence)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// An individual's assignee must never be the proposal's requester
    pub fn validate_assignee(&self, requester: &Identity) -> ApiResult<()> {
        match self.assignee() {
            Some(assignee) => validate_assignee(assignee, requester),
            None => Ok(()),
        }
    }
}

/// Checks a prospective assignee against the proposal requester
pub fn validate_assignee(assignee: &Identity, requester: &Identity) -> ApiResult<()> {
    if assignee.is_blank() {
        return Err(validation_error("Assignee cannot be blank"));
    }
    if assignee == requester {
        return Err(validation_error(format!(
            "Assignee {} cannot also be Requester",
            assignee
        )));
    }
    Ok(())
}
