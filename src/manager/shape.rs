//! Desired tree shapes
//!
//! What the caller (usually an approver policy) wants the tree to look like.

use crate::step::{GroupKind, Identity, LeafRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesiredShape {
    /// One individual leaf
    Approver {
        assignee: Identity,
        #[serde(default)]
        role: LeafRole,
    },
    /// A serial or parallel group over nested shapes
    Group {
        kind: GroupKind,
        members: Vec<DesiredShape>,
    },
}

impl DesiredShape {
    pub fn approver(assignee: impl Into<Identity>) -> Self {
        DesiredShape::Approver {
            assignee: assignee.into(),
            role: LeafRole::Approval,
        }
    }

    pub fn purchaser(assignee: impl Into<Identity>) -> Self {
        DesiredShape::Approver {
            assignee: assignee.into(),
            role: LeafRole::Purchase,
        }
    }

    pub fn serial(members: Vec<DesiredShape>) -> Self {
        DesiredShape::Group {
            kind: GroupKind::Serial,
            members,
        }
    }

    pub fn parallel(members: Vec<DesiredShape>) -> Self {
        DesiredShape::Group {
            kind: GroupKind::Parallel,
            members,
        }
    }

    /// Serial group of approvers, in the given order
    pub fn serial_of<I, T>(assignees: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identity>,
    {
        Self::serial(assignees.into_iter().map(Self::approver).collect())
    }

    /// Parallel group of approvers
    pub fn parallel_of<I, T>(assignees: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identity>,
    {
        Self::parallel(assignees.into_iter().map(Self::approver).collect())
    }

    /// Every leaf assignee, depth first
    pub fn assignees(&self) -> Vec<&Identity> {
        self.leaves().into_iter().map(|(assignee, _)| assignee).collect()
    }

    /// Every leaf with its role, depth first
    pub fn leaves(&self) -> Vec<(&Identity, LeafRole)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(&'a Identity, LeafRole)>) {
        match self {
            DesiredShape::Approver { assignee, role } => out.push((assignee, *role)),
            DesiredShape::Group { members, .. } => {
                for member in members {
                    member.collect_leaves(out);
                }
            }
        }
    }

    /// Drop empty groups; `None` when nothing is left
    pub fn prune(self) -> Option<Self> {
        match self {
            DesiredShape::Approver { .. } => Some(self),
            DesiredShape::Group { kind, members } => {
                let members: Vec<_> = members.into_iter().filter_map(Self::prune).collect();
                if members.is_empty() {
                    None
                } else {
                    Some(DesiredShape::Group { kind, members })
                }
            }
        }
    }

    /// Prune, and wrap a bare approver so the root is always a group
    pub fn normalized(self) -> Option<Self> {
        match self.prune()? {
            leaf @ DesiredShape::Approver { .. } => Some(Self::serial(vec![leaf])),
            group => Some(group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_removes_empty_groups() {
        let shape = DesiredShape::serial(vec![
            DesiredShape::parallel(vec![]),
            DesiredShape::approver("a"),
            DesiredShape::serial(vec![DesiredShape::parallel(vec![])]),
        ]);
        assert_eq!(
            shape.prune(),
            Some(DesiredShape::serial(vec![DesiredShape::approver("a")]))
        );
        assert_eq!(DesiredShape::parallel_of(Vec::<&str>::new()).prune(), None);
    }

    #[test]
    fn test_normalized_wraps_bare_leaf() {
        let shape = DesiredShape::purchaser("buyer").normalized().unwrap();
        assert_eq!(shape, DesiredShape::serial(vec![DesiredShape::purchaser("buyer")]));
    }

    #[test]
    fn test_assignees_depth_first() {
        let shape = DesiredShape::serial(vec![
            DesiredShape::approver("ao"),
            DesiredShape::parallel_of(["b1", "b2"]),
        ]);
        let names: Vec<&str> = shape.assignees().iter().map(|i| i.as_str()).collect();
        assert_eq!(names, vec!["ao", "b1", "b2"]);
    }

    #[test]
    fn test_deserialize_from_json() {
        let shape: DesiredShape = serde_json::from_str(
            r#"{"type":"group","kind":"parallel","members":[
                {"type":"approver","assignee":"a@example.com"},
                {"type":"approver","assignee":"b@example.com","role":"purchase"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            shape,
            DesiredShape::parallel(vec![
                DesiredShape::approver("a@example.com"),
                DesiredShape::purchaser("b@example.com"),
            ])
        );
    }
}
