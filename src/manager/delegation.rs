//! Delegation registry
//!
//! A delegate may act for a principal. Reconciliation uses this to keep a
//! step that was handed to a delegate when the policy still asks for the
//! principal.

use crate::step::Identity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegations {
    by_principal: BTreeMap<Identity, BTreeSet<Identity>>,
}

impl Delegations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the delegation already existed
    pub fn add(&mut self, principal: Identity, delegate: Identity) -> bool {
        self.by_principal.entry(principal).or_default().insert(delegate)
    }

    pub fn remove(&mut self, principal: &Identity, delegate: &Identity) -> bool {
        let Some(delegates) = self.by_principal.get_mut(principal) else {
            return false;
        };
        let removed = delegates.remove(delegate);
        if delegates.is_empty() {
            self.by_principal.remove(principal);
        }
        removed
    }

    pub fn delegates_of(&self, principal: &Identity) -> Vec<&Identity> {
        self.by_principal
            .get(principal)
            .map(|d| d.iter().collect())
            .unwrap_or_default()
    }

    pub fn is_delegate(&self, principal: &Identity, candidate: &Identity) -> bool {
        self.by_principal
            .get(principal)
            .is_some_and(|d| d.contains(candidate))
    }
}
