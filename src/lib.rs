//! approvalflow - approval step trees
//!
//! Routes a proposal through a tree of approval steps: individual approvers,
//! serial groups that approve in order and parallel groups that approve in
//! any order. The tree can be reconciled against a new desired shape at any
//! point without losing approvals already given.
//!
//! - `step` / `tree`: the step state machine and the arena it lives in
//! - `manager`: reconciliation against a desired shape
//! - `proposal`: status aggregation and the per-proposal service
//! - `policy`: approver policies feeding reconciliation

pub mod config;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod policy;
pub mod proposal;
pub mod state;
pub mod step;
pub mod tree;
