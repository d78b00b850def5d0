//! Step manager - reconciles an approval tree against a desired shape
//!
//! - `shape`: what the tree should look like
//! - `delegation`: who may stand in for whom
//! - `reconcile`: rebuild with progress preserved

mod delegation;
mod reconcile;
mod shape;

pub use delegation::Delegations;
pub use reconcile::{ReconcileContext, ReconcileOutcome, Reconciliation, StepManager};
pub use shape::DesiredShape;
