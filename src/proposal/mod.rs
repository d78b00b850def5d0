//! Proposal module - requests routed through an approval tree
//!
//! Holds the proposal entity, status aggregation and the service that
//! serializes every tree mutation per proposal.

mod models;
mod service;
mod status;

pub use models::*;
pub use service::ApprovalService;
pub use status::StatusPolicy;
