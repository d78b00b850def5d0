//! Step module - the unit of the approval state machine
//!
//! Individual approver leaves and serial/parallel groups.

mod models;

pub use models::*;
