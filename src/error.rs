//! Error handling module
//!
//! Provides unified error types for the approval engine and its collaborators.

use crate::step::{StepId, StepStatus};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition: cannot {event} step {step} while {status}")]
    InvalidTransition {
        step: StepId,
        status: StepStatus,
        event: &'static str,
    },

    #[error("Revocation failed for step {step}: {reason}")]
    Revocation { step: StepId, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Stable machine-readable code, used in logs and CLI output
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::Revocation { .. } => "REVOCATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Outcome of asking a collaborator to revoke a step's external artifact
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevocationError {
    /// No artifact was ever issued for the step
    #[error("no artifact issued")]
    NotFound,

    #[error("{0}")]
    Failed(String),
}

/// Failure reported by a notification collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("hook failed: {0}")]
pub struct HookError(pub String);

/// Result type alias for engine operations
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> AppError {
    AppError::NotFound(msg.into())
}
