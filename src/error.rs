//! Error types for the workflow operator

use thiserror::Error;

/// Result type for operator operations
pub type OperatorResult<T> = Result<T, OperatorError>;

/// Comprehensive error types for the workflow operator.
///
/// Configuration-time errors are fatal (propagate out of `main`);
/// everything else is caught and classified at the manager boundary.
#[derive(Error, Debug)]
pub enum OperatorError {
    /// A rule failed load-time validation (bad action name, bad `when`)
    #[error("invalid rule for {key}: {reason}")]
    InvalidRule { key: String, reason: String },

    /// The configured scheduler is not one of the supported backends
    #[error("{0} is not a valid scheduler, choose from: kubernetes, flux")]
    UnknownScheduler(String),

    /// A step is missing its required container image
    #[error("step '{0}' is missing a required 'image'")]
    MissingImage(String),

    /// The parsed workflow violates a structural invariant
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Failure to load or parse the workflow configuration file
    #[error("failed to load workflow config: {0}")]
    ConfigLoad(String),

    /// A backend submission failed outright (not a conflict)
    #[error("submit failed for step '{step}' jobid '{jobid}': {reason}")]
    SubmitFailed {
        step: String,
        jobid: String,
        reason: String,
    },

    /// Internal invariant violation: a contract the state machine or rules
    /// engine relies on was broken. These are bugs, not operational errors.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl From<std::io::Error> for OperatorError {
    fn from(err: std::io::Error) -> Self {
        OperatorError::ConfigLoad(err.to_string())
    }
}

impl From<serde_yaml::Error> for OperatorError {
    fn from(err: serde_yaml::Error) -> Self {
        OperatorError::ConfigLoad(err.to_string())
    }
}
