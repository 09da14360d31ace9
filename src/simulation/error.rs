//! Errors raised while building and wiring up models

use super::types::Address;

/// Failure while constructing, initializing or removing a model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid value '{value}' for parameter {key}: {reason}")]
    InvalidParameter {
        key: String,
        value: String,
        reason: String,
    },
    #[error("missing dependency model '{0}'")]
    MissingDependency(String),
    #[error("unparseable address '{0}'")]
    UnparseableAddress(String),
    #[error("a model named '{0}' already exists")]
    DuplicateName(String),
    #[error("unknown model type '{0}'")]
    UnknownType(String),
    #[error("dependency cycle among models {0:?}")]
    DependencyCycle(Vec<String>),
    #[error("model '{name}' is still required by {dependents:?}")]
    StillRequired {
        name: String,
        dependents: Vec<String>,
    },
    #[error("model '{0}' not found")]
    NotFound(String),
    #[error("model '{name}' is not a {expected}")]
    WrongType { name: String, expected: &'static str },
    #[error("address {0} is already registered")]
    DuplicateAddress(Address),
    #[error("model '{name}' failed to initialize: {reason}")]
    InitFailed { name: String, reason: String },
}

impl ModelError {
    /// Small integer code reported for initialization failures
    pub fn code(&self) -> i32 {
        match self {
            ModelError::InvalidParameter { .. } => 1,
            ModelError::MissingDependency(_) => 2,
            ModelError::UnparseableAddress(_) => 3,
            ModelError::DuplicateName(_) => 4,
            ModelError::UnknownType(_) => 5,
            ModelError::DependencyCycle(_) => 6,
            ModelError::StillRequired { .. } => 7,
            ModelError::NotFound(_) => 8,
            ModelError::WrongType { .. } => 9,
            ModelError::DuplicateAddress(_) => 10,
            ModelError::InitFailed { .. } => 11,
        }
    }
}
