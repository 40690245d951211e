use thiserror::Error;

use crate::validation::ErrorKind;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy: {0}")]
    ConfigValidation(String),

    #[error("malformed policy property '{key}': {value}")]
    Malformed { key: String, value: String },

    #[error("policy commit failed for: {}", failed.join(", "))]
    Persist { failed: Vec<String> },

    #[error("config store error: {0}")]
    Store(String),

    #[error("config store IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PolicyError {
    /// Reported error kind
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigValidation(_) | Self::Malformed { .. } => ErrorKind::ConfigValidationError,
            Self::Persist { .. } | Self::Store(_) | Self::Io(_) => ErrorKind::PersistFailure,
        }
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::ConfigValidation(_) | Self::Malformed { .. })
    }

    #[must_use]
    pub const fn is_persist(&self) -> bool {
        !self.is_validation()
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
