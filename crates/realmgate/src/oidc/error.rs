//! OIDC error types

use thiserror::Error;

use crate::validation::{ErrorKind, ValidatorError};

#[derive(Debug, Error)]
pub enum OidcError {
    /// The token or code itself is wrong; maps to an INVALID outcome
    #[error("token rejected: {0}")]
    Rejected(ErrorKind),

    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("JWKS fetch failed: {0}")]
    JwksFetch(String),

    #[error("JWKS parse failed: {0}")]
    JwksParse(String),

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl OidcError {
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Rejection reason, if this is a rejection
    #[must_use]
    pub const fn rejection(&self) -> Option<ErrorKind> {
        match self {
            Self::Rejected(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<ErrorKind> for OidcError {
    fn from(kind: ErrorKind) -> Self {
        Self::Rejected(kind)
    }
}

impl From<reqwest::Error> for OidcError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider(err.to_string())
    }
}

impl From<OidcError> for ValidatorError {
    fn from(err: OidcError) -> Self {
        match err {
            OidcError::Config(msg) => Self::Config(msg),
            other => Self::Provider(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OidcError>;
