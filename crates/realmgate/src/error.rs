use thiserror::Error;

use crate::oidc::OidcError;
use crate::policy::PolicyError;
use crate::store::TokenStoreError;
use crate::validation::{ErrorKind, ValidatorError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validator error: {0}")]
    Validator(#[from] ValidatorError),

    #[error("OIDC error: {0}")]
    Oidc(#[from] OidcError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Token store error: {0}")]
    TokenStore(#[from] TokenStoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Faults an operator has to fix: bad trust material, bad settings,
    /// invalid policy
    #[must_use]
    pub const fn is_config(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Validator(e) => e.is_config(),
            Self::Oidc(e) => matches!(e, OidcError::Config(_)),
            Self::Policy(e) => e.is_validation(),
            Self::TokenStore(_) => false,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::TokenStore(e) if e.is_not_found())
    }

    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::TokenStore(_))
    }

    /// Error kind when this error stands for one
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Oidc(e) => e.rejection(),
            Self::Policy(e) => Some(e.kind()),
            Self::TokenStore(e) => Some(e.kind()),
            Self::Validator(_) | Self::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
