//! Validator fault types
//!
//! These are configuration and IO faults. A wrong credential is never an
//! error; see [`super::ValidationOutcome`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("trust store unavailable: {0}")]
    TrustStore(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ValidatorError {
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Tls(_) | Self::TrustStore(_))
    }
}

impl From<reqwest::Error> for ValidatorError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ValidatorError>;
