//! Credential validation
//!
//! One [`TokenValidator`] per [`CredentialKind`], looked up through an
//! explicit [`ValidatorRegistry`].
//!
//! # Outcome vs. error
//!
//! A credential that is simply wrong (bad password, untrusted certificate,
//! forged token) is reported as `Ok(ValidationOutcome { state: Invalid, .. })`.
//! `Err(ValidatorError)` is reserved for faults on our side: unreadable trust
//! stores, TLS setup failures, unreachable providers. Callers branch on the
//! state and surface errors to operators.

mod certificate;
mod error;
mod registry;
mod ticket;
mod username;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::credential::{CredentialKind, RawCredential};

pub use certificate::{CertificateValidator, CertificateValidatorConfig, SubjectConstraints};
pub use error::{Result, ValidatorError};
pub use registry::ValidatorRegistry;
pub use ticket::TicketValidator;
pub use username::UsernamePasswordValidator;

/// Reasons a credential was rejected or an operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TokenNotSigned,
    SignatureInvalid,
    NoMatchingKey,
    NonceMismatch,
    AtHashMismatch,
    AtHashMissing,
    UnsupportedAlgorithm,
    RealmNotFound,
    CertificateUntrusted,
    DecodeError,
    StorageCorruption,
    NotFound,
    ConfigValidationError,
    PersistFailure,
    /// Issuer, audience, or expiry check failed on a verified token
    ClaimsInvalid,
    /// The backend (realm, ticket server) refused the credential
    CredentialRejected,
    /// Certificate subject DN matched none of the configured constraints
    SubjectNotPermitted,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TokenNotSigned => "token_not_signed",
            Self::SignatureInvalid => "signature_invalid",
            Self::NoMatchingKey => "no_matching_key",
            Self::NonceMismatch => "nonce_mismatch",
            Self::AtHashMismatch => "at_hash_mismatch",
            Self::AtHashMissing => "at_hash_missing",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::RealmNotFound => "realm_not_found",
            Self::CertificateUntrusted => "certificate_untrusted",
            Self::DecodeError => "decode_error",
            Self::StorageCorruption => "storage_corruption",
            Self::NotFound => "not_found",
            Self::ConfigValidationError => "config_validation_error",
            Self::PersistFailure => "persist_failure",
            Self::ClaimsInvalid => "claims_invalid",
            Self::CredentialRejected => "credential_rejected",
            Self::SubjectNotPermitted => "subject_not_permitted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Valid,
    Invalid,
}

/// Validated identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub attributes: HashMap<String, String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// OAuth tokens obtained while validating an OIDC credential
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Access token expiry, unix seconds
    pub expires_at: Option<u64>,
}

impl fmt::Debug for IssuedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedTokens")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Result of validating one credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub state: ValidationState,
    pub principal: Option<Principal>,
    pub realm: Option<String>,
    pub error: Option<ErrorKind>,
    pub tokens: Option<IssuedTokens>,
    /// Set when the validation cache answered without consulting a backend
    pub cached: bool,
}

impl ValidationOutcome {
    #[must_use]
    pub fn valid(principal: Principal, realm: impl Into<String>) -> Self {
        Self {
            state: ValidationState::Valid,
            principal: Some(principal),
            realm: Some(realm.into()),
            error: None,
            tokens: None,
            cached: false,
        }
    }

    #[must_use]
    pub const fn invalid(error: ErrorKind) -> Self {
        Self {
            state: ValidationState::Invalid,
            principal: None,
            realm: None,
            error: Some(error),
            tokens: None,
            cached: false,
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: IssuedTokens) -> Self {
        self.tokens = Some(tokens);
        self
    }

    #[must_use]
    pub const fn from_cache(mut self) -> Self {
        self.cached = true;
        self
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state == ValidationState::Valid
    }
}

/// Per-request inputs to validation beyond the credential itself
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Realm required by the resolved policy bin
    pub realm: Option<String>,
}

impl ValidationContext {
    #[must_use]
    pub fn for_realm(realm: impl Into<String>) -> Self {
        Self {
            realm: Some(realm.into()),
        }
    }

    /// Whether a validator answering for `realm` may serve this request
    #[must_use]
    pub fn serves(&self, realm: &str) -> bool {
        self.realm.as_deref().is_none_or(|wanted| wanted == realm)
    }
}

/// Validator for one credential kind
#[async_trait]
pub trait TokenValidator: Send + Sync + fmt::Debug {
    /// Credential kind this validator is registered under
    fn kind(&self) -> CredentialKind;

    /// Whether this validator understands the credential's representation
    fn can_handle(&self, credential: &RawCredential) -> bool;

    /// Validate a credential this validator can handle
    async fn validate(
        &self,
        credential: &RawCredential,
        context: &ValidationContext,
    ) -> Result<ValidationOutcome>;
}
