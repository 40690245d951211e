//! Trust material and backend collaborators
//!
//! Validators never talk to a network, a trust store, or a user directory
//! directly. They go through the traits here so each backend can be swapped
//! or faked:
//!
//! - [`TicketValidationClient`] - ticket server round trip
//! - [`CertificateTrust`] - chain verification against trust anchors
//! - [`RealmLogin`] - username/password check against one realm

mod realm;
mod ticket_client;
mod tls;
pub mod x509;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use realm::StaticRealm;
pub use ticket_client::{HttpTicketValidationClient, TicketClientConfig};
pub use tls::{DEFAULT_HTTP_TIMEOUT, TlsMaterial, build_tls_client};
pub use x509::TrustStoreVerifier;

/// Assertion a ticket server returns for a valid ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketAssertion {
    pub principal: String,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("ticket rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("malformed ticket server response: {0}")]
    Malformed(String),

    #[error("ticket server unreachable: {0}")]
    Transport(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),
}

impl TicketError {
    /// TLS faults are configuration errors; everything else means the ticket
    /// could not be confirmed.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

/// Validates service tickets against a ticket server
#[async_trait]
pub trait TicketValidationClient: Send + Sync + fmt::Debug {
    async fn validate(
        &self,
        ticket: &str,
        service_url: &str,
    ) -> Result<TicketAssertion, TicketError>;
}

/// Result of checking a chain against the trust store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustVerdict {
    Trusted,
    Untrusted(String),
}

impl TrustVerdict {
    #[must_use]
    pub const fn is_trusted(&self) -> bool {
        matches!(self, Self::Trusted)
    }
}

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("trust store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed certificate: {0}")]
    Malformed(String),
}

/// Decides whether a certificate chain is anchored in trusted material
pub trait CertificateTrust: Send + Sync + fmt::Debug {
    /// Verify a leaf-first chain of DER certificates
    fn verify(&self, der_chain: &[Vec<u8>]) -> Result<TrustVerdict, TrustError>;
}

#[derive(Debug, Error)]
pub enum RealmError {
    #[error("realm {realm} unavailable: {reason}")]
    Unavailable { realm: String, reason: String },
}

/// Username/password login against one named realm
pub trait RealmLogin: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// `Ok(Some(attributes))` accepts, `Ok(None)` rejects. `Err` means the
    /// realm could not answer and the next realm should be tried.
    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<HashMap<String, String>>, RealmError>;
}
