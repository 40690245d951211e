//! Multi-protocol credential validation, context policy, and encrypted
//! OAuth token storage
//!
//! A request is resolved to a policy bin by path, the credential kinds the
//! bin accepts are extracted from the request in order, and the first one
//! found is handed to the validator registered for its kind. OIDC tokens
//! obtained on the way are kept per user and source in an encrypted store.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod constants;
pub mod credential;
mod error;
pub mod extract;
pub mod observability;
pub mod oidc;
pub mod orchestrator;
pub mod policy;
pub mod store;
#[cfg(test)]
mod testing;
pub mod trust;
pub mod validation;

pub use config::{Config, ConfigBuilder, TelemetryConfig};
pub use credential::{CredentialKind, RawCredential};
pub use error::{Error, Result};
pub use extract::RequestEnvelope;
pub use orchestrator::{AuthDecision, Authenticator, SecurityContext, Subject};
pub use validation::{
    ErrorKind, Principal, TokenValidator, ValidationOutcome, ValidationState,
};
