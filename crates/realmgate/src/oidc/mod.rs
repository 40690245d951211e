//! OpenID Connect client-side validation
//!
//! [`OidcValidator`] runs the relying-party half of the protocol: code
//! exchange, ID token and access token verification against the provider's
//! published keys, and the optional userinfo round trip. Keys come from a
//! [`KeySource`]; in production that is a [`JwksCache`] kept warm by a
//! [`JwksRefreshTask`].

mod claims;
mod config;
mod error;
mod jwks;
pub mod jwt;
mod metadata;
mod provider;
mod validator;

pub use claims::Claims;
pub use config::{
    DEFAULT_CLOCK_SKEW, DEFAULT_JWKS_MIN_REFETCH, DEFAULT_JWKS_TTL, OidcValidatorConfig, ResponseType,
    UnknownResponseType,
};
pub use error::{OidcError, Result};
pub use jwks::{Jwk, JwkSet, JwksCache, JwksRefreshTask, KeySource, StaticKeySource};
pub use metadata::{ProviderMetadata, algorithm_name};
pub use provider::{HttpOidcProvider, OidcProviderClient, TokenResponse, UserInfo};
pub(crate) use provider::unix_now;
pub use validator::{OidcValidator, ValidatedIdToken};
