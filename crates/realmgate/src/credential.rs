//! Normalized credential types
//!
//! A [`RawCredential`] is what an extractor pulls out of its transport
//! envelope. It is created per request and dropped once validation is done.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::constants::{CAS_TICKET_VALUE_TYPE, X509_PKI_PATH_VALUE_TYPE, X509_V3_VALUE_TYPE};
use crate::validation::ErrorKind;

/// Closed set of credential kinds a policy bin may accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialKind {
    /// Single sign-on service ticket
    Ticket,
    /// X.509 certificate or certificate chain
    Certificate,
    /// Username and password
    UsernamePassword,
    /// OIDC authorization code or bearer token
    Oidc,
}

impl CredentialKind {
    pub const ALL: [Self; 4] = [
        Self::Ticket,
        Self::Certificate,
        Self::UsernamePassword,
        Self::Oidc,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "CAS",
            Self::Certificate => "PKI",
            Self::UsernamePassword => "BASIC",
            Self::Oidc => "OIDC",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for authentication type names that map to no credential kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown authentication type: {0}")]
pub struct UnknownCredentialKind(pub String);

impl FromStr for CredentialKind {
    type Err = UnknownCredentialKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CAS" | "TICKET" => Ok(Self::Ticket),
            "PKI" | "X509" | "CERT" => Ok(Self::Certificate),
            "BASIC" | "USERNAME" | "UPT" => Ok(Self::UsernamePassword),
            "OIDC" | "OAUTH" | "BEARER" => Ok(Self::Oidc),
            _ => Err(UnknownCredentialKind(s.to_string())),
        }
    }
}

/// Binary security token as received: declared value-type plus base64 text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySecurityToken {
    pub value_type: String,
    pub encoding_type: Option<String>,
    pub value: String,
}

impl BinarySecurityToken {
    pub fn new(value_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value_type: value_type.into(),
            encoding_type: None,
            value: value.into(),
        }
    }

    /// Wrap raw bytes as a base64 token of the given value-type
    pub fn from_bytes(value_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(value_type, STANDARD.encode(bytes))
    }

    /// Decode the base64 payload
    pub fn decode(&self) -> Result<Vec<u8>, ErrorKind> {
        let compact: String = self.value.split_whitespace().collect();
        STANDARD.decode(compact).map_err(|_| ErrorKind::DecodeError)
    }

    #[must_use]
    pub fn is_ticket(&self) -> bool {
        self.value_type == CAS_TICKET_VALUE_TYPE
    }

    #[must_use]
    pub fn is_pki_path(&self) -> bool {
        self.value_type == X509_PKI_PATH_VALUE_TYPE
    }

    #[must_use]
    pub fn is_single_x509(&self) -> bool {
        self.value_type == X509_V3_VALUE_TYPE
    }
}

/// Username/password pair with optional replay-protection fields
#[derive(Clone, PartialEq, Eq)]
pub struct UsernamePasswordCredential {
    pub username: String,
    pub password: Option<String>,
    pub nonce: Option<String>,
    pub created: Option<String>,
}

impl UsernamePasswordCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            nonce: None,
            created: None,
        }
    }

    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>, created: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self.created = Some(created.into());
        self
    }
}

impl fmt::Debug for UsernamePasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernamePasswordCredential")
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("nonce", &self.nonce)
            .field("created", &self.created)
            .finish()
    }
}

/// OIDC credential: an authorization code, tokens, or both
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OidcCredential {
    pub authorization_code: Option<String>,
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    /// Nonce bound to the caller's session when the login was started
    pub session_nonce: Option<String>,
    /// Federated source the tokens will be stored under
    pub source_id: Option<String>,
}

impl OidcCredential {
    #[must_use]
    pub fn from_code(code: impl Into<String>) -> Self {
        Self {
            authorization_code: Some(code.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn from_access_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_session_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.session_nonce = Some(nonce.into());
        self
    }

    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.authorization_code.is_none() && self.access_token.is_none() && self.id_token.is_none()
    }
}

impl fmt::Debug for OidcCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcCredential")
            .field("has_code", &self.authorization_code.is_some())
            .field("has_access_token", &self.access_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("source_id", &self.source_id)
            .finish_non_exhaustive()
    }
}

/// Credential extracted from a request envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCredential {
    BinarySecurityToken(BinarySecurityToken),
    /// DER certificates from an inline XML signature key-info X509 data block
    X509KeyInfo(Vec<Vec<u8>>),
    UsernamePassword(UsernamePasswordCredential),
    Oidc(OidcCredential),
}

impl RawCredential {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::BinarySecurityToken(_) => "binary_security_token",
            Self::X509KeyInfo(_) => "x509_key_info",
            Self::UsernamePassword(_) => "username_password",
            Self::Oidc(_) => "oidc",
        }
    }
}

/// Decoded view of a ticket binary security token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketCredential {
    pub ticket: String,
    pub service_url: String,
}

impl TicketCredential {
    /// Decode the base64 payload into plaintext ticket text
    pub fn decode(token: &BinarySecurityToken, service_url: &str) -> Result<Self, ErrorKind> {
        let bytes = token.decode()?;
        let ticket = String::from_utf8(bytes).map_err(|_| ErrorKind::DecodeError)?;
        let ticket = ticket.trim();
        if ticket.is_empty() {
            return Err(ErrorKind::DecodeError);
        }
        Ok(Self {
            ticket: ticket.to_string(),
            service_url: service_url.to_string(),
        })
    }
}

/// Decoded certificate chain, leaf first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChainCredential {
    pub der_certs: Vec<Vec<u8>>,
}

impl CertificateChainCredential {
    #[must_use]
    pub fn leaf(&self) -> Option<&[u8]> {
        self.der_certs.first().map(Vec::as_slice)
    }
}
