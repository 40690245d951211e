//! OIDC validator configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default tolerance for `exp`/`nbf` checks
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Default lifetime of a fetched key set
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(3600);

/// Minimum age of a cached key set before an unknown `kid` may refetch it
pub const DEFAULT_JWKS_MIN_REFETCH: Duration = Duration::from_secs(30);

/// OAuth 2.0 / OIDC `response_type` the client registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    #[default]
    Code,
    IdToken,
    IdTokenToken,
    CodeIdToken,
    CodeToken,
    CodeIdTokenToken,
}

impl ResponseType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::IdToken => "id_token",
            Self::IdTokenToken => "id_token token",
            Self::CodeIdToken => "code id_token",
            Self::CodeToken => "code token",
            Self::CodeIdTokenToken => "code id_token token",
        }
    }

    /// Flows that return both an ID token and an access token from the
    /// authorization endpoint must bind them with `at_hash`
    #[must_use]
    pub const fn requires_at_hash(&self) -> bool {
        matches!(self, Self::IdTokenToken | Self::CodeIdTokenToken)
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown response type: {0}")]
pub struct UnknownResponseType(pub String);

impl FromStr for ResponseType {
    type Err = UnknownResponseType;

    /// Parts may appear in any order, separated by whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut code = false;
        let mut id_token = false;
        let mut token = false;
        for part in s.split_whitespace() {
            match part {
                "code" if !code => code = true,
                "id_token" if !id_token => id_token = true,
                "token" if !token => token = true,
                _ => return Err(UnknownResponseType(s.to_string())),
            }
        }

        match (code, id_token, token) {
            (true, false, false) => Ok(Self::Code),
            (false, true, false) => Ok(Self::IdToken),
            (false, true, true) => Ok(Self::IdTokenToken),
            (true, true, false) => Ok(Self::CodeIdToken),
            (true, false, true) => Ok(Self::CodeToken),
            (true, true, true) => Ok(Self::CodeIdTokenToken),
            _ => Err(UnknownResponseType(s.to_string())),
        }
    }
}

/// OIDC relying-party settings
#[derive(Clone)]
pub struct OidcValidatorConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Redirect URI sent with authorization-code exchanges
    pub redirect_uri: Option<String>,
    /// Realm reported for principals authenticated through OIDC
    pub realm: String,
    pub response_type: ResponseType,
    /// Require the ID token `nonce` to equal the session nonce
    pub check_nonce: bool,
    pub clock_skew: Duration,
}

impl fmt::Debug for OidcValidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcValidatorConfig")
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("redirect_uri", &self.redirect_uri)
            .field("realm", &self.realm)
            .field("response_type", &self.response_type)
            .field("check_nonce", &self.check_nonce)
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

impl OidcValidatorConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            realm: "oidc".to_string(),
            response_type: ResponseType::Code,
            check_nonce: true,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    #[must_use]
    pub const fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    #[must_use]
    pub const fn with_nonce_check(mut self, check: bool) -> Self {
        self.check_nonce = check;
        self
    }

    #[must_use]
    pub const fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }
}
