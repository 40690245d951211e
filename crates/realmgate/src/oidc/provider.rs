//! Token and userinfo endpoint client

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;

use super::claims::Claims;
use super::config::OidcValidatorConfig;
use super::error::{OidcError, Result};
use super::metadata::ProviderMetadata;
use crate::trust::DEFAULT_HTTP_TIMEOUT;
use crate::validation::{ErrorKind, IssuedTokens};

/// Token endpoint response
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Current unix time in seconds
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

impl TokenResponse {
    /// Absolute access-token expiry, unix seconds
    #[must_use]
    pub fn expires_at(&self, now: u64) -> Option<u64> {
        self.expires_in.map(|secs| now.saturating_add(secs))
    }

    #[must_use]
    pub fn into_issued(self) -> IssuedTokens {
        let expires_at = self.expires_at(unix_now());
        IssuedTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            expires_at,
        }
    }
}

/// Userinfo endpoint response
#[derive(Debug, Clone, PartialEq)]
pub enum UserInfo {
    /// `application/jwt` body, signed or not
    Jwt(String),
    /// Plain JSON claims
    Json(Claims),
}

/// Client-side calls to the identity provider
#[async_trait]
pub trait OidcProviderClient: Send + Sync + fmt::Debug {
    fn metadata(&self) -> &ProviderMetadata;

    /// Exchange an authorization code at the token endpoint
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse>;

    /// Obtain a fresh token pair with a refresh token
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;

    async fn userinfo(&self, access_token: &str) -> Result<UserInfo>;
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// reqwest-backed provider client
///
/// Token endpoint `4xx` answers (`invalid_grant` and friends) are
/// rejections of the presented code or refresh token. Network failures and
/// `5xx` answers are provider faults.
pub struct HttpOidcProvider {
    metadata: ProviderMetadata,
    config: OidcValidatorConfig,
    client: reqwest::Client,
}

impl fmt::Debug for HttpOidcProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpOidcProvider")
            .field("issuer", &self.metadata.issuer)
            .field("client_id", &self.config.client_id)
            .finish_non_exhaustive()
    }
}

impl HttpOidcProvider {
    pub fn new(metadata: ProviderMetadata, config: OidcValidatorConfig) -> Result<Self> {
        Self::with_timeout(metadata, config, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(
        metadata: ProviderMetadata,
        config: OidcValidatorConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OidcError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            metadata,
            config,
            client,
        })
    }

    /// Discover the provider and build a client for it
    pub async fn discover(
        issuer: &str,
        config: OidcValidatorConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let metadata = ProviderMetadata::discover(issuer, timeout).await?;
        Self::with_timeout(metadata, config, timeout)
    }

    fn token_endpoint(&self) -> Result<&str> {
        self.metadata
            .token_endpoint
            .as_deref()
            .ok_or_else(|| OidcError::Config("provider has no token endpoint".into()))
    }

    /// Grant parameters as sent; public clients identify themselves in the body
    fn token_form<'a>(&'a self, grant: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut form = grant.to_vec();
        if self.config.client_secret.is_none() {
            form.push(("client_id", self.config.client_id.as_str()));
        }
        form
    }

    async fn token_request(&self, grant: &[(&str, &str)]) -> Result<TokenResponse> {
        let endpoint = self.token_endpoint()?;
        let mut request = self.client.post(endpoint).form(&self.token_form(grant));
        if let Some(secret) = &self.config.client_secret {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_client_error() {
            let body: Option<TokenErrorBody> = response.json().await.ok();
            let (error, description) = body.map_or_else(
                || (status.to_string(), None),
                |b| (b.error, b.error_description),
            );
            tracing::warn!(
                status = %status,
                error = %error,
                description = ?description,
                "Token endpoint rejected grant"
            );
            return Err(OidcError::Rejected(ErrorKind::CredentialRejected));
        }
        if !status.is_success() {
            return Err(OidcError::Provider(format!(
                "token endpoint returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OidcError::Provider(format!("malformed token response: {e}")))
    }
}

#[async_trait]
impl OidcProviderClient for HttpOidcProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        tracing::debug!(issuer = %self.metadata.issuer, "Exchanging authorization code");
        let mut params = vec![("grant_type", "authorization_code"), ("code", code)];
        if let Some(redirect_uri) = &self.config.redirect_uri {
            params.push(("redirect_uri", redirect_uri.as_str()));
        }
        self.token_request(&params).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        tracing::debug!(issuer = %self.metadata.issuer, "Refreshing access token");
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn userinfo(&self, access_token: &str) -> Result<UserInfo> {
        let endpoint = self
            .metadata
            .userinfo_endpoint
            .as_deref()
            .ok_or_else(|| OidcError::Config("provider has no userinfo endpoint".into()))?;

        let response = self
            .client
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(OidcError::Rejected(ErrorKind::CredentialRejected));
        }
        if !status.is_success() {
            return Err(OidcError::Provider(format!(
                "userinfo endpoint returned {status}"
            )));
        }

        let is_jwt = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/jwt"));

        if is_jwt {
            let body = response.text().await?;
            Ok(UserInfo::Jwt(body.trim().to_string()))
        } else {
            let claims: Claims = response
                .json()
                .await
                .map_err(|e| OidcError::Provider(format!("malformed userinfo response: {e}")))?;
            Ok(UserInfo::Json(claims))
        }
    }
}
