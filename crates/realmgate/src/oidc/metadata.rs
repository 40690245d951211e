//! Provider metadata and discovery

use std::time::Duration;

use jsonwebtoken::Algorithm;
use openidconnect::IssuerUrl;
use openidconnect::core::CoreProviderMetadata;
use serde::Serialize;

use super::error::{OidcError, Result};

/// The subset of provider metadata token validation needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub jwks_uri: String,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub id_token_signing_algs: Vec<String>,
    pub userinfo_signing_algs: Vec<String>,
}

/// JOSE name of an algorithm, e.g. `RS256`
#[must_use]
pub fn algorithm_name(alg: Algorithm) -> String {
    format!("{alg:?}")
}

fn serialized_name<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value)
        .ok()?
        .as_str()
        .map(str::to_string)
}

impl ProviderMetadata {
    pub fn new(issuer: impl Into<String>, jwks_uri: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            jwks_uri: jwks_uri.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_userinfo_endpoint(mut self, url: impl Into<String>) -> Self {
        self.userinfo_endpoint = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_id_token_signing_algs<I, S>(mut self, algs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_token_signing_algs = algs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_userinfo_signing_algs<I, S>(mut self, algs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.userinfo_signing_algs = algs.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the provider advertises `alg` for ID tokens. An empty list
    /// places no restriction.
    #[must_use]
    pub fn allows_id_token_alg(&self, alg: Algorithm) -> bool {
        let name = algorithm_name(alg);
        self.id_token_signing_algs.is_empty() || self.id_token_signing_algs.contains(&name)
    }

    /// Whether the provider advertises `alg` for userinfo responses. An
    /// empty list trusts the token's own header.
    #[must_use]
    pub fn allows_userinfo_alg(&self, alg: Algorithm) -> bool {
        let name = algorithm_name(alg);
        self.userinfo_signing_algs.is_empty() || self.userinfo_signing_algs.contains(&name)
    }

    /// Run OIDC discovery against `issuer`
    pub async fn discover(issuer: &str, timeout: Duration) -> Result<Self> {
        tracing::info!(issuer = %issuer, "Discovering OIDC provider");

        let issuer_url = IssuerUrl::new(issuer.to_string())
            .map_err(|e| OidcError::Config(format!("invalid issuer URL: {e}")))?;

        let http_client = openidconnect::reqwest::Client::builder()
            .timeout(timeout)
            .redirect(openidconnect::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OidcError::Config(format!("failed to create HTTP client: {e}")))?;

        let metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| OidcError::Discovery(e.to_string()))?;

        let metadata = Self::from_core(&metadata);
        tracing::info!(
            issuer = %metadata.issuer,
            jwks_uri = %metadata.jwks_uri,
            has_userinfo = metadata.userinfo_endpoint.is_some(),
            "OIDC discovery completed"
        );
        Ok(metadata)
    }

    #[must_use]
    pub fn from_core(metadata: &CoreProviderMetadata) -> Self {
        Self {
            issuer: metadata.issuer().as_str().to_string(),
            jwks_uri: metadata.jwks_uri().as_str().to_string(),
            token_endpoint: metadata.token_endpoint().map(|u| u.as_str().to_string()),
            userinfo_endpoint: metadata.userinfo_endpoint().map(|u| u.as_str().to_string()),
            id_token_signing_algs: metadata
                .id_token_signing_alg_values_supported()
                .iter()
                .filter_map(serialized_name)
                .collect(),
            userinfo_signing_algs: metadata
                .userinfo_signing_alg_values_supported()
                .map(|algs| algs.iter().filter_map(serialized_name).collect())
                .unwrap_or_default(),
        }
    }
}
