//! OIDC credential validator

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, Validation};

use super::claims::Claims;
use super::config::OidcValidatorConfig;
use super::error::{OidcError, Result};
use super::jwks::KeySource;
use super::jwt::{self, TokenHeader};
use super::metadata::{ProviderMetadata, algorithm_name};
use super::provider::{OidcProviderClient, UserInfo};
use crate::credential::{CredentialKind, OidcCredential, RawCredential};
use crate::validation::{
    self, ErrorKind, IssuedTokens, Principal, TokenValidator, ValidationContext,
    ValidationOutcome,
};

/// ID token that passed signature, claim and nonce checks
#[derive(Debug, Clone)]
pub struct ValidatedIdToken {
    pub claims: Claims,
    pub algorithm: Algorithm,
}

/// Validates authorization codes, ID tokens and bearer access tokens
/// issued by one provider
#[derive(Debug, Clone)]
pub struct OidcValidator {
    config: OidcValidatorConfig,
    provider: Arc<dyn OidcProviderClient>,
    keys: Arc<dyn KeySource>,
}

fn signed_header(token: &str) -> Result<TokenHeader> {
    let header = jwt::parse_header(token)?;
    if jwt::is_unsigned(token, &header) {
        return Err(OidcError::Rejected(ErrorKind::TokenNotSigned));
    }
    Ok(header)
}

impl OidcValidator {
    pub fn new(
        config: OidcValidatorConfig,
        provider: Arc<dyn OidcProviderClient>,
        keys: Arc<dyn KeySource>,
    ) -> Self {
        Self {
            config,
            provider,
            keys,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &OidcValidatorConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn OidcProviderClient> {
        &self.provider
    }

    fn leeway(&self) -> u64 {
        self.config.clock_skew.as_secs()
    }

    /// Verify an ID token from the token endpoint
    ///
    /// Unsigned tokens are refused before anything else is looked at. The
    /// issuer must equal the provider's, the audience must contain our
    /// client id, and when nonce checking is on the token's `nonce` must
    /// equal the one bound to the caller's session.
    pub async fn validate_id_token(
        &self,
        id_token: &str,
        session_nonce: Option<&str>,
        metadata: &ProviderMetadata,
    ) -> Result<ValidatedIdToken> {
        let header = signed_header(id_token)?;
        let alg = jwt::algorithm(&header)?;
        if !metadata.allows_id_token_alg(alg) {
            tracing::warn!(alg = %algorithm_name(alg), "ID token algorithm not advertised by provider");
            return Err(OidcError::Rejected(ErrorKind::UnsupportedAlgorithm));
        }

        let keys = self
            .keys
            .candidate_keys(&metadata.jwks_uri, header.kid.as_deref(), alg)
            .await?;
        if keys.is_empty() {
            tracing::warn!(kid = ?header.kid, alg = %algorithm_name(alg), "No key matches ID token");
            return Err(OidcError::Rejected(ErrorKind::NoMatchingKey));
        }

        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway();
        validation.set_issuer(&[metadata.issuer.as_str()]);
        validation.set_audience(&[self.config.client_id.as_str()]);

        let claims = jwt::verify_with_candidates(id_token, &keys, &validation)?;

        if self.config.check_nonce && claims.nonce() != session_nonce {
            tracing::warn!(
                has_session_nonce = session_nonce.is_some(),
                has_token_nonce = claims.nonce().is_some(),
                "ID token nonce does not match session"
            );
            return Err(OidcError::Rejected(ErrorKind::NonceMismatch));
        }

        Ok(ValidatedIdToken {
            claims,
            algorithm: alg,
        })
    }

    /// Verify an ID token returned by the userinfo endpoint
    ///
    /// The response arrived over the authenticated back channel, so an
    /// unsigned token is accepted as is. A signed one must use an algorithm
    /// the provider advertises for userinfo (or, when it advertises none,
    /// the token's own header algorithm) and verify against one of the
    /// candidate keys.
    pub async fn validate_user_info_id_token(
        &self,
        token: &str,
        metadata: &ProviderMetadata,
    ) -> Result<Claims> {
        let header = jwt::parse_header(token)?;
        if jwt::is_unsigned(token, &header) {
            tracing::debug!("Accepting unsigned userinfo token");
            return jwt::unverified_claims(token);
        }

        let alg = jwt::algorithm(&header)?;
        if !metadata.allows_userinfo_alg(alg) {
            tracing::warn!(alg = %algorithm_name(alg), "Userinfo algorithm not advertised by provider");
            return Err(OidcError::Rejected(ErrorKind::UnsupportedAlgorithm));
        }

        let keys = self
            .keys
            .candidate_keys(&metadata.jwks_uri, header.kid.as_deref(), alg)
            .await?;

        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway();
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        jwt::verify_with_candidates(token, &keys, &validation)
    }

    /// Verify a JWT access token
    ///
    /// The expected algorithm is the ID token's when one is available,
    /// otherwise the access token's own header algorithm. `alg: none` is
    /// refused in both cases. With an ID token present, `at_hash` binding
    /// is checked as well.
    pub async fn validate_access_token(
        &self,
        access_token: &str,
        id_token: Option<&ValidatedIdToken>,
        metadata: &ProviderMetadata,
    ) -> Result<Claims> {
        let header = signed_header(access_token)?;
        let alg = match id_token {
            Some(id_token) => id_token.algorithm,
            None => jwt::algorithm(&header)?,
        };

        let keys = self
            .keys
            .candidate_keys(&metadata.jwks_uri, header.kid.as_deref(), alg)
            .await?;
        if keys.is_empty() {
            tracing::warn!(kid = ?header.kid, alg = %algorithm_name(alg), "No key matches access token");
            return Err(OidcError::Rejected(ErrorKind::NoMatchingKey));
        }

        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway();
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = jwt::verify_with_candidates(access_token, &keys, &validation)?;

        if let Some(id_token) = id_token {
            self.validate_access_token_at_hash(access_token, id_token)?;
        }
        Ok(claims)
    }

    /// Check the ID token's `at_hash` against `access_token`
    pub fn validate_access_token_at_hash(
        &self,
        access_token: &str,
        id_token: &ValidatedIdToken,
    ) -> Result<()> {
        let mandatory = self.config.response_type.requires_at_hash();
        match id_token.claims.at_hash() {
            None if mandatory => {
                tracing::warn!(response_type = %self.config.response_type, "ID token lacks at_hash");
                Err(OidcError::Rejected(ErrorKind::AtHashMissing))
            }
            None => Ok(()),
            Some(expected) => {
                let actual = jwt::at_hash(access_token, id_token.algorithm)?;
                if actual == expected {
                    Ok(())
                } else {
                    tracing::warn!("Access token does not match ID token at_hash");
                    Err(OidcError::Rejected(ErrorKind::AtHashMismatch))
                }
            }
        }
    }

    async fn userinfo_claims(&self, access_token: &str, metadata: &ProviderMetadata) -> Result<Claims> {
        match self.provider.userinfo(access_token).await? {
            UserInfo::Jwt(token) => self.validate_user_info_id_token(&token, metadata).await,
            UserInfo::Json(claims) => Ok(claims),
        }
    }

    async fn run(&self, credential: &OidcCredential) -> Result<(Claims, Option<IssuedTokens>)> {
        let metadata = self.provider.metadata();
        let nonce = credential.session_nonce.as_deref();

        if let Some(code) = &credential.authorization_code {
            let response = self.provider.exchange_code(code).await?;
            let id_token = response
                .id_token
                .as_deref()
                .ok_or(OidcError::Rejected(ErrorKind::DecodeError))?;
            let validated = self.validate_id_token(id_token, nonce, metadata).await?;
            self.validate_access_token(&response.access_token, Some(&validated), metadata)
                .await?;
            return Ok((validated.claims, Some(response.into_issued())));
        }

        match (&credential.access_token, &credential.id_token) {
            (Some(access_token), Some(id_token)) => {
                let validated = self.validate_id_token(id_token, nonce, metadata).await?;
                let access_claims = self
                    .validate_access_token(access_token, Some(&validated), metadata)
                    .await?;
                let tokens = IssuedTokens {
                    access_token: access_token.clone(),
                    refresh_token: None,
                    id_token: Some(id_token.clone()),
                    expires_at: access_claims.exp(),
                };
                Ok((validated.claims, Some(tokens)))
            }
            (Some(access_token), None) => {
                let mut claims = self.validate_access_token(access_token, None, metadata).await?;
                if metadata.userinfo_endpoint.is_some() {
                    let info = self.userinfo_claims(access_token, metadata).await?;
                    if let (Some(token_sub), Some(info_sub)) = (claims.sub(), info.sub())
                        && token_sub != info_sub
                    {
                        tracing::warn!("Userinfo subject differs from access token subject");
                        return Err(OidcError::Rejected(ErrorKind::ClaimsInvalid));
                    }
                    claims.merge_missing(info);
                }
                let tokens = IssuedTokens {
                    access_token: access_token.clone(),
                    refresh_token: None,
                    id_token: None,
                    expires_at: claims.exp(),
                };
                Ok((claims, Some(tokens)))
            }
            (None, Some(id_token)) => {
                let validated = self.validate_id_token(id_token, nonce, metadata).await?;
                Ok((validated.claims, None))
            }
            (None, None) => Err(OidcError::Rejected(ErrorKind::DecodeError)),
        }
    }
}

#[async_trait]
impl TokenValidator for OidcValidator {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Oidc
    }

    fn can_handle(&self, credential: &RawCredential) -> bool {
        matches!(credential, RawCredential::Oidc(c) if !c.is_empty())
    }

    async fn validate(
        &self,
        credential: &RawCredential,
        context: &ValidationContext,
    ) -> validation::Result<ValidationOutcome> {
        if !context.serves(&self.config.realm) {
            tracing::warn!(realm = %self.config.realm, wanted = ?context.realm, "OIDC realm not required here");
            return Ok(ValidationOutcome::invalid(ErrorKind::RealmNotFound));
        }

        let RawCredential::Oidc(oidc) = credential else {
            return Ok(ValidationOutcome::invalid(ErrorKind::DecodeError));
        };

        let (claims, tokens) = match self.run(oidc).await {
            Ok(result) => result,
            Err(OidcError::Rejected(kind)) => {
                tracing::warn!(reason = %kind, "OIDC credential rejected");
                return Ok(ValidationOutcome::invalid(kind));
            }
            Err(e) => {
                tracing::error!(error = %e, "OIDC validation failed");
                return Err(e.into());
            }
        };

        let Some(name) = claims.principal_name() else {
            tracing::warn!("Verified token carries no usable principal claim");
            return Ok(ValidationOutcome::invalid(ErrorKind::ClaimsInvalid));
        };

        let principal = Principal::new(name).with_attributes(claims.attributes());
        tracing::info!(principal = %principal.name, realm = %self.config.realm, "OIDC credential validated");

        let outcome = ValidationOutcome::valid(principal, self.config.realm.clone());
        Ok(match tokens {
            Some(tokens) => outcome.with_tokens(tokens),
            None => outcome,
        })
    }
}
