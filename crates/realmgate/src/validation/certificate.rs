//! X.509 certificate-chain validator

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use super::{
    ErrorKind, Principal, Result, TokenValidator, ValidationContext, ValidationOutcome,
    ValidatorError,
};
use crate::credential::{CertificateChainCredential, CredentialKind, RawCredential};
use crate::trust::x509::{country, email_address, split_pki_path, subject_dn};
use crate::trust::{CertificateTrust, TrustError, TrustVerdict};

/// Principal attribute holding the certificate e-mail address
pub const EMAIL_ATTRIBUTE: &str = "email";

/// Principal attribute holding the certificate country code
pub const COUNTRY_ATTRIBUTE: &str = "country";

/// Subject DN patterns a leaf certificate must match
///
/// Each pattern must match the whole DN. With no patterns every subject is
/// permitted.
#[derive(Debug, Clone, Default)]
pub struct SubjectConstraints {
    patterns: Vec<Regex>,
}

impl SubjectConstraints {
    pub fn new<I, S>(patterns: I) -> std::result::Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(&format!("^(?:{})$", p.as_ref())))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn permits(&self, subject_dn: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(subject_dn))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CertificateValidatorConfig {
    pub realm: String,
    pub subject_constraints: Vec<String>,
}

impl CertificateValidatorConfig {
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            subject_constraints: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_subject_constraint(mut self, pattern: impl Into<String>) -> Self {
        self.subject_constraints.push(pattern.into());
        self
    }
}

/// Validates certificate chains against a [`CertificateTrust`] and subject
/// constraints
#[derive(Debug, Clone)]
pub struct CertificateValidator {
    trust: Arc<dyn CertificateTrust>,
    constraints: SubjectConstraints,
    realm: String,
}

impl CertificateValidator {
    pub fn new(
        trust: Arc<dyn CertificateTrust>,
        config: CertificateValidatorConfig,
    ) -> Result<Self> {
        let constraints = SubjectConstraints::new(&config.subject_constraints)
            .map_err(|e| ValidatorError::Config(format!("invalid subject constraint: {e}")))?;
        Ok(Self {
            trust,
            constraints,
            realm: config.realm,
        })
    }

    fn decode_chain(
        credential: &RawCredential,
    ) -> std::result::Result<CertificateChainCredential, ErrorKind> {
        let der_certs = match credential {
            RawCredential::BinarySecurityToken(token) if token.is_pki_path() => {
                split_pki_path(&token.decode()?).map_err(|_| ErrorKind::DecodeError)?
            }
            RawCredential::BinarySecurityToken(token) if token.is_single_x509() => {
                vec![token.decode()?]
            }
            RawCredential::X509KeyInfo(certs) if !certs.is_empty() => certs.clone(),
            _ => return Err(ErrorKind::DecodeError),
        };
        Ok(CertificateChainCredential { der_certs })
    }

    fn enrich(leaf: &[u8]) -> HashMap<String, String> {
        let mut attributes = HashMap::new();

        match email_address(leaf) {
            Ok(Some(email)) => {
                attributes.insert(EMAIL_ATTRIBUTE.to_string(), email);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "Could not extract e-mail from certificate"),
        }

        match country(leaf) {
            Ok(Some(code)) => {
                attributes.insert(COUNTRY_ATTRIBUTE.to_string(), code);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "Could not extract country from certificate"),
        }

        attributes
    }
}

#[async_trait]
impl TokenValidator for CertificateValidator {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Certificate
    }

    fn can_handle(&self, credential: &RawCredential) -> bool {
        match credential {
            RawCredential::BinarySecurityToken(token) => {
                token.is_pki_path() || token.is_single_x509()
            }
            RawCredential::X509KeyInfo(_) => true,
            _ => false,
        }
    }

    async fn validate(
        &self,
        credential: &RawCredential,
        context: &ValidationContext,
    ) -> Result<ValidationOutcome> {
        if !context.serves(&self.realm) {
            tracing::warn!(realm = %self.realm, wanted = ?context.realm, "Certificate realm not required here");
            return Ok(ValidationOutcome::invalid(ErrorKind::RealmNotFound));
        }

        let chain = match Self::decode_chain(credential) {
            Ok(chain) => chain,
            Err(kind) => {
                tracing::warn!(error = %kind, "Undecodable certificate credential");
                return Ok(ValidationOutcome::invalid(kind));
            }
        };

        match self.trust.verify(&chain.der_certs) {
            Ok(TrustVerdict::Trusted) => {}
            Ok(TrustVerdict::Untrusted(reason)) => {
                tracing::warn!(reason = %reason, "Certificate chain not trusted");
                return Ok(ValidationOutcome::invalid(ErrorKind::CertificateUntrusted));
            }
            Err(TrustError::Malformed(reason)) => {
                tracing::warn!(reason = %reason, "Malformed certificate chain");
                return Ok(ValidationOutcome::invalid(ErrorKind::DecodeError));
            }
            Err(TrustError::Unavailable(reason)) => {
                tracing::error!(reason = %reason, "Trust store unavailable");
                return Err(ValidatorError::TrustStore(reason));
            }
        }

        let Some(leaf) = chain.leaf() else {
            return Ok(ValidationOutcome::invalid(ErrorKind::DecodeError));
        };
        let Ok(dn) = subject_dn(leaf) else {
            return Ok(ValidationOutcome::invalid(ErrorKind::DecodeError));
        };

        if !self.constraints.permits(&dn) {
            tracing::warn!(subject = %dn, "Certificate subject matches no constraint");
            return Ok(ValidationOutcome::invalid(ErrorKind::SubjectNotPermitted));
        }

        tracing::info!(subject = %dn, realm = %self.realm, "Certificate validated");
        let principal = Principal::new(dn).with_attributes(Self::enrich(leaf));
        Ok(ValidationOutcome::valid(principal, self.realm.clone()))
    }
}

#[cfg(test)]
mod tests {
    use rcgen::{CertificateParams, DnType, KeyPair, SanType};

    use super::*;
    use crate::constants::{CAS_TICKET_VALUE_TYPE, X509_PKI_PATH_VALUE_TYPE, X509_V3_VALUE_TYPE};
    use crate::credential::BinarySecurityToken;
    use crate::trust::TrustStoreVerifier;
    use crate::trust::x509::encode_pki_path;

    fn cert(cn: &str, email: Option<&str>) -> Vec<u8> {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        params.distinguished_name.push(DnType::CountryName, "NL");
        if let Some(email) = email {
            params
                .subject_alt_names
                .push(SanType::Rfc822Name(email.try_into().unwrap()));
        }
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().to_vec()
    }

    fn validator(anchors: Vec<Vec<u8>>, constraints: &[&str]) -> CertificateValidator {
        let trust = Arc::new(TrustStoreVerifier::from_der(anchors).unwrap());
        let mut config = CertificateValidatorConfig::new("pki");
        for pattern in constraints {
            config = config.with_subject_constraint(*pattern);
        }
        CertificateValidator::new(trust, config).unwrap()
    }

    fn single(der: &[u8]) -> RawCredential {
        RawCredential::BinarySecurityToken(BinarySecurityToken::from_bytes(X509_V3_VALUE_TYPE, der))
    }

    #[test]
    fn test_subject_constraints() {
        let constraints = SubjectConstraints::new([".*CN=alice.*", "CN=bob"]).unwrap();
        assert!(constraints.permits("C=NL, CN=alice"));
        assert!(constraints.permits("CN=bob"));
        assert!(!constraints.permits("CN=bob, C=NL"));
        assert!(SubjectConstraints::default().permits("anything"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let trust = Arc::new(TrustStoreVerifier::default());
        let config = CertificateValidatorConfig::new("pki").with_subject_constraint("(");
        let err = CertificateValidator::new(trust, config).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_can_handle() {
        let v = validator(vec![cert("a", None)], &[]);
        assert!(v.can_handle(&single(b"x")));
        assert!(v.can_handle(&RawCredential::BinarySecurityToken(
            BinarySecurityToken::from_bytes(X509_PKI_PATH_VALUE_TYPE, b"x")
        )));
        assert!(v.can_handle(&RawCredential::X509KeyInfo(vec![vec![1]])));
        assert!(!v.can_handle(&RawCredential::BinarySecurityToken(
            BinarySecurityToken::from_bytes(CAS_TICKET_VALUE_TYPE, b"x")
        )));
    }

    #[tokio::test]
    async fn test_trusted_certificate_with_attributes() {
        let der = cert("alice", Some("alice@example.com"));
        let v = validator(vec![der.clone()], &[]);

        let outcome = v
            .validate(&single(&der), &ValidationContext::default())
            .await
            .unwrap();

        assert!(outcome.is_valid());
        let principal = outcome.principal.unwrap();
        assert!(principal.name.contains("CN=alice"));
        assert_eq!(principal.attribute(EMAIL_ATTRIBUTE), Some("alice@example.com"));
        assert_eq!(principal.attribute(COUNTRY_ATTRIBUTE), Some("NL"));
    }

    #[tokio::test]
    async fn test_trusted_certificate_outside_required_realm() {
        let der = cert("alice", None);
        let v = validator(vec![der.clone()], &[]);

        let outcome = v
            .validate(&single(&der), &ValidationContext::for_realm("ldap"))
            .await
            .unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::RealmNotFound));

        let outcome = v
            .validate(&single(&der), &ValidationContext::for_realm("pki"))
            .await
            .unwrap();
        assert_eq!(outcome.realm.as_deref(), Some("pki"));
    }

    #[tokio::test]
    async fn test_trusted_chain_rejected_by_subject_constraint() {
        let der = cert("mallory", None);
        let v = validator(vec![der.clone()], &[".*CN=alice.*", ".*CN=bob.*"]);

        let outcome = v
            .validate(&single(&der), &ValidationContext::default())
            .await
            .unwrap();

        assert!(!outcome.is_valid());
        assert_eq!(outcome.error, Some(ErrorKind::SubjectNotPermitted));
    }

    #[tokio::test]
    async fn test_matching_subject_constraint_accepts() {
        let der = cert("bob", None);
        let v = validator(vec![der.clone()], &[".*CN=alice.*", ".*CN=bob.*"]);
        let outcome = v
            .validate(&single(&der), &ValidationContext::default())
            .await
            .unwrap();
        assert!(outcome.is_valid());
    }

    #[tokio::test]
    async fn test_untrusted_certificate() {
        let v = validator(vec![cert("anchor", None)], &[]);
        let outcome = v
            .validate(&single(&cert("stranger", None)), &ValidationContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::CertificateUntrusted));
    }

    #[tokio::test]
    async fn test_pki_path_and_key_info_forms() {
        let der = cert("alice", None);
        let v = validator(vec![der.clone()], &[]);

        let pki = RawCredential::BinarySecurityToken(BinarySecurityToken::from_bytes(
            X509_PKI_PATH_VALUE_TYPE,
            &encode_pki_path(std::slice::from_ref(&der)),
        ));
        assert!(
            v.validate(&pki, &ValidationContext::default())
                .await
                .unwrap()
                .is_valid()
        );

        let key_info = RawCredential::X509KeyInfo(vec![der]);
        assert!(
            v.validate(&key_info, &ValidationContext::default())
                .await
                .unwrap()
                .is_valid()
        );
    }

    #[tokio::test]
    async fn test_garbage_der_is_decode_error() {
        let v = validator(vec![cert("a", None)], &[]);
        let outcome = v
            .validate(&single(b"not der"), &ValidationContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::DecodeError));
    }

    #[tokio::test]
    async fn test_empty_trust_store_is_hard_error() {
        let trust = Arc::new(TrustStoreVerifier::default());
        let v = CertificateValidator::new(trust, CertificateValidatorConfig::new("pki")).unwrap();
        let err = v
            .validate(&single(&cert("a", None)), &ValidationContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidatorError::TrustStore(_)));
    }
}
