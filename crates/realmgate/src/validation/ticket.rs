//! Service ticket validator

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    ErrorKind, Principal, Result, TokenValidator, ValidationContext, ValidationOutcome,
    ValidatorError,
};
use crate::credential::{CredentialKind, RawCredential, TicketCredential};
use crate::trust::TicketValidationClient;

/// Validates SSO service tickets through a [`TicketValidationClient`]
#[derive(Debug, Clone)]
pub struct TicketValidator {
    client: Arc<dyn TicketValidationClient>,
    service_url: String,
    realm: String,
}

impl TicketValidator {
    pub fn new(
        client: Arc<dyn TicketValidationClient>,
        service_url: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            client,
            service_url: service_url.into(),
            realm: realm.into(),
        }
    }

    #[must_use]
    pub fn service_url(&self) -> &str {
        &self.service_url
    }
}

#[async_trait]
impl TokenValidator for TicketValidator {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Ticket
    }

    fn can_handle(&self, credential: &RawCredential) -> bool {
        matches!(credential, RawCredential::BinarySecurityToken(token) if token.is_ticket())
    }

    async fn validate(
        &self,
        credential: &RawCredential,
        context: &ValidationContext,
    ) -> Result<ValidationOutcome> {
        if !context.serves(&self.realm) {
            tracing::warn!(realm = %self.realm, wanted = ?context.realm, "Ticket realm not required here");
            return Ok(ValidationOutcome::invalid(ErrorKind::RealmNotFound));
        }

        let RawCredential::BinarySecurityToken(token) = credential else {
            return Ok(ValidationOutcome::invalid(ErrorKind::DecodeError));
        };

        let ticket = match TicketCredential::decode(token, &self.service_url) {
            Ok(ticket) => ticket,
            Err(kind) => {
                tracing::warn!(error = %kind, "Undecodable service ticket");
                return Ok(ValidationOutcome::invalid(kind));
            }
        };

        match self
            .client
            .validate(&ticket.ticket, &ticket.service_url)
            .await
        {
            Ok(assertion) => {
                tracing::info!(principal = %assertion.principal, realm = %self.realm, "Service ticket validated");
                let principal =
                    Principal::new(assertion.principal).with_attributes(assertion.attributes);
                Ok(ValidationOutcome::valid(principal, self.realm.clone()))
            }
            Err(e) if e.is_tls() => {
                tracing::error!(error = %e, "Ticket client TLS setup failed");
                Err(ValidatorError::Tls(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Service ticket rejected");
                Ok(ValidationOutcome::invalid(ErrorKind::CredentialRejected))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::constants::{CAS_TICKET_VALUE_TYPE, X509_PKI_PATH_VALUE_TYPE, X509_V3_VALUE_TYPE};
    use crate::credential::{BinarySecurityToken, OidcCredential, UsernamePasswordCredential};
    use crate::trust::{TicketAssertion, TicketError};

    #[derive(Debug, Default)]
    struct ScriptedClient {
        seen: Mutex<Vec<(String, String)>>,
        fail_tls: bool,
    }

    #[async_trait]
    impl TicketValidationClient for ScriptedClient {
        async fn validate(
            &self,
            ticket: &str,
            service_url: &str,
        ) -> std::result::Result<TicketAssertion, TicketError> {
            self.seen
                .lock()
                .push((ticket.to_string(), service_url.to_string()));
            if self.fail_tls {
                return Err(TicketError::Tls("bad keystore".into()));
            }
            if ticket == "ST-good" {
                let mut attributes = HashMap::new();
                attributes.insert("email".to_string(), "alice@example.com".to_string());
                Ok(TicketAssertion {
                    principal: "alice".into(),
                    attributes,
                })
            } else {
                Err(TicketError::Rejected {
                    code: "INVALID_TICKET".into(),
                    message: "unknown".into(),
                })
            }
        }
    }

    fn validator(client: Arc<ScriptedClient>) -> TicketValidator {
        TicketValidator::new(client, "https://app.example.com/services", "cas")
    }

    fn ticket_token(ticket: &str) -> RawCredential {
        RawCredential::BinarySecurityToken(BinarySecurityToken::from_bytes(
            CAS_TICKET_VALUE_TYPE,
            ticket.as_bytes(),
        ))
    }

    #[test]
    fn test_can_handle_only_ticket_value_type() {
        let v = validator(Arc::new(ScriptedClient::default()));
        assert!(v.can_handle(&ticket_token("ST-1")));

        for value_type in [
            X509_PKI_PATH_VALUE_TYPE,
            X509_V3_VALUE_TYPE,
            "urn:ogc:def:ows:CAS:ServiceTicket2",
            "",
        ] {
            let token = BinarySecurityToken::from_bytes(value_type, b"ST-1");
            assert!(!v.can_handle(&RawCredential::BinarySecurityToken(token)));
        }

        assert!(!v.can_handle(&RawCredential::UsernamePassword(
            UsernamePasswordCredential::new("a", "b")
        )));
        assert!(!v.can_handle(&RawCredential::Oidc(OidcCredential::from_code("c"))));
        assert!(!v.can_handle(&RawCredential::X509KeyInfo(vec![])));
    }

    #[tokio::test]
    async fn test_valid_ticket() {
        let client = Arc::new(ScriptedClient::default());
        let v = validator(Arc::clone(&client));

        let outcome = v
            .validate(&ticket_token("ST-good"), &ValidationContext::default())
            .await
            .unwrap();

        assert!(outcome.is_valid());
        assert_eq!(outcome.realm.as_deref(), Some("cas"));
        let principal = outcome.principal.unwrap();
        assert_eq!(principal.name, "alice");
        assert_eq!(principal.attribute("email"), Some("alice@example.com"));
        assert_eq!(
            client.seen.lock()[0],
            (
                "ST-good".to_string(),
                "https://app.example.com/services".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_ticket_for_other_realm_not_sent_to_server() {
        let client = Arc::new(ScriptedClient::default());
        let v = validator(Arc::clone(&client));

        let outcome = v
            .validate(&ticket_token("ST-good"), &ValidationContext::for_realm("ldap"))
            .await
            .unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::RealmNotFound));
        assert!(client.seen.lock().is_empty());

        let outcome = v
            .validate(&ticket_token("ST-good"), &ValidationContext::for_realm("cas"))
            .await
            .unwrap();
        assert!(outcome.is_valid());
    }

    #[tokio::test]
    async fn test_rejected_ticket_is_invalid_not_error() {
        let v = validator(Arc::new(ScriptedClient::default()));
        let outcome = v
            .validate(&ticket_token("ST-bad"), &ValidationContext::default())
            .await
            .unwrap();
        assert!(!outcome.is_valid());
        assert_eq!(outcome.error, Some(ErrorKind::CredentialRejected));
    }

    #[tokio::test]
    async fn test_tls_failure_is_hard_error() {
        let client = Arc::new(ScriptedClient {
            fail_tls: true,
            ..Default::default()
        });
        let err = validator(client)
            .validate(&ticket_token("ST-good"), &ValidationContext::default())
            .await
            .unwrap_err();
        assert!(err.is_tls());
    }

    #[tokio::test]
    async fn test_undecodable_payload() {
        let v = validator(Arc::new(ScriptedClient::default()));
        let token = RawCredential::BinarySecurityToken(BinarySecurityToken::new(
            CAS_TICKET_VALUE_TYPE,
            "!!!not base64",
        ));
        let outcome = v
            .validate(&token, &ValidationContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::DecodeError));
    }
}
