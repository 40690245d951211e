//! CAS-style ticket validation over HTTPS

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::tls::{DEFAULT_HTTP_TIMEOUT, TlsMaterial, build_tls_client};
use super::{TicketAssertion, TicketError, TicketValidationClient};

#[derive(Debug, Clone)]
pub struct TicketClientConfig {
    /// Base URL of the ticket server, e.g. `https://sso.example.com/cas`
    pub validation_url: String,
    pub tls: TlsMaterial,
    pub timeout: Duration,
}

impl TicketClientConfig {
    pub fn new(validation_url: impl Into<String>) -> Self {
        Self {
            validation_url: validation_url.into(),
            tls: TlsMaterial::default(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn service_validate_url(&self) -> String {
        format!(
            "{}/serviceValidate",
            self.validation_url.trim_end_matches('/')
        )
    }
}

/// Ticket client calling `serviceValidate` with `format=JSON`
///
/// The TLS client is built on first use and reused afterwards, so a broken
/// trust store surfaces on the first validation rather than at startup.
#[derive(Debug)]
pub struct HttpTicketValidationClient {
    config: TicketClientConfig,
    client: RwLock<Option<Client>>,
}

impl HttpTicketValidationClient {
    #[must_use]
    pub fn new(config: TicketClientConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    fn client(&self) -> Result<Client, TicketError> {
        if let Some(client) = self.client.read().as_ref() {
            return Ok(client.clone());
        }

        let mut slot = self.client.write();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = build_tls_client(&self.config.tls, self.config.timeout)?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl TicketValidationClient for HttpTicketValidationClient {
    async fn validate(
        &self,
        ticket: &str,
        service_url: &str,
    ) -> Result<TicketAssertion, TicketError> {
        let client = self.client()?;
        let url = self.config.service_validate_url();

        tracing::debug!(url = %url, service = %service_url, "Validating service ticket");

        let response = client
            .get(&url)
            .query(&[
                ("ticket", ticket),
                ("service", service_url),
                ("format", "JSON"),
            ])
            .send()
            .await
            .map_err(|e| TicketError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TicketError::Transport(format!(
                "ticket server returned {}",
                response.status()
            )));
        }

        let body: ServiceResponseEnvelope = response
            .json()
            .await
            .map_err(|e| TicketError::Malformed(e.to_string()))?;

        body.into_assertion()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceResponseEnvelope {
    service_response: ServiceResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceResponse {
    authentication_success: Option<AuthenticationSuccess>,
    authentication_failure: Option<AuthenticationFailure>,
}

#[derive(Debug, Deserialize)]
struct AuthenticationSuccess {
    user: String,
    #[serde(default)]
    attributes: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AuthenticationFailure {
    code: String,
    #[serde(default)]
    description: String,
}

impl ServiceResponseEnvelope {
    fn into_assertion(self) -> Result<TicketAssertion, TicketError> {
        let response = self.service_response;
        if let Some(failure) = response.authentication_failure {
            return Err(TicketError::Rejected {
                code: failure.code,
                message: failure.description.trim().to_string(),
            });
        }

        let success = response.authentication_success.ok_or_else(|| {
            TicketError::Malformed("neither success nor failure in response".into())
        })?;

        let attributes = success
            .attributes
            .into_iter()
            .filter_map(|(key, value)| flatten_attribute(value).map(|v| (key, v)))
            .collect();

        Ok(TicketAssertion {
            principal: success.user,
            attributes,
        })
    }
}

/// Multi-valued attributes are joined with commas
fn flatten_attribute(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(flatten_attribute).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
        Value::Null | Value::Object(_) => None,
    }
}
