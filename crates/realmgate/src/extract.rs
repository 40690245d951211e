//! Pulling credentials out of a request envelope

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::constants::{ACCESS_TOKEN_PARAM, AUTHORIZATION_HEADER, CODE_PARAM, ID_TOKEN_PARAM};
use crate::credential::{CredentialKind, OidcCredential, RawCredential, UsernamePasswordCredential};
use crate::validation::ErrorKind;

/// Transport-neutral view of an inbound request
#[derive(Debug, Clone, Default)]
pub struct RequestEnvelope {
    pub path: String,
    /// Header names are stored lowercase
    headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
    /// Security-header elements, already parsed
    pub security_tokens: Vec<RawCredential>,
    /// Nonce bound to the caller's session when an OIDC login began
    pub session_nonce: Option<String>,
}

impl RequestEnvelope {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_security_token(mut self, token: RawCredential) -> Self {
        self.security_tokens.push(token);
        self
    }

    #[must_use]
    pub fn with_session_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.session_nonce = Some(nonce.into());
        self
    }

    /// Case-insensitive header lookup
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `Authorization` header value after `scheme`, matched case-insensitively
    fn authorization(&self, scheme: &str) -> Option<&str> {
        let value = self.header(AUTHORIZATION_HEADER)?.trim();
        let (found, rest) = value.split_once(' ')?;
        found.eq_ignore_ascii_case(scheme).then(|| rest.trim())
    }
}

/// Result of looking for one kind of credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The request carries no credential of this kind
    Absent,
    Found(RawCredential),
    /// A credential of this kind is present but unreadable
    Malformed(ErrorKind),
}

/// Look for a credential of `kind` in `envelope`
#[must_use]
pub fn extract(kind: CredentialKind, envelope: &RequestEnvelope) -> Extraction {
    match kind {
        CredentialKind::Ticket => extract_ticket(envelope),
        CredentialKind::Certificate => extract_certificate(envelope),
        CredentialKind::UsernamePassword => extract_username_password(envelope),
        CredentialKind::Oidc => extract_oidc(envelope),
    }
}

fn first_token(envelope: &RequestEnvelope, pred: impl Fn(&RawCredential) -> bool) -> Extraction {
    envelope
        .security_tokens
        .iter()
        .find(|token| pred(token))
        .cloned()
        .map_or(Extraction::Absent, Extraction::Found)
}

fn extract_ticket(envelope: &RequestEnvelope) -> Extraction {
    first_token(envelope, |token| {
        matches!(token, RawCredential::BinarySecurityToken(bst) if bst.is_ticket())
    })
}

fn extract_certificate(envelope: &RequestEnvelope) -> Extraction {
    first_token(envelope, |token| match token {
        RawCredential::BinarySecurityToken(bst) => bst.is_pki_path() || bst.is_single_x509(),
        RawCredential::X509KeyInfo(certs) => !certs.is_empty(),
        _ => false,
    })
}

fn extract_username_password(envelope: &RequestEnvelope) -> Extraction {
    if let Extraction::Found(token) = first_token(envelope, |token| {
        matches!(token, RawCredential::UsernamePassword(_))
    }) {
        return Extraction::Found(token);
    }

    let Some(encoded) = envelope.authorization("Basic") else {
        return Extraction::Absent;
    };
    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    match decoded.as_deref().and_then(|text| text.split_once(':')) {
        Some((username, password)) if !username.is_empty() => Extraction::Found(
            RawCredential::UsernamePassword(UsernamePasswordCredential::new(username, password)),
        ),
        _ => {
            tracing::debug!("Malformed Basic authorization header");
            Extraction::Malformed(ErrorKind::DecodeError)
        }
    }
}

fn extract_oidc(envelope: &RequestEnvelope) -> Extraction {
    let bearer = envelope.authorization("Bearer").filter(|t| !t.is_empty());
    let credential = OidcCredential {
        authorization_code: envelope.param(CODE_PARAM).map(str::to_string),
        access_token: envelope
            .param(ACCESS_TOKEN_PARAM)
            .or(bearer)
            .map(str::to_string),
        id_token: envelope.param(ID_TOKEN_PARAM).map(str::to_string),
        session_nonce: envelope.session_nonce.clone(),
        source_id: None,
    };

    if credential.is_empty() {
        Extraction::Absent
    } else {
        Extraction::Found(RawCredential::Oidc(credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CAS_TICKET_VALUE_TYPE, X509_PKI_PATH_VALUE_TYPE};
    use crate::credential::BinarySecurityToken;

    fn found(extraction: Extraction) -> RawCredential {
        match extraction {
            Extraction::Found(credential) => credential,
            other => panic!("expected credential, got {other:?}"),
        }
    }

    #[test]
    fn test_basic_header() {
        let envelope = RequestEnvelope::new("/")
            .with_header("Authorization", format!("Basic {}", STANDARD.encode("bob:pa:ss")));
        let RawCredential::UsernamePassword(upt) =
            found(extract(CredentialKind::UsernamePassword, &envelope))
        else {
            panic!("expected username/password");
        };
        assert_eq!(upt.username, "bob");
        assert_eq!(upt.password.as_deref(), Some("pa:ss"));
    }

    #[test]
    fn test_malformed_basic_header() {
        for value in ["Basic !!!", "basic Ym9i", "BASIC OnB3"] {
            let envelope = RequestEnvelope::new("/").with_header("authorization", value);
            assert_eq!(
                extract(CredentialKind::UsernamePassword, &envelope),
                Extraction::Malformed(ErrorKind::DecodeError),
                "{value}"
            );
        }
    }

    #[test]
    fn test_username_token_preferred_over_header() {
        let upt = UsernamePasswordCredential::new("alice", "pw").with_nonce("n", "2024-01-01");
        let envelope = RequestEnvelope::new("/")
            .with_header("Authorization", format!("Basic {}", STANDARD.encode("bob:pw")))
            .with_security_token(RawCredential::UsernamePassword(upt.clone()));
        assert_eq!(
            found(extract(CredentialKind::UsernamePassword, &envelope)),
            RawCredential::UsernamePassword(upt)
        );
    }

    #[test]
    fn test_bearer_and_code() {
        let envelope = RequestEnvelope::new("/")
            .with_header("AUTHORIZATION", "bearer eyJ.a.b")
            .with_session_nonce("n-1");
        let RawCredential::Oidc(oidc) = found(extract(CredentialKind::Oidc, &envelope)) else {
            panic!("expected oidc");
        };
        assert_eq!(oidc.access_token.as_deref(), Some("eyJ.a.b"));
        assert_eq!(oidc.session_nonce.as_deref(), Some("n-1"));

        let envelope = RequestEnvelope::new("/").with_param("code", "abc");
        let RawCredential::Oidc(oidc) = found(extract(CredentialKind::Oidc, &envelope)) else {
            panic!("expected oidc");
        };
        assert_eq!(oidc.authorization_code.as_deref(), Some("abc"));

        let envelope = RequestEnvelope::new("/").with_param("code", "");
        assert_eq!(extract(CredentialKind::Oidc, &envelope), Extraction::Absent);
    }

    #[test]
    fn test_binary_tokens_by_value_type() {
        let ticket = RawCredential::BinarySecurityToken(BinarySecurityToken::from_bytes(
            CAS_TICKET_VALUE_TYPE,
            b"ST-1",
        ));
        let chain = RawCredential::BinarySecurityToken(BinarySecurityToken::from_bytes(
            X509_PKI_PATH_VALUE_TYPE,
            b"\x30\x00",
        ));
        let envelope = RequestEnvelope::new("/")
            .with_security_token(chain.clone())
            .with_security_token(ticket.clone());

        assert_eq!(found(extract(CredentialKind::Ticket, &envelope)), ticket);
        assert_eq!(found(extract(CredentialKind::Certificate, &envelope)), chain);
        assert_eq!(
            extract(CredentialKind::Ticket, &RequestEnvelope::new("/")),
            Extraction::Absent
        );
    }
}
