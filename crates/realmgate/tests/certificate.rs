//! Certificate authentication against a trust store loaded from disk

use std::fs;
use std::sync::Arc;

use rcgen::{Certificate, CertificateParams, DnType, KeyPair};
use realmgate::bootstrap::create_security_context;
use realmgate::constants::{X509_PKI_PATH_VALUE_TYPE, X509_V3_VALUE_TYPE};
use realmgate::credential::BinarySecurityToken;
use realmgate::policy::{ContextPolicyEngine, PolicyEntry};
use realmgate::trust::x509::encode_pki_path;
use realmgate::{
    AuthDecision, Authenticator, ConfigBuilder, CredentialKind, ErrorKind, RawCredential,
    RequestEnvelope,
};
use tempfile::TempDir;

fn self_signed(cn: &str) -> Certificate {
    let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.distinguished_name.push(DnType::CountryName, "NL");
    let key = KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap()
}

fn x509(der: &[u8]) -> RawCredential {
    RawCredential::BinarySecurityToken(BinarySecurityToken::from_bytes(X509_V3_VALUE_TYPE, der))
}

/// Authenticator trusting `anchors`, guarding `/wfs` with PKI
async fn authenticator(
    dir: &TempDir,
    anchors: &[&Certificate],
    constraints: &[&str],
) -> Authenticator {
    let entries =
        [PolicyEntry::new("/wfs", "pki", ["PKI"]).with_required_attribute("country", "NL")];
    authenticator_with(dir, anchors, constraints, entries).await
}

async fn authenticator_with(
    dir: &TempDir,
    anchors: &[&Certificate],
    constraints: &[&str],
    entries: impl IntoIterator<Item = PolicyEntry>,
) -> Authenticator {
    let bundle: String = anchors.iter().map(|c| c.pem()).collect();
    let trust_store = dir.path().join("trust.pem");
    fs::write(&trust_store, bundle).unwrap();

    let config = ConfigBuilder::new()
        .token_store_dir(dir.path().join("tokens"))
        .certificate_trust_store(&trust_store)
        .subject_constraints(constraints.iter().map(|s| (*s).to_string()).collect())
        .build()
        .unwrap();
    let policy = Arc::new(ContextPolicyEngine::new(entries, Vec::new()));
    let context = create_security_context(&config, policy).await.unwrap();
    Authenticator::new(Arc::new(context))
}

#[tokio::test]
async fn test_trusted_certificate_authenticates() {
    let dir = TempDir::new().unwrap();
    let alice = self_signed("alice");
    let auth = authenticator(&dir, &[&alice], &[]).await;

    let envelope = RequestEnvelope::new("/wfs/layers").with_security_token(x509(alice.der()));
    let decision = auth.authenticate(&envelope).await.unwrap();

    let subject = decision.subject().expect("authenticated");
    assert!(subject.principal.name.contains("CN=alice"));
    assert_eq!(subject.principal.attribute("country"), Some("NL"));
    assert_eq!(subject.realm, "pki");
    assert_eq!(subject.kind, CredentialKind::Certificate);
}

#[tokio::test]
async fn test_pki_path_form() {
    let dir = TempDir::new().unwrap();
    let alice = self_signed("alice");
    let auth = authenticator(&dir, &[&alice], &[]).await;

    let path = encode_pki_path(&[alice.der().to_vec()]);
    let token = BinarySecurityToken::from_bytes(X509_PKI_PATH_VALUE_TYPE, &path);
    let envelope = RequestEnvelope::new("/wfs")
        .with_security_token(RawCredential::BinarySecurityToken(token));

    assert!(auth.authenticate(&envelope).await.unwrap().subject().is_some());
}

#[tokio::test]
async fn test_subject_constraint_overrides_trust() {
    let dir = TempDir::new().unwrap();
    let alice = self_signed("alice");
    let mallory = self_signed("mallory");
    let auth = authenticator(&dir, &[&alice, &mallory], &[".*CN=alice.*"]).await;

    let ok = RequestEnvelope::new("/wfs").with_security_token(x509(alice.der()));
    assert!(auth.authenticate(&ok).await.unwrap().subject().is_some());

    let denied = RequestEnvelope::new("/wfs").with_security_token(x509(mallory.der()));
    assert_eq!(
        auth.authenticate(&denied).await.unwrap(),
        AuthDecision::Unauthorized {
            reason: Some(ErrorKind::SubjectNotPermitted)
        }
    );
}

#[tokio::test]
async fn test_untrusted_certificate_rejected() {
    let dir = TempDir::new().unwrap();
    let anchor = self_signed("anchor");
    let stranger = self_signed("stranger");
    let auth = authenticator(&dir, &[&anchor], &[]).await;

    let envelope = RequestEnvelope::new("/wfs").with_security_token(x509(stranger.der()));
    assert_eq!(
        auth.authenticate(&envelope).await.unwrap(),
        AuthDecision::Unauthorized {
            reason: Some(ErrorKind::CertificateUntrusted)
        }
    );
}

#[tokio::test]
async fn test_garbage_certificate_is_decode_error() {
    let dir = TempDir::new().unwrap();
    let alice = self_signed("alice");
    let auth = authenticator(&dir, &[&alice], &[]).await;

    let envelope = RequestEnvelope::new("/wfs").with_security_token(x509(b"not a certificate"));
    assert_eq!(
        auth.authenticate(&envelope).await.unwrap(),
        AuthDecision::Unauthorized {
            reason: Some(ErrorKind::DecodeError)
        }
    );
}

#[tokio::test]
async fn test_trusted_certificate_rejected_for_other_realm() {
    let dir = TempDir::new().unwrap();
    let alice = self_signed("alice");
    let auth = authenticator_with(
        &dir,
        &[&alice],
        &[],
        [
            PolicyEntry::new("/", "ldap", ["PKI"]),
            PolicyEntry::new("/wfs", "pki", ["PKI"]),
        ],
    )
    .await;

    let envelope = RequestEnvelope::new("/catalog").with_security_token(x509(alice.der()));
    assert_eq!(
        auth.authenticate(&envelope).await.unwrap(),
        AuthDecision::Unauthorized {
            reason: Some(ErrorKind::RealmNotFound)
        }
    );

    let envelope = RequestEnvelope::new("/wfs").with_security_token(x509(alice.der()));
    assert_eq!(auth.authenticate(&envelope).await.unwrap().subject().unwrap().realm, "pki");
}
