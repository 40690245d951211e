//! TLS client construction from PEM trust and identity material

use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Certificate, Client, Identity};

use super::TicketError;

/// Default timeout applied to backend HTTP calls
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// PEM files a TLS client is built from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    /// PEM bundle of CA certificates added to the default roots
    pub trust_store: Option<PathBuf>,
    /// PEM file holding a client certificate followed by its private key
    pub identity: Option<PathBuf>,
}

impl TlsMaterial {
    #[must_use]
    pub fn with_trust_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_store = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity = Some(path.into());
        self
    }
}

/// Build an HTTP client for the configured material
///
/// Unreadable or unparsable material is reported as [`TicketError::Tls`].
pub fn build_tls_client(material: &TlsMaterial, timeout: Duration) -> Result<Client, TicketError> {
    let mut builder = Client::builder().timeout(timeout);

    if let Some(path) = &material.trust_store {
        let pem = std::fs::read(path)
            .map_err(|e| TicketError::Tls(format!("cannot read {}: {e}", path.display())))?;
        let certs = Certificate::from_pem_bundle(&pem)
            .map_err(|e| TicketError::Tls(format!("invalid trust store {}: {e}", path.display())))?;
        if certs.is_empty() {
            return Err(TicketError::Tls(format!(
                "trust store {} contains no certificates",
                path.display()
            )));
        }
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    if let Some(path) = &material.identity {
        let pem = std::fs::read(path)
            .map_err(|e| TicketError::Tls(format!("cannot read {}: {e}", path.display())))?;
        let identity = Identity::from_pem(&pem)
            .map_err(|e| TicketError::Tls(format!("invalid identity {}: {e}", path.display())))?;
        builder = builder.identity(identity);
    }

    builder.build().map_err(|e| TicketError::Tls(e.to_string()))
}
