//! X.509 parsing helpers and the trust-store verifier

use std::path::Path;

use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::pem::Pem;
use x509_parser::prelude::FromDer;

use super::{CertificateTrust, TrustError, TrustVerdict};

const DER_SEQUENCE_TAG: u8 = 0x30;

fn parse(der: &[u8]) -> Result<X509Certificate<'_>, TrustError> {
    let (rest, cert) =
        X509Certificate::from_der(der).map_err(|e| TrustError::Malformed(e.to_string()))?;
    if !rest.is_empty() {
        return Err(TrustError::Malformed(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }
    Ok(cert)
}

/// Split the body of a DER `SEQUENCE` header off `input`
fn sequence_body(input: &[u8]) -> Result<&[u8], TrustError> {
    let malformed = |reason: &str| TrustError::Malformed(format!("PkiPath: {reason}"));

    let (&tag, rest) = input.split_first().ok_or_else(|| malformed("empty"))?;
    if tag != DER_SEQUENCE_TAG {
        return Err(malformed("not a SEQUENCE"));
    }
    let (&first, rest) = rest.split_first().ok_or_else(|| malformed("missing length"))?;

    let (len, rest) = if first & 0x80 == 0 {
        (usize::from(first), rest)
    } else {
        let count = usize::from(first & 0x7f);
        if count == 0 || count > 4 || rest.len() < count {
            return Err(malformed("bad length"));
        }
        let len = rest[..count]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
        (len, &rest[count..])
    };

    if rest.len() != len {
        return Err(malformed("length mismatch"));
    }
    Ok(rest)
}

/// Split a PkiPath (`SEQUENCE OF Certificate`, issuer first) into a
/// leaf-first list of DER certificates
pub fn split_pki_path(der: &[u8]) -> Result<Vec<Vec<u8>>, TrustError> {
    let mut remaining = sequence_body(der)?;
    let mut certs = Vec::new();

    while !remaining.is_empty() {
        let (rest, _) = X509Certificate::from_der(remaining)
            .map_err(|e| TrustError::Malformed(e.to_string()))?;
        let consumed = remaining.len() - rest.len();
        certs.push(remaining[..consumed].to_vec());
        remaining = rest;
    }

    if certs.is_empty() {
        return Err(TrustError::Malformed("PkiPath: no certificates".into()));
    }
    certs.reverse();
    Ok(certs)
}

/// Encode a leaf-first chain as a PkiPath
#[must_use]
pub fn encode_pki_path(leaf_first: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = leaf_first.iter().rev().flatten().copied().collect();
    let mut out = vec![DER_SEQUENCE_TAG];
    if body.len() < 0x80 {
        out.push(body.len() as u8);
    } else {
        let len_bytes: Vec<u8> = body
            .len()
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        out.push(0x80 | len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
    out.extend_from_slice(&body);
    out
}

/// Subject distinguished name of a certificate
pub fn subject_dn(der: &[u8]) -> Result<String, TrustError> {
    Ok(parse(der)?.subject().to_string())
}

/// E-mail address from the subject DN, falling back to an RFC 822
/// subject alternative name
pub fn email_address(der: &[u8]) -> Result<Option<String>, TrustError> {
    let cert = parse(der)?;

    if let Some(attr) = cert.subject().iter_email().next() {
        let email = attr
            .as_str()
            .map_err(|e| TrustError::Malformed(format!("emailAddress: {e}")))?;
        return Ok(Some(email.to_string()));
    }

    let san = cert
        .subject_alternative_name()
        .map_err(|e| TrustError::Malformed(format!("subjectAltName: {e}")))?;
    Ok(san.and_then(|ext| {
        ext.value.general_names.iter().find_map(|name| match name {
            GeneralName::RFC822Name(email) => Some((*email).to_string()),
            _ => None,
        })
    }))
}

/// Country code from the subject DN
pub fn country(der: &[u8]) -> Result<Option<String>, TrustError> {
    let cert = parse(der)?;
    cert.subject()
        .iter_country()
        .next()
        .map(|attr| {
            attr.as_str()
                .map(str::to_string)
                .map_err(|e| TrustError::Malformed(format!("countryName: {e}")))
        })
        .transpose()
}

/// Verifies chains against a fixed set of trust anchors
///
/// A chain is trusted when every certificate is inside its validity window,
/// each certificate is signed by the next one, and the last certificate
/// either is an anchor or is signed by one.
#[derive(Debug, Clone, Default)]
pub struct TrustStoreVerifier {
    anchors: Vec<Vec<u8>>,
}

impl TrustStoreVerifier {
    /// Build from DER anchors, rejecting any that fail to parse
    pub fn from_der(anchors: Vec<Vec<u8>>) -> Result<Self, TrustError> {
        for der in &anchors {
            parse(der)?;
        }
        Ok(Self { anchors })
    }

    /// Build from a PEM bundle
    pub fn from_pem(pem: &[u8]) -> Result<Self, TrustError> {
        let mut anchors = Vec::new();
        for block in Pem::iter_from_buffer(pem) {
            let block = block.map_err(|e| TrustError::Malformed(format!("PEM: {e}")))?;
            if block.label == "CERTIFICATE" {
                anchors.push(block.contents);
            }
        }
        Self::from_der(anchors)
    }

    /// Load anchors from a PEM/DER file or a directory of them
    pub fn load(path: &Path) -> Result<Self, TrustError> {
        let unavailable = |e: std::io::Error| {
            TrustError::Unavailable(format!("{}: {e}", path.display()))
        };

        let files = if path.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(path)
                .map_err(unavailable)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut anchors = Vec::new();
        for file in files {
            let bytes = std::fs::read(&file).map_err(unavailable)?;
            let loaded = if bytes.starts_with(b"-----BEGIN") {
                Self::from_pem(&bytes)
            } else {
                Self::from_der(vec![bytes])
            }
            .map_err(|e| TrustError::Unavailable(format!("{}: {e}", file.display())))?;
            anchors.extend(loaded.anchors);
        }

        if anchors.is_empty() {
            return Err(TrustError::Unavailable(format!(
                "{}: no trust anchors found",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), anchors = anchors.len(), "Loaded trust store");
        Ok(Self { anchors })
    }

    #[must_use]
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    fn anchored(&self, last_der: &[u8], last: &X509Certificate<'_>) -> Result<bool, TrustError> {
        for anchor_der in &self.anchors {
            if anchor_der.as_slice() == last_der {
                return Ok(true);
            }
            let anchor = parse(anchor_der)?;
            if anchor.subject().as_raw() == last.issuer().as_raw()
                && anchor.validity().is_valid()
                && last.verify_signature(Some(anchor.public_key())).is_ok()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl CertificateTrust for TrustStoreVerifier {
    fn verify(&self, der_chain: &[Vec<u8>]) -> Result<TrustVerdict, TrustError> {
        if self.anchors.is_empty() {
            return Err(TrustError::Unavailable("trust store is empty".into()));
        }
        if der_chain.is_empty() {
            return Err(TrustError::Malformed("empty certificate chain".into()));
        }

        let chain = der_chain
            .iter()
            .map(|der| parse(der))
            .collect::<Result<Vec<_>, _>>()?;

        for cert in &chain {
            if !cert.validity().is_valid() {
                return Ok(TrustVerdict::Untrusted(format!(
                    "certificate {} outside validity window",
                    cert.subject()
                )));
            }
        }

        for pair in chain.windows(2) {
            let (child, issuer) = (&pair[0], &pair[1]);
            if child.issuer().as_raw() != issuer.subject().as_raw()
                || child.verify_signature(Some(issuer.public_key())).is_err()
            {
                return Ok(TrustVerdict::Untrusted(format!(
                    "certificate {} not issued by {}",
                    child.subject(),
                    issuer.subject()
                )));
            }
        }

        let last_index = chain.len() - 1;
        if self.anchored(&der_chain[last_index], &chain[last_index])? {
            Ok(TrustVerdict::Trusted)
        } else {
            Ok(TrustVerdict::Untrusted(format!(
                "no trust anchor for {}",
                chain[last_index].issuer()
            )))
        }
    }
}
