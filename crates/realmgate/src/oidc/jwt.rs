//! JWT header inspection, candidate-key verification and `at_hash`
//!
//! Headers are parsed by hand rather than through
//! [`jsonwebtoken::decode_header`], which refuses `alg: none`. An unsigned
//! token has to be recognised as such to be rejected (or, for userinfo
//! responses, accepted) with the right reason.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha384, Sha512};

use super::claims::Claims;
use super::error::{OidcError, Result};
use crate::validation::ErrorKind;

/// JOSE header fields used for key selection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| OidcError::Rejected(ErrorKind::DecodeError))
}

/// Header of a compact JWS, read from the segment before the first `.`
pub fn parse_header(token: &str) -> Result<TokenHeader> {
    let (segment, _) = token
        .split_once('.')
        .ok_or(OidcError::Rejected(ErrorKind::DecodeError))?;
    serde_json::from_slice(&decode_segment(segment)?)
        .map_err(|_| OidcError::Rejected(ErrorKind::DecodeError))
}

/// `alg: none` or an empty signature segment
#[must_use]
pub fn is_unsigned(token: &str, header: &TokenHeader) -> bool {
    header.alg.eq_ignore_ascii_case("none") || token.split('.').nth(2).is_none_or(str::is_empty)
}

/// Map the header algorithm onto a supported signing algorithm
pub fn algorithm(header: &TokenHeader) -> Result<Algorithm> {
    Algorithm::from_str(&header.alg).map_err(|_| OidcError::Rejected(ErrorKind::UnsupportedAlgorithm))
}

/// Claims of a token without verifying anything
pub fn unverified_claims(token: &str) -> Result<Claims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or(OidcError::Rejected(ErrorKind::DecodeError))?;
    serde_json::from_slice(&decode_segment(payload)?)
        .map_err(|_| OidcError::Rejected(ErrorKind::DecodeError))
}

/// Verify `token` against each candidate key in order
///
/// The first key that verifies wins. A key that fails the signature check
/// moves on to the next; a verified token whose claims fail validation is
/// rejected outright. Running out of candidates is `SignatureInvalid`.
pub fn verify_with_candidates(
    token: &str,
    keys: &[DecodingKey],
    validation: &Validation,
) -> Result<Claims> {
    for (index, key) in keys.iter().enumerate() {
        match jsonwebtoken::decode::<Claims>(token, key, validation) {
            Ok(data) => return Ok(data.claims),
            Err(e) => match e.kind() {
                JwtErrorKind::ExpiredSignature
                | JwtErrorKind::ImmatureSignature
                | JwtErrorKind::InvalidIssuer
                | JwtErrorKind::InvalidAudience
                | JwtErrorKind::MissingRequiredClaim(_) => {
                    tracing::debug!(error = %e, "Verified token failed claim checks");
                    return Err(OidcError::Rejected(ErrorKind::ClaimsInvalid));
                }
                JwtErrorKind::InvalidToken
                | JwtErrorKind::Base64(_)
                | JwtErrorKind::Json(_)
                | JwtErrorKind::Utf8(_) => {
                    return Err(OidcError::Rejected(ErrorKind::DecodeError));
                }
                _ => {
                    tracing::debug!(candidate = index, error = %e, "Candidate key did not verify token");
                }
            },
        }
    }
    Err(OidcError::Rejected(ErrorKind::SignatureInvalid))
}

/// `at_hash` for `access_token` under `alg`: base64url of the left half of
/// the SHA-2 digest matching the algorithm's bit length
#[allow(unreachable_patterns)]
pub fn at_hash(access_token: &str, alg: Algorithm) -> Result<String> {
    let bytes = access_token.as_bytes();
    let digest: Vec<u8> = match alg {
        Algorithm::HS256 | Algorithm::RS256 | Algorithm::ES256 | Algorithm::PS256 => {
            Sha256::digest(bytes).to_vec()
        }
        Algorithm::HS384 | Algorithm::RS384 | Algorithm::ES384 | Algorithm::PS384 => {
            Sha384::digest(bytes).to_vec()
        }
        Algorithm::HS512 | Algorithm::RS512 | Algorithm::PS512 | Algorithm::EdDSA => {
            Sha512::digest(bytes).to_vec()
        }
        _ => return Err(OidcError::Rejected(ErrorKind::UnsupportedAlgorithm)),
    };
    Ok(URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]))
}
