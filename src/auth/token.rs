//! Credential wire format.
//!
//! Tokens are HS256 JWTs encoded and signed with `jsonwebtoken`. Expiry is
//! judged by the verifier against its own clock, so the library's `exp`
//! validation is turned off here.

use std::collections::HashSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

use super::SigningKey;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Whether a credential grants access or may only be exchanged for new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Claims carried in the token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier.
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds. The token is valid while `now < exp`.
    pub exp: u64,
    /// Unique token id.
    pub jti: String,
    /// Session the token was granted under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

fn validation() -> Validation {
    let mut validation = Validation::new(ALGORITHM);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation.leeway = 0;
    validation
}

/// Split `raw` into `header.payload.` and the signature segment.
///
/// Everything after the second dot is signature, so a damaged signature is
/// never mistaken for a structural problem.
fn split(raw: &str) -> Result<(&str, &str), AuthError> {
    let mut parts = raw.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature))
            if !header.is_empty() && !payload.is_empty() =>
        {
            let unsigned_len = header.len() + payload.len() + 2;
            Ok((&raw[..unsigned_len], signature))
        }
        _ => Err(AuthError::Malformed),
    }
}

/// Parse the header and claims without looking at the signature.
pub(crate) fn peek(raw: &str) -> Result<Claims, AuthError> {
    let (unsigned, _) = split(raw)?;

    let mut validation = validation();
    validation.insecure_disable_signature_validation();
    let unkeyed = DecodingKey::from_secret(&[]);
    let data = jsonwebtoken::decode::<Claims>(unsigned, &unkeyed, &validation)
        .map_err(|_| AuthError::Malformed)?;

    if data.header.alg != ALGORITHM {
        return Err(AuthError::Malformed);
    }
    Ok(data.claims)
}

/// Parse `raw` and check its HMAC tag against `key`.
pub(crate) fn verify(raw: &str, key: &SigningKey) -> Result<Claims, AuthError> {
    let (_, signature) = split(raw)?;
    if signature.contains('.') {
        return Err(AuthError::InvalidSignature);
    }

    jsonwebtoken::decode::<Claims>(raw, key.decoding_key(), &validation())
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            _ => AuthError::Malformed,
        })
}

/// Serialize and sign `claims`.
pub(crate) fn encode(
    claims: &Claims,
    key: &SigningKey,
) -> Result<String, jsonwebtoken::errors::Error> {
    jsonwebtoken::encode(&Header::new(ALGORITHM), claims, key.encoding_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::EncodingKey;

    const SECRET: &[u8] = b"test-secret-key-32-bytes-long!!!";

    fn key() -> SigningKey {
        SigningKey::new(SECRET).unwrap()
    }

    fn claims() -> Claims {
        Claims {
            sub: "user-42".to_string(),
            iat: 1_000,
            exp: 2_000,
            jti: "jti-1".to_string(),
            sid: None,
            kind: TokenKind::Access,
            roles: vec![],
        }
    }

    #[test]
    fn test_encoded_token_verifies() {
        let token = encode(&claims(), &key()).unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert!(!token.contains('='));

        assert_eq!(peek(&token).unwrap(), claims());
        assert_eq!(verify(&token, &key()).unwrap(), claims());
    }

    #[test]
    fn test_payload_uses_jwt_field_names() {
        let token = encode(&claims(), &key()).unwrap();
        let json = jsonwebtoken::decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_secret(SECRET),
            &validation(),
        )
        .unwrap()
        .claims;
        assert_eq!(json["sub"], "user-42");
        assert_eq!(json["type"], "access");
        assert!(json.get("sid").is_none());
    }

    #[test]
    fn test_structural_failures() {
        for raw in ["", ".", "..", "abc", "abc.def", "!!!.???.sig", "e30.e30.sig"] {
            assert_eq!(peek(raw), Err(AuthError::Malformed), "{:?}", raw);
            assert_eq!(verify(raw, &key()), Err(AuthError::Malformed), "{:?}", raw);
        }
    }

    #[test]
    fn test_unsupported_algorithm_is_malformed() {
        let token = encode(&claims(), &key()).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        // {"alg":"none"}
        let raw = format!("eyJhbGciOiJub25lIn0.{}.", payload);
        assert_eq!(peek(&raw), Err(AuthError::Malformed));

        let hs512 = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims(),
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert_eq!(peek(&hs512), Err(AuthError::Malformed));
        assert_eq!(verify(&hs512, &key()), Err(AuthError::Malformed));
    }

    #[test]
    fn test_garbage_signature_is_invalid_signature() {
        let token = encode(&claims(), &key()).unwrap();
        let (unsigned, _) = token.rsplit_once('.').unwrap();
        for sig in ["", "***", "a.b"] {
            let raw = format!("{}.{}", unsigned, sig);
            assert_eq!(peek(&raw).unwrap(), claims());
            assert_eq!(verify(&raw, &key()), Err(AuthError::InvalidSignature));
        }
    }
}
