//! Unverified inspection of JWT claims
//!
//! Tokens handled here are only ever inspected to learn who they were issued
//! to and how long they remain valid, for the purpose of choosing cache keys
//! and cache lifetimes. Nothing in this module verifies a signature, so none
//! of these values may be used to make an authorization decision.

use aliri::jwt;
use aliri_base64::Base64Url;
use aliri_clock::{DurationSecs, UnixTime};
use serde::Deserialize;
use thiserror::Error;

/// The subset of registered claims used for caching decisions
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    sub: Option<jwt::Subject>,
    #[serde(default)]
    iat: Option<UnixTime>,
    #[serde(default)]
    exp: Option<UnixTime>,
}

impl TokenClaims {
    /// Constructs a claims set from its parts
    pub fn new(
        sub: Option<jwt::Subject>,
        iat: Option<UnixTime>,
        exp: Option<UnixTime>,
    ) -> Self {
        Self { sub, iat, exp }
    }

    /// The `sub` claim
    pub fn subject(&self) -> Option<&jwt::SubjectRef> {
        self.sub.as_deref()
    }

    /// The `iat` claim
    pub fn issued_at(&self) -> Option<UnixTime> {
        self.iat
    }

    /// The `exp` claim
    pub fn expires_at(&self) -> Option<UnixTime> {
        self.exp
    }

    /// The span between issuance and expiry
    ///
    /// Returns `None` if either claim is missing or if the token expires at
    /// or before the time it was issued.
    pub fn lifetime(&self) -> Option<DurationSecs> {
        match (self.iat, self.exp) {
            (Some(iat), Some(exp)) if exp > iat => Some(DurationSecs(exp.0 - iat.0)),
            _ => None,
        }
    }
}

/// An error decoding the payload of a JWT
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload segment was not valid base64url
    #[error("token payload is not valid base64url")]
    Base64(#[from] aliri_base64::InvalidBase64Data),
    /// The payload was not a JSON object with the expected claim types
    #[error("token payload is not a valid claims object")]
    Json(#[from] serde_json::Error),
}

/// A capability to read the claims of a bearer token
pub trait TokenDecoder: Send + Sync {
    /// Decodes the claims of `token`
    ///
    /// Returns `Ok(None)` when the token is opaque, that is, not shaped like a
    /// JWT at all. Returns an error when the token looks like a JWT but its
    /// payload cannot be read.
    fn decode(&self, token: &str) -> Result<Option<TokenClaims>, DecodeError>;
}

/// Decodes compact-serialized JWTs without verifying their signatures
#[derive(Clone, Copy, Debug, Default)]
pub struct UnverifiedJwtDecoder;

impl TokenDecoder for UnverifiedJwtDecoder {
    fn decode(&self, token: &str) -> Result<Option<TokenClaims>, DecodeError> {
        let mut segments = token.split('.');
        let payload = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Ok(None),
        };

        let raw = Base64Url::from_encoded(payload)?;
        let claims = serde_json::from_slice(raw.as_slice())?;
        Ok(Some(claims))
    }
}

impl<F> TokenDecoder for F
where
    F: Fn(&str) -> Result<Option<TokenClaims>, DecodeError> + Send + Sync,
{
    fn decode(&self, token: &str) -> Result<Option<TokenClaims>, DecodeError> {
        (self)(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // {"alg":"HS256","typ":"JWT"}.{"sub":"svc-user","iat":1700000000,"exp":1700003600}
    const TOKEN_WITH_CLAIMS: &str = concat!(
        "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.",
        "eyJzdWIiOiJzdmMtdXNlciIsImlhdCI6MTcwMDAwMDAwMCwiZXhwIjoxNzAwMDAzNjAwfQ.",
        "c2lnbmF0dXJl"
    );

    // {"alg":"HS256","typ":"JWT"}.{"name":"no claims here"}
    const TOKEN_WITHOUT_CLAIMS: &str = concat!(
        "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.",
        "eyJuYW1lIjoibm8gY2xhaW1zIGhlcmUifQ.",
        "c2lnbmF0dXJl"
    );

    #[test]
    fn reads_subject_and_lifetime() {
        let claims = UnverifiedJwtDecoder
            .decode(TOKEN_WITH_CLAIMS)
            .unwrap()
            .unwrap();

        assert_eq!(claims.subject().map(|s| s.as_str()), Some("svc-user"));
        assert_eq!(claims.issued_at(), Some(UnixTime(1_700_000_000)));
        assert_eq!(claims.expires_at(), Some(UnixTime(1_700_003_600)));
        assert_eq!(claims.lifetime(), Some(DurationSecs(3600)));
    }

    #[test]
    fn missing_claims_are_not_an_error() {
        let claims = UnverifiedJwtDecoder
            .decode(TOKEN_WITHOUT_CLAIMS)
            .unwrap()
            .unwrap();

        assert_eq!(claims, TokenClaims::default());
        assert_eq!(claims.lifetime(), None);
    }

    #[test]
    fn opaque_tokens_have_no_claims() {
        assert!(UnverifiedJwtDecoder.decode("12345").unwrap().is_none());
        assert!(UnverifiedJwtDecoder.decode("a.b").unwrap().is_none());
    }

    #[test]
    fn garbage_payload_is_an_error() {
        assert!(UnverifiedJwtDecoder.decode("abc.!!!.def").is_err());
        // "bm90IGpzb24" is "not json"
        assert!(UnverifiedJwtDecoder.decode("abc.bm90IGpzb24.def").is_err());
    }

    #[test]
    fn inverted_lifetime_is_discarded() {
        let claims = TokenClaims::new(None, Some(UnixTime(20)), Some(UnixTime(10)));
        assert_eq!(claims.lifetime(), None);
    }
}
