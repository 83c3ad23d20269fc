use std::fmt;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::config::JwtConfig;

/// The only algorithm tokens are signed and accepted with.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Why a presented token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Expired,
    NotYetValid,
    WrongIssuer,
    WrongAudience,
    WrongAlgorithm,
    BadSignature,
    MissingClaim,
    Malformed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::Expired => "token expired",
            RejectReason::NotYetValid => "token not yet valid",
            RejectReason::WrongIssuer => "issuer mismatch",
            RejectReason::WrongAudience => "audience mismatch",
            RejectReason::WrongAlgorithm => "unexpected signing algorithm",
            RejectReason::BadSignature => "invalid signature",
            RejectReason::MissingClaim => "missing required claim",
            RejectReason::Malformed => "malformed token",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing key unusable: {0}")]
    Signing(String),
    #[error("token rejected: {0}")]
    Rejected(RejectReason),
}

impl From<jsonwebtoken::errors::Error> for RejectReason {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => RejectReason::Expired,
            ErrorKind::ImmatureSignature => RejectReason::NotYetValid,
            ErrorKind::InvalidIssuer => RejectReason::WrongIssuer,
            ErrorKind::InvalidAudience => RejectReason::WrongAudience,
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                RejectReason::WrongAlgorithm
            }
            ErrorKind::InvalidSignature => RejectReason::BadSignature,
            ErrorKind::MissingRequiredClaim(_) => RejectReason::MissingClaim,
            // Claims are deserialized before the required-claim check runs,
            // so an absent field surfaces as a serde error.
            ErrorKind::Json(e) if e.to_string().starts_with("missing field") => {
                RejectReason::MissingClaim
            }
            _ => RejectReason::Malformed,
        }
    }
}

/// Holds JWT signing and verification keys with config data.
///
/// Built once at startup; the secret never changes for the life of the
/// process.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Result<Self, TokenError> {
        Self::from_secret(
            cfg.secret.as_bytes(),
            &cfg.issuer,
            &cfg.audience,
            Duration::minutes(cfg.ttl_minutes),
        )
    }

    pub fn from_secret(
        secret: &[u8],
        issuer: &str,
        audience: &str,
        ttl: Duration,
    ) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Signing("empty secret".into()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
            ttl,
        })
    }

    /// Signs a token for `sub` with explicit scope and lifetime.
    pub fn issue(
        &self,
        sub: Uuid,
        issuer: &str,
        audience: &str,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub,
            iat: now.unix_timestamp(),
            nbf: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            iss: issuer.to_owned(),
            aud: audience.to_owned(),
        };
        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(user_id = %sub, "jwt signed");
        Ok(token)
    }

    /// Signs a token scoped to this service's own issuer and audience.
    pub fn sign(&self, sub: Uuid) -> Result<String, TokenError> {
        self.issue(sub, &self.issuer, &self.audience, self.ttl)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation
    }

    /// Checks signature, algorithm, lifetime and scope. Never touches the
    /// store.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation())
            .map_err(|e| TokenError::Rejected(e.into()))?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_secret(secret.as_bytes(), issuer, audience, Duration::minutes(5))
            .expect("keys")
    }

    fn reason(err: TokenError) -> RejectReason {
        match err {
            TokenError::Rejected(r) => r,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert!(claims.exp > claims.iat);
        assert_eq!(claims.nbf, claims.iat);
    }

    #[test]
    fn empty_secret_is_a_signing_failure() {
        let err = JwtKeys::from_secret(b"", "iss", "aud", Duration::minutes(1)).unwrap_err();
        assert!(matches!(err, TokenError::Signing(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys
            .issue(Uuid::new_v4(), "iss", "aud", Duration::minutes(-2))
            .expect("sign");
        assert_eq!(reason(keys.verify(&token).unwrap_err()), RejectReason::Expired);
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let good = make_keys("secret-a", "iss", "aud");
        let other = make_keys("secret-b", "iss", "aud");
        let token = other.sign(Uuid::new_v4()).expect("sign");
        assert_eq!(
            reason(good.verify(&token).unwrap_err()),
            RejectReason::BadSignature
        );
    }

    #[test]
    fn wrong_issuer_and_audience_are_rejected() {
        let keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_iss = keys
            .issue(Uuid::new_v4(), "bad-iss", "good-aud", Duration::minutes(5))
            .unwrap();
        assert_eq!(
            reason(keys.verify(&bad_iss).unwrap_err()),
            RejectReason::WrongIssuer
        );
        let bad_aud = keys
            .issue(Uuid::new_v4(), "good-iss", "bad-aud", Duration::minutes(5))
            .unwrap();
        assert_eq!(
            reason(keys.verify(&bad_aud).unwrap_err()),
            RejectReason::WrongAudience
        );
    }

    #[test]
    fn other_algorithms_are_refused() {
        let keys = make_keys("same-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: now,
            nbf: now,
            exp: now + 300,
            iss: "iss".into(),
            aud: "aud".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"same-secret"),
        )
        .unwrap();
        assert_eq!(
            reason(keys.verify(&token).unwrap_err()),
            RejectReason::WrongAlgorithm
        );
    }

    #[test]
    fn missing_not_before_is_rejected() {
        let keys = make_keys("same-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let payload = json!({
            "sub": Uuid::new_v4(),
            "iat": now,
            "exp": now + 300,
            "iss": "iss",
            "aud": "aud",
        });
        let token = encode(
            &Header::new(ALGORITHM),
            &payload,
            &EncodingKey::from_secret(b"same-secret"),
        )
        .unwrap();
        assert_eq!(
            reason(keys.verify(&token).unwrap_err()),
            RejectReason::MissingClaim
        );
    }

    #[test]
    fn missing_subject_is_a_missing_claim() {
        let keys = make_keys("same-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let payload = json!({
            "iat": now,
            "nbf": now,
            "exp": now + 300,
            "iss": "iss",
            "aud": "aud",
        });
        let token = encode(
            &Header::new(ALGORITHM),
            &payload,
            &EncodingKey::from_secret(b"same-secret"),
        )
        .unwrap();
        assert_eq!(
            reason(keys.verify(&token).unwrap_err()),
            RejectReason::MissingClaim
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = make_keys("same-secret", "iss", "aud");
        assert_eq!(
            reason(keys.verify("not.a.jwt").unwrap_err()),
            RejectReason::Malformed
        );
    }
}
