//! Login JWTs for owner-authenticated API access.

use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Owner id (username).
    pub sub: String,
    pub jti: String,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    Decode(String),
    #[error("encoding failed: {0}")]
    Encode(String),
}

pub fn encode(claims: &AuthClaims, secret: &[u8]) -> Result<String, AuthError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Encode(e.to_string()))
}

pub fn decode_and_verify(token: &str, secret: &[u8]) -> Result<AuthClaims, AuthError> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<AuthClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn encode_decode_round_trip() {
        let claims = AuthClaims {
            sub: "alice".into(),
            jti: "test-jti".into(),
            exp: (Utc::now() + Duration::days(1)).timestamp(),
        };
        let token = encode(&claims, b"secret").unwrap();
        let back = decode_and_verify(&token, b"secret").unwrap();
        assert_eq!(back.sub, "alice");
        assert!(decode_and_verify(&token, b"wrong").is_err());
    }
}
