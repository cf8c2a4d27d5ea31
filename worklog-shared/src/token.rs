//! Signed, expiring share-link tokens.
//!
//! A share token is a self-contained HS256 JWT embedding the invoice query
//! (owner, local-date range, optional payment-status filter) and an expiry.
//! Validation yields only the query; the holder's view is always a live
//! re-aggregation, never a snapshot.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PaymentStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareClaims {
    /// Owner whose entries the token is scoped to.
    pub sub: String,
    /// Inclusive local-date range of the invoice query.
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Optional payment-status filter baked into the query.
    pub status: Option<PaymentStatus>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("share link expired")]
    Expired,
    #[error("invalid share token")]
    Invalid,
    #[error("encoding failed: {0}")]
    Encode(String),
}

pub fn issue(
    owner_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    status: Option<PaymentStatus>,
    ttl: Duration,
    now: DateTime<Utc>,
    secret: &[u8],
) -> Result<String, TokenError> {
    let expires = now
        .checked_add_signed(ttl)
        .ok_or_else(|| TokenError::Encode("expiry out of range".to_string()))?;
    let claims = ShareClaims {
        sub: owner_id.to_string(),
        from,
        to,
        status,
        iat: now.timestamp(),
        exp: expires.timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| TokenError::Encode(e.to_string()))
}

/// Verifies the signature and payload shape, then checks expiry against the
/// caller-supplied clock. Expiry is strict: a token is rejected from the
/// exact second it expires, so a zero-ttl token never returns data.
pub fn validate(
    token: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<ShareClaims, TokenError> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::new(Algorithm::HS256);
    // exp is compared below against the caller's clock, without leeway
    validation.validate_exp = false;
    let claims = jsonwebtoken::decode::<ShareClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| TokenError::Invalid)?;
    if claims.to < claims.from {
        return Err(TokenError::Invalid);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &[u8] = b"share-secret";

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
        )
    }

    #[test]
    fn round_trips_the_embedded_query() {
        let (from, to) = range();
        let now = Utc.with_ymd_and_hms(2025, 4, 8, 12, 0, 0).unwrap();
        let token = issue(
            "alice",
            from,
            to,
            Some(PaymentStatus::NotPaid),
            Duration::days(7),
            now,
            SECRET,
        )
        .unwrap();
        let claims = validate(&token, SECRET, now).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.from, from);
        assert_eq!(claims.to, to);
        assert_eq!(claims.status, Some(PaymentStatus::NotPaid));
    }

    #[test]
    fn zero_ttl_is_expired_immediately() {
        let (from, to) = range();
        let now = Utc.with_ymd_and_hms(2025, 4, 8, 12, 0, 0).unwrap();
        let token = issue("alice", from, to, None, Duration::zero(), now, SECRET).unwrap();
        assert_eq!(validate(&token, SECRET, now), Err(TokenError::Expired));
    }

    #[test]
    fn expiry_is_checked_against_the_given_clock() {
        let (from, to) = range();
        let now = Utc.with_ymd_and_hms(2025, 4, 8, 12, 0, 0).unwrap();
        let token = issue("alice", from, to, None, Duration::days(7), now, SECRET).unwrap();
        assert!(validate(&token, SECRET, now + Duration::days(6)).is_ok());
        assert_eq!(
            validate(&token, SECRET, now + Duration::days(8)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn tampered_or_foreign_tokens_are_invalid_not_expired() {
        let (from, to) = range();
        let now = Utc.with_ymd_and_hms(2025, 4, 8, 12, 0, 0).unwrap();
        let token = issue("alice", from, to, None, Duration::days(7), now, SECRET).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        assert_eq!(validate(&tampered, SECRET, now), Err(TokenError::Invalid));
        assert_eq!(
            validate(&token, b"other-secret", now),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            validate("not-a-jwt", SECRET, now),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn absurd_ttl_fails_to_issue_instead_of_panicking() {
        let (from, to) = range();
        let now = Utc.with_ymd_and_hms(2025, 4, 8, 12, 0, 0).unwrap();
        let result = issue("alice", from, to, None, Duration::MAX, now, SECRET);
        assert!(matches!(result, Err(TokenError::Encode(_))));
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let (from, to) = range();
        let now = Utc.with_ymd_and_hms(2025, 4, 8, 12, 0, 0).unwrap();
        let token = issue("alice", to, from, None, Duration::days(7), now, SECRET).unwrap();
        assert_eq!(validate(&token, SECRET, now), Err(TokenError::Invalid));
    }
}
