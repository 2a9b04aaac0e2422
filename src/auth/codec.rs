// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token minting, verification and refresh-token fingerprinting.
//!
//! ## Security
//!
//! - Only HMAC algorithms (HS256/HS384/HS512) are accepted for the codec key
//! - A token whose header names any algorithm other than the configured one
//!   is rejected before its signature is looked at
//! - Refresh tokens are stored as an HMAC-SHA256 fingerprint under a key
//!   derived from the signing key, and compared in constant time

use std::time::Duration;

use hmac::{Hmac, Mac};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use uuid::Uuid;

use super::claims::{AccessClaims, RefreshClaims};
use super::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh token lifetime (30 days).
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Domain separator for deriving the fingerprint key from the signing key.
const FINGERPRINT_CONTEXT: &[u8] = b"relational-token-service/refresh-fingerprint/v1";

/// Whether `exp` is enforced when verifying a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCheck {
    Enforce,
    /// Signature, algorithm and claim shape are still checked.
    Skip,
}

/// Mints and verifies the service's signed claim sets.
pub trait TokenCodec: Send + Sync {
    /// Mint a refresh token for `(guid, ip)`.
    fn mint_refresh(&self, guid: Uuid, ip: &str) -> Result<String, AuthError>;

    /// Mint an access token pointing at refresh record `refresh_id`.
    fn mint_access(&self, guid: Uuid, ip: &str, refresh_id: u64) -> Result<String, AuthError>;

    fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError>;

    fn verify_access(&self, token: &str, expiry: ExpiryCheck) -> Result<AccessClaims, AuthError>;

    /// The opaque form of a refresh token handed to the credential store.
    fn fingerprint(&self, token: &str) -> Vec<u8>;

    /// Constant-time check of a presented refresh token against its stored fingerprint.
    fn credential_matches(&self, presented: &str, stored: &[u8]) -> bool;
}

/// [`TokenCodec`] producing HMAC-signed JWTs.
#[derive(Clone)]
pub struct JwtCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    fingerprint_mac: HmacSha256,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtCodec {
    /// Create a codec for the given HMAC algorithm and shared secret.
    pub fn new(algorithm: Algorithm, secret: &[u8]) -> Result<Self, AuthError> {
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AuthError::SigningError(format!(
                "{algorithm:?} is not a symmetric HMAC algorithm"
            )));
        }
        if secret.is_empty() {
            return Err(AuthError::SigningError("signing key is empty".into()));
        }

        let mut derive = HmacSha256::new_from_slice(secret)
            .map_err(|e| AuthError::SigningError(e.to_string()))?;
        derive.update(FINGERPRINT_CONTEXT);
        let fingerprint_key = derive.finalize().into_bytes();
        let fingerprint_mac = HmacSha256::new_from_slice(&fingerprint_key)
            .map_err(|e| AuthError::SigningError(e.to_string()))?;

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            fingerprint_mac,
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
        })
    }

    /// Override the token lifetimes.
    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AuthError::SigningError(e.to_string()))
    }

    fn decode_claims<T: DeserializeOwned>(
        &self,
        token: &str,
        expiry: ExpiryCheck,
    ) -> Result<T, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_exp = expiry == ExpiryCheck::Enforce;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                AuthError::TokenInvalid(
                    match e.kind() {
                        ErrorKind::ExpiredSignature => "token has expired",
                        ErrorKind::InvalidSignature => "signature mismatch",
                        ErrorKind::InvalidAlgorithm => "unexpected signing algorithm",
                        ErrorKind::MissingRequiredClaim(_) | ErrorKind::Json(_) => {
                            "unexpected claim set"
                        }
                        _ => "malformed token",
                    }
                    .to_string(),
                )
            })
    }
}

fn expiry_after(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

impl TokenCodec for JwtCodec {
    fn mint_refresh(&self, guid: Uuid, ip: &str) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        self.sign(&RefreshClaims {
            guid,
            ip: ip.to_string(),
            jti: Uuid::new_v4(),
            iat: now,
            exp: expiry_after(now, self.refresh_ttl),
        })
    }

    fn mint_access(&self, guid: Uuid, ip: &str, refresh_id: u64) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        self.sign(&AccessClaims {
            guid,
            ip: ip.to_string(),
            refresh_id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: expiry_after(now, self.access_ttl),
        })
    }

    fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.decode_claims(token, ExpiryCheck::Enforce)
    }

    fn verify_access(&self, token: &str, expiry: ExpiryCheck) -> Result<AccessClaims, AuthError> {
        self.decode_claims(token, expiry)
    }

    fn fingerprint(&self, token: &str) -> Vec<u8> {
        let mut mac = self.fingerprint_mac.clone();
        mac.update(token.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn credential_matches(&self, presented: &str, stored: &[u8]) -> bool {
        let mut mac = self.fingerprint_mac.clone();
        mac.update(presented.as_bytes());
        mac.verify_slice(stored).is_ok()
    }
}
