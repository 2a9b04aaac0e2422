// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Claim sets carried by access and refresh tokens.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims embedded in a refresh token.
///
/// Unknown fields are rejected so an access token can never be read as a
/// refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    /// Client identifier the token was issued to
    pub guid: Uuid,
    /// Origin the token was issued against
    pub ip: String,
    /// Unique token id, so tokens minted within the same second differ
    pub jti: Uuid,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

/// Claims embedded in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub guid: Uuid,
    pub ip: String,
    /// Id of the refresh record this access token was paired with.
    #[serde(rename = "refreshId")]
    pub refresh_id: u64,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_claims_use_camel_case_back_reference() {
        let claims = AccessClaims {
            guid: Uuid::nil(),
            ip: "127.0.0.1".to_string(),
            refresh_id: 5,
            jti: Uuid::new_v4(),
            iat: 1,
            exp: 2,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["refreshId"], 5);
        assert!(json.get("refresh_id").is_none());
    }

    #[test]
    fn access_claims_do_not_parse_as_refresh_claims() {
        let json = r#"{"guid":"123e4567-e89b-12d3-a456-426614174000","ip":"1.2.3.4","refreshId":1,"jti":"c643f9b6-220a-46ad-acb1-5902f6405b65","iat":1,"exp":2}"#;
        assert!(serde_json::from_str::<RefreshClaims>(json).is_err());
        assert!(serde_json::from_str::<AccessClaims>(json).is_ok());
    }

    #[test]
    fn refresh_claims_reject_missing_guid() {
        let result = serde_json::from_str::<RefreshClaims>(r#"{"ip":"1.2.3.4","iat":1,"exp":2}"#);
        assert!(result.is_err());
    }
}
