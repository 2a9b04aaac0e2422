// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the token endpoints. Field names on the
//! wire (`accessT`, `refreshT`) are fixed by existing clients.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::TokenPair;

// =============================================================================
// Token Pair
// =============================================================================

/// Token pair returned by both `Auth` and `Refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TokenPairResponse {
    /// Short-lived access JWT.
    #[serde(rename = "accessT")]
    pub access_token: String,
    /// Long-lived refresh JWT.
    #[serde(rename = "refreshT")]
    pub refresh_token: String,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Body of `POST /refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[serde(rename = "refreshT")]
    pub refresh_token: String,
    #[serde(rename = "accessT")]
    pub access_token: String,
}

/// Query parameters of `GET /auth/{guid}`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthQuery {
    /// Contact address for origin-change alerts. Kept from the previous
    /// `Auth` when omitted.
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_pair_uses_wire_names() {
        let body = serde_json::to_value(TokenPairResponse {
            access_token: "a".into(),
            refresh_token: "r".into(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"accessT": "a", "refreshT": "r"}));
    }

    #[test]
    fn refresh_request_requires_both_tokens() {
        let ok: RefreshRequest =
            serde_json::from_str(r#"{"refreshT":"r","accessT":"a"}"#).unwrap();
        assert_eq!(ok.refresh_token, "r");
        assert_eq!(ok.access_token, "a");

        assert!(serde_json::from_str::<RefreshRequest>(r#"{"refreshT":"r"}"#).is_err());
    }
}
