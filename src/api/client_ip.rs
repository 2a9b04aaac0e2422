// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the caller's origin IP.
//!
//! ```rust,ignore
//! async fn my_handler(ClientIp(ip): ClientIp) -> impl IntoResponse {
//!     // ip is the peer address without its port
//! }
//! ```

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};

use crate::auth::AuthError;
use crate::state::AppState;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Origin IP of the request.
///
/// Uses the TCP peer address. When `TRUST_FORWARDED_FOR` is enabled the
/// left-most `X-Forwarded-For` entry takes precedence. The port is dropped
/// since it changes between connections of the same client.
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.trust_forwarded_for {
            if let Some(ip) = forwarded_ip(parts) {
                return Ok(ClientIp(ip.to_string()));
            }
        }

        let ConnectInfo(addr) = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .cloned()
            .ok_or_else(|| AuthError::InvalidInput("client address unavailable".into()))?;

        Ok(ClientIp(addr.ip().to_string()))
    }
}

fn forwarded_ip(parts: &Parts) -> Option<IpAddr> {
    parts
        .headers
        .get(FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}
