// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Issues and rotates the access/refresh token pairs of the service.
//!
//! ## Token Pair
//!
//! - **Refresh token**: long-lived JWT bound to `(guid, ip)`. Only an HMAC
//!   fingerprint of it is persisted, never the token itself.
//! - **Access token**: short-lived JWT bound to `(guid, ip, refreshId)`,
//!   where `refreshId` names the refresh record it was issued with.
//!
//! ## Security
//!
//! - Tokens are signed with a single symmetric key (HS256/384/512)
//! - Fingerprints are compared in constant time
//! - Clock skew tolerance is 60 seconds
//! - A refresh from a new origin succeeds but alerts the identity's contact address

pub mod claims;
pub mod codec;
pub mod email;
pub mod error;
pub mod service;

pub use claims::{AccessClaims, RefreshClaims};
pub use codec::{ExpiryCheck, JwtCodec, TokenCodec};
pub use error::AuthError;
pub use service::{AccessExpiryPolicy, RotationPolicy, ServicePolicy, TokenPair, TokenService};
