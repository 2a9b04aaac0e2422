// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Token Service - JWT access/refresh token issuance
//!
//! This crate issues short-lived access tokens paired with long-lived
//! refresh tokens for opaque client identifiers, and rotates access tokens
//! against a persisted fingerprint of the refresh token.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token codec, policies and the issuance/rotation service
//! - `notify` - Origin-change alert sinks
//! - `storage` - Credential store (redb) and its in-memory substitute

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod notify;
pub mod state;
pub mod storage;
