// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance and rotation errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StoreError;

/// Error type for the `Auth` and `Refresh` operations.
///
/// Every variant is terminal for the request. Origin drift is not an error
/// and never produces one of these.
#[derive(Debug)]
pub enum AuthError {
    /// Malformed GUID, email or request body
    InvalidInput(String),
    /// The store refused or failed the identity upsert that opens `Auth`
    IdentityUpsert(String),
    /// Signature, expiry, algorithm or claim-shape failure
    TokenInvalid(String),
    /// Access and refresh tokens name different identities
    IdentityMismatch,
    /// Presented refresh token does not match the stored credential
    ReplayOrTamper,
    /// The referenced refresh record does not exist
    NotFound,
    /// Store unreachable, failed or timed out
    PersistenceError(String),
    /// Key or algorithm misconfiguration
    SigningError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::IdentityUpsert(_) => "persistence_error",
            AuthError::TokenInvalid(_) => "token_invalid",
            AuthError::IdentityMismatch => "identity_mismatch",
            AuthError::ReplayOrTamper => "replay_or_tamper",
            AuthError::NotFound => "not_found",
            AuthError::PersistenceError(_) => "persistence_error",
            AuthError::SigningError(_) => "signing_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_)
            | AuthError::IdentityUpsert(_)
            | AuthError::TokenInvalid(_)
            | AuthError::IdentityMismatch
            | AuthError::ReplayOrTamper
            | AuthError::NotFound => StatusCode::BAD_REQUEST,
            AuthError::PersistenceError(_) | AuthError::SigningError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the failure was caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            AuthError::IdentityUpsert(msg) => write!(f, "Cannot register identity: {msg}"),
            AuthError::TokenInvalid(msg) => write!(f, "Token is invalid: {msg}"),
            AuthError::IdentityMismatch => {
                write!(f, "Access and refresh tokens belong to different identities")
            }
            AuthError::ReplayOrTamper => {
                write!(f, "Refresh token does not match the issued credential")
            }
            AuthError::NotFound => write!(f, "Refresh credential not found"),
            AuthError::PersistenceError(msg) => write!(f, "Credential store failure: {msg}"),
            AuthError::SigningError(msg) => write!(f, "Token signing failure: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AuthError::NotFound,
            other => AuthError::PersistenceError(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
