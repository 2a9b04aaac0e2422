// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance and refresh endpoints.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};

use super::client_ip::ClientIp;
use crate::{
    auth::AuthError,
    models::{AuthQuery, RefreshRequest, TokenPairResponse},
    state::AppState,
};

/// Issue a token pair for a client identifier.
#[utoipa::path(
    get,
    path = "/auth/{guid}",
    params(
        ("guid" = String, Path, description = "Client identifier (UUID)"),
        AuthQuery
    ),
    tag = "Tokens",
    responses(
        (status = 202, description = "Token pair issued", body = TokenPairResponse),
        (status = 400, description = "Malformed identifier or identity not registered"),
        (status = 500, description = "Signing or persistence failure")
    )
)]
pub async fn issue_tokens(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(guid): Path<String>,
    query: Result<Query<AuthQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<TokenPairResponse>), AuthError> {
    let Query(query) = query.map_err(|e| AuthError::InvalidInput(e.body_text()))?;
    let pair = state
        .service
        .issue(&guid, query.email.as_deref(), &ip)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(pair.into())))
}

/// Rotate the access token of an issued pair.
#[utoipa::path(
    post,
    path = "/refresh",
    request_body = RefreshRequest,
    tag = "Tokens",
    responses(
        (status = 202, description = "Access token rotated", body = TokenPairResponse),
        (status = 400, description = "Invalid, mismatched or replayed tokens"),
        (status = 500, description = "Signing or persistence failure")
    )
)]
pub async fn refresh_tokens(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenPairResponse>), AuthError> {
    let Json(request) = body.map_err(|e| AuthError::InvalidInput(e.body_text()))?;
    let pair = state
        .service
        .refresh(&request.access_token, &request.refresh_token, &ip)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(pair.into())))
}
