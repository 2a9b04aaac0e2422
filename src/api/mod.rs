// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{RefreshRequest, TokenPairResponse},
    state::AppState,
};

pub mod client_ip;
pub mod health;
pub mod tokens;

/// Maximum accepted request body.
const BODY_LIMIT: usize = 5 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let request_timeout = state.request_timeout;
    let routes = Router::new()
        .route("/auth/{guid}", get(tokens::issue_tokens))
        .route("/refresh", post(tokens::refresh_tokens))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        tokens::issue_tokens,
        tokens::refresh_tokens,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            TokenPairResponse,
            RefreshRequest,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Tokens", description = "Token pair issuance and rotation"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
