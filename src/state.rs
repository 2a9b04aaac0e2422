// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenService;

/// Default bound on a whole HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TokenService>,
    /// Take the client origin from `X-Forwarded-For` when behind a proxy.
    pub trust_forwarded_for: bool,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: TokenService) -> Self {
        Self {
            service: Arc::new(service),
            trust_forwarded_for: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
