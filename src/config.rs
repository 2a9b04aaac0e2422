// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup. Invalid
//! values abort start-up with a [`ConfigError`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `credentials.redb` | `./data` |
//! | `JWT_KEY` | HMAC signing key | Required (`dev` feature: fixed dev key) |
//! | `JWT_ALGORITHM` | `HS256`, `HS384` or `HS512` | `HS512` |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `900` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `2592000` |
//! | `REFRESH_ROTATION` | `reuse` or `single_use` | `reuse` |
//! | `REFRESH_ACCESS_EXPIRY` | `enforce` or `allow_expired` | `enforce` |
//! | `STORE_TIMEOUT_SECS` | Bound on each store call | `5` |
//! | `NOTIFY_WEBHOOK_URL` | Webhook receiving origin alerts | Unset (log only) |
//! | `NOTIFY_TIMEOUT_SECS` | Bound on each alert delivery | `10` |
//! | `REQUEST_TIMEOUT_SECS` | Bound on a whole HTTP request | `10` |
//! | `TRUST_FORWARDED_FOR` | Take the origin from `X-Forwarded-For` | `false` |
//! | `TLS_CERT_PATH` | PEM certificate chain for HTTPS | Unset (plain HTTP) |
//! | `TLS_KEY_PATH` | PEM private key for HTTPS | Unset (plain HTTP) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

use crate::auth::codec::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL};
use crate::auth::service::{DEFAULT_NOTIFY_TIMEOUT, DEFAULT_STORE_TIMEOUT};
use crate::auth::{AccessExpiryPolicy, RotationPolicy, ServicePolicy};
use crate::state::DEFAULT_REQUEST_TIMEOUT;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the credential database directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the token signing key.
///
/// The same key derives the fingerprint key for stored refresh tokens, so
/// rotating it invalidates every outstanding refresh token.
pub const JWT_KEY_ENV: &str = "JWT_KEY";
pub const JWT_ALGORITHM_ENV: &str = "JWT_ALGORITHM";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const REFRESH_ROTATION_ENV: &str = "REFRESH_ROTATION";
pub const REFRESH_ACCESS_EXPIRY_ENV: &str = "REFRESH_ACCESS_EXPIRY";
pub const STORE_TIMEOUT_ENV: &str = "STORE_TIMEOUT_SECS";
pub const NOTIFY_WEBHOOK_URL_ENV: &str = "NOTIFY_WEBHOOK_URL";
pub const NOTIFY_TIMEOUT_ENV: &str = "NOTIFY_TIMEOUT_SECS";
pub const REQUEST_TIMEOUT_ENV: &str = "REQUEST_TIMEOUT_SECS";
pub const TRUST_FORWARDED_FOR_ENV: &str = "TRUST_FORWARDED_FOR";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Database file name inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "credentials.redb";

/// Signing key used when `JWT_KEY` is unset in development builds.
#[cfg(feature = "dev")]
const DEV_JWT_KEY: &str = "dev-only-signing-key-do-not-deploy";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// PEM files for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Fully resolved service configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub jwt_key: Vec<u8>,
    /// Set when `JWT_KEY` was absent and the development key is in use.
    pub dev_signing_key: bool,
    pub jwt_algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub policy: ServicePolicy,
    pub notify_webhook: Option<Url>,
    pub trust_forwarded_for: bool,
    pub request_timeout: Duration,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("data_dir", &self.data_dir)
            .field("jwt_key", &"<redacted>")
            .field("dev_signing_key", &self.dev_signing_key)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("policy", &self.policy)
            .field("notify_webhook", &self.notify_webhook)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("request_timeout", &self.request_timeout)
            .field("tls", &self.tls)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(var(PORT_ENV), PORT_ENV, 8080)?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|e| invalid(HOST_ENV, e))?;

        let (jwt_key, dev_signing_key) = match var(JWT_KEY_ENV) {
            Some(key) => (key.into_bytes(), false),
            None => (dev_key()?, true),
        };
        let jwt_algorithm = match var(JWT_ALGORITHM_ENV) {
            Some(raw) => parse_algorithm(&raw)?,
            None => Algorithm::HS512,
        };

        let access_ttl = secs_or(var(ACCESS_TOKEN_TTL_ENV), ACCESS_TOKEN_TTL_ENV, DEFAULT_ACCESS_TTL)?;
        let refresh_ttl =
            secs_or(var(REFRESH_TOKEN_TTL_ENV), REFRESH_TOKEN_TTL_ENV, DEFAULT_REFRESH_TTL)?;
        if access_ttl >= refresh_ttl {
            return Err(ConfigError::Invalid {
                var: ACCESS_TOKEN_TTL_ENV,
                reason: "must be shorter than the refresh token lifetime".into(),
            });
        }

        let rotation = match var(REFRESH_ROTATION_ENV).as_deref() {
            None | Some("reuse") => RotationPolicy::Reuse,
            Some("single_use") => RotationPolicy::SingleUse,
            Some(other) => return Err(invalid(REFRESH_ROTATION_ENV, format!("unknown policy {other:?}"))),
        };
        let access_expiry = match var(REFRESH_ACCESS_EXPIRY_ENV).as_deref() {
            None | Some("enforce") => AccessExpiryPolicy::Enforce,
            Some("allow_expired") => AccessExpiryPolicy::AllowExpired,
            Some(other) => {
                return Err(invalid(REFRESH_ACCESS_EXPIRY_ENV, format!("unknown policy {other:?}")))
            }
        };
        let policy = ServicePolicy {
            rotation,
            access_expiry,
            store_timeout: secs_or(var(STORE_TIMEOUT_ENV), STORE_TIMEOUT_ENV, DEFAULT_STORE_TIMEOUT)?,
            notify_timeout: secs_or(var(NOTIFY_TIMEOUT_ENV), NOTIFY_TIMEOUT_ENV, DEFAULT_NOTIFY_TIMEOUT)?,
        };

        let notify_webhook = var(NOTIFY_WEBHOOK_URL_ENV)
            .map(|raw| {
                let url = Url::parse(&raw).map_err(|e| invalid(NOTIFY_WEBHOOK_URL_ENV, e))?;
                match url.scheme() {
                    "http" | "https" => Ok(url),
                    scheme => Err(invalid(NOTIFY_WEBHOOK_URL_ENV, format!("unsupported scheme {scheme:?}"))),
                }
            })
            .transpose()?;

        let trust_forwarded_for = match var(TRUST_FORWARDED_FOR_ENV).as_deref() {
            None | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => return Err(invalid(TRUST_FORWARDED_FOR_ENV, format!("expected a boolean, got {other:?}"))),
        };

        let tls = match (var(TLS_CERT_PATH_ENV), var(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(TLS_KEY_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(TLS_CERT_PATH_ENV)),
        };

        let request_timeout =
            secs_or(var(REQUEST_TIMEOUT_ENV), REQUEST_TIMEOUT_ENV, DEFAULT_REQUEST_TIMEOUT)?;

        let log_format = match var(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(invalid(LOG_FORMAT_ENV, format!("unknown format {other:?}"))),
        };

        Ok(Self {
            bind_addr,
            data_dir: var(DATA_DIR_ENV).unwrap_or_else(|| "./data".to_string()).into(),
            jwt_key,
            dev_signing_key,
            jwt_algorithm,
            access_ttl,
            refresh_ttl,
            policy,
            notify_webhook,
            trust_forwarded_for,
            request_timeout,
            tls,
            log_format,
        })
    }

    /// Path of the credential database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(feature = "dev")]
fn dev_key() -> Result<Vec<u8>, ConfigError> {
    Ok(DEV_JWT_KEY.as_bytes().to_vec())
}

#[cfg(not(feature = "dev"))]
fn dev_key() -> Result<Vec<u8>, ConfigError> {
    Err(ConfigError::Missing(JWT_KEY_ENV))
}

fn parse_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    match Algorithm::from_str(raw) {
        Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
        _ => Err(invalid(JWT_ALGORITHM_ENV, format!("expected HS256, HS384 or HS512, got {raw:?}"))),
    }
}

fn parse_or<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e| invalid(var, e)),
        None => Ok(default),
    }
}

fn secs_or(raw: Option<String>, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_or(raw, var, default.as_secs())?;
    if secs == 0 {
        return Err(invalid(var, "must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

fn invalid(var: &'static str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}
