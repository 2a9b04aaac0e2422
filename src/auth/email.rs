// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contact address normalization.

use unicode_normalization::UnicodeNormalization;

use super::error::AuthError;

/// Maximum accepted address length (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;

/// Normalize a contact address: NFKC, trimmed, lowercased.
///
/// Only the shape is checked (one `@`, non-empty local part, dotted domain).
pub fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let normalized: String = raw.trim().nfkc().collect::<String>().to_lowercase();

    if normalized.is_empty() || normalized.len() > MAX_EMAIL_LEN {
        return Err(AuthError::InvalidInput("email has invalid length".into()));
    }
    if normalized.chars().any(char::is_whitespace) {
        return Err(AuthError::InvalidInput("email contains whitespace".into()));
    }

    let Some((local, domain)) = normalized.split_once('@') else {
        return Err(AuthError::InvalidInput("email is missing '@'".into()));
    };
    if local.is_empty() || domain.contains('@') {
        return Err(AuthError::InvalidInput("email is malformed".into()));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(AuthError::InvalidInput("email domain is malformed".into()));
    }

    Ok(normalized)
}
