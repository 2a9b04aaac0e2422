// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Storage
//!
//! Persistence contract for identities and refresh-token records, plus the
//! two implementations shipped with the service.
//!
//! ## Storage Layout
//!
//! ```text
//! users   guid        -> { ip, email }
//! tokens  id (serial) -> { user_id, token, created_at }
//! meta    "token_seq" -> next token id
//! ```
//!
//! `token` is the keyed fingerprint computed by the token codec. The raw
//! refresh token is never written to disk.
//!
//! ## Implementations
//!
//! - [`CredentialDatabase`] - embedded redb file, used by the server binary
//! - [`MemoryCredentialStore`] - process-local maps for tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod credential_db;
pub mod memory;

pub use credential_db::CredentialDatabase;
pub use memory::MemoryCredentialStore;

/// A client's durable identifier plus its last-seen origin and contact address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub guid: Uuid,
    pub ip: String,
    /// Contact address for origin-mismatch alerts. `None` on upsert keeps
    /// whatever address is already stored.
    pub email: Option<String>,
}

impl Identity {
    pub fn new(guid: Uuid, ip: impl Into<String>) -> Self {
        Self {
            guid,
            ip: ip.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }
}

/// A persisted refresh credential.
///
/// Records are never mutated in place; they are only created or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    /// Store-assigned, monotonically increasing id.
    pub id: u64,
    pub owner_guid: Uuid,
    /// Keyed fingerprint of the refresh token.
    pub token_hash: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence interface consumed by the token service.
///
/// Implementations must make each call atomic on its own; the service never
/// spans a transaction across calls.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert the identity, or overwrite the IP (and email, when given) of an
    /// existing one. Idempotent.
    async fn upsert_user(&self, identity: &Identity) -> StoreResult<()>;

    /// Persist a refresh-token fingerprint for `guid`, returning the new record id.
    async fn store_refresh(&self, fingerprint: &[u8], guid: Uuid) -> StoreResult<u64>;

    /// Load a refresh record. Fails with [`StoreError::NotFound`] if absent.
    async fn load_refresh(&self, record_id: u64) -> StoreResult<RefreshRecord>;

    /// Load an identity. Fails with [`StoreError::NotFound`] if absent.
    async fn load_user(&self, guid: Uuid) -> StoreResult<Identity>;

    /// Remove a refresh record. Fails with [`StoreError::NotFound`] if it was
    /// already removed, so at most one concurrent caller succeeds.
    async fn revoke_refresh(&self, record_id: u64) -> StoreResult<()>;

    /// Readiness probe.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
