// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded credential database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: guid → serialized UserRow
//! - `tokens`: record id → serialized TokenRow
//! - `meta`: key → u64 (id sequence)
//!
//! redb serializes write transactions, which gives every store call the
//! single-row atomicity the token service relies on. All calls are blocking
//! and are moved onto the blocking pool from the async trait methods.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CredentialStore, Identity, RefreshRecord, StoreError, StoreResult};

// =============================================================================
// Table Definitions
// =============================================================================

/// Identities: guid (hyphenated) → UserRow JSON bytes.
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Refresh credentials: serial id → TokenRow JSON bytes.
const TOKENS: TableDefinition<u64, &[u8]> = TableDefinition::new("tokens");

/// Sequences and other bookkeeping values.
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in `META` holding the next refresh record id.
const TOKEN_SEQUENCE: &str = "token_seq";

#[derive(Debug, Serialize, Deserialize)]
struct UserRow {
    ip: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenRow {
    user_id: Uuid,
    token: Vec<u8>,
    created_at: DateTime<Utc>,
}

// =============================================================================
// CredentialDatabase
// =============================================================================

/// redb-backed [`CredentialStore`].
#[derive(Clone)]
pub struct CredentialDatabase {
    db: Arc<Database>,
}

impl CredentialDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(TOKENS)?;
            let _ = write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert or update an identity. A missing email keeps the stored one.
    pub fn put_user(&self, identity: &Identity) -> StoreResult<()> {
        let key = identity.guid.to_string();

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;

            let existing_email = match table.get(key.as_str())? {
                Some(value) => serde_json::from_slice::<UserRow>(value.value())?.email,
                None => None,
            };

            let row = UserRow {
                ip: identity.ip.clone(),
                email: identity.email.clone().or(existing_email),
            };
            let json = serde_json::to_vec(&row)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up an identity by guid.
    pub fn get_user(&self, guid: Uuid) -> StoreResult<Option<Identity>> {
        let key = guid.to_string();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(key.as_str())? {
            Some(value) => {
                let row: UserRow = serde_json::from_slice(value.value())?;
                Ok(Some(Identity {
                    guid,
                    ip: row.ip,
                    email: row.email,
                }))
            }
            None => Ok(None),
        }
    }

    // =========================================================================
    // Refresh records
    // =========================================================================

    /// Append a refresh record and return its id.
    pub fn insert_token(&self, fingerprint: &[u8], guid: Uuid) -> StoreResult<u64> {
        let row = TokenRow {
            user_id: guid,
            token: fingerprint.to_vec(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&row)?;

        let write_txn = self.db.begin_write()?;
        let id = {
            let mut meta = write_txn.open_table(META)?;
            let id = meta.get(TOKEN_SEQUENCE)?.map(|v| v.value()).unwrap_or(1);
            meta.insert(TOKEN_SEQUENCE, id + 1)?;

            let mut tokens = write_txn.open_table(TOKENS)?;
            tokens.insert(id, json.as_slice())?;
            id
        };
        write_txn.commit()?;
        Ok(id)
    }

    /// Look up a refresh record by id.
    pub fn get_token(&self, record_id: u64) -> StoreResult<Option<RefreshRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TOKENS)?;
        match table.get(record_id)? {
            Some(value) => {
                let row: TokenRow = serde_json::from_slice(value.value())?;
                Ok(Some(RefreshRecord {
                    id: record_id,
                    owner_guid: row.user_id,
                    token_hash: row.token,
                    created_at: row.created_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Remove a refresh record, returning whether it existed.
    pub fn remove_token(&self, record_id: u64) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TOKENS)?;
            let removed = table.remove(record_id)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Open a read transaction against every table.
    pub fn check(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(USERS)?;
        let _ = read_txn.open_table(TOKENS)?;
        Ok(())
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(CredentialDatabase) -> StoreResult<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || op(db)).await?
    }
}

#[async_trait]
impl CredentialStore for CredentialDatabase {
    async fn upsert_user(&self, identity: &Identity) -> StoreResult<()> {
        let identity = identity.clone();
        self.blocking(move |db| db.put_user(&identity)).await
    }

    async fn store_refresh(&self, fingerprint: &[u8], guid: Uuid) -> StoreResult<u64> {
        let fingerprint = fingerprint.to_vec();
        self.blocking(move |db| db.insert_token(&fingerprint, guid)).await
    }

    async fn load_refresh(&self, record_id: u64) -> StoreResult<RefreshRecord> {
        self.blocking(move |db| db.get_token(record_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("refresh record {record_id}")))
    }

    async fn load_user(&self, guid: Uuid) -> StoreResult<Identity> {
        self.blocking(move |db| db.get_user(guid))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {guid}")))
    }

    async fn revoke_refresh(&self, record_id: u64) -> StoreResult<()> {
        if self.blocking(move |db| db.remove_token(record_id)).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("refresh record {record_id}")))
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.blocking(|db| db.check()).await
    }
}

// =============================================================================
// Tests
// =============================================================================
