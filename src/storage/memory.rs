// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory credential store.
//!
//! Substitute for the redb store in unit tests. Keeps per-call counters so
//! tests can assert how the token service drives the store, and can be
//! switched into an unavailable state to exercise failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CredentialStore, Identity, RefreshRecord, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, Identity>,
    tokens: BTreeMap<u64, RefreshRecord>,
    next_token_id: u64,
}

/// Number of calls made to each store operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub upsert_user: usize,
    pub store_refresh: usize,
    pub load_refresh: usize,
    pub load_user: usize,
    pub revoke_refresh: usize,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    upsert_user: AtomicUsize,
    store_refresh: AtomicUsize,
    load_refresh: AtomicUsize,
    load_user: AtomicUsize,
    revoke_refresh: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            upsert_user: self.upsert_user.load(Ordering::SeqCst),
            store_refresh: self.store_refresh.load(Ordering::SeqCst),
            load_refresh: self.load_refresh.load(Ordering::SeqCst),
            load_user: self.load_user.load(Ordering::SeqCst),
            revoke_refresh: self.revoke_refresh.load(Ordering::SeqCst),
        }
    }

    pub fn token_count(&self) -> usize {
        self.tables.lock().map(|t| t.tokens.len()).unwrap_or_default()
    }

    fn enter(&self, counter: &AtomicUsize) -> StoreResult<MutexGuard<'_, Tables>> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn upsert_user(&self, identity: &Identity) -> StoreResult<()> {
        let mut tables = self.enter(&self.upsert_user)?;
        let email = identity.email.clone().or_else(|| {
            tables
                .users
                .get(&identity.guid)
                .and_then(|existing| existing.email.clone())
        });
        tables.users.insert(
            identity.guid,
            Identity {
                guid: identity.guid,
                ip: identity.ip.clone(),
                email,
            },
        );
        Ok(())
    }

    async fn store_refresh(&self, fingerprint: &[u8], guid: Uuid) -> StoreResult<u64> {
        let mut tables = self.enter(&self.store_refresh)?;
        tables.next_token_id += 1;
        let id = tables.next_token_id;
        tables.tokens.insert(
            id,
            RefreshRecord {
                id,
                owner_guid: guid,
                token_hash: fingerprint.to_vec(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn load_refresh(&self, record_id: u64) -> StoreResult<RefreshRecord> {
        let tables = self.enter(&self.load_refresh)?;
        tables
            .tokens
            .get(&record_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("refresh record {record_id}")))
    }

    async fn load_user(&self, guid: Uuid) -> StoreResult<Identity> {
        let tables = self.enter(&self.load_user)?;
        tables
            .users
            .get(&guid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {guid}")))
    }

    async fn revoke_refresh(&self, record_id: u64) -> StoreResult<()> {
        let mut tables = self.enter(&self.revoke_refresh)?;
        tables
            .tokens
            .remove(&record_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("refresh record {record_id}")))
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".into()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_start_at_one_and_increase() {
        let store = MemoryCredentialStore::new();
        let guid = Uuid::new_v4();
        assert_eq!(store.store_refresh(b"a", guid).await.unwrap(), 1);
        assert_eq!(store.store_refresh(b"b", guid).await.unwrap(), 2);
        assert_eq!(store.token_count(), 2);
    }

    #[tokio::test]
    async fn unavailable_store_fails_and_still_counts() {
        let store = MemoryCredentialStore::new();
        store.set_unavailable(true);

        let result = store.upsert_user(&Identity::new(Uuid::new_v4(), "1.2.3.4")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(store.ping().await.is_err());
        assert_eq!(store.call_counts().upsert_user, 1);
    }

    #[tokio::test]
    async fn upsert_preserves_email_when_absent() {
        let store = MemoryCredentialStore::new();
        let guid = Uuid::new_v4();
        store
            .upsert_user(&Identity::new(guid, "1.1.1.1").with_email(Some("x@example.com".into())))
            .await
            .unwrap();
        store.upsert_user(&Identity::new(guid, "2.2.2.2")).await.unwrap();

        let user = store.load_user(guid).await.unwrap();
        assert_eq!(user.ip, "2.2.2.2");
        assert_eq!(user.email.as_deref(), Some("x@example.com"));
    }
}
