// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance and rotation.
//!
//! ## Auth
//!
//! `Start → IdentityResolved → RefreshIssued → AccessIssued → Done`
//!
//! 1. Parse the GUID (and optional contact address)
//! 2. Upsert the identity with the caller's origin
//! 3. Mint a refresh token and persist its fingerprint
//! 4. Mint an access token pointing at the new refresh record
//!
//! A failure after step 2 leaves the identity in place; re-running `Auth`
//! is always safe.
//!
//! ## Refresh
//!
//! `Start → RefreshVerified → AccessVerified → GuidsMatched →
//! CredentialLoaded → CredentialMatched → OriginChecked → Reissued`
//!
//! A presented refresh token is accepted only if it fingerprint-matches the
//! record the access token points at. A change of origin never fails the
//! request; it raises an alert on a background task instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use super::codec::{ExpiryCheck, TokenCodec};
use super::email::normalize_email;
use super::error::AuthError;
use crate::notify::{NotificationError, NotificationSink, OriginAlert};
use crate::storage::{CredentialStore, Identity, StoreError, StoreResult};

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single notification delivery.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// What happens to a refresh record once it has been used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    /// The refresh token stays valid until it expires; only the access token rotates.
    #[default]
    Reuse,
    /// The record is revoked on use and a new refresh token is issued.
    SingleUse,
}

/// Whether an expired access token may still authorize a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessExpiryPolicy {
    #[default]
    Enforce,
    AllowExpired,
}

/// Tunables for [`TokenService`].
#[derive(Debug, Clone, Copy)]
pub struct ServicePolicy {
    pub rotation: RotationPolicy,
    pub access_expiry: AccessExpiryPolicy,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            rotation: RotationPolicy::default(),
            access_expiry: AccessExpiryPolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

/// An issued access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Drives the `Auth` and `Refresh` operations.
pub struct TokenService {
    codec: Arc<dyn TokenCodec>,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationSink>,
    policy: ServicePolicy,
    notifications: TaskTracker,
}

impl TokenService {
    pub fn new(
        codec: Arc<dyn TokenCodec>,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            codec,
            store,
            notifier,
            policy: ServicePolicy::default(),
            notifications: TaskTracker::new(),
        }
    }

    pub fn with_policy(mut self, policy: ServicePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ServicePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Tracker for in-flight origin alerts, drained on shutdown.
    pub fn notifications(&self) -> &TaskTracker {
        &self.notifications
    }

    /// Issue a new token pair for `raw_guid` seen from `observed_ip`.
    pub async fn issue(
        &self,
        raw_guid: &str,
        email: Option<&str>,
        observed_ip: &str,
    ) -> Result<TokenPair, AuthError> {
        let span = tracing::info_span!("auth", guid = %raw_guid, ip = %observed_ip);
        self.issue_inner(raw_guid, email, observed_ip)
            .instrument(span.clone())
            .await
            .inspect_err(|e| span.in_scope(|| log_rejection(e)))
    }

    /// Rotate the access token of a previously issued pair.
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
        observed_ip: &str,
    ) -> Result<TokenPair, AuthError> {
        let span = tracing::info_span!(
            "refresh",
            ip = %observed_ip,
            guid = tracing::field::Empty,
            refresh_id = tracing::field::Empty
        );
        self.refresh_inner(access_token, refresh_token, observed_ip)
            .instrument(span.clone())
            .await
            .inspect_err(|e| span.in_scope(|| log_rejection(e)))
    }

    async fn issue_inner(
        &self,
        raw_guid: &str,
        email: Option<&str>,
        observed_ip: &str,
    ) -> Result<TokenPair, AuthError> {
        let guid = Uuid::parse_str(raw_guid)
            .map_err(|e| AuthError::InvalidInput(format!("malformed guid: {e}")))?;
        let email = email.map(normalize_email).transpose()?;

        let identity = Identity::new(guid, observed_ip).with_email(email);
        self.bounded(self.store.upsert_user(&identity))
            .await
            .map_err(|e| AuthError::IdentityUpsert(e.to_string()))?;

        let (pair, record_id) = self.issue_for(guid, observed_ip).await?;
        info!(refresh_id = record_id, "Issued token pair");
        Ok(pair)
    }

    /// Mint, persist and pair a fresh refresh token for an existing identity.
    async fn issue_for(&self, guid: Uuid, ip: &str) -> Result<(TokenPair, u64), AuthError> {
        let refresh_token = self.codec.mint_refresh(guid, ip)?;
        let fingerprint = self.codec.fingerprint(&refresh_token);
        let record_id = self
            .bounded(self.store.store_refresh(&fingerprint, guid))
            .await
            .map_err(|e| AuthError::PersistenceError(e.to_string()))?;
        let access_token = self.codec.mint_access(guid, ip, record_id)?;

        Ok((
            TokenPair {
                access_token,
                refresh_token,
            },
            record_id,
        ))
    }

    async fn refresh_inner(
        &self,
        access_token: &str,
        refresh_token: &str,
        observed_ip: &str,
    ) -> Result<TokenPair, AuthError> {
        let refresh_claims = self.codec.verify_refresh(refresh_token)?;

        let expiry = match self.policy.access_expiry {
            AccessExpiryPolicy::Enforce => ExpiryCheck::Enforce,
            AccessExpiryPolicy::AllowExpired => ExpiryCheck::Skip,
        };
        let access_claims = self.codec.verify_access(access_token, expiry)?;

        if refresh_claims.guid != access_claims.guid {
            return Err(AuthError::IdentityMismatch);
        }
        let guid = refresh_claims.guid;
        let span = tracing::Span::current();
        span.record("guid", tracing::field::display(guid));
        span.record("refresh_id", access_claims.refresh_id);

        let record = self
            .bounded(self.store.load_refresh(access_claims.refresh_id))
            .await?;
        if record.owner_guid != guid {
            return Err(AuthError::ReplayOrTamper);
        }
        if !self.codec.credential_matches(refresh_token, &record.token_hash) {
            return Err(AuthError::ReplayOrTamper);
        }

        if refresh_claims.ip != observed_ip {
            self.spawn_origin_alert(guid, refresh_claims.ip.clone(), observed_ip.to_string());
        }

        match self.policy.rotation {
            RotationPolicy::Reuse => {
                let access_token = self.codec.mint_access(guid, observed_ip, record.id)?;
                info!("Rotated access token");
                Ok(TokenPair {
                    access_token,
                    refresh_token: refresh_token.to_string(),
                })
            }
            RotationPolicy::SingleUse => {
                self.bounded(self.store.revoke_refresh(record.id))
                    .await
                    .map_err(|e| match e {
                        // Another request consumed this record first
                        StoreError::NotFound(_) => AuthError::ReplayOrTamper,
                        other => AuthError::PersistenceError(other.to_string()),
                    })?;
                let (pair, record_id) = self.issue_for(guid, observed_ip).await?;
                info!(new_refresh_id = record_id, "Rotated token pair");
                Ok(pair)
            }
        }
    }

    /// Alert the identity's contact address about a change of origin.
    fn spawn_origin_alert(&self, guid: Uuid, issued_ip: String, observed_ip: String) {
        warn!(
            issued_ip = %issued_ip,
            observed_ip = %observed_ip,
            "Refresh origin differs from issuing origin"
        );

        let store = Arc::clone(&self.store);
        let notifier = Arc::clone(&self.notifier);
        let policy = self.policy;
        let span = tracing::info_span!("origin_alert", guid = %guid);

        self.notifications.spawn(
            async move {
                let result =
                    deliver_origin_alert(store, notifier, policy, guid, issued_ip, observed_ip)
                        .await;
                match result {
                    Ok(()) => info!("Origin alert delivered"),
                    Err(e) => warn!(error = %e, "Origin alert not delivered"),
                }
            }
            .instrument(span),
        );
    }

    async fn bounded<T>(&self, op: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.policy.store_timeout, op)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }
}

async fn deliver_origin_alert(
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationSink>,
    policy: ServicePolicy,
    guid: Uuid,
    issued_ip: String,
    observed_ip: String,
) -> Result<(), NotificationError> {
    let identity = tokio::time::timeout(policy.store_timeout, store.load_user(guid))
        .await
        .map_err(|_| NotificationError::Timeout)?
        .map_err(|e| NotificationError::Lookup(e.to_string()))?;
    let address = identity.email.ok_or(NotificationError::NoAddress(guid))?;

    let alert = OriginAlert {
        address,
        guid,
        issued_ip,
        observed_ip,
    };
    tokio::time::timeout(policy.notify_timeout, notifier.notify(&alert))
        .await
        .map_err(|_| NotificationError::Timeout)?
}

fn log_rejection(e: &AuthError) {
    if e.is_client_error() {
        warn!(error_code = e.error_code(), error = %e, "Request rejected");
    } else {
        error!(error_code = e.error_code(), error = %e, "Request failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::AccessClaims;
    use crate::auth::codec::JwtCodec;
    use crate::storage::{MemoryCredentialStore, RefreshRecord};
    use async_trait::async_trait;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use std::sync::Mutex;

    const SECRET: &[u8] = b"service-test-key";
    const GUID: &str = "123e4567-e89b-12d3-a456-426614174000";
    const OTHER_GUID: &str = "c643f9b6-220a-46ad-acb1-5902f6405b65";
    const EMAIL: &str = "owner@example.com";

    /// Sink that records every alert it receives.
    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<OriginAlert>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for RecordingNotifier {
        async fn notify(&self, alert: &OriginAlert) -> Result<(), NotificationError> {
            self.alerts.lock().unwrap().push(alert.clone());
            if self.fail {
                Err(NotificationError::Delivery("mailbox full".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Sink that never completes a delivery.
    #[derive(Default)]
    struct HangingNotifier {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl NotificationSink for HangingNotifier {
        async fn notify(&self, _alert: &OriginAlert) -> Result<(), NotificationError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::future::pending().await
        }
    }

    /// Store whose refresh lookups never answer in time.
    struct StalledStore(MemoryCredentialStore);

    #[async_trait]
    impl CredentialStore for StalledStore {
        async fn upsert_user(&self, identity: &Identity) -> StoreResult<()> {
            self.0.upsert_user(identity).await
        }
        async fn store_refresh(&self, fingerprint: &[u8], guid: Uuid) -> StoreResult<u64> {
            self.0.store_refresh(fingerprint, guid).await
        }
        async fn load_refresh(&self, _record_id: u64) -> StoreResult<RefreshRecord> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(StoreError::Unavailable("stalled".into()))
        }
        async fn load_user(&self, guid: Uuid) -> StoreResult<Identity> {
            self.0.load_user(guid).await
        }
        async fn revoke_refresh(&self, record_id: u64) -> StoreResult<()> {
            self.0.revoke_refresh(record_id).await
        }
    }

    struct Harness {
        service: TokenService,
        store: Arc<MemoryCredentialStore>,
        notifier: Arc<RecordingNotifier>,
        codec: Arc<JwtCodec>,
    }

    fn harness_with(policy: ServicePolicy, notifier: RecordingNotifier) -> Harness {
        let codec = Arc::new(JwtCodec::new(Algorithm::HS512, SECRET).unwrap());
        let store = Arc::new(MemoryCredentialStore::new());
        let notifier = Arc::new(notifier);
        let service = TokenService::new(codec.clone(), store.clone(), notifier.clone())
            .with_policy(policy);
        Harness {
            service,
            store,
            notifier,
            codec,
        }
    }

    fn harness() -> Harness {
        harness_with(ServicePolicy::default(), RecordingNotifier::default())
    }

    async fn drain_alerts(service: &TokenService) {
        service.notifications().close();
        service.notifications().wait().await;
    }

    #[tokio::test]
    async fn auth_touches_store_once_each_and_returns_jwts() {
        let h = harness();
        let pair = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();

        let counts = h.store.call_counts();
        assert_eq!(counts.upsert_user, 1);
        assert_eq!(counts.store_refresh, 1);

        for token in [&pair.access_token, &pair.refresh_token] {
            assert!(!token.is_empty());
            assert_eq!(token.split('.').count(), 3);
        }
    }

    #[tokio::test]
    async fn auth_then_refresh_keeps_refresh_id() {
        let h = harness();
        let pair = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();
        let original = h.codec.verify_access(&pair.access_token, ExpiryCheck::Enforce).unwrap();

        let rotated = h
            .service
            .refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1")
            .await
            .unwrap();

        assert_eq!(rotated.refresh_token, pair.refresh_token);
        let claims = h.codec.verify_access(&rotated.access_token, ExpiryCheck::Enforce).unwrap();
        assert_eq!(claims.refresh_id, original.refresh_id);
        assert_eq!(claims.guid, original.guid);
        assert_eq!(h.store.call_counts().store_refresh, 1, "refresh must not write");
    }

    #[tokio::test]
    async fn auth_rejects_malformed_guid_without_touching_store() {
        let h = harness();
        let result = h.service.issue("123e4567-e89b-", None, "10.0.0.1").await;
        assert!(matches!(result, Err(AuthError::InvalidInput(_))));
        assert_eq!(h.store.call_counts().upsert_user, 0);
    }

    #[tokio::test]
    async fn auth_rejects_malformed_email() {
        let h = harness();
        let result = h.service.issue(GUID, Some("not-an-address"), "10.0.0.1").await;
        assert!(matches!(result, Err(AuthError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn auth_upsert_failure_is_reported_as_identity_upsert() {
        let h = harness();
        h.store.set_unavailable(true);
        let err = h.service.issue(GUID, None, "10.0.0.1").await.unwrap_err();
        assert!(matches!(err, AuthError::IdentityUpsert(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tampered_refresh_token_is_never_accepted() {
        let h = harness();
        let pair = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();

        let bytes = pair.refresh_token.as_bytes();
        let positions = [0, bytes.len() / 3, bytes.len() / 2, bytes.len() - 3];
        for pos in positions {
            let mut tampered = bytes.to_vec();
            tampered[pos] = if tampered[pos] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(tampered).unwrap();

            let result = h
                .service
                .refresh(&pair.access_token, &tampered, "10.0.0.1")
                .await;
            assert!(
                matches!(
                    result,
                    Err(AuthError::ReplayOrTamper) | Err(AuthError::TokenInvalid(_))
                ),
                "byte {pos} tamper was accepted: {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn other_refresh_token_of_same_identity_is_replay() {
        let h = harness();
        let first = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();
        let second = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();

        let result = h
            .service
            .refresh(&first.access_token, &second.refresh_token, "10.0.0.1")
            .await;
        assert!(matches!(result, Err(AuthError::ReplayOrTamper)));
    }

    #[tokio::test]
    async fn swapped_identities_are_mismatch() {
        let h = harness();
        let a = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();
        let b = h.service.issue(OTHER_GUID, None, "10.0.0.1").await.unwrap();

        let result = h
            .service
            .refresh(&b.access_token, &a.refresh_token, "10.0.0.1")
            .await;
        assert!(matches!(result, Err(AuthError::IdentityMismatch)));
    }

    #[tokio::test]
    async fn missing_refresh_record_is_not_found() {
        let h = harness();
        let pair = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();
        let guid = Uuid::parse_str(GUID).unwrap();
        let dangling = h.codec.mint_access(guid, "10.0.0.1", 999).unwrap();

        let result = h
            .service
            .refresh(&dangling, &pair.refresh_token, "10.0.0.1")
            .await;
        assert!(matches!(result, Err(AuthError::NotFound)));
    }

    #[tokio::test]
    async fn record_of_another_identity_is_replay() {
        let h = harness();
        let a = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();
        let b = h.service.issue(OTHER_GUID, None, "10.0.0.1").await.unwrap();
        let a_id = h
            .codec
            .verify_access(&a.access_token, ExpiryCheck::Enforce)
            .unwrap()
            .refresh_id;

        // Access token for B pointing at A's record
        let other = Uuid::parse_str(OTHER_GUID).unwrap();
        let forged = h.codec.mint_access(other, "10.0.0.1", a_id).unwrap();
        let result = h
            .service
            .refresh(&forged, &b.refresh_token, "10.0.0.1")
            .await;
        assert!(matches!(result, Err(AuthError::ReplayOrTamper)));
    }

    #[tokio::test]
    async fn origin_change_succeeds_and_notifies_once() {
        let h = harness();
        let pair = h.service.issue(GUID, Some(EMAIL), "10.0.0.1").await.unwrap();

        let rotated = h
            .service
            .refresh(&pair.access_token, &pair.refresh_token, "192.168.1.7")
            .await
            .unwrap();
        drain_alerts(&h.service).await;

        let alerts = h.notifier.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].address, EMAIL);
        assert_eq!(alerts[0].issued_ip, "10.0.0.1");
        assert_eq!(alerts[0].observed_ip, "192.168.1.7");

        let claims = h.codec.verify_access(&rotated.access_token, ExpiryCheck::Enforce).unwrap();
        assert_eq!(claims.ip, "192.168.1.7");
    }

    #[tokio::test]
    async fn same_origin_does_not_notify() {
        let h = harness();
        let pair = h.service.issue(GUID, Some(EMAIL), "10.0.0.1").await.unwrap();
        h.service
            .refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1")
            .await
            .unwrap();
        drain_alerts(&h.service).await;

        assert!(h.notifier.alerts.lock().unwrap().is_empty());
        assert_eq!(h.store.call_counts().load_user, 0);
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_refresh() {
        let h = harness_with(
            ServicePolicy::default(),
            RecordingNotifier {
                fail: true,
                ..Default::default()
            },
        );
        let pair = h.service.issue(GUID, Some(EMAIL), "10.0.0.1").await.unwrap();

        let result = h
            .service
            .refresh(&pair.access_token, &pair.refresh_token, "172.16.0.9")
            .await;
        drain_alerts(&h.service).await;

        assert!(result.is_ok());
        assert_eq!(h.notifier.alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hanging_sink_is_cut_off_without_affecting_refresh() {
        let codec = Arc::new(JwtCodec::new(Algorithm::HS512, SECRET).unwrap());
        let store = Arc::new(MemoryCredentialStore::new());
        let notifier = Arc::new(HangingNotifier::default());
        let policy = ServicePolicy {
            notify_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let service = TokenService::new(codec, store.clone(), notifier.clone()).with_policy(policy);
        let pair = service.issue(GUID, Some(EMAIL), "10.0.0.1").await.unwrap();

        let rotated = tokio::time::timeout(
            Duration::from_secs(1),
            service.refresh(&pair.access_token, &pair.refresh_token, "172.16.0.9"),
        )
        .await
        .expect("refresh must not wait for the alert");
        assert!(rotated.is_ok());

        tokio::time::timeout(Duration::from_secs(2), drain_alerts(&service))
            .await
            .expect("alert task must give up after the notify timeout");
        assert_eq!(notifier.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let guid = Uuid::parse_str(GUID).unwrap();
        let result = deliver_origin_alert(
            store,
            notifier,
            policy,
            guid,
            "10.0.0.1".into(),
            "172.16.0.9".into(),
        )
        .await;
        assert!(matches!(result, Err(NotificationError::Timeout)));
    }

    #[tokio::test]
    async fn origin_change_without_address_skips_sink() {
        let h = harness();
        let pair = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();
        h.service
            .refresh(&pair.access_token, &pair.refresh_token, "172.16.0.9")
            .await
            .unwrap();
        drain_alerts(&h.service).await;

        assert_eq!(h.store.call_counts().load_user, 1);
        assert!(h.notifier.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_refreshes_both_succeed_under_reuse() {
        let h = harness();
        let pair = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();

        let (a, b) = tokio::join!(
            h.service.refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1"),
            h.service.refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1"),
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn single_use_rotation_revokes_previous_pair() {
        let h = harness_with(
            ServicePolicy {
                rotation: RotationPolicy::SingleUse,
                ..Default::default()
            },
            RecordingNotifier::default(),
        );
        let pair = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();

        let rotated = h
            .service
            .refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1")
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert_eq!(h.store.token_count(), 1);

        let replay = h
            .service
            .refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1")
            .await;
        assert!(matches!(replay, Err(AuthError::NotFound)));

        h.service
            .refresh(&rotated.access_token, &rotated.refresh_token, "10.0.0.1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn single_use_rotation_has_one_winner() {
        let h = harness_with(
            ServicePolicy {
                rotation: RotationPolicy::SingleUse,
                ..Default::default()
            },
            RecordingNotifier::default(),
        );
        let pair = h.service.issue(GUID, None, "10.0.0.1").await.unwrap();

        let (a, b) = tokio::join!(
            h.service.refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1"),
            h.service.refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1"),
        );
        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "{a:?} / {b:?}");
    }

    fn expired_access_token(refresh_id: u64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = AccessClaims {
            guid: Uuid::parse_str(GUID).unwrap(),
            ip: "10.0.0.1".to_string(),
            refresh_id,
            jti: Uuid::new_v4(),
            iat: now - 7200,
            exp: now - 3600,
        };
        encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn expired_access_token_follows_policy() {
        let strict = harness();
        let pair = strict.service.issue(GUID, None, "10.0.0.1").await.unwrap();
        let result = strict
            .service
            .refresh(&expired_access_token(1), &pair.refresh_token, "10.0.0.1")
            .await;
        assert!(matches!(result, Err(AuthError::TokenInvalid(_))));

        let lenient = harness_with(
            ServicePolicy {
                access_expiry: AccessExpiryPolicy::AllowExpired,
                ..Default::default()
            },
            RecordingNotifier::default(),
        );
        let pair = lenient.service.issue(GUID, None, "10.0.0.1").await.unwrap();
        lenient
            .service
            .refresh(&expired_access_token(1), &pair.refresh_token, "10.0.0.1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stalled_store_times_out_as_persistence_error() {
        let codec = Arc::new(JwtCodec::new(Algorithm::HS512, SECRET).unwrap());
        let service = TokenService::new(
            codec,
            Arc::new(StalledStore(MemoryCredentialStore::new())),
            Arc::new(RecordingNotifier::default()),
        )
        .with_policy(ServicePolicy {
            store_timeout: Duration::from_millis(50),
            ..Default::default()
        });
        let pair = service.issue(GUID, None, "10.0.0.1").await.unwrap();

        let result = service
            .refresh(&pair.access_token, &pair.refresh_token, "10.0.0.1")
            .await;
        assert!(matches!(result, Err(AuthError::PersistenceError(_))));
    }
}
