use crate::auth::credentials::CredentialPair;
use crate::config::{PROFILE_NAMESPACE, TOKEN_NAMESPACE};
use crate::db::StateStorage;
use crate::error::ClientError;
use crate::types::UserProfile;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Holder of the current credential pair, written through to durable storage.
///
/// The in-memory value is authoritative for the process; the durable record is a
/// best-effort cache that survives restarts. Readers may subscribe to changes.
#[derive(Clone)]
pub struct TokenStore {
    storage: StateStorage,
    current: Arc<watch::Sender<Option<CredentialPair>>>,
}

impl TokenStore {
    /// Load the persisted pair. Unreadable or malformed records count as absent.
    pub async fn load(storage: StateStorage) -> Self {
        let initial = match storage.get(TOKEN_NAMESPACE).await {
            Ok(Some(record)) => {
                let parsed = CredentialPair::from_durable(&record.payload);
                if parsed.is_none() {
                    warn!(namespace = TOKEN_NAMESPACE, "failed to parse stored tokens; ignoring");
                }
                parsed
            }
            Ok(None) => None,
            Err(e) => {
                warn!(namespace = TOKEN_NAMESPACE, error = %e, "failed to read stored tokens");
                None
            }
        };
        debug!(present = initial.is_some(), "token store loaded");
        let (tx, _rx) = watch::channel(initial);
        Self {
            storage,
            current: Arc::new(tx),
        }
    }

    pub fn get(&self) -> Option<CredentialPair> {
        self.current.borrow().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|p| p.access_token.clone())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Replace the pair and persist it. Incomplete pairs are refused.
    pub async fn set(&self, pair: CredentialPair) -> Result<(), ClientError> {
        if !pair.is_complete() {
            return Err(ClientError::InvalidTokenPayload);
        }
        let payload = serde_json::to_string(&pair)?;
        self.current.send_replace(Some(pair));
        if let Err(e) = self.storage.put(TOKEN_NAMESPACE, &payload).await {
            warn!(error = %e, "failed to persist tokens; keeping in-memory session");
        }
        Ok(())
    }

    pub async fn clear(&self) {
        self.current.send_replace(None);
        if let Err(e) = self.storage.delete(TOKEN_NAMESPACE).await {
            warn!(error = %e, "failed to remove persisted tokens");
        }
    }

    /// Observe session changes, e.g. a forced logout after a failed refresh.
    pub fn subscribe(&self) -> watch::Receiver<Option<CredentialPair>> {
        self.current.subscribe()
    }
}

/// Cached profile of the logged-in user; never used for authorization.
#[derive(Clone)]
pub struct ProfileStore {
    storage: StateStorage,
    current: Arc<watch::Sender<Option<UserProfile>>>,
}

impl ProfileStore {
    pub async fn load(storage: StateStorage) -> Self {
        let initial = match storage.get(PROFILE_NAMESPACE).await {
            Ok(Some(record)) => serde_json::from_str::<UserProfile>(&record.payload)
                .inspect_err(|e| {
                    warn!(namespace = PROFILE_NAMESPACE, error = %e, "failed to parse stored profile");
                })
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(namespace = PROFILE_NAMESPACE, error = %e, "failed to read stored profile");
                None
            }
        };
        let (tx, _rx) = watch::channel(initial);
        Self {
            storage,
            current: Arc::new(tx),
        }
    }

    pub fn get(&self) -> Option<UserProfile> {
        self.current.borrow().clone()
    }

    pub async fn set(&self, profile: UserProfile) {
        let payload = match serde_json::to_string(&profile) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to serialize profile");
                return;
            }
        };
        self.current.send_replace(Some(profile));
        if let Err(e) = self.storage.put(PROFILE_NAMESPACE, &payload).await {
            warn!(error = %e, "failed to persist profile");
        }
    }

    pub async fn clear(&self) {
        self.current.send_replace(None);
        if let Err(e) = self.storage.delete(PROFILE_NAMESPACE).await {
            warn!(error = %e, "failed to remove persisted profile");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_storage() -> StateStorage {
        StateStorage::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite")
    }

    #[tokio::test]
    async fn malformed_record_loads_as_absent() {
        let storage = memory_storage().await;
        storage
            .put(TOKEN_NAMESPACE, r#"{"accessToken":"only-half"}"#)
            .await
            .unwrap();
        let store = TokenStore::load(storage).await;
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn incomplete_pair_is_refused() {
        let store = TokenStore::load(memory_storage().await).await;
        let err = store.set(CredentialPair::new("a", "")).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidTokenPayload));
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_clear() {
        let store = TokenStore::load(memory_storage().await).await;
        let mut rx = store.subscribe();
        store.set(CredentialPair::new("a1", "r1")).await.unwrap();
        store.clear().await;
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
    }

    #[tokio::test]
    async fn profile_round_trips() {
        let storage = memory_storage().await;
        let profiles = ProfileStore::load(storage.clone()).await;
        let profile = UserProfile {
            email: "a@x.com".to_string(),
            full_name: "Ada".to_string(),
        };
        profiles.set(profile.clone()).await;
        let reloaded = ProfileStore::load(storage).await;
        assert_eq!(reloaded.get(), Some(profile));
    }
}
