//! Caching of issued tokens

use std::{error, fmt, sync::Arc};

use crate::{
    claims::{TokenDecoder, UnverifiedJwtDecoder},
    store::SharedStore,
};

/// Caches issued tokens in the shared credential store
///
/// A token is kept for as long as its own claims say it is valid, that is,
/// for `exp - iat` seconds. Tokens are never invalidated early; the store is
/// relied upon to drop them once that lifetime has passed.
#[derive(Clone)]
pub struct TokenCache {
    store: SharedStore,
    decoder: Arc<dyn TokenDecoder>,
}

impl TokenCache {
    /// Constructs a token cache over `store`
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            decoder: Arc::new(UnverifiedJwtDecoder),
        }
    }

    /// Uses a custom decoder to read token lifetimes
    pub fn with_decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Looks up the token cached under `key`
    pub async fn get_token(&self, key: &str) -> Option<String> {
        let token = self.store.get(key).await;
        if token.is_some() {
            tracing::trace!(cache.key = key, "found cached token");
        } else {
            tracing::trace!(cache.key = key, "no cached token");
        }
        token
    }

    /// Caches `token` under `key` for its remaining lifetime
    ///
    /// Returns whether the token was handed to the store. A token whose
    /// lifetime cannot be determined is not cached.
    pub async fn set_token(&self, key: &str, token: &str) -> bool {
        let lifetime = match self.decoder.decode(token) {
            Ok(claims) => claims.and_then(|c| c.lifetime()),
            Err(error) => {
                tracing::warn!(
                    cache.key = key,
                    error = (&error as &dyn error::Error),
                    "unable to decode issued token, not caching"
                );
                return false;
            }
        };

        match lifetime {
            Some(ttl) => {
                self.store.set(key, token.to_owned(), ttl).await;
                tracing::trace!(cache.key = key, ttl = ttl.0, "cached issued token");
                true
            }
            None => {
                tracing::debug!(
                    cache.key = key,
                    "issued token has no usable lifetime, not caching"
                );
                false
            }
        }
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use aliri_clock::DurationSecs;
    use async_trait::async_trait;

    use super::*;
    use crate::store::{CredentialStore, StoreError};

    // {"alg":"HS256","typ":"JWT"}.{"sub":"svc-user","iat":1700000000,"exp":1700003600}
    const TOKEN_WITH_LIFETIME: &str = concat!(
        "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.",
        "eyJzdWIiOiJzdmMtdXNlciIsImlhdCI6MTcwMDAwMDAwMCwiZXhwIjoxNzAwMDAzNjAwfQ.",
        "c2lnbmF0dXJl"
    );

    #[derive(Clone, Default)]
    struct RecordingStore(Arc<Mutex<Vec<(String, String, u64)>>>);

    #[async_trait]
    impl CredentialStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let writes = self.0.lock().unwrap();
            Ok(writes
                .iter()
                .rev()
                .find(|(k, _, _)| k == key)
                .map(|(_, v, _)| v.clone()))
        }

        async fn set(&self, key: &str, value: String, ttl: DurationSecs) -> Result<(), StoreError> {
            self.0.lock().unwrap().push((key.to_owned(), value, ttl.0));
            Ok(())
        }
    }

    #[tokio::test]
    async fn caches_tokens_for_their_lifetime() {
        let store = RecordingStore::default();
        let cache = TokenCache::new(SharedStore::new(store.clone()));

        assert!(cache.set_token("aud-client", TOKEN_WITH_LIFETIME).await);

        let writes = store.0.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![(
                "aud-client".to_owned(),
                TOKEN_WITH_LIFETIME.to_owned(),
                3600
            )]
        );
    }

    #[tokio::test]
    async fn cached_tokens_are_returned() {
        let cache = TokenCache::new(SharedStore::new(RecordingStore::default()));
        cache.set_token("aud-client", TOKEN_WITH_LIFETIME).await;

        assert_eq!(
            cache.get_token("aud-client").await.as_deref(),
            Some(TOKEN_WITH_LIFETIME)
        );
        assert_eq!(cache.get_token("other").await, None);
    }

    #[tokio::test]
    async fn opaque_tokens_are_not_cached() {
        let store = RecordingStore::default();
        let cache = TokenCache::new(SharedStore::new(store.clone()));

        assert!(!cache.set_token("aud-client", "opaque").await);
        assert!(store.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_tokens_are_not_cached() {
        let store = RecordingStore::default();
        let cache = TokenCache::new(SharedStore::new(store.clone()));

        assert!(!cache.set_token("aud-client", "a.!!!.b").await);
        assert!(store.0.lock().unwrap().is_empty());
    }
}
