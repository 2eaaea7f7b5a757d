//! Caching of whole responses
//!
//! Responses are keyed by a fingerprint of the call. Unless the caller
//! supplies a [`KeyGen`](crate::KeyGen), the fingerprint is
//! `{method}-{uri}-{subject}`, where the subject comes from the bearer token
//! attached to the call, or `{method}-{uri}` when there is no subject.
//!
//! Failing to derive a key fails the call, since a wrong key could hand one
//! caller's response to another. Failing to read or write the store only
//! costs a cache miss.

use std::{error, sync::Arc};

use aliri_base64::Base64;
use aliri_clock::DurationSecs;
use authward_tokens::{claims::TokenDecoder, store::SharedStore};
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::{error::CacheKeyError, options::RequestOptions, transport::Response};

#[derive(Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Base64,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    response: CachedResponse,
}

impl From<&Response> for CacheEntry {
    fn from(response: &Response) -> Self {
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_owned(), value.to_str().ok()?.to_owned()))
            })
            .collect();

        Self {
            response: CachedResponse {
                status: response.status().as_u16(),
                headers,
                body: Base64::from_raw(response.body().to_vec()),
            },
        }
    }
}

impl CacheEntry {
    fn into_response(self) -> Option<Response> {
        let status = StatusCode::from_u16(self.response.status).ok()?;
        let mut headers = HeaderMap::with_capacity(self.response.headers.len());
        for (name, value) in self.response.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.append(name, value);
            }
        }

        Some(Response::new(status, headers, self.response.body.into_inner()))
    }
}

/// The `max-age` directive of the response's `Cache-Control` header, if any
pub fn max_age(headers: &HeaderMap) -> Option<u64> {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|directive| {
            let (name, value) = directive.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("max-age") {
                value.trim().trim_matches('"').parse().ok()
            } else {
                None
            }
        })
}

/// A cache of successful responses
#[derive(Clone)]
pub struct ResponseCache {
    store: SharedStore,
    decoder: Arc<dyn TokenDecoder>,
    cache_all_ttl: DurationSecs,
}

impl ResponseCache {
    /// Constructs a response cache over `store`
    pub fn new(
        store: SharedStore,
        decoder: Arc<dyn TokenDecoder>,
        cache_all_ttl: DurationSecs,
    ) -> Self {
        Self {
            store,
            decoder,
            cache_all_ttl,
        }
    }

    /// The key the response to `options` is cached under
    pub fn cache_key(&self, options: &RequestOptions) -> Result<String, CacheKeyError> {
        if let Some(key_gen) = &options.key_gen {
            return key_gen.key(options).map_err(CacheKeyError::Custom);
        }

        let subject = match &options.auth.bearer {
            Some(bearer) => self
                .decoder
                .decode(bearer.as_str())?
                .and_then(|claims| claims.subject().map(|s| s.as_str().to_owned())),
            None => None,
        };

        Ok(match subject {
            Some(subject) => format!("{}-{}-{}", options.method, options.uri, subject),
            None => format!("{}-{}", options.method, options.uri),
        })
    }

    /// Looks up a cached response to `options`
    pub async fn check(
        &self,
        options: &RequestOptions,
    ) -> Result<Option<Response>, CacheKeyError> {
        let key = self.cache_key(options)?;
        let Some(cached) = self.store.get(&key).await else {
            tracing::trace!(cache.key = %key, "response cache miss");
            return Ok(None);
        };

        let entry = match serde_json::from_str::<CacheEntry>(&cached) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(
                    cache.key = %key,
                    error = (&error as &dyn error::Error),
                    "unreadable cached response, treating as a miss"
                );
                return Ok(None);
            }
        };

        let response = entry.into_response();
        if response.is_some() {
            tracing::trace!(cache.key = %key, "response cache hit");
        } else {
            tracing::warn!(
                cache.key = %key,
                "cached response has an invalid status, treating as a miss"
            );
        }
        Ok(response)
    }

    /// Caches `response` to `options` if it is cacheable
    ///
    /// Returns whether the response was handed to the store.
    pub async fn save(
        &self,
        options: &RequestOptions,
        response: &Response,
    ) -> Result<bool, CacheKeyError> {
        if !response.status().is_success() {
            return Ok(false);
        }

        let ttl = match (options.cache_all, max_age(response.headers())) {
            (Some(false), _) => return Ok(false),
            (_, Some(age)) if age > 0 => DurationSecs(age),
            (Some(true), _) => self.cache_all_ttl,
            (None, _) => return Ok(false),
        };

        let key = self.cache_key(options)?;
        let value = match serde_json::to_string(&CacheEntry::from(response)) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(
                    cache.key = %key,
                    error = (&error as &dyn error::Error),
                    "unable to serialize response for caching"
                );
                return Ok(false);
            }
        };

        self.store.set(&key, value, ttl).await;
        tracing::trace!(cache.key = %key, ttl = ttl.0, "cached response");
        Ok(true)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("store", &self.store)
            .field("cache_all_ttl", &self.cache_all_ttl)
            .finish_non_exhaustive()
    }
}
