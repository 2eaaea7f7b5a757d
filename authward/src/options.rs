//! Per-call request options and authentication configuration

use std::{fmt, sync::Arc};

use aliri::jwt;
use authward_tokens::{
    backoff::RetryBudget, AccessToken, ClientId, ClientSecret, RefreshToken, TargetId,
};
use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};

use crate::{error::BoxError, transport::Body};

/// Credentials and identifiers used to authenticate a call
///
/// A single configuration may carry what several strategies need. They are
/// tried in order: an explicit bearer token, then client credentials, then a
/// delegated token.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// A bearer token to use as-is
    pub bearer: Option<AccessToken>,
    /// The client ID for a client credentials grant
    pub client_id: Option<ClientId>,
    /// The client secret for a client credentials grant
    pub client_secret: Option<ClientSecret>,
    /// The audience to request a client credentials token for
    pub audience: Option<jwt::Audience>,
    /// The authority to send grants to
    pub authorization_server: Option<Url>,
    /// The authority to send delegation grants to
    pub delegation_server: Option<Url>,
    /// The refresh token to exchange for a delegated token
    pub refresh_token: Option<RefreshToken>,
    /// The service a delegated token is requested for
    pub target_id: Option<TargetId>,
    /// The scope requested with a delegation grant
    pub scope: Option<String>,
}

impl AuthConfig {
    /// Authenticates with a bearer token
    pub fn bearer(token: impl Into<AccessToken>) -> Self {
        Self::default().with_bearer(token)
    }

    /// Authenticates with client credentials
    pub fn client_credentials(
        client_id: impl Into<ClientId>,
        client_secret: impl Into<ClientSecret>,
    ) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            ..Self::default()
        }
    }

    /// Authenticates with a delegated token obtained using `refresh_token`
    pub fn delegation(refresh_token: impl Into<RefreshToken>) -> Self {
        Self::default().with_refresh_token(refresh_token)
    }

    /// Sets the bearer token
    pub fn with_bearer(mut self, token: impl Into<AccessToken>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Sets the client ID
    pub fn with_client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the client secret
    pub fn with_client_secret(mut self, client_secret: impl Into<ClientSecret>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Sets the audience
    pub fn with_audience(mut self, audience: impl Into<jwt::Audience>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the authorization server
    pub fn with_authorization_server(mut self, url: Url) -> Self {
        self.authorization_server = Some(url);
        self
    }

    /// Sets the delegation server
    pub fn with_delegation_server(mut self, url: Url) -> Self {
        self.delegation_server = Some(url);
        self
    }

    /// Sets the refresh token
    pub fn with_refresh_token(mut self, refresh_token: impl Into<RefreshToken>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the delegation target
    pub fn with_target_id(mut self, target_id: impl Into<TargetId>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Sets the delegation scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

type KeyFn = dyn Fn(&RequestOptions) -> Result<String, BoxError> + Send + Sync;

/// A custom function deriving the response cache key for a call
#[derive(Clone)]
pub struct KeyGen(Arc<KeyFn>);

impl KeyGen {
    /// Wraps a key derivation function
    pub fn new<F>(key_fn: F) -> Self
    where
        F: Fn(&RequestOptions) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(key_fn))
    }

    /// Derives the key for `options`
    pub fn key(&self, options: &RequestOptions) -> Result<String, BoxError> {
        (self.0)(options)
    }
}

impl fmt::Debug for KeyGen {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("KeyGen(..)")
    }
}

/// Everything needed to issue one call
///
/// Options are owned by a single call. When a strategy resolves a token, it
/// attaches the token to a copy so that other strategies never observe it.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    /// The HTTP method, `GET` by default
    pub method: Method,
    /// The target URI
    pub uri: String,
    /// Request headers
    pub headers: HeaderMap,
    /// The request body
    pub body: Option<Body>,
    /// How to authenticate
    pub auth: AuthConfig,
    /// The retries remaining for this call
    pub retry: RetryBudget,
    /// A custom response cache key
    pub key_gen: Option<KeyGen>,
    /// Overrides when responses are cached
    ///
    /// `None` caches successful responses carrying a positive `max-age`.
    /// `Some(true)` caches every successful response. `Some(false)` caches
    /// nothing.
    pub cache_all: Option<bool>,
}

impl RequestOptions {
    /// A `GET` of `uri` with no authentication and unlimited retries
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: None,
            auth: AuthConfig::default(),
            retry: RetryBudget::unlimited(),
            key_gen: None,
            cache_all: None,
        }
    }

    /// Sets the method
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a header, replacing any existing value
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces all headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a JSON body
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    /// Sets a raw body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(Body::Bytes(body.into()));
        self
    }

    /// Sets the authentication configuration
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Permits at most `times_to_retry` retries
    pub fn with_times_to_retry(mut self, times_to_retry: u32) -> Self {
        self.retry = RetryBudget::limited(times_to_retry);
        self
    }

    /// Uses a custom response cache key
    pub fn with_key_gen(mut self, key_gen: KeyGen) -> Self {
        self.key_gen = Some(key_gen);
        self
    }

    /// Overrides when responses are cached
    pub fn with_cache_all(mut self, cache_all: bool) -> Self {
        self.cache_all = Some(cache_all);
        self
    }

    /// Retries remaining, or `None` if unlimited
    pub fn times_to_retry(&self) -> Option<u32> {
        self.retry.remaining()
    }

    /// Retries performed so far
    pub fn retry_attempts(&self) -> u32 {
        self.retry.attempts()
    }

    /// A copy of these options authenticated with `token`
    pub(crate) fn authorized_with(&self, token: AccessToken) -> Self {
        let mut options = self.clone();
        options.auth.bearer = Some(token);
        options
    }
}
