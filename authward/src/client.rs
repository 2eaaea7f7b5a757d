//! The entry point for issuing authenticated calls

use std::{error, fmt, sync::Arc};

use authward_tokens::{
    claims::{TokenDecoder, UnverifiedJwtDecoder},
    sources::TokenCache,
    store::{CredentialStore, SharedStore},
};

use crate::{
    cache::ResponseCache,
    config::AuthorizerConfig,
    error::{Error, Result, TransportError},
    events::{RequestEvent, RequestEvents},
    options::RequestOptions,
    resolver::Resolved,
    transport::{OutboundRequest, Response, Transport},
};

pub(crate) struct Inner {
    pub(crate) config: AuthorizerConfig,
    transport: Box<dyn Transport>,
    store: SharedStore,
    pub(crate) tokens: TokenCache,
    pub(crate) responses: ResponseCache,
    events: RequestEvents,
}

impl Inner {
    /// Sends `request`, notifying listeners before and after
    pub(crate) async fn send(&self, request: OutboundRequest) -> Result<Response, TransportError> {
        self.events.emit(&RequestEvent::RequestSent { request: &request });

        let response = self.transport.send(request.clone()).await?;

        self.events.emit(&RequestEvent::ResponseReceived {
            request: &request,
            response: &response,
        });

        Ok(response)
    }
}

/// Issues calls, attaching whatever credentials they require
///
/// Each call tries, in order, the bearer token it was given, a client
/// credentials grant, and a delegation grant, falling back to an
/// unauthenticated probe when a delegation target must first be discovered.
/// Issued tokens and cacheable responses are kept in a shared
/// [`CredentialStore`], which is a no-op until one is configured.
///
/// Transport failures are retried, re-running the whole resolution each time,
/// for as long as the call's retry budget allows.
///
/// Clones share the same store, caches and listeners.
///
/// ```
/// use authward::{AuthConfig, Authorizer, RequestOptions};
/// use authward_tokens::store::InMemoryStore;
///
/// let authorizer = Authorizer::builder(reqwest::Client::new())
///     .with_credential_store(InMemoryStore::new())
///     .build();
///
/// let options = RequestOptions::new("https://api.example.com/orders/1234")
///     .with_auth(AuthConfig::client_credentials("my-client", "my-secret"))
///     .with_times_to_retry(2);
///
/// # async move {
/// let response = authorizer.issue(options).await?;
/// println!("{}", response.status());
/// # Ok::<_, authward::Error>(())
/// # };
/// ```
#[derive(Clone)]
pub struct Authorizer {
    pub(crate) inner: Arc<Inner>,
}

impl Authorizer {
    /// Constructs an authorizer with the default configuration
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::builder(transport).build()
    }

    /// Starts building an authorizer
    pub fn builder(transport: impl Transport + 'static) -> AuthorizerBuilder {
        AuthorizerBuilder {
            transport: Box::new(transport),
            config: AuthorizerConfig::default(),
            store: SharedStore::default(),
            decoder: Arc::new(UnverifiedJwtDecoder),
            events: RequestEvents::new(),
        }
    }

    /// Issues a call
    ///
    /// The response is returned whatever its status. An error is returned
    /// only if the call could not be authenticated, or if sending failed and
    /// the retry budget is spent.
    #[tracing::instrument(
        skip_all,
        fields(
            request.method = %options.method,
            request.uri = %options.uri,
        ),
    )]
    pub async fn issue(&self, mut options: RequestOptions) -> Result<Response> {
        self.apply_defaults(&mut options);

        loop {
            let error = match self.inner.resolve(&options).await? {
                Resolved::Response(response) => return Ok(response),
                Resolved::Retry(error) => error,
            };

            let Some(delay) = options.retry.consume(&self.inner.config.backoff) else {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    retry.attempts = options.retry_attempts(),
                    "request failed, no retries remaining"
                );
                return Err(Error::Transport(error));
            };

            tracing::warn!(
                error = (&error as &dyn error::Error),
                retry.attempt = options.retry_attempts(),
                retry.remaining = ?options.times_to_retry(),
                retry.delay = ?delay,
                "request failed, retrying"
            );

            tokio::time::sleep(delay).await;
        }
    }

    fn apply_defaults(&self, options: &mut RequestOptions) {
        let defaults = &self.inner.config.default_headers;
        for name in defaults.keys() {
            if !options.headers.contains_key(name) {
                for value in defaults.get_all(name) {
                    options.headers.append(name.clone(), value.clone());
                }
            }
        }
    }

    /// Replaces the credential store for all future lookups
    ///
    /// Calls already in flight are not disturbed, and nothing is copied from
    /// the previous store.
    pub fn set_credential_store(&self, store: impl CredentialStore + 'static) {
        self.inner.store.replace(store);
    }

    /// The listeners notified of every request and response
    pub fn events(&self) -> &RequestEvents {
        &self.inner.events
    }

    /// The configuration in use
    pub fn config(&self) -> &AuthorizerConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("config", &self.inner.config)
            .field("store", &self.inner.store)
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

/// A builder for an [`Authorizer`]
pub struct AuthorizerBuilder {
    transport: Box<dyn Transport>,
    config: AuthorizerConfig,
    store: SharedStore,
    decoder: Arc<dyn TokenDecoder>,
    events: RequestEvents,
}

impl AuthorizerBuilder {
    /// Uses `config` instead of the defaults
    pub fn with_config(mut self, config: AuthorizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Keeps tokens and responses in `store`
    pub fn with_credential_store(self, store: impl CredentialStore + 'static) -> Self {
        self.store.replace(store);
        self
    }

    /// Reads token claims with `decoder`
    pub fn with_decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Notifies the listeners in `events`
    pub fn with_events(mut self, events: RequestEvents) -> Self {
        self.events = events;
        self
    }

    /// Builds the authorizer
    pub fn build(self) -> Authorizer {
        let tokens = TokenCache::new(self.store.clone()).with_decoder(Arc::clone(&self.decoder));
        let responses = ResponseCache::new(
            self.store.clone(),
            self.decoder,
            self.config.cache_all_ttl,
        );

        Authorizer {
            inner: Arc::new(Inner {
                config: self.config,
                transport: self.transport,
                store: self.store,
                tokens,
                responses,
                events: self.events,
            }),
        }
    }
}

impl fmt::Debug for AuthorizerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthorizerBuilder")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
