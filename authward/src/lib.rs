//! Authenticated outbound requests
//!
//! An [`Authorizer`] issues calls described by [`RequestOptions`], working
//! out how each one should be authenticated:
//!
//! 1. a bearer token supplied with the call is used as-is;
//! 2. otherwise, client credentials are exchanged for an access token;
//! 3. otherwise, a refresh token is exchanged for a delegated token scoped to
//!    a target service. If the target is not known, the call is first sent
//!    without credentials, and the target is read from the `client_id` in the
//!    `WWW-Authenticate` challenge of the `401` that comes back.
//!
//! A call authenticated with client credentials that is refused with a `401`
//! falls back to delegation in the same way.
//!
//! Issued tokens are cached for their lifetime, and successful responses
//! carrying a `Cache-Control: max-age` are cached for that long, both in a
//! replaceable [`CredentialStore`](authward_tokens::store::CredentialStore).
//! Transport failures are retried with exponential backoff.
//!
//! ```
//! use authward::{AuthConfig, Authorizer, RequestEvent, RequestOptions};
//! use reqwest_middleware::ClientBuilder;
//!
//! let client = ClientBuilder::new(reqwest::Client::new()).build();
//! let authorizer = Authorizer::new(client);
//!
//! authorizer.events().subscribe(|event: &RequestEvent<'_>| {
//!     tracing::debug!(event = event.name(), url = %event.request().url, "request event");
//! });
//!
//! let options = RequestOptions::new("https://api.example.com/orders")
//!     .with_auth(
//!         AuthConfig::delegation("refresh-token")
//!             .with_target_id("order-service"),
//!     )
//!     .with_times_to_retry(3);
//! # async move {
//! let orders: serde_json::Value = authorizer.issue(options).await?.json()?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! # };
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod cache;
mod challenge;
mod client;
pub mod config;
pub mod error;
pub mod events;
mod grants;
mod options;
pub mod resolver;
mod service;
pub mod transport;

pub use challenge::Challenge;
pub use client::{Authorizer, AuthorizerBuilder};
pub use config::AuthorizerConfig;
pub use error::{CacheKeyError, ConfigError, Error, Result, TransportError};
pub use events::{ListenerId, RequestEvent, RequestEvents, RequestListener};
pub use options::{AuthConfig, KeyGen, RequestOptions};
pub use service::{ServiceClient, ServiceCredentials};
pub use transport::{Body, OutboundRequest, Response, Transport};
