//! Errors produced while issuing an authenticated request

use std::error;

use authward_tokens::{claims::DecodeError, sources::oauth2::GrantError};
use thiserror::Error;

/// A boxed, thread-safe error
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// A result whose error defaults to [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A failure to reach a remote endpoint or to read its response
///
/// These are the only failures that are retried.
#[derive(Debug, Error)]
#[error("error sending request")]
pub struct TransportError(#[source] BoxError);

impl TransportError {
    /// Wraps an underlying transport failure
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self(source.into())
    }
}

/// A failure to derive the response cache key for a request
#[derive(Debug, Error)]
pub enum CacheKeyError {
    /// The caller-supplied key generator failed
    #[error("custom cache key generator failed")]
    Custom(#[source] BoxError),
    /// The bearer token could not be decoded to find its subject
    #[error("unable to decode bearer token while deriving cache key")]
    Decode(#[from] DecodeError),
}

/// An invalid value in the environment configuration
#[derive(Debug, Error)]
#[error("invalid value for `{variable}`")]
pub struct ConfigError {
    variable: &'static str,
    #[source]
    source: BoxError,
}

impl ConfigError {
    pub(crate) fn new(variable: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            variable,
            source: source.into(),
        }
    }

    /// The environment variable holding the invalid value
    pub fn variable(&self) -> &'static str {
        self.variable
    }
}

/// An error issuing an authenticated request
#[derive(Debug, Error)]
pub enum Error {
    /// Sending a request failed, and retries were exhausted
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The authority refused to issue a token, or issued one that could not be read
    #[error("error obtaining token")]
    Grant(#[from] GrantError),
    /// The response cache key could not be derived
    #[error("error deriving cache key")]
    CacheKey(#[from] CacheKeyError),
    /// No strategy had enough information to authenticate the request
    #[error("not enough information to obtain a delegated token")]
    InsufficientAuthInfo,
    /// The request could not be built from its options
    #[error("invalid request")]
    InvalidRequest(#[source] BoxError),
}

impl Error {
    /// Whether this error arose from a transport failure
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
