//! Choosing how to authenticate a call
//!
//! Authentication is attempted with one strategy at a time. Each attempt
//! produces an [`Outcome`], and [`transition`] decides from the strategy and
//! its outcome whether the call is settled, should be retried, has failed, or
//! moves on to another strategy:
//!
//! ```text
//! PassedToken ──no bearer──▶ ClientCredentials ──no credentials──▶ Delegation
//!                                   │                                  │
//!                                  401                        not enough information
//!                                   │                                  │
//!                                   ▼                                  ▼
//!                        Delegation (challenged) ◀────401──── Unauthenticated
//! ```
//!
//! A challenged delegation that still lacks information fails the call, so
//! at most one unauthenticated probe is made per attempt.

use authward_tokens::AccessTokenRef;
use bytes::{BufMut, BytesMut};
use reqwest::{
    header::{self, HeaderValue},
    StatusCode, Url,
};

use crate::{
    challenge::Challenge,
    client::Inner,
    error::{Error, TransportError},
    options::RequestOptions,
    transport::{OutboundRequest, Response},
};

/// A way of authenticating a call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Use the bearer token supplied by the caller
    PassedToken,
    /// Obtain a token with a client credentials grant
    ClientCredentials,
    /// Obtain a delegated token with a refresh token
    Delegation {
        /// The challenge that led here, if any
        challenge: Option<Challenge>,
    },
    /// Send the call without credentials to discover what it requires
    Unauthenticated,
}

/// What came of attempting a strategy
#[derive(Debug)]
pub enum Outcome {
    /// The call was answered
    Responded(Response),
    /// The strategy lacked the information it needs
    InsufficientInfo,
    /// The attempt failed
    Failed(Error),
}

/// What to do after a strategy has been attempted
#[derive(Debug)]
pub enum Transition {
    /// Attempt another strategy
    Next(Strategy),
    /// The call is complete
    Settled(Response),
    /// Sending failed; the call may be retried
    Retry(TransportError),
    /// The call failed and must not be retried
    Fail(Error),
}

/// Decides what follows `outcome` from `strategy`
pub fn transition(strategy: &Strategy, outcome: Outcome) -> Transition {
    match (strategy, outcome) {
        (_, Outcome::Failed(Error::Transport(error))) => Transition::Retry(error),
        (_, Outcome::Failed(error)) => Transition::Fail(error),

        (Strategy::PassedToken, Outcome::InsufficientInfo) => {
            Transition::Next(Strategy::ClientCredentials)
        }
        (Strategy::ClientCredentials, Outcome::InsufficientInfo) => {
            Transition::Next(Strategy::Delegation { challenge: None })
        }
        (Strategy::Delegation { challenge: None }, Outcome::InsufficientInfo) => {
            Transition::Next(Strategy::Unauthenticated)
        }
        (Strategy::Delegation { challenge: Some(_) }, Outcome::InsufficientInfo)
        | (Strategy::Unauthenticated, Outcome::InsufficientInfo) => {
            Transition::Fail(Error::InsufficientAuthInfo)
        }

        (
            Strategy::ClientCredentials | Strategy::Unauthenticated,
            Outcome::Responded(response),
        ) if response.status() == StatusCode::UNAUTHORIZED => {
            Transition::Next(Strategy::Delegation {
                challenge: Some(Challenge::from_response(&response)),
            })
        }
        (_, Outcome::Responded(response)) => Transition::Settled(response),
    }
}

/// How a single attempt at a call ended
#[derive(Debug)]
pub(crate) enum Resolved {
    Response(Response),
    Retry(TransportError),
}

impl Inner {
    /// Runs the strategies for one attempt at `options`
    pub(crate) async fn resolve(&self, options: &RequestOptions) -> Result<Resolved, Error> {
        let mut strategy = Strategy::PassedToken;
        loop {
            let outcome = self.attempt(&strategy, options).await;
            match transition(&strategy, outcome) {
                Transition::Next(next) => {
                    tracing::trace!(from = ?strategy, to = ?next, "changing strategy");
                    strategy = next;
                }
                Transition::Settled(response) => return Ok(Resolved::Response(response)),
                Transition::Retry(error) => return Ok(Resolved::Retry(error)),
                Transition::Fail(error) => return Err(error),
            }
        }
    }

    async fn attempt(&self, strategy: &Strategy, options: &RequestOptions) -> Outcome {
        match strategy {
            Strategy::PassedToken => match &options.auth.bearer {
                Some(_) => self.authenticated(options).await,
                None => Outcome::InsufficientInfo,
            },
            Strategy::ClientCredentials => match self.client_credentials(&options.auth) {
                Some((token_url, grant)) => {
                    match self.request_token(&token_url, &grant).await {
                        Ok(token) => self.authenticated(&options.authorized_with(token)).await,
                        Err(error) => Outcome::Failed(error),
                    }
                }
                None => Outcome::InsufficientInfo,
            },
            Strategy::Delegation { challenge } => {
                match self.delegation(&options.auth, challenge.as_ref()) {
                    Some((token_url, grant)) => {
                        match self.request_token(&token_url, &grant).await {
                            Ok(token) => {
                                self.authenticated(&options.authorized_with(token)).await
                            }
                            Err(error) => Outcome::Failed(error),
                        }
                    }
                    None => {
                        tracing::debug!(
                            challenged = challenge.is_some(),
                            "not enough information for delegation"
                        );
                        Outcome::InsufficientInfo
                    }
                }
            }
            Strategy::Unauthenticated => self.unauthenticated(options).await,
        }
    }

    /// Sends `options` with its bearer token, consulting the response cache
    async fn authenticated(&self, options: &RequestOptions) -> Outcome {
        match self.responses.check(options).await {
            Ok(Some(response)) => return Outcome::Responded(response),
            Ok(None) => {}
            Err(error) => return Outcome::Failed(error.into()),
        }

        let request = match build_request(options, options.auth.bearer.as_deref()) {
            Ok(request) => request,
            Err(error) => return Outcome::Failed(error),
        };

        let response = match self.send(request).await {
            Ok(response) => response,
            Err(error) => return Outcome::Failed(error.into()),
        };

        if let Err(error) = self.responses.save(options, &response).await {
            return Outcome::Failed(error.into());
        }

        Outcome::Responded(response)
    }

    /// Sends `options` without resolved credentials and without caching
    async fn unauthenticated(&self, options: &RequestOptions) -> Outcome {
        tracing::debug!("probing without credentials");

        let request = match build_request(options, None) {
            Ok(request) => request,
            Err(error) => return Outcome::Failed(error),
        };

        match self.send(request).await {
            Ok(response) => Outcome::Responded(response),
            Err(error) => Outcome::Failed(error.into()),
        }
    }
}

fn build_request(
    options: &RequestOptions,
    bearer: Option<&AccessTokenRef>,
) -> Result<OutboundRequest, Error> {
    let url = Url::parse(&options.uri).map_err(|err| Error::InvalidRequest(err.into()))?;

    let mut request = OutboundRequest::new(options.method.clone(), url);
    request.headers = options.headers.clone();
    request.body = options.body.clone();

    if let Some(token) = bearer {
        request
            .headers
            .insert(header::AUTHORIZATION, bearer_header(token)?);
    }

    Ok(request)
}

fn bearer_header(token: &AccessTokenRef) -> Result<HeaderValue, Error> {
    let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(token.as_str().as_bytes());
    let mut value = HeaderValue::from_maybe_shared(header_value.freeze())
        .map_err(|err| Error::InvalidRequest(err.into()))?;
    value.set_sensitive(true);
    Ok(value)
}
