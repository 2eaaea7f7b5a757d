//! Grant exchanges with an OAuth2-style token issuing authority
//!
//! This module describes *what* is sent to an authority and how its answer is
//! read. Sending is left to the caller, so that grant requests travel over the
//! same transport, and emit the same notifications, as every other request.

use thiserror::Error;

use crate::ClientIdRef;

pub mod dto;

/// A credentials source for an OAuth2 authority
pub trait CredentialsSource: serde::Serialize + Send + Sync {
    /// The client ID of the client making the request
    fn client_id(&self) -> &ClientIdRef;
    /// The grant type or flow to be performed
    fn grant_type() -> &'static str;
    /// The audience or target the issued token is scoped to
    fn audience(&self) -> &str;
    /// The key under which the issued token is cached
    fn cache_key(&self) -> String;
    /// Extracts the issued token from the authority's response
    fn issued_token(response: dto::TokenResponse) -> Option<String>;
    /// The name of the response field holding the issued token
    fn token_field() -> &'static str;
}

/// An error while attempting to request a new token from the authority
#[derive(Debug, Error)]
pub enum GrantError {
    /// The authority answered with an unsuccessful status
    #[error("error requesting token from authority ({status}): {body}")]
    ErrorWithBody {
        /// The status code returned
        status: u16,
        /// The body of the error
        body: String,
    },
    /// Unable to deserialize the token body
    #[error("error deserializing token body from authority")]
    TokenBodyError(#[from] serde_json::Error),
    /// The token body did not contain the expected token
    #[error("token body from authority did not contain an `{field}`")]
    MissingToken {
        /// The expected field
        field: &'static str,
    },
    /// Unable to serialize the grant request
    #[error("error serializing grant request")]
    RequestBody(#[source] serde_json::Error),
}

/// Reads the token issued for `R` out of an authority's response
pub fn read_token_response<R: CredentialsSource>(
    status: u16,
    body: &[u8],
) -> Result<String, GrantError> {
    if !(200..300).contains(&status) {
        return Err(GrantError::ErrorWithBody {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }

    let response: dto::TokenResponse = serde_json::from_slice(body)?;
    R::issued_token(response).ok_or(GrantError::MissingToken {
        field: R::token_field(),
    })
}
