//! A client bound to one set of service credentials

use aliri::jwt;
use authward_tokens::{AccessToken, ClientId, ClientSecret, RefreshToken};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Method,
};

use crate::{
    client::Authorizer,
    error::Result,
    options::{AuthConfig, KeyGen, RequestOptions},
    transport::{Body, Response},
};

const SERVICE_TIMES_TO_RETRY: u32 = 2;

/// The credentials a service calls others with
#[derive(Clone, Debug, Default)]
pub struct ServiceCredentials {
    /// The service's client ID
    pub client_id: Option<ClientId>,
    /// The service's client secret
    pub client_secret: Option<ClientSecret>,
    /// A refresh token for delegation
    pub refresh_token: Option<RefreshToken>,
    /// The resource server tokens are requested for
    pub audience: Option<jwt::Audience>,
    /// A custom response cache key
    pub key_gen: Option<KeyGen>,
}

/// Issues calls on behalf of a single service
///
/// Every call is sent as JSON unless another content type is given, and is
/// retried at most twice.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    authorizer: Authorizer,
    credentials: ServiceCredentials,
}

impl ServiceClient {
    /// Constructs a client issuing calls through `authorizer`
    pub fn new(authorizer: Authorizer, credentials: ServiceCredentials) -> Self {
        Self {
            authorizer,
            credentials,
        }
    }

    /// Issues a call
    ///
    /// When `access_token` is given, it is used in preference to obtaining a
    /// token with the service's own credentials.
    pub async fn call(
        &self,
        method: Method,
        url: impl Into<String>,
        body: Option<Body>,
        headers: Option<HeaderMap>,
        access_token: Option<AccessToken>,
    ) -> Result<Response> {
        self.authorizer
            .issue(self.options(method, url.into(), body, headers, access_token))
            .await
    }

    fn options(
        &self,
        method: Method,
        url: String,
        body: Option<Body>,
        headers: Option<HeaderMap>,
        access_token: Option<AccessToken>,
    ) -> RequestOptions {
        let mut headers = headers.unwrap_or_default();
        headers
            .entry(header::CONTENT_TYPE)
            .or_insert_with(|| HeaderValue::from_static("application/json"));

        let auth = AuthConfig {
            bearer: access_token,
            client_id: self.credentials.client_id.clone(),
            client_secret: self.credentials.client_secret.clone(),
            refresh_token: self.credentials.refresh_token.clone(),
            audience: self.credentials.audience.clone(),
            ..AuthConfig::default()
        };

        let mut options = RequestOptions::new(url)
            .with_method(method)
            .with_headers(headers)
            .with_auth(auth)
            .with_times_to_retry(SERVICE_TIMES_TO_RETRY);
        options.body = body;
        options.key_gen = self.credentials.key_gen.clone();
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Unused;

    #[async_trait::async_trait]
    impl crate::Transport for Unused {
        async fn send(
            &self,
            _: crate::OutboundRequest,
        ) -> Result<Response, crate::TransportError> {
            Err(crate::TransportError::new("unused"))
        }
    }

    fn client() -> ServiceClient {
        ServiceClient::new(
            Authorizer::new(Unused),
            ServiceCredentials {
                client_id: Some(ClientId::from_static("id")),
                client_secret: Some(ClientSecret::from_static("secret")),
                ..ServiceCredentials::default()
            },
        )
    }

    #[test]
    fn content_type_defaults_to_json() {
        let options =
            client().options(Method::GET, "https://a.example.com/".into(), None, None, None);

        assert_eq!(
            options.headers.get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(options.times_to_retry(), Some(2));
        assert!(options.auth.bearer.is_none());
        assert_eq!(
            options.auth.client_id.as_ref().map(|c| c.as_str()),
            Some("id")
        );
    }

    #[test]
    fn caller_content_type_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));

        let options = client().options(
            Method::POST,
            "https://a.example.com/".into(),
            None,
            Some(headers),
            None,
        );

        assert_eq!(options.headers.get(header::CONTENT_TYPE).unwrap(), "text/csv");
    }

    #[test]
    fn access_token_becomes_the_bearer() {
        let options = client().options(
            Method::GET,
            "https://a.example.com/".into(),
            None,
            None,
            Some(AccessToken::from_static("1234")),
        );

        assert_eq!(
            options.auth.bearer.as_ref().map(|t| t.as_str()),
            Some("1234")
        );
    }
}
