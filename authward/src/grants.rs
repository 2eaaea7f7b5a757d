//! Token grants sent over the shared transport

use std::sync::Arc;

use authward_tokens::{
    sources::oauth2::{
        dto::{ClientCredentials, ClientCredentialsWithAudience, DelegationCredentials},
        read_token_response, CredentialsSource, GrantError,
    },
    AccessToken,
};
use reqwest::{Method, Url};

use crate::{
    challenge::Challenge,
    client::Inner,
    error::Error,
    options::AuthConfig,
    transport::{Body, OutboundRequest},
};

impl Inner {
    /// The client credentials grant for `auth`, if it carries client credentials
    pub(crate) fn client_credentials(
        &self,
        auth: &AuthConfig,
    ) -> Option<(Url, ClientCredentialsWithAudience)> {
        let client_id = auth.client_id.as_ref()?;
        let client_secret = auth.client_secret.as_ref()?;

        let grant = ClientCredentialsWithAudience {
            credentials: Arc::new(ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            audience: auth
                .audience
                .clone()
                .unwrap_or_else(|| self.config.default_audience.clone()),
        };

        let token_url = auth
            .authorization_server
            .clone()
            .unwrap_or_else(|| self.config.token_url.clone());

        Some((token_url, grant))
    }

    /// The delegation grant for `auth`, if enough is known to request one
    ///
    /// Once challenged, only the target named by the challenge is used; a
    /// challenge without a target leaves nothing to delegate to. Tokens for a
    /// challenged target are cached by target alone.
    pub(crate) fn delegation(
        &self,
        auth: &AuthConfig,
        challenge: Option<&Challenge>,
    ) -> Option<(Url, DelegationCredentials)> {
        let refresh_token = auth.refresh_token.as_ref()?;

        let (target, requester) = match challenge {
            Some(challenge) => (challenge.target()?.to_owned(), None),
            None => (auth.target_id.clone()?, auth.client_id.clone()),
        };

        let grant = DelegationCredentials {
            client_id: self.config.delegation_client_id.clone(),
            target,
            refresh_token: refresh_token.clone(),
            scope: auth
                .scope
                .clone()
                .unwrap_or_else(|| self.config.default_scope.clone()),
            requester,
        };

        let token_url = auth
            .delegation_server
            .as_ref()
            .or(auth.authorization_server.as_ref())
            .unwrap_or(&self.config.delegation_url)
            .clone();

        Some((token_url, grant))
    }

    /// Obtains a token for `credentials`, from the token cache if possible
    #[tracing::instrument(
        err,
        skip(self, token_url, credentials),
        fields(
            token_url = %token_url,
            credentials.grant_type = S::grant_type(),
            credentials.client_id = %credentials.client_id(),
            credentials.audience = credentials.audience(),
        ),
    )]
    pub(crate) async fn request_token<S: CredentialsSource>(
        &self,
        token_url: &Url,
        credentials: &S,
    ) -> Result<AccessToken, Error> {
        let key = credentials.cache_key();
        if let Some(token) = self.tokens.get_token(&key).await {
            return Ok(AccessToken::from(token));
        }

        tracing::trace!("requesting token from authority");

        let body = serde_json::to_value(credentials).map_err(GrantError::RequestBody)?;
        let mut request = OutboundRequest::new(Method::POST, token_url.clone());
        request.body = Some(Body::Json(body));

        let response = self.send(request).await?;

        tracing::debug!(
            response.status = response.status().as_u16(),
            "received response from authority"
        );

        let token = read_token_response::<S>(response.status().as_u16(), response.body())?;

        tracing::info!("obtained new token from authority");
        self.tokens.set_token(&key, &token).await;

        Ok(AccessToken::from(token))
    }
}

#[cfg(test)]
mod tests {
    use authward_tokens::{ClientId, ClientSecret, RefreshToken, TargetId};

    use super::*;
    use crate::{config::AuthorizerConfig, Authorizer};

    #[derive(Debug)]
    struct Unreachable;

    #[async_trait::async_trait]
    impl crate::Transport for Unreachable {
        async fn send(
            &self,
            _: OutboundRequest,
        ) -> Result<crate::Response, crate::TransportError> {
            Err(crate::TransportError::new("unreachable"))
        }
    }

    fn authorizer() -> Authorizer {
        Authorizer::builder(Unreachable)
            .with_config(
                AuthorizerConfig::default()
                    .with_delegation_url(
                        Url::parse("https://auth.example.com/delegation").unwrap(),
                    )
                    .with_token_url(Url::parse("https://auth.example.com/token").unwrap()),
            )
            .build()
    }

    mod client_credentials {
        use super::*;

        #[test]
        fn requires_both_id_and_secret() {
            let authorizer = authorizer();
            let auth = AuthConfig::default().with_client_id("id");
            assert!(authorizer.inner.client_credentials(&auth).is_none());
        }

        #[test]
        fn defaults_audience_and_server() {
            let authorizer = authorizer();
            let auth = AuthConfig::client_credentials("id", "secret");

            let (url, grant) = authorizer.inner.client_credentials(&auth).unwrap();

            assert_eq!(url.as_str(), "https://auth.example.com/token");
            assert_eq!(grant.audience.as_str(), "https://api.cimpress.io/");
            assert_eq!(grant.cache_key(), "https://api.cimpress.io/-id");
        }

        #[test]
        fn caller_server_wins() {
            let authorizer = authorizer();
            let auth = AuthConfig::client_credentials("id", "secret")
                .with_audience("https://aud.example.com/")
                .with_authorization_server(Url::parse("https://other.example.com/t").unwrap());

            let (url, grant) = authorizer.inner.client_credentials(&auth).unwrap();

            assert_eq!(url.as_str(), "https://other.example.com/t");
            assert_eq!(grant.audience.as_str(), "https://aud.example.com/");
        }
    }

    mod delegation {
        use super::*;

        fn configured() -> AuthConfig {
            AuthConfig::delegation("12345678").with_target_id("abcd")
        }

        #[test]
        fn requires_a_refresh_token() {
            let authorizer = authorizer();
            let auth = AuthConfig::default().with_target_id("abcd");
            assert!(authorizer.inner.delegation(&auth, None).is_none());
        }

        #[test]
        fn requires_a_target() {
            let authorizer = authorizer();
            let auth = AuthConfig::delegation("12345678");
            assert!(authorizer.inner.delegation(&auth, None).is_none());
            assert!(authorizer
                .inner
                .delegation(&auth, Some(&Challenge::default()))
                .is_none());
        }

        #[test]
        fn uses_configured_defaults() {
            let authorizer = authorizer();

            let (url, grant) = authorizer.inner.delegation(&configured(), None).unwrap();

            assert_eq!(url.as_str(), "https://auth.example.com/delegation");
            assert_eq!(
                grant.client_id,
                ClientId::from_static("QkxOvNz4fWRFT6vcq79ylcIuolFz2cwN")
            );
            assert_eq!(grant.target, TargetId::from_static("abcd"));
            assert_eq!(grant.refresh_token.as_str(), "12345678");
            assert_eq!(grant.scope, "openid");
            assert_eq!(grant.cache_key(), "abcd");
        }

        #[test]
        fn configured_client_id_separates_cached_tokens() {
            let authorizer = authorizer();
            let auth = configured().with_client_id("123");

            let (_, grant) = authorizer.inner.delegation(&auth, None).unwrap();

            assert_eq!(grant.cache_key(), "abcd-123");
        }

        #[test]
        fn challenged_target_replaces_configured_target() {
            let authorizer = authorizer();
            let auth = configured().with_client_id("123").with_scope("openid email");

            let (_, grant) = authorizer
                .inner
                .delegation(&auth, Some(&Challenge::for_target("efgh")))
                .unwrap();

            assert_eq!(grant.target.as_str(), "efgh");
            assert_eq!(grant.scope, "openid email");
            assert_eq!(grant.cache_key(), "efgh");
        }

        #[test]
        fn challenge_without_a_target_ignores_the_configured_target() {
            let authorizer = authorizer();
            let auth = configured().with_client_id("123");

            assert!(authorizer
                .inner
                .delegation(&auth, Some(&Challenge::default()))
                .is_none());
        }

        #[test]
        fn delegation_server_is_preferred_over_authorization_server() {
            let authorizer = authorizer();
            let auth = configured()
                .with_authorization_server(Url::parse("https://a.example.com/").unwrap());

            let (url, _) = authorizer.inner.delegation(&auth, None).unwrap();
            assert_eq!(url.as_str(), "https://a.example.com/");

            let auth = auth.with_delegation_server(Url::parse("https://d.example.com/").unwrap());
            let (url, _) = authorizer.inner.delegation(&auth, None).unwrap();
            assert_eq!(url.as_str(), "https://d.example.com/");
        }
    }

    #[tokio::test]
    async fn grant_transport_failures_are_transport_errors() {
        let authorizer = authorizer();
        let (url, grant) = authorizer
            .inner
            .client_credentials(&AuthConfig::client_credentials(
                ClientId::from_static("id"),
                ClientSecret::from_static("secret"),
            ))
            .unwrap();

        let err = authorizer.inner.request_token(&url, &grant).await.unwrap_err();

        assert!(err.is_transport());
    }

    #[test]
    fn refresh_token_is_kept_secret_in_debug_output() {
        let auth = AuthConfig::delegation(RefreshToken::from_static("12345678"));
        assert!(!format!("{:?}", auth).contains("12345678"));
    }
}
