//! Configuration shared by every call made through an authorizer

use std::{env, time::Duration};

use aliri::jwt;
use aliri_clock::DurationSecs;
use authward_tokens::{backoff::ErrorBackoffConfig, ClientId};
use reqwest::{header::HeaderMap, Url};

use crate::error::ConfigError;

const DEFAULT_TOKEN_URL: &str = "https://cimpress.auth0.com/oauth/token";
const DEFAULT_DELEGATION_URL: &str = "https://cimpress.auth0.com/delegation";
const DEFAULT_AUDIENCE: &str = "https://api.cimpress.io/";
const DEFAULT_DELEGATION_CLIENT_ID: &str = "QkxOvNz4fWRFT6vcq79ylcIuolFz2cwN";
const DEFAULT_SCOPE: &str = "openid";

const TOKEN_URL_VAR: &str = "AUTHWARD_TOKEN_URL";
const DELEGATION_URL_VAR: &str = "AUTHWARD_DELEGATION_URL";
const AUDIENCE_VAR: &str = "AUTHWARD_AUDIENCE";
const DELEGATION_CLIENT_ID_VAR: &str = "AUTHWARD_DELEGATION_CLIENT_ID";
const SCOPE_VAR: &str = "AUTHWARD_SCOPE";

/// Settings applied to every call
#[derive(Clone, Debug)]
pub struct AuthorizerConfig {
    /// Where client credentials grants are sent unless a call says otherwise
    pub token_url: Url,
    /// Where delegation grants are sent unless a call says otherwise
    pub delegation_url: Url,
    /// The audience requested when a call does not name one
    pub default_audience: jwt::Audience,
    /// The client ID delegation grants are issued under
    pub delegation_client_id: ClientId,
    /// The scope requested with a delegation grant when a call does not name one
    pub default_scope: String,
    /// Delays between retries
    pub backoff: ErrorBackoffConfig,
    /// How long a response is cached when caching is forced without a `max-age`
    pub cache_all_ttl: DurationSecs,
    /// Headers added to every call that does not already set them
    pub default_headers: HeaderMap,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            token_url: Url::parse(DEFAULT_TOKEN_URL).expect("valid default token URL"),
            delegation_url: Url::parse(DEFAULT_DELEGATION_URL)
                .expect("valid default delegation URL"),
            default_audience: jwt::Audience::from_static(DEFAULT_AUDIENCE),
            delegation_client_id: ClientId::from_static(DEFAULT_DELEGATION_CLIENT_ID),
            default_scope: DEFAULT_SCOPE.to_owned(),
            backoff: ErrorBackoffConfig::default(),
            cache_all_ttl: DurationSecs(60),
            default_headers: HeaderMap::new(),
        }
    }
}

impl AuthorizerConfig {
    /// Reads the configuration from the environment
    ///
    /// Unset variables fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(TOKEN_URL_VAR) {
            config.token_url =
                Url::parse(&url).map_err(|err| ConfigError::new(TOKEN_URL_VAR, err))?;
        }

        if let Some(url) = lookup(DELEGATION_URL_VAR) {
            config.delegation_url =
                Url::parse(&url).map_err(|err| ConfigError::new(DELEGATION_URL_VAR, err))?;
        }

        if let Some(audience) = lookup(AUDIENCE_VAR) {
            config.default_audience = audience.into();
        }

        if let Some(client_id) = lookup(DELEGATION_CLIENT_ID_VAR) {
            config.delegation_client_id = client_id.into();
        }

        if let Some(scope) = lookup(SCOPE_VAR) {
            config.default_scope = scope;
        }

        Ok(config)
    }

    /// Sets the token URL
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Sets the delegation URL
    pub fn with_delegation_url(mut self, url: Url) -> Self {
        self.delegation_url = url;
        self
    }

    /// Sets the default audience
    pub fn with_default_audience(mut self, audience: impl Into<jwt::Audience>) -> Self {
        self.default_audience = audience.into();
        self
    }

    /// Sets the client ID delegation grants are issued under
    pub fn with_delegation_client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.delegation_client_id = client_id.into();
        self
    }

    /// Sets the default delegation scope
    pub fn with_default_scope(mut self, scope: impl Into<String>) -> Self {
        self.default_scope = scope.into();
        self
    }

    /// Sets the retry backoff
    pub fn with_backoff(mut self, backoff: ErrorBackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets how long forcibly cached responses live without a `max-age`
    pub fn with_cache_all_ttl(mut self, ttl: Duration) -> Self {
        self.cache_all_ttl = DurationSecs(ttl.as_secs());
        self
    }

    /// Sets headers added to every call
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn unset_variables_use_defaults() {
        let config = AuthorizerConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.token_url.as_str(), DEFAULT_TOKEN_URL);
        assert_eq!(config.delegation_url.as_str(), DEFAULT_DELEGATION_URL);
        assert_eq!(config.default_audience.as_str(), "https://api.cimpress.io/");
        assert_eq!(config.default_scope, "openid");
        assert_eq!(config.cache_all_ttl, DurationSecs(60));
    }

    #[test]
    fn variables_override_defaults() {
        let config = AuthorizerConfig::from_lookup(lookup(&[
            (TOKEN_URL_VAR, "https://auth.example.com/token"),
            (AUDIENCE_VAR, "https://api.example.com/"),
            (DELEGATION_CLIENT_ID_VAR, "delegator"),
            (SCOPE_VAR, "openid profile"),
        ]))
        .unwrap();

        assert_eq!(config.token_url.as_str(), "https://auth.example.com/token");
        assert_eq!(config.default_audience.as_str(), "https://api.example.com/");
        assert_eq!(config.delegation_client_id.as_str(), "delegator");
        assert_eq!(config.default_scope, "openid profile");
    }

    #[test]
    fn invalid_url_names_the_variable() {
        let err = AuthorizerConfig::from_lookup(lookup(&[(DELEGATION_URL_VAR, "not a url")]))
            .unwrap_err();

        assert_eq!(err.variable(), DELEGATION_URL_VAR);
    }
}
