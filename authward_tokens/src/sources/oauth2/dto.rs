//! DTOs for interacting with OAuth2 token issuing servers

use std::sync::Arc;

use aliri::jwt;
use serde::{Deserialize, Serialize, Serializer};

use crate::{AccessToken, ClientId, ClientIdRef, ClientSecret, IdToken, RefreshToken, TargetId};

/// Grant type sent when exchanging client credentials
pub const CLIENT_CREDENTIALS_GRANT_TYPE: &str = "client_credentials";

/// Grant type sent when exchanging a refresh token for a delegated token
pub const DELEGATION_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Client credentials
#[derive(Debug, Serialize)]
pub struct ClientCredentials {
    /// The client ID
    pub client_id: ClientId,

    /// The client secret
    pub client_secret: ClientSecret,
}

/// Client credentials with an audience
#[derive(Debug)]
pub struct ClientCredentialsWithAudience {
    /// The client credentials
    pub credentials: Arc<ClientCredentials>,

    /// The target audience
    pub audience: jwt::Audience,
}

impl Serialize for ClientCredentialsWithAudience {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("ClientCredentialsWithAudience", 4)?;
        ser.serialize_field("audience", &self.audience)?;
        ser.serialize_field("client_id", &self.credentials.client_id)?;
        ser.serialize_field("client_secret", &self.credentials.client_secret)?;
        ser.serialize_field("grant_type", CLIENT_CREDENTIALS_GRANT_TYPE)?;
        ser.end()
    }
}

impl super::CredentialsSource for ClientCredentialsWithAudience {
    fn client_id(&self) -> &ClientIdRef {
        &self.credentials.client_id
    }
    fn grant_type() -> &'static str {
        CLIENT_CREDENTIALS_GRANT_TYPE
    }
    fn audience(&self) -> &str {
        self.audience.as_str()
    }
    fn cache_key(&self) -> String {
        format!("{}-{}", self.audience, self.credentials.client_id)
    }
    fn issued_token(response: TokenResponse) -> Option<String> {
        response.access_token.map(|t| t.as_str().to_owned())
    }
    fn token_field() -> &'static str {
        "access_token"
    }
}

/// Credentials for exchanging a refresh token for a token scoped to a target service
#[derive(Debug)]
pub struct DelegationCredentials {
    /// The client ID the delegation grant is issued under
    pub client_id: ClientId,

    /// The service the delegated token is intended for
    pub target: TargetId,

    /// The refresh token being exchanged
    pub refresh_token: RefreshToken,

    /// The requested scope
    pub scope: String,

    /// The client on whose behalf the token is requested, if known
    ///
    /// Only used to separate cached tokens; never sent to the authority.
    pub requester: Option<ClientId>,
}

impl Serialize for DelegationCredentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("DelegationCredentials", 6)?;
        ser.serialize_field("client_id", &self.client_id)?;
        ser.serialize_field("target", &self.target)?;
        ser.serialize_field("refresh_token", &self.refresh_token)?;
        ser.serialize_field("grant_type", DELEGATION_GRANT_TYPE)?;
        ser.serialize_field("api_type", "app")?;
        ser.serialize_field("scope", &self.scope)?;
        ser.end()
    }
}

impl super::CredentialsSource for DelegationCredentials {
    fn client_id(&self) -> &ClientIdRef {
        &self.client_id
    }
    fn grant_type() -> &'static str {
        DELEGATION_GRANT_TYPE
    }
    fn audience(&self) -> &str {
        self.target.as_str()
    }
    fn cache_key(&self) -> String {
        match &self.requester {
            Some(requester) => format!("{}-{}", self.target, requester),
            None => self.target.to_string(),
        }
    }
    fn issued_token(response: TokenResponse) -> Option<String> {
        response.id_token.map(|t| t.as_str().to_owned())
    }
    fn token_field() -> &'static str {
        "id_token"
    }
}

/// The body returned by a token issuing server
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The access token issued by a client credentials grant
    #[serde(default)]
    pub access_token: Option<AccessToken>,

    /// The ID token issued by a delegation grant
    #[serde(default)]
    pub id_token: Option<IdToken>,
}
