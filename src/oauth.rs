use std::time::Duration;

use oauth2::{
    AuthUrl, EndpointNotSet, EndpointSet, RefreshToken, StandardRevocableToken, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
};
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::endpoints::Endpoints;
use crate::error::{Error, Result};

/// Stores the OAuth 2 client ID and client secret.
#[derive(Debug, Clone)]
pub struct KeyPair(
    pub(crate) oauth2::ClientId,
    pub(crate) Option<oauth2::ClientSecret>,
);

impl KeyPair {
    /// Creates a new `KeyPair` from the provided `client_id` and `client_secret` strings.
    #[must_use]
    pub fn new(client_id: String, client_secret: Option<String>) -> Self {
        Self(
            oauth2::ClientId::new(client_id),
            client_secret.map(oauth2::ClientSecret::new),
        )
    }

    /// Creates a new `KeyPair` from `XERO_CLIENT_ID` and `XERO_CLIENT_SECRET` environment variables.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("XERO_CLIENT_ID")
            .map_err(|_| Error::Configuration("XERO_CLIENT_ID not set".to_owned()))?;
        Ok(Self::new(client_id, std::env::var("XERO_CLIENT_SECRET").ok()))
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.1.as_ref().map(|s| s.secret().as_str())
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.client_id() == other.client_id() && self.client_secret() == other.client_secret()
    }
}

pub type OAuthClient = oauth2::Client<
    BasicErrorResponse,
    TokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Builds the `oauth2` client for the identity server in `endpoints`.
///
/// Without a secret the client id travels in the request body, which is what
/// public (PKCE) clients need.
#[instrument(skip(key_pair))]
pub(crate) fn build_oauth_client(key_pair: &KeyPair, endpoints: &Endpoints) -> Result<OAuthClient> {
    let client = oauth2::Client::new(key_pair.0.clone())
        .set_auth_uri(AuthUrl::from_url(endpoints.authorize_url()?))
        .set_token_uri(TokenUrl::from_url(endpoints.token_url()?));

    Ok(match &key_pair.1 {
        Some(secret) => client.set_client_secret(secret.clone()),
        None => client,
    })
}

/// HTTP client for token endpoint calls. Redirects are not followed.
pub(crate) fn token_http_client(user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(Error::Request)
}

/// Token endpoint response. Xero adds an `id_token` when `openid` was requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    access_token: oauth2::AccessToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(deserialize_with = "token_type_case_insensitive")]
    token_type: BasicTokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

fn token_type_case_insensitive<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BasicTokenType, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(match raw.to_ascii_lowercase().as_str() {
        "bearer" => BasicTokenType::Bearer,
        "mac" => BasicTokenType::Mac,
        _ => BasicTokenType::Extension(raw),
    })
}

impl oauth2::TokenResponse for TokenResponse {
    type TokenType = BasicTokenType;

    fn access_token(&self) -> &oauth2::AccessToken {
        &self.access_token
    }

    fn token_type(&self) -> &BasicTokenType {
        &self.token_type
    }

    fn expires_in(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    fn scopes(&self) -> Option<&Vec<oauth2::Scope>> {
        None
    }
}

/// Persisted OAuth2 token material.
///
/// `expires_at` is an absolute unix timestamp, filled in on receipt when the
/// server only reports `expires_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Token {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

fn bearer() -> String {
    "Bearer".to_owned()
}

impl OAuth2Token {
    pub(crate) fn from_response(response: &TokenResponse, received_at: OffsetDateTime) -> Self {
        let expires_at = response.expires_in.map(|secs| {
            received_at.unix_timestamp() + i64::try_from(secs).unwrap_or(i64::MAX / 2)
        });
        Self {
            access_token: response.access_token.secret().clone(),
            token_type: match &response.token_type {
                BasicTokenType::Bearer => bearer(),
                other => other.as_ref().to_owned(),
            },
            refresh_token: response.refresh_token.as_ref().map(|t| t.secret().clone()),
            expires_in: response.expires_in,
            expires_at,
            scope: response
                .scope
                .as_deref()
                .map(|s| s.split_whitespace().map(str::to_owned).collect()),
            id_token: response.id_token.clone(),
        }
    }

    /// Absolute expiry, if the token carries one.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn token_response_accepts_capitalised_bearer() {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "abc",
            "token_type": "Bearer",
            "expires_in": 1800,
            "refresh_token": "def",
            "scope": "offline_access openid"
        }))
        .unwrap();
        let token = OAuth2Token::from_response(&response, datetime!(2024-01-01 0:00 UTC));
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_at, Some(1_704_067_200 + 1800));
        assert_eq!(token.refresh_token.as_deref(), Some("def"));
        assert_eq!(
            token.scope,
            Some(vec!["offline_access".to_owned(), "openid".to_owned()])
        );
    }
}
