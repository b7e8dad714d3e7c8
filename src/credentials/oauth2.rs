//! OAuth2 authorization-code credentials and tenant discovery.

use std::borrow::Cow;

use oauth2::{
    AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
};
use reqwest::{Method, StatusCode, header};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use url::Url;
use uuid::Uuid;

use super::{Authorize, Signer, expiry_from_timestamp};
use crate::dispatch::classify_failure;
use crate::endpoints::Endpoints;
use crate::error::{ApiResponse, Error, Result};
use crate::oauth::{KeyPair, OAuth2Token, OAuthClient, build_oauth_client, token_http_client};
use crate::scope::Scope;
use crate::utils::resolve_user_agent;

const NO_TENANTS: &str = "This app is not authorised to access any Xero Organisations. Did the \
                          scopes requested include access to organisation data, or has access \
                          to the organisation(s) been removed?";

time::serde::format_description!(
    connection_date,
    PrimitiveDateTime,
    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
);

/// A Xero organisation (or practice) the token has been granted access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    #[serde(default)]
    pub auth_event_id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub tenant_type: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default, with = "connection_date::option")]
    pub created_date_utc: Option<PrimitiveDateTime>,
    #[serde(default, with = "connection_date::option")]
    pub updated_date_utc: Option<PrimitiveDateTime>,
}

/// Persisted form of [`OAuth2Credentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2State {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<OAuth2Token>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(flatten)]
    pub endpoints: Endpoints,
}

/// Credentials for the OAuth2 authorization-code flow.
///
/// ```no_run
/// # async fn run() -> xero_connect::error::Result<()> {
/// use xero_connect::credentials::OAuth2Credentials;
/// use xero_connect::oauth::KeyPair;
///
/// let mut credentials = OAuth2Credentials::new(
///     KeyPair::from_env()?,
///     Some("https://example.com/oauth/xero/callback".to_owned()),
///     None,
/// );
/// let (url, _state) = credentials.generate_url()?;
/// println!("visit {url}");
/// // ... the user is redirected back to the callback ...
/// credentials
///     .verify("https://example.com/oauth/xero/callback?code=abc&state=xyz")
///     .await?;
/// credentials.set_default_tenant().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Credentials {
    state: OAuth2State,
}

impl OAuth2Credentials {
    #[must_use]
    pub fn new(key_pair: KeyPair, callback_uri: Option<String>, scope: Option<Scope>) -> Self {
        Self {
            state: OAuth2State {
                client_id: key_pair.client_id().to_owned(),
                client_secret: key_pair.client_secret().map(str::to_owned),
                callback_uri,
                auth_state: None,
                token: None,
                scope: scope.unwrap_or_default(),
                tenant_id: None,
                user_agent: None,
                endpoints: Endpoints::default(),
            },
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: OAuth2Token) -> Self {
        self.state.token = Some(token);
        self
    }

    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.state.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn with_auth_state(mut self, auth_state: impl Into<String>) -> Self {
        self.state.auth_state = Some(auth_state.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.state.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.state.endpoints = endpoints;
        self
    }

    pub fn set_tenant_id(&mut self, tenant_id: Option<String>) {
        trace!(?tenant_id, "updating tenant id");
        self.state.tenant_id = tenant_id;
    }

    #[must_use]
    pub fn token(&self) -> Option<&OAuth2Token> {
        self.state.token.as_ref()
    }

    #[must_use]
    pub fn auth_state(&self) -> Option<&str> {
        self.state.auth_state.as_deref()
    }

    #[must_use]
    pub fn callback_uri(&self) -> Option<&str> {
        self.state.callback_uri.as_deref()
    }

    fn key_pair(&self) -> KeyPair {
        KeyPair::new(self.state.client_id.clone(), self.state.client_secret.clone())
    }

    fn http_user_agent(&self) -> String {
        resolve_user_agent(self.state.user_agent.as_deref(), None)
    }

    fn oauth_client(&self) -> Result<OAuthClient> {
        let client = build_oauth_client(&self.key_pair(), &self.state.endpoints)?;
        Ok(match self.redirect_url()? {
            Some(redirect) => client.set_redirect_uri(redirect),
            None => client,
        })
    }

    fn redirect_url(&self) -> Result<Option<RedirectUrl>> {
        self.state
            .callback_uri
            .as_ref()
            .map(|uri| {
                RedirectUrl::new(uri.clone())
                    .map_err(|e| Error::Configuration(format!("invalid callback uri: {e}")))
            })
            .transpose()
    }

    /// The authorization URL the user must visit.
    ///
    /// A fresh random state is generated unless one is already set; either way it is
    /// stored for `verify` to compare against.
    pub fn generate_url(&mut self) -> Result<(Url, CsrfToken)> {
        self.authorization_url(None)
    }

    pub(crate) fn authorization_url(
        &mut self,
        challenge: Option<PkceCodeChallenge>,
    ) -> Result<(Url, CsrfToken)> {
        let client = self.oauth_client()?;
        let state = self
            .state
            .auth_state
            .clone()
            .map_or_else(CsrfToken::new_random, CsrfToken::new);
        let mut request = client
            .authorize_url(move || state)
            .add_scopes(self.state.scope.as_oauth2_scopes().iter().cloned());
        if let Some(challenge) = challenge {
            request = request.set_pkce_challenge(challenge);
        }
        let (url, csrf) = request.url();
        self.state.auth_state = Some(csrf.secret().clone());
        Ok((url, csrf))
    }

    /// Completes the flow from the full URL the user was redirected to.
    ///
    /// Every failure, local or remote, surfaces as [`Error::AccessDenied`].
    #[instrument(skip(self, callback_url))]
    pub async fn verify(&mut self, callback_url: &str) -> Result<()> {
        let url = Url::parse(callback_url)
            .map_err(|e| Error::AccessDenied(format!("invalid callback url: {e}")))?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        if let Some(error) = param("error") {
            return Err(Error::AccessDenied(error));
        }
        self.check_state(param("state").as_deref())?;
        let code = param("code")
            .ok_or_else(|| Error::AccessDenied("Missing authorization code".to_owned()))?;

        self.exchange_code(code, None)
            .await
            .map_err(|e| Error::AccessDenied(e.to_string()))?;
        debug!("oauth2 credentials verified");
        Ok(())
    }

    pub(crate) fn check_state(&self, returned: Option<&str>) -> Result<()> {
        match (&self.state.auth_state, returned) {
            (Some(expected), Some(returned)) if expected == returned => Ok(()),
            (None, _) => Ok(()),
            _ => Err(Error::AccessDenied("State Mismatch".to_owned())),
        }
    }

    pub(crate) async fn exchange_code(
        &mut self,
        code: String,
        verifier: Option<PkceCodeVerifier>,
    ) -> Result<()> {
        let client = self.oauth_client()?;
        let http = token_http_client(&self.http_user_agent())?;
        let mut request = client.exchange_code(AuthorizationCode::new(code));
        if let Some(redirect) = self.redirect_url()? {
            request = request.set_redirect_uri(Cow::Owned(redirect));
        }
        if let Some(verifier) = verifier {
            request = request.set_pkce_verifier(verifier);
        }
        let response = request.request_async(&http).await?;
        self.state.token = Some(OAuth2Token::from_response(
            &response,
            OffsetDateTime::now_utc(),
        ));
        Ok(())
    }

    /// Exchanges the refresh token for a new token and returns it.
    ///
    /// `offline_access` must have been granted for Xero to issue a refresh token.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<OAuth2Token> {
        if self.state.token.is_none() {
            return Err(Error::Credentials(
                "Cannot refresh token, no token is present.".to_owned(),
            ));
        }
        if self.state.client_secret.is_none() {
            return Err(Error::Credentials(
                "Cannot refresh token, client_secret must be supplied.".to_owned(),
            ));
        }
        self.refresh_grant().await
    }

    /// The refresh grant itself; public clients send the client id in the body.
    pub(crate) async fn refresh_grant(&mut self) -> Result<OAuth2Token> {
        let refresh_token = self
            .state
            .token
            .as_ref()
            .ok_or_else(|| {
                Error::Credentials("Cannot refresh token, no token is present.".to_owned())
            })?
            .refresh_token
            .clone()
            .ok_or_else(|| {
                Error::Credentials(
                    "Token cannot be refreshed, was `offline_access` included in scope?"
                        .to_owned(),
                )
            })?;

        let client = self.oauth_client()?;
        let http = token_http_client(&self.http_user_agent())?;
        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(&http)
            .await?;

        let mut token = OAuth2Token::from_response(&response, OffsetDateTime::now_utc());
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token);
        }
        self.state.token = Some(token.clone());
        debug!("oauth2 token refreshed");
        Ok(token)
    }

    /// Organisations this token can access, optionally limited to one authorization event.
    #[instrument(skip(self))]
    pub async fn get_tenants(&self, auth_event_id: Option<&str>) -> Result<Vec<Tenant>> {
        let mut url = self.state.endpoints.connections_url()?;
        if let Some(auth_event_id) = auth_event_id {
            url.query_pairs_mut()
                .append_pair("authEventId", auth_event_id);
        }
        let authorization = self.oauth()?.authorization(&Method::GET, &url, &[])?;

        let response = token_http_client(&self.http_user_agent())?
            .get(url)
            .header(header::AUTHORIZATION, authorization)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = ApiResponse::read(response).await?;
        debug!(status = %response.status, "connections endpoint responded");
        trace!(body = %response.text(), "connections response");

        if response.status == StatusCode::OK {
            Ok(serde_json::from_slice(&response.body)?)
        } else {
            Err(classify_failure(response))
        }
    }

    /// Selects the first tenant the token can access.
    #[instrument(skip(self))]
    pub async fn set_default_tenant(&mut self) -> Result<()> {
        let tenant = self
            .get_tenants(None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Credentials(NO_TENANTS.to_owned()))?;
        self.set_tenant_id(Some(tenant.tenant_id.to_string()));
        Ok(())
    }

    pub fn expires_at(&self) -> Result<OffsetDateTime> {
        expiry_from_timestamp(self.state.token.as_ref().and_then(|t| t.expires_at))
    }

    /// `true` once fewer than `grace` remain before the token expires.
    pub fn expired(&self, grace: Duration, now: Option<OffsetDateTime>) -> Result<bool> {
        let now = now.unwrap_or_else(OffsetDateTime::now_utc);
        Ok(self.expires_at()? - now < grace)
    }

    #[must_use]
    pub fn state(&self) -> OAuth2State {
        self.state.clone()
    }

    #[must_use]
    pub fn from_state(state: OAuth2State) -> Self {
        Self { state }
    }
}

impl Authorize for OAuth2Credentials {
    fn oauth(&self) -> Result<Signer> {
        self.state
            .token
            .as_ref()
            .map(|token| Signer::Bearer(token.access_token.clone()))
            .ok_or(Error::NotVerified)
    }

    fn requires_tenant(&self) -> bool {
        true
    }

    fn tenant_id(&self) -> Option<&str> {
        self.state.tenant_id.as_deref()
    }

    fn user_agent(&self) -> Option<&str> {
        self.state.user_agent.as_deref()
    }

    fn endpoints(&self) -> &Endpoints {
        &self.state.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn credentials() -> OAuth2Credentials {
        OAuth2Credentials::new(
            KeyPair::new("client".to_owned(), Some("secret".to_owned())),
            Some("https://example.com/callback".to_owned()),
            None,
        )
    }

    #[test]
    fn generated_url_reuses_existing_state() {
        let mut credentials = credentials().with_auth_state("fixed");
        let (url, csrf) = credentials.generate_url().unwrap();
        assert_eq!(csrf.secret(), "fixed");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("state".to_owned(), "fixed".to_owned())));
        assert!(query.contains(&("client_id".to_owned(), "client".to_owned())));
        assert!(query.contains(&(
            "scope".to_owned(),
            "offline_access accounting.transactions.read accounting.contacts.read".to_owned()
        )));
    }

    #[test]
    fn generated_url_stores_random_state() {
        let mut credentials = credentials();
        let (_, csrf) = credentials.generate_url().unwrap();
        assert_eq!(credentials.auth_state(), Some(csrf.secret().as_str()));
    }

    #[test]
    fn state_mismatch_is_access_denied() {
        let credentials = credentials().with_auth_state("expected");
        assert!(matches!(
            credentials.check_state(Some("other")),
            Err(Error::AccessDenied(msg)) if msg == "State Mismatch"
        ));
        assert!(credentials.check_state(Some("expected")).is_ok());
    }

    #[test]
    fn expiry_uses_the_grace_window() {
        let credentials = credentials().with_token(OAuth2Token {
            access_token: "a".to_owned(),
            token_type: "Bearer".to_owned(),
            refresh_token: None,
            expires_in: Some(1800),
            expires_at: Some(datetime!(2024-01-01 12:00 UTC).unix_timestamp()),
            scope: None,
            id_token: None,
        });
        let grace = Duration::seconds(30);
        assert!(!credentials
            .expired(grace, Some(datetime!(2024-01-01 11:59 UTC)))
            .unwrap());
        assert!(credentials
            .expired(grace, Some(datetime!(2024-01-01 11:59:45 UTC)))
            .unwrap());
        // exactly `grace` left is still usable
        assert!(!credentials
            .expired(grace, Some(datetime!(2024-01-01 11:59:30 UTC)))
            .unwrap());
        assert!(credentials
            .expired(grace, Some(datetime!(2024-01-01 11:59:30.5 UTC)))
            .unwrap());
    }

    #[test]
    fn tenants_parse_fractional_dates() {
        let tenants: Vec<Tenant> = serde_json::from_value(serde_json::json!([{
            "id": "e1eede29-f875-4a5d-8470-17f6a29a88b1",
            "authEventId": "d99ecdfe-391d-43d2-b834-17636ba90e8d",
            "tenantId": "70784a63-d24b-46a9-a4db-0e70a274b056",
            "tenantType": "ORGANISATION",
            "tenantName": "Maple Florists Ltd",
            "createdDateUtc": "2019-07-09T23:40:30.1833130",
            "updatedDateUtc": "2020-05-15T01:35:13"
        }]))
        .unwrap();
        assert_eq!(tenants[0].tenant_name.as_deref(), Some("Maple Florists Ltd"));
        assert_eq!(
            tenants[0].updated_date_utc,
            Some(datetime!(2020-05-15 01:35:13))
        );
        assert!(tenants[0].created_date_utc.is_some());
    }
}
