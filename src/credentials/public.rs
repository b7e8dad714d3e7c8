//! Three-legged OAuth1 with HMAC-SHA1 signing ("public" applications).

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use url::Url;

use super::oauth1::{self, OAuth1Signer, SignatureMethod, TokenGrant};
use super::{Authorize, Signer, expired_with_grace, expiry_from_timestamp};
use crate::endpoints::Endpoints;
use crate::error::{Error, Result};
use crate::utils::resolve_user_agent;

/// Persisted form of [`PublicCredentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicState {
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_uri: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token_secret: Option<String>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_expires_at: Option<i64>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_authorization_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(flatten)]
    pub endpoints: Endpoints,
}

impl PublicState {
    pub(crate) fn new(
        consumer_key: String,
        consumer_secret: String,
        callback_uri: Option<String>,
        scope: Option<String>,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            consumer_key,
            consumer_secret,
            callback_uri,
            verified: false,
            oauth_token: None,
            oauth_token_secret: None,
            oauth_expires_at: None,
            oauth_authorization_expires_at: None,
            scope,
            user_agent: None,
            endpoints,
        }
    }

    /// Signer bound to the current token, if there is one.
    pub(crate) fn signer(&self, method: SignatureMethod) -> OAuth1Signer {
        let signer = match method {
            SignatureMethod::HmacSha1 => {
                OAuth1Signer::hmac(&self.consumer_key, &self.consumer_secret)
            }
            SignatureMethod::RsaSha1(key) => OAuth1Signer::rsa(&self.consumer_key, key)
                .with_consumer_secret(&self.consumer_secret),
        };
        match &self.oauth_token {
            Some(token) => signer.with_token(token, self.oauth_token_secret.clone()),
            None => signer,
        }
    }

    pub(crate) fn user_agent(&self) -> String {
        resolve_user_agent(self.user_agent.as_deref(), None)
    }

    pub(crate) fn apply(&mut self, grant: TokenGrant) {
        self.oauth_token = Some(grant.token);
        self.oauth_token_secret = Some(grant.token_secret);
        self.oauth_expires_at = Some(grant.expires_at);
        self.oauth_authorization_expires_at = Some(grant.authorization_expires_at);
    }

    /// Fetches a provisional request token.
    pub(crate) async fn request_token(&mut self, method: SignatureMethod) -> Result<TokenGrant> {
        let signer = self.signer(method).with_callback(self.callback_uri.clone());
        let grant = oauth1::exchange(
            &signer,
            self.endpoints.request_token_url()?,
            &self.user_agent(),
        )
        .await?;
        self.verified = false;
        self.apply(grant.clone());
        Ok(grant)
    }

    /// Trades the provisional token and the user's verifier for an access token.
    pub(crate) async fn access_token(
        &mut self,
        method: SignatureMethod,
        verifier: &str,
    ) -> Result<TokenGrant> {
        if self.oauth_token.is_none() {
            return Err(Error::Credentials(
                "Cannot verify credentials without a request token; call initiate first"
                    .to_owned(),
            ));
        }
        let signer = self.signer(method).with_verifier(verifier);
        let grant = oauth1::exchange(
            &signer,
            self.endpoints.access_token_url()?,
            &self.user_agent(),
        )
        .await?;
        self.apply(grant.clone());
        self.verified = true;
        Ok(grant)
    }

    pub(crate) fn authorize_url(&self) -> Result<Url> {
        let token = self.oauth_token.as_deref().ok_or_else(|| {
            Error::Credentials("No request token is present; call initiate first".to_owned())
        })?;
        let mut url = self.endpoints.oauth1_authorize_url()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("oauth_token", token);
            if let Some(scope) = &self.scope {
                query.append_pair("scope", scope);
            }
        }
        Ok(url)
    }

    pub(crate) fn expired(&self, grace: Duration, now: Option<OffsetDateTime>) -> Result<bool> {
        let expires_at = expiry_from_timestamp(self.oauth_expires_at)?;
        Ok(expired_with_grace(
            expires_at,
            grace,
            now.unwrap_or_else(OffsetDateTime::now_utc),
        ))
    }

    pub(crate) fn oauth(&self, method: SignatureMethod) -> Result<Signer> {
        if !self.verified || self.oauth_token.is_none() {
            return Err(Error::NotVerified);
        }
        Ok(Signer::OAuth1(self.signer(method)))
    }
}

/// Credentials for a public Xero application.
///
/// ```no_run
/// # async fn run() -> xero_connect::error::Result<()> {
/// use xero_connect::credentials::PublicCredentials;
///
/// let mut credentials =
///     PublicCredentials::initiate("key", "secret", None, None, None).await?;
/// println!("visit {}", credentials.url()?);
/// credentials.verify("1234567").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicCredentials {
    state: PublicState,
}

impl PublicCredentials {
    /// Obtains a request token, returning unverified credentials.
    #[instrument(skip(consumer_secret, endpoints))]
    pub async fn initiate(
        consumer_key: impl Into<String> + std::fmt::Debug,
        consumer_secret: impl Into<String>,
        callback_uri: Option<String>,
        scope: Option<String>,
        endpoints: Option<Endpoints>,
    ) -> Result<Self> {
        let mut state = PublicState::new(
            consumer_key.into(),
            consumer_secret.into(),
            callback_uri,
            scope,
            endpoints.unwrap_or_default(),
        );
        state.request_token(SignatureMethod::HmacSha1).await?;
        debug!("public credentials initiated");
        Ok(Self { state })
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.state.user_agent = Some(user_agent.into());
        self
    }

    /// The URL the user visits to authorize the request token.
    pub fn url(&self) -> Result<Url> {
        self.state.authorize_url()
    }

    #[instrument(skip(self, verifier))]
    pub async fn verify(&mut self, verifier: &str) -> Result<()> {
        self.state
            .access_token(SignatureMethod::HmacSha1, verifier)
            .await?;
        debug!("public credentials verified");
        Ok(())
    }

    #[must_use]
    pub fn verified(&self) -> bool {
        self.state.verified
    }

    pub fn expired(&self, grace: Duration, now: Option<OffsetDateTime>) -> Result<bool> {
        self.state.expired(grace, now)
    }

    #[must_use]
    pub fn state(&self) -> PublicState {
        self.state.clone()
    }

    #[must_use]
    pub fn from_state(state: PublicState) -> Self {
        Self { state }
    }
}

impl Authorize for PublicCredentials {
    fn oauth(&self) -> Result<Signer> {
        self.state.oauth(SignatureMethod::HmacSha1)
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

    fn state() -> PublicState {
        let mut state = PublicState::new(
            "key".to_owned(),
            "secret".to_owned(),
            Some("https://example.com/cb".to_owned()),
            Some("payroll.employees".to_owned()),
            Endpoints::default(),
        );
        state.oauth_token = Some("token".to_owned());
        state.oauth_token_secret = Some("token-secret".to_owned());
        state
    }

    #[test]
    fn authorize_url_carries_token_and_scope() {
        let url = state().authorize_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.xero.com/oauth/Authorize?oauth_token=token&scope=payroll.employees"
        );
    }

    #[test]
    fn unverified_credentials_do_not_sign() {
        let credentials = PublicCredentials::from_state(state());
        assert!(matches!(credentials.oauth(), Err(Error::NotVerified)));
    }

    #[test]
    fn state_serializes_flat() {
        let mut state = state();
        state.verified = true;
        state.oauth_expires_at = Some(1_700_000_000);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["oauth_expires_at"], 1_700_000_000);
        assert!(json.get("api_url").is_none());
        assert!(json.get("user_agent").is_none());
        let restored: PublicState = serde_json::from_value(json).unwrap();
        assert_eq!(restored, state);
    }
}
