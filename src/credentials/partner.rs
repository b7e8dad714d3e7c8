//! Three-legged OAuth1 with RSA-SHA1 signing and session-handle refresh
//! ("partner" applications).

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use url::Url;

use super::oauth1::{self, RsaKey, SignatureMethod};
use super::public::PublicState;
use super::{Authorize, Signer};
use crate::endpoints::Endpoints;
use crate::error::{Error, Result};

/// Persisted form of [`PartnerCredentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerState {
    #[serde(flatten)]
    pub public: PublicState,
    /// PEM encoded private key.
    pub rsa_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_session_handle: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartnerCredentials {
    state: PartnerState,
    key: RsaKey,
}

impl PartnerCredentials {
    /// Obtains a request token signed with `rsa_key`, returning unverified credentials.
    #[instrument(skip(consumer_secret, rsa_key, endpoints))]
    pub async fn initiate(
        consumer_key: impl Into<String> + std::fmt::Debug,
        consumer_secret: impl Into<String>,
        rsa_key: &str,
        callback_uri: Option<String>,
        scope: Option<String>,
        endpoints: Option<Endpoints>,
    ) -> Result<Self> {
        let key = RsaKey::from_pem(rsa_key)?;
        let mut credentials = Self {
            state: PartnerState {
                public: PublicState::new(
                    consumer_key.into(),
                    consumer_secret.into(),
                    callback_uri,
                    scope,
                    endpoints.unwrap_or_default(),
                ),
                rsa_key: key.pem().to_owned(),
                oauth_session_handle: None,
            },
            key,
        };
        let grant = credentials.state.public.request_token(credentials.method()).await?;
        credentials.state.oauth_session_handle = grant.session_handle;
        debug!("partner credentials initiated");
        Ok(credentials)
    }

    fn method(&self) -> SignatureMethod {
        SignatureMethod::RsaSha1(self.key.clone())
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.state.public.user_agent = Some(user_agent.into());
        self
    }

    pub fn url(&self) -> Result<Url> {
        self.state.public.authorize_url()
    }

    #[instrument(skip(self, verifier))]
    pub async fn verify(&mut self, verifier: &str) -> Result<()> {
        let grant = self.state.public.access_token(self.method(), verifier).await?;
        if grant.session_handle.is_some() {
            self.state.oauth_session_handle = grant.session_handle;
        }
        debug!("partner credentials verified");
        Ok(())
    }

    /// Renews the access token using the session handle.
    ///
    /// The previous session handle is kept when the response does not carry a new one.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<()> {
        let handle = self.state.oauth_session_handle.clone().ok_or_else(|| {
            Error::Credentials("Cannot refresh token, no session handle is present.".to_owned())
        })?;
        if self.state.public.oauth_token.is_none() {
            return Err(Error::Credentials(
                "Cannot refresh token, no token is present.".to_owned(),
            ));
        }

        let mut url = self.state.public.endpoints.access_token_url()?;
        url.query_pairs_mut()
            .append_pair("oauth_session_handle", &handle);
        let signer = self.state.public.signer(self.method());
        let grant = oauth1::exchange(&signer, url, &self.state.public.user_agent()).await?;

        if grant.session_handle.is_some() {
            self.state.oauth_session_handle = grant.session_handle.clone();
        }
        self.state.public.apply(grant);
        self.state.public.verified = true;
        debug!("partner credentials refreshed");
        Ok(())
    }

    #[must_use]
    pub fn verified(&self) -> bool {
        self.state.public.verified
    }

    pub fn expired(&self, grace: Duration, now: Option<OffsetDateTime>) -> Result<bool> {
        self.state.public.expired(grace, now)
    }

    #[must_use]
    pub fn state(&self) -> PartnerState {
        self.state.clone()
    }

    /// Rebuilds the credentials, re-parsing the stored key.
    pub fn from_state(state: PartnerState) -> Result<Self> {
        let key = RsaKey::from_pem(&state.rsa_key)?;
        Ok(Self { state, key })
    }
}

impl Authorize for PartnerCredentials {
    fn oauth(&self) -> Result<Signer> {
        self.state.public.oauth(self.method())
    }

    fn user_agent(&self) -> Option<&str> {
        self.state.public.user_agent.as_deref()
    }

    fn endpoints(&self) -> &Endpoints {
        &self.state.public.endpoints
    }
}
