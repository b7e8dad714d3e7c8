//! Two-legged OAuth1 with RSA-SHA1 signing ("private" applications).
//!
//! The consumer key doubles as the access token, so these credentials are verified
//! from the moment they are built and never expire.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::oauth1::{OAuth1Signer, RsaKey};
use super::{Authorize, Signer};
use crate::endpoints::Endpoints;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateState {
    pub consumer_key: String,
    pub rsa_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(flatten)]
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrivateCredentials {
    state: PrivateState,
    key: RsaKey,
}

impl PrivateCredentials {
    pub fn new(
        consumer_key: impl Into<String>,
        rsa_key: &str,
        endpoints: Option<Endpoints>,
    ) -> Result<Self> {
        let key = RsaKey::from_pem(rsa_key)?;
        Ok(Self {
            state: PrivateState {
                consumer_key: consumer_key.into(),
                rsa_key: key.pem().to_owned(),
                user_agent: None,
                endpoints: endpoints.unwrap_or_default(),
            },
            key,
        })
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.state.user_agent = Some(user_agent.into());
        self
    }

    /// Always an error: private tokens carry no expiry.
    pub fn expired(&self, _grace: Duration, _now: Option<OffsetDateTime>) -> Result<bool> {
        Err(Error::Credentials(
            "Private credentials do not expire".to_owned(),
        ))
    }

    #[must_use]
    pub fn state(&self) -> PrivateState {
        self.state.clone()
    }

    pub fn from_state(state: PrivateState) -> Result<Self> {
        let key = RsaKey::from_pem(&state.rsa_key)?;
        Ok(Self { state, key })
    }
}

impl Authorize for PrivateCredentials {
    fn oauth(&self) -> Result<Signer> {
        Ok(Signer::OAuth1(
            OAuth1Signer::rsa(&self.state.consumer_key, self.key.clone())
                .with_token(&self.state.consumer_key, None),
        ))
    }

    fn user_agent(&self) -> Option<&str> {
        self.state.user_agent.as_deref()
    }

    fn endpoints(&self) -> &Endpoints {
        &self.state.endpoints
    }
}
