//! Credential lifecycle for every way of authorizing against Xero.
//!
//! Each variant moves from *unverified* (holding at most a provisional token) to
//! *verified* (holding a usable access token). Only verified credentials hand out a
//! [`Signer`]. Every variant can be persisted with `state()` and rebuilt with
//! `from_state()`.

use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::endpoints::Endpoints;
use crate::error::{Error, Result};

pub mod oauth1;
pub mod oauth2;
pub mod partner;
pub mod pkce;
pub mod private;
pub mod public;

pub use self::oauth1::{OAuth1Signer, RsaKey, SignatureMethod};
pub use self::oauth2::{OAuth2Credentials, OAuth2State, Tenant};
pub use self::partner::{PartnerCredentials, PartnerState};
pub use self::pkce::{
    BrowserOpener, CallbackResponder, DefaultResponder, LogBrowserOpener, OAuth2PkceCredentials,
    PkceState, SystemBrowser,
};
pub use self::private::{PrivateCredentials, PrivateState};
pub use self::public::{PublicCredentials, PublicState};

/// Safety margin applied by `expired()` when the caller does not pick one.
pub const DEFAULT_GRACE: Duration = Duration::seconds(30);

/// `true` once `now` is within `grace` of `expires_at`.
#[must_use]
pub fn expired_with_grace(expires_at: OffsetDateTime, grace: Duration, now: OffsetDateTime) -> bool {
    expires_at <= now + grace
}

/// Converts a stored unix timestamp, failing when none is known yet.
pub(crate) fn expiry_from_timestamp(timestamp: Option<i64>) -> Result<OffsetDateTime> {
    let timestamp =
        timestamp.ok_or_else(|| Error::Credentials("Expiry time is not available".to_owned()))?;
    OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|e| Error::Credentials(format!("invalid expiry timestamp: {e}")))
}

/// Attaches authorization to one outbound request.
#[derive(Clone, PartialEq)]
pub enum Signer {
    OAuth1(OAuth1Signer),
    Bearer(String),
}

impl Signer {
    /// The `Authorization` header value for a request.
    ///
    /// `form` holds urlencoded body parameters, which OAuth1 includes in the signature.
    pub fn authorization(
        &self,
        method: &Method,
        url: &Url,
        form: &[(String, String)],
    ) -> Result<String> {
        match self {
            Self::OAuth1(signer) => signer.authorization(method, url, form),
            Self::Bearer(token) => Ok(format!("Bearer {token}")),
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuth1(signer) => f.debug_tuple("OAuth1").field(signer.method()).finish(),
            Self::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

/// What the dispatcher needs from a credential.
pub trait Authorize {
    /// The signer for outbound requests, or [`Error::NotVerified`].
    fn oauth(&self) -> Result<Signer>;

    /// Whether requests must carry a `Xero-tenant-id` header.
    fn requires_tenant(&self) -> bool {
        false
    }

    fn tenant_id(&self) -> Option<&str> {
        None
    }

    fn user_agent(&self) -> Option<&str> {
        None
    }

    fn endpoints(&self) -> &Endpoints;
}

/// Any of the supported credential variants.
#[derive(Debug, Clone)]
pub enum Credentials {
    Public(PublicCredentials),
    Partner(PartnerCredentials),
    Private(PrivateCredentials),
    OAuth2(OAuth2Credentials),
    Pkce(OAuth2PkceCredentials),
}

/// Persisted form of [`Credentials`], tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialState {
    Public(PublicState),
    Partner(PartnerState),
    Private(PrivateState),
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2State),
    Pkce(PkceState),
}

impl Credentials {
    #[must_use]
    pub fn state(&self) -> CredentialState {
        match self {
            Self::Public(c) => CredentialState::Public(c.state()),
            Self::Partner(c) => CredentialState::Partner(c.state()),
            Self::Private(c) => CredentialState::Private(c.state()),
            Self::OAuth2(c) => CredentialState::OAuth2(c.state()),
            Self::Pkce(c) => CredentialState::Pkce(c.state()),
        }
    }

    /// Rebuilds credentials without any network call.
    pub fn from_state(state: CredentialState) -> Result<Self> {
        Ok(match state {
            CredentialState::Public(s) => Self::Public(PublicCredentials::from_state(s)),
            CredentialState::Partner(s) => Self::Partner(PartnerCredentials::from_state(s)?),
            CredentialState::Private(s) => Self::Private(PrivateCredentials::from_state(s)?),
            CredentialState::OAuth2(s) => Self::OAuth2(OAuth2Credentials::from_state(s)),
            CredentialState::Pkce(s) => Self::Pkce(OAuth2PkceCredentials::from_state(s)),
        })
    }

    /// Whether the current token is within `grace` of expiring.
    pub fn expired(&self, grace: Duration, now: Option<OffsetDateTime>) -> Result<bool> {
        match self {
            Self::Public(c) => c.expired(grace, now),
            Self::Partner(c) => c.expired(grace, now),
            Self::Private(c) => c.expired(grace, now),
            Self::OAuth2(c) => c.expired(grace, now),
            Self::Pkce(c) => c.expired(grace, now),
        }
    }

    fn as_authorize(&self) -> &dyn Authorize {
        match self {
            Self::Public(c) => c,
            Self::Partner(c) => c,
            Self::Private(c) => c,
            Self::OAuth2(c) => c,
            Self::Pkce(c) => c,
        }
    }
}

impl Authorize for Credentials {
    fn oauth(&self) -> Result<Signer> {
        self.as_authorize().oauth()
    }

    fn requires_tenant(&self) -> bool {
        self.as_authorize().requires_tenant()
    }

    fn tenant_id(&self) -> Option<&str> {
        self.as_authorize().tenant_id()
    }

    fn user_agent(&self) -> Option<&str> {
        self.as_authorize().user_agent()
    }

    fn endpoints(&self) -> &Endpoints {
        self.as_authorize().endpoints()
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Credentials {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_variant!(
    Public(PublicCredentials),
    Partner(PartnerCredentials),
    Private(PrivateCredentials),
    OAuth2(OAuth2Credentials),
    Pkce(OAuth2PkceCredentials),
);
