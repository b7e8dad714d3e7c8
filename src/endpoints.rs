use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

pub const XERO_BASE_URL: &str = "https://api.xero.com";
pub const XERO_AUTH_URL: &str = "https://login.xero.com/identity/connect/authorize";
pub const XERO_TOKEN_URL: &str = "https://identity.xero.com/connect/token";

const REQUEST_TOKEN_PATH: &[&str] = &["oauth", "RequestToken"];
const AUTHORIZE_PATH: &[&str] = &["oauth", "Authorize"];
const ACCESS_TOKEN_PATH: &[&str] = &["oauth", "AccessToken"];
const CONNECTIONS_PATH: &[&str] = &["connections"];

/// The API generations hosted under the base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Api {
    Accounting,
    Payroll,
    Files,
    Projects,
    BankFeeds,
}

/// Body format spoken by an API generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Xml,
    Json,
}

impl WireFormat {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Json => "application/json",
        }
    }
}

impl Api {
    fn segments(self) -> &'static [&'static str] {
        match self {
            Self::Accounting => &["api.xro", "2.0"],
            Self::Payroll => &["payroll.xro", "1.0"],
            Self::Files => &["files.xro", "1.0"],
            Self::Projects => &["projects.xro", "2.0"],
            Self::BankFeeds => &["bankfeeds.xro", "1.0"],
        }
    }

    #[must_use]
    pub fn wire_format(self) -> WireFormat {
        match self {
            Self::Accounting | Self::Payroll => WireFormat::Xml,
            Self::Files | Self::Projects | Self::BankFeeds => WireFormat::Json,
        }
    }
}

/// Base URLs for the API and the OAuth2 identity server.
///
/// Serialized flat as `api_url`, `authorize_url` and `token_url`; values equal to the
/// public Xero defaults are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(
        rename = "api_url",
        default = "default_base",
        skip_serializing_if = "is_default_base"
    )]
    base: String,
    #[serde(
        rename = "authorize_url",
        default = "default_authorize",
        skip_serializing_if = "is_default_authorize"
    )]
    authorize: String,
    #[serde(
        rename = "token_url",
        default = "default_token",
        skip_serializing_if = "is_default_token"
    )]
    token: String,
}

fn default_base() -> String {
    XERO_BASE_URL.to_owned()
}

fn default_authorize() -> String {
    XERO_AUTH_URL.to_owned()
}

fn default_token() -> String {
    XERO_TOKEN_URL.to_owned()
}

fn is_default_base(s: &str) -> bool {
    s == XERO_BASE_URL
}

fn is_default_authorize(s: &str) -> bool {
    s == XERO_AUTH_URL
}

fn is_default_token(s: &str) -> bool {
    s == XERO_TOKEN_URL
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            base: default_base(),
            authorize: default_authorize(),
            token: default_token(),
        }
    }
}

impl Endpoints {
    /// Endpoints rooted at `base`, keeping the public identity server.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    /// Overrides the OAuth2 authorize and token endpoints.
    #[must_use]
    pub fn with_identity(mut self, authorize: impl Into<String>, token: impl Into<String>) -> Self {
        self.authorize = authorize.into();
        self.token = token.into();
        self
    }

    /// Reads `XERO_API_URL`, `XERO_IDENTITY_AUTHORIZE_URL` and `XERO_IDENTITY_TOKEN_URL`,
    /// falling back to the public defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str, default: fn() -> String| -> Result<String> {
            let value = std::env::var(name).unwrap_or_else(|_| default());
            Url::parse(&value)
                .map_err(|e| Error::Configuration(format!("{name} is not a valid URL: {e}")))?;
            Ok(value)
        };
        Ok(Self {
            base: read("XERO_API_URL", default_base)?,
            authorize: read("XERO_IDENTITY_AUTHORIZE_URL", default_authorize)?,
            token: read("XERO_IDENTITY_TOKEN_URL", default_token)?,
        })
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn authorize_url(&self) -> Result<Url> {
        Url::parse(&self.authorize).map_err(|_| Error::InvalidEndpoint)
    }

    pub fn token_url(&self) -> Result<Url> {
        Url::parse(&self.token).map_err(|_| Error::InvalidEndpoint)
    }

    /// Appends path segments to the base URL. An empty trailing segment yields a trailing slash.
    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url> {
        let mut url = Url::parse(&self.base).map_err(|_| Error::InvalidEndpoint)?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidEndpoint)?
            .pop_if_empty()
            .extend(segments.iter().map(AsRef::as_ref));
        Ok(url)
    }

    /// Root URL of an API generation, e.g. `https://api.xero.com/api.xro/2.0`.
    pub fn api_url(&self, api: Api) -> Result<Url> {
        self.join(api.segments())
    }

    /// URL of a path beneath an API generation.
    pub fn resource_url<S: AsRef<str>>(&self, api: Api, segments: &[S]) -> Result<Url> {
        let mut url = self.api_url(api)?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidEndpoint)?
            .extend(segments.iter().map(AsRef::as_ref));
        Ok(url)
    }

    pub fn request_token_url(&self) -> Result<Url> {
        self.join(REQUEST_TOKEN_PATH)
    }

    pub fn oauth1_authorize_url(&self) -> Result<Url> {
        self.join(AUTHORIZE_PATH)
    }

    pub fn access_token_url(&self) -> Result<Url> {
        self.join(ACCESS_TOKEN_PATH)
    }

    pub fn connections_url(&self) -> Result<Url> {
        self.join(CONNECTIONS_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_api_urls() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints
                .resource_url(Api::Accounting, &["Invoices", "abc", "history", ""])
                .unwrap()
                .as_str(),
            "https://api.xero.com/api.xro/2.0/Invoices/abc/history/"
        );
        assert_eq!(
            endpoints.access_token_url().unwrap().as_str(),
            "https://api.xero.com/oauth/AccessToken"
        );
    }

    #[test]
    fn default_endpoints_serialize_to_nothing() {
        let json = serde_json::to_value(Endpoints::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));

        let custom = Endpoints::new("http://127.0.0.1:9000");
        let json = serde_json::to_value(&custom).unwrap();
        assert_eq!(json, serde_json::json!({ "api_url": "http://127.0.0.1:9000" }));
        assert_eq!(serde_json::from_value::<Endpoints>(json).unwrap(), custom);
    }

    #[test]
    fn attachment_names_are_escaped() {
        let url = Endpoints::default()
            .resource_url(Api::Accounting, &["Invoices", "1", "Attachments", "my file.pdf"])
            .unwrap();
        assert!(url.as_str().ends_with("/Attachments/my%20file.pdf"));
    }
}
