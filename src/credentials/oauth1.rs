//! OAuth 1.0a request signing (RFC 5849) and the token exchange shared by the
//! public, partner and private credential variants.

use std::fmt;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, StatusCode, header};
use rsa::{
    RsaPrivateKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::SigningKey,
    pkcs8::DecodePrivateKey,
    signature::{SignatureEncoding, Signer},
};
use sha1::Sha1;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::dispatch::classify_failure;
use crate::error::{ApiResponse, Error, Result};
use crate::oauth::token_http_client;
use crate::utils::parse_qs;

/// Token lifetime assumed when the provider does not report one.
pub const OAUTH_EXPIRY_SECONDS: i64 = 3600;

/// RFC 3986 unreserved characters stay literal; everything else is escaped.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// A parsed RSA-SHA1 signing key together with the PEM it was read from.
#[derive(Clone)]
pub struct RsaKey {
    pem: String,
    signing_key: Arc<SigningKey<Sha1>>,
}

impl RsaKey {
    /// Parses a PKCS#1 (`BEGIN RSA PRIVATE KEY`) or PKCS#8 (`BEGIN PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| Error::InvalidRsaKey(e.to_string()))?;
        Ok(Self {
            pem: pem.to_owned(),
            signing_key: Arc::new(SigningKey::new(key)),
        })
    }

    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }

    fn sign(&self, message: &str) -> Vec<u8> {
        self.signing_key.sign(message.as_bytes()).to_vec()
    }
}

impl fmt::Debug for RsaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RsaKey(..)")
    }
}

impl PartialEq for RsaKey {
    fn eq(&self, other: &Self) -> bool {
        self.pem == other.pem
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignatureMethod {
    HmacSha1,
    RsaSha1(RsaKey),
}

impl SignatureMethod {
    fn name(&self) -> &'static str {
        match self {
            Self::HmacSha1 => "HMAC-SHA1",
            Self::RsaSha1(_) => "RSA-SHA1",
        }
    }
}

/// Produces `Authorization: OAuth ...` headers for one consumer and, optionally,
/// one token.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: String,
    method: SignatureMethod,
    token: Option<String>,
    token_secret: Option<String>,
    callback: Option<String>,
    verifier: Option<String>,
}

impl OAuth1Signer {
    #[must_use]
    pub fn hmac(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            method: SignatureMethod::HmacSha1,
            token: None,
            token_secret: None,
            callback: None,
            verifier: None,
        }
    }

    #[must_use]
    pub fn rsa(consumer_key: impl Into<String>, key: RsaKey) -> Self {
        Self {
            method: SignatureMethod::RsaSha1(key),
            ..Self::hmac(consumer_key, String::new())
        }
    }

    /// Keeps the consumer secret alongside an RSA key; partner apps are issued both.
    #[must_use]
    pub fn with_consumer_secret(mut self, secret: impl Into<String>) -> Self {
        self.consumer_secret = secret.into();
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, secret: Option<String>) -> Self {
        self.token = Some(token.into());
        self.token_secret = secret;
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Option<String>) -> Self {
        self.callback = callback;
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.verifier = Some(verifier.into());
        self
    }

    #[must_use]
    pub fn method(&self) -> &SignatureMethod {
        &self.method
    }

    /// Signs a request with a fresh nonce and the current time.
    pub fn authorization(
        &self,
        method: &Method,
        url: &Url,
        form: &[(String, String)],
    ) -> Result<String> {
        let nonce = Uuid::new_v4().simple().to_string();
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        self.authorization_with(method, url, form, &nonce, timestamp)
    }

    /// Signs a request with a caller chosen nonce and timestamp.
    pub fn authorization_with(
        &self,
        method: &Method,
        url: &Url,
        form: &[(String, String)],
        nonce: &str,
        timestamp: i64,
    ) -> Result<String> {
        let oauth_params = self.oauth_params(nonce, timestamp);
        let base = signature_base_string(method, url, form, &oauth_params);
        trace!(%base, "oauth1 signature base string");
        let signature = self.sign(&base)?;

        let mut header = String::from("OAuth ");
        for (i, (k, v)) in oauth_params
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .chain(std::iter::once(("oauth_signature", signature.as_str())))
            .enumerate()
        {
            if i > 0 {
                header.push_str(", ");
            }
            header.push_str(&format!("{}=\"{}\"", encode(k), encode(v)));
        }
        Ok(header)
    }

    fn oauth_params(&self, nonce: &str, timestamp: i64) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("oauth_nonce", nonce.to_owned()),
            ("oauth_timestamp", timestamp.to_string()),
            ("oauth_version", "1.0".to_owned()),
            ("oauth_signature_method", self.method.name().to_owned()),
            ("oauth_consumer_key", self.consumer_key.clone()),
        ];
        if let Some(token) = &self.token {
            params.push(("oauth_token", token.clone()));
        }
        if let Some(callback) = &self.callback {
            params.push(("oauth_callback", callback.clone()));
        }
        if let Some(verifier) = &self.verifier {
            params.push(("oauth_verifier", verifier.clone()));
        }
        params
    }

    fn sign(&self, base: &str) -> Result<String> {
        let raw = match &self.method {
            SignatureMethod::HmacSha1 => {
                let key = format!(
                    "{}&{}",
                    encode(&self.consumer_secret),
                    encode(self.token_secret.as_deref().unwrap_or_default())
                );
                let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
                    .map_err(|e| Error::Credentials(e.to_string()))?;
                mac.update(base.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            SignatureMethod::RsaSha1(key) => key.sign(base),
        };
        Ok(BASE64.encode(raw))
    }
}

/// `METHOD&base-url&normalized-params`, each part percent encoded.
pub(crate) fn signature_base_string(
    method: &Method,
    url: &Url,
    form: &[(String, String)],
    oauth_params: &[(&str, String)],
) -> String {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (encode(&k), encode(&v)))
        .chain(form.iter().map(|(k, v)| (encode(k), encode(v))))
        .chain(oauth_params.iter().map(|(k, v)| (encode(k), encode(v))))
        .collect();
    params.sort();
    let normalized = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut base_url = url.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);

    format!(
        "{}&{}&{}",
        method.as_str().to_ascii_uppercase(),
        encode(base_url.as_str()),
        encode(&normalized)
    )
}

/// Token material returned by `RequestToken` and `AccessToken`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenGrant {
    pub token: String,
    pub token_secret: String,
    pub session_handle: Option<String>,
    pub expires_at: i64,
    pub authorization_expires_at: i64,
}

impl TokenGrant {
    fn parse(text: &str, now: OffsetDateTime) -> Result<Self> {
        let payload = parse_qs(text);
        let get = |key: &str| {
            payload
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let lifetime = |key: &str| {
            get(key)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(OAUTH_EXPIRY_SECONDS)
        };
        let missing = |key: &str| Error::Credentials(format!("token response is missing {key}"));

        Ok(Self {
            token: get("oauth_token").ok_or_else(|| missing("oauth_token"))?,
            token_secret: get("oauth_token_secret").ok_or_else(|| missing("oauth_token_secret"))?,
            session_handle: get("oauth_session_handle"),
            expires_at: now.unix_timestamp() + lifetime("oauth_expires_in"),
            authorization_expires_at: now.unix_timestamp()
                + lifetime("oauth_authorization_expires_in"),
        })
    }
}

/// POSTs a signed request to a token endpoint and parses the urlencoded reply.
#[instrument(skip(signer))]
pub(crate) async fn exchange(
    signer: &OAuth1Signer,
    url: Url,
    user_agent: &str,
) -> Result<TokenGrant> {
    let authorization = signer.authorization(&Method::POST, &url, &[])?;
    let response = token_http_client(user_agent)?
        .post(url)
        .header(header::AUTHORIZATION, authorization)
        .send()
        .await?;
    let response = ApiResponse::read(response).await?;
    debug!(status = %response.status, "oauth1 token endpoint responded");

    if response.status == StatusCode::OK {
        TokenGrant::parse(&response.text(), OffsetDateTime::now_utc())
    } else {
        Err(classify_failure(response))
    }
}
