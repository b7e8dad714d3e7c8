use std::fmt;

use miette::Diagnostic;
use oauth2::{HttpClientError, RequestTokenError, basic::BasicErrorResponse};
use reqwest::{StatusCode, header::HeaderMap};
use serde::Deserialize;
use thiserror::Error;
use tracing_error::SpanTrace;
use url::Url;

use crate::utils::parse_qs;

/// Error returned by the `oauth2` crate for code and refresh grants.
pub type OAuth2RequestError = RequestTokenError<HttpClientError<reqwest::Error>, BasicErrorResponse>;

/// The HTTP response a remote error was classified from.
#[derive(Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub span_trace: SpanTrace,
}

impl ApiResponse {
    /// Drains a `reqwest` response into an owned snapshot.
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(Self {
            status,
            url,
            headers,
            body,
            span_trace: SpanTrace::capture(),
        })
    }

    /// The body decoded as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The `Content-Type` header, or an empty string.
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("body", &self.text())
            .finish_non_exhaustive()
    }
}

/// JSON `ValidationException` body returned by the accounting API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidationExceptionBody {
    pub r#type: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub elements: Vec<ValidationExceptionElement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidationExceptionElement {
    #[serde(default)]
    pub validation_errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[allow(clippy::module_name_repetitions)]
pub struct ValidationError {
    pub message: String,
}

/// RFC 7807 style problem document (`{Type, Title, Status, Detail}`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProblemDetails {
    pub r#type: Option<String>,
    pub title: Option<String>,
    pub status: Option<u16>,
    #[serde(default)]
    pub detail: String,
}

/// Errors that can occur when interacting with the Xero API.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("error making request: {0}")]
    #[diagnostic(
        code(xero_connect::request_error),
        help("Check your network connection and Xero API availability")
    )]
    Request(#[source] reqwest::Error),

    /// HTTP 400 with the provider's validation messages.
    #[error("{message}")]
    #[diagnostic(
        code(xero_connect::bad_request),
        help("Review the validation errors returned by the Xero API")
    )]
    BadRequest {
        message: String,
        problem: Option<String>,
        errors: Vec<String>,
        response: Box<ApiResponse>,
    },

    /// HTTP 401. `problem` carries the provider's sub-reason such as `token_expired`.
    #[error("{message}")]
    #[diagnostic(
        code(xero_connect::unauthorized),
        help("The token was rejected; refresh or re-authorize the credentials")
    )]
    Unauthorized {
        message: String,
        problem: Option<String>,
        errors: Vec<String>,
        response: Box<ApiResponse>,
    },

    #[error("forbidden: {message}")]
    #[diagnostic(
        code(xero_connect::forbidden),
        help("Check the granted scopes and the selected tenant")
    )]
    Forbidden {
        message: String,
        response: Box<ApiResponse>,
    },

    #[error("not found: {message}")]
    #[diagnostic(code(xero_connect::not_found))]
    NotFound {
        message: String,
        response: Box<ApiResponse>,
    },

    #[error("unsupported media type: {message}")]
    #[diagnostic(code(xero_connect::unsupported_media_type))]
    UnsupportedMediaType {
        message: String,
        response: Box<ApiResponse>,
    },

    #[error("internal error: {message}")]
    #[diagnostic(code(xero_connect::internal_error))]
    InternalError {
        message: String,
        response: Box<ApiResponse>,
    },

    #[error("not implemented: {message}")]
    #[diagnostic(code(xero_connect::not_implemented))]
    NotImplemented {
        message: String,
        response: Box<ApiResponse>,
    },

    /// HTTP 429, or a 503 whose body carries an encoded rate-limit payload.
    #[error("{message}")]
    #[diagnostic(
        code(xero_connect::rate_limit_exceeded),
        help("The Xero API rate limit has been exceeded. Wait before retrying.")
    )]
    RateLimitExceeded {
        message: String,
        problem: Option<String>,
        errors: Vec<String>,
        /// Value of `X-Rate-Limit-Problem`, e.g. `day` or `minute`.
        limit: Option<String>,
        response: Box<ApiResponse>,
    },

    #[error("service not available: {message}")]
    #[diagnostic(
        code(xero_connect::not_available),
        help("The organisation or the API is offline; try again later")
    )]
    NotAvailable {
        message: String,
        response: Box<ApiResponse>,
    },

    #[error("{message}")]
    #[diagnostic(code(xero_connect::unknown))]
    Unknown {
        message: String,
        response: Box<ApiResponse>,
    },

    #[error("OAuth credentials haven't been verified")]
    #[diagnostic(
        code(xero_connect::not_verified),
        help("Complete the authorization flow with `verify` before making requests")
    )]
    NotVerified,

    #[error("access denied: {0}")]
    #[diagnostic(code(xero_connect::access_denied))]
    AccessDenied(String),

    #[error("tenant id not set")]
    #[diagnostic(
        code(xero_connect::tenant_id_not_set),
        help("Call `set_default_tenant` or choose one of `get_tenants`")
    )]
    TenantIdNotSet,

    #[error("a provided idempotency key must be between 1 and 128 characters long (got {0})")]
    #[diagnostic(code(xero_connect::invalid_idempotency_key))]
    InvalidIdempotencyKey(usize),

    /// A local credential lifecycle failure, such as refreshing without a token.
    #[error("{0}")]
    #[diagnostic(code(xero_connect::credentials))]
    Credentials(String),

    #[error("{operation} is not available for {resource}")]
    #[diagnostic(code(xero_connect::unsupported_operation))]
    UnsupportedOperation {
        operation: &'static str,
        resource: String,
    },

    /// Rejected locally before sending, e.g. over-long history details.
    #[error("invalid argument: {0}")]
    #[diagnostic(code(xero_connect::invalid_argument))]
    InvalidArgument(String),

    #[error("oauth2 error: {0}")]
    #[diagnostic(
        code(xero_connect::oauth2_error),
        help("Verify your OAuth2 configuration and credentials")
    )]
    OAuth2(#[source] Box<OAuth2RequestError>),

    #[error("endpoint could not be parsed as a URL")]
    #[diagnostic(
        code(xero_connect::invalid_endpoint),
        help("Check that the API endpoint URL is correctly formatted")
    )]
    InvalidEndpoint,

    #[error("invalid filter: {0}")]
    #[diagnostic(code(xero_connect::invalid_filter))]
    InvalidFilter(String),

    #[error("invalid RSA private key: {0}")]
    #[diagnostic(
        code(xero_connect::invalid_rsa_key),
        help("Provide a PEM encoded PKCS#1 or PKCS#8 private key")
    )]
    InvalidRsaKey(String),

    #[error("error building or reading XML: {0}")]
    #[diagnostic(code(xero_connect::xml))]
    Xml(String),

    #[error("error decoding JSON: {0}")]
    #[diagnostic(
        code(xero_connect::deserialization_error),
        help("The API returned data in an unexpected format")
    )]
    Json(#[source] serde_json::Error),

    #[error("callback server error: {0}")]
    #[diagnostic(code(xero_connect::callback_server))]
    CallbackServer(String),

    #[error("configuration error: {0}")]
    #[diagnostic(code(xero_connect::configuration))]
    Configuration(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<OAuth2RequestError> for Error {
    fn from(e: OAuth2RequestError) -> Self {
        Self::OAuth2(Box::new(e))
    }
}

impl Error {
    fn response(&self) -> Option<&ApiResponse> {
        match self {
            Self::BadRequest { response, .. }
            | Self::Unauthorized { response, .. }
            | Self::Forbidden { response, .. }
            | Self::NotFound { response, .. }
            | Self::UnsupportedMediaType { response, .. }
            | Self::InternalError { response, .. }
            | Self::NotImplemented { response, .. }
            | Self::RateLimitExceeded { response, .. }
            | Self::NotAvailable { response, .. }
            | Self::Unknown { response, .. } => Some(response),
            _ => None,
        }
    }

    /// The originating response, for errors produced by a remote call.
    #[must_use]
    pub fn api_response(&self) -> Option<&ApiResponse> {
        self.response()
    }

    #[must_use]
    pub fn span_trace(&self) -> Option<&SpanTrace> {
        self.response().map(|r| &r.span_trace)
    }

    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.response().map(|r| &r.url)
    }

    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.response().map(|r| r.status)
    }

    #[must_use]
    pub fn response_body(&self) -> Option<String> {
        self.response().map(ApiResponse::text)
    }

    /// The specific problem reported by the provider, when one was extracted.
    #[must_use]
    pub fn problem(&self) -> Option<&str> {
        match self {
            Self::BadRequest { problem, .. }
            | Self::Unauthorized { problem, .. }
            | Self::RateLimitExceeded { problem, .. } => problem.as_deref(),
            _ => None,
        }
    }

    /// Individual problems extracted from the response body.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        match self {
            Self::BadRequest { errors, .. }
            | Self::Unauthorized { errors, .. }
            | Self::RateLimitExceeded { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Builds a `BadRequest` from a JSON, urlencoded, plain-text or XML body.
    ///
    /// A body that does not have the shape its content type promises yields `Unknown`.
    pub(crate) fn bad_request(response: ApiResponse) -> Self {
        match parse_bad_request(&response) {
            Some((message, errors)) => Self::BadRequest {
                message,
                problem: errors.first().cloned(),
                errors,
                response: Box::new(response),
            },
            None => Self::unparseable(response),
        }
    }

    /// Builds an `Unauthorized` from a JSON problem document or an urlencoded oauth problem.
    pub(crate) fn unauthorized(response: ApiResponse) -> Self {
        match parse_unauthorized(&response) {
            Some((message, errors)) => Self::Unauthorized {
                message,
                problem: errors.first().cloned(),
                errors,
                response: Box::new(response),
            },
            None => Self::unparseable(response),
        }
    }

    /// Builds a `NotImplemented` from the first `Message` node of an `ApiException`,
    /// falling back to the raw body.
    pub(crate) fn not_implemented(response: ApiResponse) -> Self {
        let message = xml_messages(&response.text())
            .and_then(|m| m.into_iter().next())
            .unwrap_or_else(|| response.text());
        Self::NotImplemented {
            message,
            response: Box::new(response),
        }
    }

    /// A 503 carries either an encoded rate-limit payload or nothing parseable.
    pub(crate) fn service_unavailable(response: ApiResponse) -> Self {
        let text = response.text();
        let payload = parse_qs(&text);
        if payload.is_empty() {
            Self::NotAvailable {
                message: text,
                response: Box::new(response),
            }
        } else {
            Self::rate_limited(response, &payload, None)
        }
    }

    pub(crate) fn rate_limited(
        response: ApiResponse,
        payload: &[(String, String)],
        limit: Option<String>,
    ) -> Self {
        match first_value(payload, "oauth_problem") {
            Some(problem) => Self::RateLimitExceeded {
                message: first_value(payload, "oauth_problem_advice").unwrap_or_default(),
                problem: Some(problem.clone()),
                errors: vec![problem],
                limit,
                response: Box::new(response),
            },
            None => Self::RateLimitExceeded {
                message: response.text(),
                problem: None,
                errors: Vec::new(),
                limit,
                response: Box::new(response),
            },
        }
    }

    pub(crate) fn unparseable(response: ApiResponse) -> Self {
        Self::unknown(response, Some(UNPARSEABLE_RESPONSE))
    }

    pub(crate) fn unknown(response: ApiResponse, message: Option<&str>) -> Self {
        Self::Unknown {
            message: message.unwrap_or("unknown error").to_owned(),
            response: Box::new(response),
        }
    }
}

const UNPARSEABLE_RESPONSE: &str = "Unable to parse Xero API response";

type Extracted = (String, Vec<String>);

fn parse_bad_request(response: &ApiResponse) -> Option<Extracted> {
    let content_type = response.content_type();

    if content_type.starts_with("application/json") {
        let body: ValidationExceptionBody = serde_json::from_slice(&response.body).ok()?;
        let errors: Vec<String> = body
            .elements
            .into_iter()
            .flat_map(|e| e.validation_errors)
            .map(|e| e.message)
            .collect();
        let mut message = format!(
            "{}: {}",
            body.r#type.unwrap_or_default(),
            body.message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "No Message Provided".to_owned())
        );
        match errors.as_slice() {
            [] => {}
            [only] => message.push_str(&format!(" ({only})")),
            [first, rest @ ..] => {
                message.push_str(&format!(" ({first}, and {} other issues)", rest.len()));
            }
        }
        return Some((message, errors));
    }

    if content_type.starts_with("text/html") {
        let text = response.text();
        let payload = parse_qs(&text);
        if payload.is_empty() {
            // sometimes the error is plain text
            return Some((text.clone(), vec![text]));
        }
        return Some((
            first_value(&payload, "oauth_problem_advice")?,
            vec![first_value(&payload, "oauth_problem")?],
        ));
    }

    let mut messages = xml_messages(&response.text())?.into_iter();
    let message = messages.next()?;
    Some((message, messages.collect()))
}

fn parse_unauthorized(response: &ApiResponse) -> Option<Extracted> {
    if response.content_type().starts_with("application/json") {
        let body: ProblemDetails = serde_json::from_slice(&response.body).ok()?;
        let reason = body.detail.split(':').next().unwrap_or_default().to_owned();
        return Some((body.detail, vec![reason]));
    }
    let payload = parse_qs(&response.text());
    Some((
        first_value(&payload, "oauth_problem_advice")?,
        vec![first_value(&payload, "oauth_problem")?],
    ))
}

fn first_value(payload: &[(String, String)], key: &str) -> Option<String> {
    payload
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

/// Text of every `Message` element in document order, or `None` for malformed XML.
fn xml_messages(text: &str) -> Option<Vec<String>> {
    let document = roxmltree::Document::parse(text).ok()?;
    Some(
        document
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "Message")
            .map(|n| n.text().unwrap_or_default().to_owned())
            .collect(),
    )
}

/// Type alias for results from this crate.
///
/// This is already a Miette diagnostic result due to the implementation of
/// the Diagnostic trait for the Error type.
pub type Result<O> = std::result::Result<O, Error>;
