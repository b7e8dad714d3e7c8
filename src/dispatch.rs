//! Sends one described request with the credentials' authorization and turns the
//! response into a [`Payload`] or a classified [`Error`].

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Method, StatusCode, header, multipart};
use url::Url;

use crate::credentials::Authorize;
use crate::document::{self, Value};
use crate::endpoints::Api;
use crate::error::{ApiResponse, Error, Result};
use crate::utils::{MAX_IDEMPOTENCY_KEY_LEN, default_user_agent};

/// Header containing number of remaining daily API calls
const HEADER_DAY_LIMIT_REMAINING: &str = "X-DayLimit-Remaining";
/// Header containing number of remaining per-minute API calls
const HEADER_MIN_LIMIT_REMAINING: &str = "X-MinLimit-Remaining";
/// Header containing number of remaining app-wide per-minute API calls
const HEADER_APP_MIN_LIMIT_REMAINING: &str = "X-AppMinLimit-Remaining";
/// Header identifying which rate limit was hit when a 429 is returned
const HEADER_RATE_LIMIT_PROBLEM: &str = "X-Rate-Limit-Problem";

pub const HEADER_TENANT_ID: &str = "Xero-tenant-id";
pub const HEADER_IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Information about the remaining API rate limits
///
/// Xero applies several rate limits to API usage:
/// - Daily limit: 5000 calls per day per tenant
/// - Minute limit: 60 calls per minute per tenant
/// - App minute limit: 10,000 calls per minute across all tenants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Number of remaining API calls for the day (out of 5000)
    pub day_limit_remaining: Option<u32>,
    /// Number of remaining API calls for the minute (out of 60)
    pub minute_limit_remaining: Option<u32>,
    /// Number of remaining API calls for the app across all tenants (out of 10,000)
    pub app_minute_limit_remaining: Option<u32>,
}

impl RateLimitInfo {
    fn from_response_headers(headers: &header::HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u32>().ok())
        };
        Self {
            day_limit_remaining: read(HEADER_DAY_LIMIT_REMAINING),
            minute_limit_remaining: read(HEADER_MIN_LIMIT_REMAINING),
            app_minute_limit_remaining: read(HEADER_APP_MIN_LIMIT_REMAINING),
        }
    }

    /// Returns true if any of the limits are close to being exhausted
    #[must_use]
    pub fn is_near_limit(&self) -> bool {
        self.day_limit_remaining.is_some_and(|v| v < 100)
            || self.minute_limit_remaining.is_some_and(|v| v < 10)
            || self.app_minute_limit_remaining.is_some_and(|v| v < 100)
    }

    /// Log current rate limit status if getting close to limits
    pub fn log_if_near_limit(&self) {
        if self.is_near_limit() {
            warn!(
                day = ?self.day_limit_remaining,
                minute = ?self.minute_limit_remaining,
                app_minute = ?self.app_minute_limit_remaining,
                "approaching Xero API rate limits"
            );
        }
    }
}

/// Request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Xml(String),
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded`; OAuth1 signs these parameters.
    Form(Vec<(String, String)>),
    /// Sent verbatim; the caller names the content type.
    Bytes(Vec<u8>),
    /// A single file upload as `multipart/form-data`.
    Multipart {
        file_name: String,
        data: Vec<u8>,
        content_type: Option<String>,
    },
}

impl Body {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Form and multipart bodies get theirs from reqwest; everything else, bodiless
    /// requests included, follows the API generation.
    fn default_content_type(&self, api: Api) -> Option<&'static str> {
        match self {
            Self::Form(_) | Self::Multipart { .. } => None,
            Self::Xml(_) => Some("application/xml"),
            Self::Json(_) => Some("application/json"),
            Self::Empty | Self::Bytes(_) => Some(api.wire_format().content_type()),
        }
    }
}

/// Everything needed to perform one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub api: Api,
    pub method: Method,
    pub url: Url,
    pub params: Vec<(String, String)>,
    pub body: Body,
    pub headers: Vec<(String, String)>,
    /// Unwrap a single-element list result.
    pub single_object: bool,
    /// Key the result is projected to, e.g. `Invoices`.
    pub resource: String,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(api: Api, method: Method, url: Url, resource: impl Into<String>) -> Self {
        Self {
            api,
            method,
            url,
            params: Vec::new(),
            body: Body::Empty,
            headers: Vec::new(),
            single_object: false,
            resource: resource.into(),
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn single_object(mut self, single_object: bool) -> Self {
        self.single_object = single_object;
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn url_with_params(&self) -> Url {
        let mut url = self.url.clone();
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.params);
        }
        url
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A JSON body, decoded and projected to the resource.
    Document(Value),
    /// Any other body (PDFs, attachments, XML, empty 204s).
    Raw(Vec<u8>),
}

impl Payload {
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Document(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Document(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(bytes) => Some(bytes),
            Self::Document(_) => None,
        }
    }
}

/// Performs requests and keeps the most recent rate-limit headers.
#[derive(Debug)]
pub struct Dispatcher {
    http: reqwest::Client,
    user_agent: Option<String>,
    rate_limit: Mutex<RateLimitInfo>,
}

impl Dispatcher {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_http_client(http))
    }

    #[must_use]
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self {
            http,
            user_agent: None,
            rate_limit: Mutex::new(RateLimitInfo::default()),
        }
    }

    /// User agent for every call that does not set one itself; overrides the credentials'.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Rate-limit headers of the most recent response.
    #[must_use]
    pub fn rate_limit_info(&self) -> RateLimitInfo {
        *self
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record_rate_limit(&self, info: RateLimitInfo) {
        info.log_if_near_limit();
        *self
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// Executes `request` signed by `credentials`.
    ///
    /// Local preconditions (idempotency key length, tenant selection, verified
    /// credentials) are checked before anything is sent.
    #[instrument(skip(self, request, credentials), fields(method = %request.method, url = %request.url))]
    pub async fn execute<C: Authorize + ?Sized>(
        &self,
        request: &RequestDescriptor,
        credentials: &C,
        timeout: Option<Duration>,
    ) -> Result<Payload> {
        let mut headers = request.headers.clone();
        let has = |headers: &[(String, String)], name: &str| {
            headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
        };

        if let Some(content_type) = request.body.default_content_type(request.api)
            && !has(&headers, header::CONTENT_TYPE.as_str())
        {
            headers.push((header::CONTENT_TYPE.to_string(), content_type.to_owned()));
        }
        if !has(&headers, header::ACCEPT.as_str()) {
            headers.push((header::ACCEPT.to_string(), "application/json".to_owned()));
        }

        if let Some(key) = request.header_value(HEADER_IDEMPOTENCY_KEY) {
            let len = key.chars().count();
            if len == 0 || len > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(Error::InvalidIdempotencyKey(len));
            }
        }

        if credentials.requires_tenant() {
            let tenant_id = credentials.tenant_id().ok_or(Error::TenantIdNotSet)?;
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case(HEADER_TENANT_ID));
            headers.push((HEADER_TENANT_ID.to_owned(), tenant_id.to_owned()));
        }

        if !has(&headers, header::USER_AGENT.as_str()) {
            let user_agent = self
                .user_agent
                .as_deref()
                .or_else(|| credentials.user_agent())
                .map_or_else(default_user_agent, str::to_owned);
            headers.push((header::USER_AGENT.to_string(), user_agent));
        }

        let url = request.url_with_params();
        let form: &[(String, String)] = match &request.body {
            Body::Form(form) => form,
            _ => &[],
        };
        let authorization = credentials
            .oauth()?
            .authorization(&request.method, &url, form)?;
        headers.push((header::AUTHORIZATION.to_string(), authorization));

        let mut builder = self.http.request(request.method.clone(), url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Xml(xml) => {
                trace!(body = %xml, "request body");
                builder.body(xml.clone())
            }
            Body::Json(json) => {
                trace!(body = %json, "request body");
                builder.body(serde_json::to_vec(json)?)
            }
            Body::Form(form) => builder.form(form),
            Body::Bytes(bytes) => builder.body(bytes.clone()),
            Body::Multipart {
                file_name,
                data,
                content_type,
            } => {
                let mut part = multipart::Part::bytes(data.clone()).file_name(file_name.clone());
                if let Some(content_type) = content_type {
                    part = part.mime_str(content_type)?;
                }
                builder.multipart(multipart::Form::new().part(file_name.clone(), part))
            }
        };
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = ApiResponse::read(builder.send().await?).await?;
        debug!(status = %response.status, url = %response.url, "response received");
        trace!(body = %response.text(), "response body");
        self.record_rate_limit(RateLimitInfo::from_response_headers(&response.headers));

        match response.status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
                if response.content_type().starts_with("application/json") {
                    let value = document::json::parse(&response.body)?;
                    project(value, request, response).map(Payload::Document)
                } else {
                    Ok(Payload::Raw(response.body))
                }
            }
            StatusCode::NO_CONTENT => Ok(Payload::Raw(response.body)),
            _ => Err(classify_failure(response)),
        }
    }
}

/// Checks the envelope status and narrows the document to the requested resource.
fn project(value: Value, request: &RequestDescriptor, response: ApiResponse) -> Result<Value> {
    if let Some(status) = value.get("Status").and_then(Value::as_str)
        && status != "OK"
    {
        let message = format!("Expected the API to say OK but received {status}");
        return Err(Error::unknown(response, Some(&message)));
    }

    let value = match value {
        Value::Map(mut map) => match map.remove("Response") {
            Some(Value::Map(mut inner)) => inner
                .remove(&request.resource)
                .unwrap_or(Value::Map(inner)),
            Some(other) => other,
            None => map
                .remove(&request.resource)
                .unwrap_or(Value::Map(map)),
        },
        other => other,
    };

    Ok(match value {
        Value::List(mut items) if request.single_object && items.len() == 1 => items.remove(0),
        other => other,
    })
}

/// Maps a non-success response onto the error taxonomy.
pub(crate) fn classify_failure(response: ApiResponse) -> Error {
    match response.status {
        StatusCode::BAD_REQUEST => Error::bad_request(response),
        StatusCode::UNAUTHORIZED => Error::unauthorized(response),
        StatusCode::FORBIDDEN => Error::Forbidden {
            message: response.text(),
            response: Box::new(response),
        },
        StatusCode::NOT_FOUND => Error::NotFound {
            message: response.text(),
            response: Box::new(response),
        },
        StatusCode::UNSUPPORTED_MEDIA_TYPE => Error::UnsupportedMediaType {
            message: response.text(),
            response: Box::new(response),
        },
        StatusCode::TOO_MANY_REQUESTS => {
            let limit = response
                .header(HEADER_RATE_LIMIT_PROBLEM)
                .unwrap_or("unknown")
                .to_owned();
            warn!(url = %response.url, %limit, "rate limit exceeded");
            let payload = [
                (
                    "oauth_problem".to_owned(),
                    format!("rate limit exceeded: {limit}"),
                ),
                (
                    "oauth_problem_advice".to_owned(),
                    format!("please wait before retrying the xero api, the limit exceeded is: {limit}"),
                ),
            ];
            Error::rate_limited(response, &payload, Some(limit))
        }
        StatusCode::INTERNAL_SERVER_ERROR => Error::InternalError {
            message: response.text(),
            response: Box::new(response),
        },
        StatusCode::NOT_IMPLEMENTED => Error::not_implemented(response),
        StatusCode::SERVICE_UNAVAILABLE => Error::service_unavailable(response),
        _ => Error::unknown(response, None),
    }
}
