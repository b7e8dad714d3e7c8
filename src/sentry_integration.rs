//! Sentry integration for xero-connect errors.
//!
//! Only available with the `sentry` feature.
//!
//! ```toml
//! [dependencies]
//! xero-connect = { version = "0.1", features = ["sentry"] }
//! ```
//!
//! Span traces are only populated when the subscriber carries
//! `tracing_error::ErrorLayer`:
//!
//! ```ignore
//! use tracing_subscriber::prelude::*;
//! use tracing_error::ErrorLayer;
//!
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(ErrorLayer::default())
//!     .with(sentry::integrations::tracing::layer())
//!     .init();
//! ```

use std::collections::BTreeMap;

use sentry_core::{Breadcrumb, protocol::Value};

use crate::error::Error;

const BODY_PREVIEW_LEN: usize = 500;

/// Records an error as a Sentry breadcrumb, keeping the remote status and URL.
impl<'a> From<&'a Error> for Breadcrumb {
    fn from(error: &'a Error) -> Self {
        let category = match error {
            Error::Request(_) => "http.request",
            Error::RateLimitExceeded { .. } => "xero.rate_limit",
            Error::Unauthorized { .. }
            | Error::Forbidden { .. }
            | Error::NotVerified
            | Error::AccessDenied(_)
            | Error::Credentials(_)
            | Error::OAuth2(_)
            | Error::InvalidRsaKey(_)
            | Error::CallbackServer(_) => "auth",
            Error::InvalidEndpoint | Error::Configuration(_) => "xero.config",
            Error::TenantIdNotSet
            | Error::InvalidIdempotencyKey(_)
            | Error::InvalidFilter(_)
            | Error::InvalidArgument(_)
            | Error::UnsupportedOperation { .. } => "xero.validation",
            Error::Xml(_) | Error::Json(_) => "xero.document",
            _ => "xero.api",
        };

        let mut data = BTreeMap::new();
        if let Some(url) = error.url() {
            data.insert("url".to_owned(), Value::from(url.to_string()));
        }
        if let Some(status) = error.status_code() {
            data.insert("status_code".to_owned(), Value::from(status.as_u16()));
        }
        if let Some(problem) = error.problem() {
            data.insert("problem".to_owned(), Value::from(problem.to_owned()));
        }
        if let Error::RateLimitExceeded {
            limit: Some(limit), ..
        } = error
        {
            data.insert("limit".to_owned(), Value::from(limit.clone()));
        }

        Breadcrumb {
            ty: "error".to_owned(),
            category: Some(category.to_owned()),
            message: Some(error.to_string()),
            data,
            level: sentry_core::Level::Error,
            ..Default::default()
        }
    }
}

/// Extra context for a Sentry event.
///
/// ```ignore
/// use sentry::configure_scope;
/// use xero_connect::sentry_integration::error_to_sentry_context;
///
/// if let Err(e) = xero.invoices().all().await {
///     configure_scope(|scope| {
///         for (key, value) in error_to_sentry_context(&e) {
///             scope.set_extra(&key, value);
///         }
///     });
/// }
/// ```
#[must_use]
pub fn error_to_sentry_context(error: &Error) -> BTreeMap<String, Value> {
    let mut context = BTreeMap::new();

    if let Some(span_trace) = error.span_trace() {
        context.insert(
            "xero.span_trace".to_owned(),
            Value::from(format!("{span_trace}")),
        );
    }
    if let Some(url) = error.url() {
        context.insert("xero.url".to_owned(), Value::from(url.to_string()));
    }
    if let Some(status) = error.status_code() {
        context.insert("xero.status_code".to_owned(), Value::from(status.as_u16()));
    }
    if let Some(body) = error.response_body() {
        let preview: String = body.chars().take(BODY_PREVIEW_LEN).collect();
        let preview = if preview.len() < body.len() {
            format!("{preview}...")
        } else {
            preview
        };
        context.insert("xero.response_body".to_owned(), Value::from(preview));
    }
    if !error.errors().is_empty() {
        context.insert(
            "xero.errors".to_owned(),
            Value::from(error.errors().to_vec()),
        );
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_errors_have_no_remote_context() {
        let error = Error::TenantIdNotSet;
        let crumb = Breadcrumb::from(&error);
        assert_eq!(crumb.category.as_deref(), Some("xero.validation"));
        assert!(crumb.data.is_empty());
        assert!(error_to_sentry_context(&error).is_empty());
    }
}
