//! # xero-connect
//!
//! Credential lifecycle, request signing and wire translation for the Xero API.
//!
//! * [`credentials`] covers OAuth1 public, partner and private applications and the
//!   OAuth2 authorization code and PKCE flows, with serializable state so a flow can be
//!   suspended and resumed.
//! * [`dispatch`] signs requests, enforces tenant and idempotency preconditions and
//!   classifies failures into [`Error`].
//! * [`document`] converts between Xero's XML/JSON bodies and a dynamic [`Value`] tree.
//! * [`filter`] compiles keyword filters into `where`, `order` and `If-Modified-Since`.
//! * [`Xero`] hands out per-resource managers.
//!
//! ## Sentry Integration
//!
//! Remote errors capture a `tracing_error::SpanTrace` when the subscriber includes
//! `ErrorLayer`. With the `sentry` feature, errors convert into breadcrumbs and event
//! context, see [`sentry_integration`](crate::sentry_integration).
//!
//! ```ignore
//! if let Err(e) = xero.invoices().get(invoice_id).await {
//!     if let Some(trace) = e.span_trace() {
//!         eprintln!("Span trace:\n{trace}");
//!     }
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate tracing;

pub mod client;
pub mod credentials;
pub mod dispatch;
pub mod document;
pub mod endpoints;
pub mod error;
pub mod filter;
pub mod manager;
pub mod oauth;
pub mod scope;
pub mod utils;

#[cfg(feature = "sentry")]
pub mod sentry_integration;

pub use client::Xero;
pub use credentials::{
    Authorize, CredentialState, Credentials, OAuth2Credentials, OAuth2PkceCredentials,
    PartnerCredentials, PrivateCredentials, PublicCredentials, Tenant,
};
pub use dispatch::{Dispatcher, Payload, RateLimitInfo, RequestDescriptor};
pub use document::{Document, Value};
pub use endpoints::{Api, Endpoints};
pub use error::{Error, Result};
pub use filter::Filter;
pub use manager::{Attachment, JsonManager, Manager, SaveOptions};
pub use oauth::KeyPair;
pub use scope::{Permission, Scope, ScopeCategory, ScopeType};

pub use tracing_error::SpanTrace;
