//! OAuth2 with PKCE for desktop and command line applications.
//!
//! `logon` opens the authorize URL in a browser and runs a loopback `warp` listener
//! until Xero redirects back to `/callback`.

use std::net::SocketAddr;

use oauth2::{PkceCodeChallenge, PkceCodeVerifier};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::{mpsc, oneshot};
use url::Url;
use warp::{Filter, http::StatusCode};

use super::oauth2::{OAuth2Credentials, OAuth2State, Tenant};
use super::{Authorize, Signer};
use crate::endpoints::Endpoints;
use crate::error::{Error, Result};
use crate::oauth::{KeyPair, OAuth2Token};
use crate::scope::Scope;

pub const DEFAULT_PKCE_PORT: u16 = 8080;

/// Random bytes behind a generated verifier; Xero wants 43 to 128 characters.
const VERIFIER_BYTES: u32 = 64;

const CALLBACK_PATH: &str = "/callback";

/// Opens the authorization URL for the user.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &Url) -> Result<()>;
}

/// Launches the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &Url) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            std::process::Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut command = std::process::Command::new("cmd");
            command.args(["/C", "start", ""]);
            command
        } else {
            std::process::Command::new("xdg-open")
        };
        command
            .arg(url.as_str())
            .spawn()
            .map_err(|e| Error::CallbackServer(format!("unable to open a browser: {e}")))?;
        Ok(())
    }
}

/// Only logs the URL, for headless environments where the user copies it by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBrowserOpener;

impl BrowserOpener for LogBrowserOpener {
    fn open(&self, url: &Url) -> Result<()> {
        info!(%url, "open this URL to authorize the application");
        Ok(())
    }
}

/// Renders the pages shown in the browser once the callback has been handled.
pub trait CallbackResponder: Send + Sync {
    fn error_page(&self, error: &str) -> String;

    fn success_page(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResponder;

impl CallbackResponder for DefaultResponder {
    fn error_page(&self, error: &str) -> String {
        let escaped = error
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        format!(
            "<html><head><title>Login failed</title></head>\
             <body><h1>Login failed</h1><p>{escaped}</p></body></html>"
        )
    }

    fn success_page(&self) -> String {
        "<html><head><title>Login successful</title></head>\
         <body><h1>Login successful</h1><p>You may close this window.</p></body></html>"
            .to_owned()
    }
}

struct Page {
    status: StatusCode,
    body: String,
}

/// One request received by the loopback listener.
struct Callback {
    path: String,
    query: Vec<(String, String)>,
    reply: oneshot::Sender<Page>,
}

impl Callback {
    fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn respond(self, status: StatusCode, body: String) {
        if self.reply.send(Page { status, body }).is_err() {
            warn!("callback connection closed before the response was sent");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceState {
    #[serde(flatten)]
    pub oauth2: OAuth2State,
    pub port: u16,
    pub verifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2PkceCredentials {
    inner: OAuth2Credentials,
    port: u16,
    verifier: String,
}

impl OAuth2PkceCredentials {
    /// Public-client credentials redirecting to `http://localhost:{port}/callback`.
    #[must_use]
    pub fn new(client_id: impl Into<String>, port: u16, scope: Option<Scope>) -> Self {
        let (_, verifier) = PkceCodeChallenge::new_random_sha256_len(VERIFIER_BYTES);
        let verifier = verifier.secret().clone();
        Self {
            inner: OAuth2Credentials::new(
                KeyPair::new(client_id.into(), None),
                Some(format!("http://localhost:{port}{CALLBACK_PATH}")),
                scope,
            ),
            port,
            verifier,
        }
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.verifier = verifier.into();
        self
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.inner = self.inner.with_endpoints(endpoints);
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.inner = self.inner.with_user_agent(user_agent);
        self
    }

    #[must_use]
    pub fn with_auth_state(mut self, auth_state: impl Into<String>) -> Self {
        self.inner = self.inner.with_auth_state(auth_state);
        self
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The S256 challenge derived from the verifier.
    #[must_use]
    pub fn challenge(&self) -> PkceCodeChallenge {
        PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(
            self.verifier.clone(),
        ))
    }

    /// The authorize URL carrying the code challenge; stores the generated state.
    pub fn generate_url(&mut self) -> Result<Url> {
        let challenge = self.challenge();
        let (url, _) = self.inner.authorization_url(Some(challenge))?;
        Ok(url)
    }

    /// Runs the whole interactive flow and waits for the callback.
    #[instrument(skip(self, browser, responder))]
    pub async fn logon(
        &mut self,
        browser: &dyn BrowserOpener,
        responder: &dyn CallbackResponder,
    ) -> Result<()> {
        let url = self.generate_url()?;

        let (callbacks_tx, mut callbacks) = mpsc::channel::<Callback>(8);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let route = warp::get()
            .and(warp::path::full())
            .and(warp::query::<Vec<(String, String)>>())
            .and_then(move |path: warp::path::FullPath, query| {
                let callbacks_tx = callbacks_tx.clone();
                async move {
                    let (reply, page) = oneshot::channel();
                    callbacks_tx
                        .send(Callback {
                            path: path.as_str().to_owned(),
                            query,
                            reply,
                        })
                        .await
                        .map_err(|_| warp::reject::not_found())?;
                    let page = page.await.map_err(|_| warp::reject::not_found())?;
                    Ok::<_, warp::Rejection>(warp::reply::with_status(
                        warp::reply::html(page.body),
                        page.status,
                    ))
                }
            });

        let address = SocketAddr::from(([127, 0, 0, 1], self.port));
        let (bound, server) = warp::serve(route)
            .try_bind_with_graceful_shutdown(address, async {
                shutdown_rx.await.ok();
            })
            .map_err(|e| Error::CallbackServer(e.to_string()))?;
        debug!(%bound, "pkce callback listener started");
        let server = tokio::spawn(server);

        let outcome = match browser.open(&url) {
            Ok(()) => self.wait_for_callback(&mut callbacks, responder).await,
            Err(e) => Err(e),
        };

        shutdown_tx.send(()).ok();
        if let Err(e) = server.await {
            warn!(error = %e, "pkce callback listener did not shut down cleanly");
        }
        outcome
    }

    async fn wait_for_callback(
        &mut self,
        callbacks: &mut mpsc::Receiver<Callback>,
        responder: &dyn CallbackResponder,
    ) -> Result<()> {
        while let Some(callback) = callbacks.recv().await {
            if callback.path != CALLBACK_PATH {
                debug!(path = %callback.path, "ignoring request to unknown path");
                callback.respond(StatusCode::NOT_FOUND, responder.error_page("Unknown endpoint"));
                continue;
            }

            if let Some(error) = callback.param("error").map(str::to_owned) {
                callback.respond(StatusCode::BAD_REQUEST, responder.error_page(&error));
                return Err(Error::AccessDenied(error));
            }
            if let Err(e) = self.inner.check_state(callback.param("state")) {
                callback.respond(StatusCode::BAD_REQUEST, responder.error_page("State Mismatch"));
                return Err(e);
            }
            let Some(code) = callback.param("code").map(str::to_owned) else {
                let message = "Missing authorization code";
                callback.respond(StatusCode::BAD_REQUEST, responder.error_page(message));
                return Err(Error::AccessDenied(message.to_owned()));
            };

            let verifier = PkceCodeVerifier::new(self.verifier.clone());
            return match self.inner.exchange_code(code, Some(verifier)).await {
                Ok(()) => {
                    callback.respond(StatusCode::OK, responder.success_page());
                    debug!("pkce credentials verified");
                    Ok(())
                }
                Err(e) => {
                    let message = e.to_string();
                    callback.respond(StatusCode::BAD_REQUEST, responder.error_page(&message));
                    Err(Error::AccessDenied(message))
                }
            };
        }
        Err(Error::CallbackServer(
            "callback listener stopped before a callback arrived".to_owned(),
        ))
    }

    /// Refreshes with the public-client grant; no client secret is needed.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<OAuth2Token> {
        self.inner.refresh_grant().await
    }

    pub async fn get_tenants(&self, auth_event_id: Option<&str>) -> Result<Vec<Tenant>> {
        self.inner.get_tenants(auth_event_id).await
    }

    pub async fn set_default_tenant(&mut self) -> Result<()> {
        self.inner.set_default_tenant().await
    }

    pub fn set_tenant_id(&mut self, tenant_id: Option<String>) {
        self.inner.set_tenant_id(tenant_id);
    }

    #[must_use]
    pub fn token(&self) -> Option<&OAuth2Token> {
        self.inner.token()
    }

    pub fn expires_at(&self) -> Result<OffsetDateTime> {
        self.inner.expires_at()
    }

    pub fn expired(&self, grace: Duration, now: Option<OffsetDateTime>) -> Result<bool> {
        self.inner.expired(grace, now)
    }

    #[must_use]
    pub fn state(&self) -> PkceState {
        PkceState {
            oauth2: self.inner.state(),
            port: self.port,
            verifier: self.verifier.clone(),
        }
    }

    #[must_use]
    pub fn from_state(state: PkceState) -> Self {
        Self {
            inner: OAuth2Credentials::from_state(state.oauth2),
            port: state.port,
            verifier: state.verifier,
        }
    }
}

impl Authorize for OAuth2PkceCredentials {
    fn oauth(&self) -> Result<Signer> {
        self.inner.oauth()
    }

    fn requires_tenant(&self) -> bool {
        true
    }

    fn tenant_id(&self) -> Option<&str> {
        self.inner.tenant_id()
    }

    fn user_agent(&self) -> Option<&str> {
        Authorize::user_agent(&self.inner)
    }

    fn endpoints(&self) -> &Endpoints {
        self.inner.endpoints()
    }
}
