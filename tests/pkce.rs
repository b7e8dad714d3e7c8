use std::sync::Mutex;

use miette::{IntoDiagnostic, Result};
use serde_json::json;
use tokio::task::JoinHandle;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xero_connect::credentials::{BrowserOpener, DefaultResponder, OAuth2PkceCredentials};
use xero_connect::Error;

mod test_utils;

/// Plays the browser: hits the listener the way Xero's redirect would.
struct RedirectingBrowser {
    port: u16,
    query: fn(&str) -> String,
    visits: Mutex<Option<JoinHandle<Vec<(u16, String)>>>>,
}

impl RedirectingBrowser {
    fn new(port: u16, query: fn(&str) -> String) -> Self {
        Self {
            port,
            query,
            visits: Mutex::new(None),
        }
    }

    async fn responses(&self) -> Vec<(u16, String)> {
        let handle = self.visits.lock().unwrap().take().expect("browser was opened");
        handle.await.unwrap()
    }
}

impl BrowserOpener for RedirectingBrowser {
    fn open(&self, url: &Url) -> xero_connect::Result<()> {
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let base = format!("http://127.0.0.1:{}", self.port);
        let callback = format!("{base}/callback?{}", (self.query)(&state));
        let handle = tokio::spawn(async move {
            let http = reqwest::Client::new();
            let mut responses = Vec::new();
            for target in [format!("{base}/favicon.ico"), callback] {
                let response = http.get(target).send().await.unwrap();
                let status = response.status().as_u16();
                responses.push((status, response.text().await.unwrap()));
            }
            responses
        });
        *self.visits.lock().unwrap() = Some(handle);
        Ok(())
    }
}

#[tokio::test]
async fn logon_exchanges_code_with_verifier() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    let mut credentials = OAuth2PkceCredentials::new("pkce-client", 18_765, None)
        .with_endpoints(test_utils::mock_endpoints(&server));

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=pkce-code"))
        .and(body_string_contains("client_id=pkce-client"))
        .and(body_string_contains(format!("code_verifier={}", credentials.verifier())))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_json(json!({
                    "access_token": "pkce-access",
                    "token_type": "Bearer",
                    "expires_in": 1800,
                    "refresh_token": "pkce-refresh"
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let browser = RedirectingBrowser::new(18_765, |state| format!("code=pkce-code&state={state}"));
    credentials
        .logon(&browser, &DefaultResponder)
        .await
        .into_diagnostic()?;

    let responses = browser.responses().await;
    assert_eq!(responses[0].0, 404);
    assert_eq!(responses[1].0, 200);
    assert_eq!(
        credentials.token().map(|t| t.access_token.as_str()),
        Some("pkce-access")
    );
    Ok(())
}

#[tokio::test]
async fn logon_reports_denied_consent() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut credentials = OAuth2PkceCredentials::new("pkce-client", 18_766, None)
        .with_endpoints(test_utils::mock_endpoints(&server));
    let browser = RedirectingBrowser::new(18_766, |state| {
        format!("error=access_denied&state={state}")
    });

    let result = credentials.logon(&browser, &DefaultResponder).await;
    assert!(matches!(result, Err(Error::AccessDenied(ref e)) if e == "access_denied"));

    let responses = browser.responses().await;
    assert_eq!(responses[1].0, 400);
    assert!(responses[1].1.contains("access_denied"));
    assert!(credentials.token().is_none());
    Ok(())
}

#[tokio::test]
async fn refresh_needs_no_client_secret() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=pkce-client"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_json(json!({
                    "access_token": "pkce-access-2",
                    "token_type": "Bearer",
                    "expires_in": 1800,
                    "refresh_token": "pkce-refresh-2"
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = serde_json::from_value(json!({
        "client_id": "pkce-client",
        "token": {
            "access_token": "pkce-access",
            "token_type": "Bearer",
            "refresh_token": "pkce-refresh",
            "expires_at": 1_700_000_000
        },
        "api_url": server.uri(),
        "token_url": format!("{}/connect/token", server.uri()),
        "port": 18_767,
        "verifier": "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"
    }))
    .into_diagnostic()?;
    let mut credentials = OAuth2PkceCredentials::from_state(state);
    assert!(credentials.expired(time::Duration::seconds(30), None).into_diagnostic()?);

    let token = credentials.refresh().await.into_diagnostic()?;
    assert_eq!(token.access_token, "pkce-access-2");
    assert!(!credentials.expired(time::Duration::seconds(30), None).into_diagnostic()?);
    Ok(())
}
