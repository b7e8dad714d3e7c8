use std::sync::Once;

use tracing::info;
use wiremock::MockServer;

use xero_connect::{Endpoints, KeyPair, OAuth2Credentials, oauth::OAuth2Token};

/// PKCS#1 key shared by the partner and private credential tests.
#[allow(dead_code)]
pub const RSA_KEY: &str = include_str!("fixtures/private_key.pem");

#[allow(dead_code)]
pub const TENANT_ID: &str = "7c3e2f5a-1b4d-4e8f-9a6c-0d2b8e4f1a3c";

/// Endpoints pointing every base URL at the mock server.
#[allow(dead_code)]
pub fn mock_endpoints(server: &MockServer) -> Endpoints {
    Endpoints::new(server.uri()).with_identity(
        format!("{}/identity/connect/authorize", server.uri()),
        format!("{}/connect/token", server.uri()),
    )
}

#[allow(dead_code)]
pub fn token(access_token: &str) -> OAuth2Token {
    OAuth2Token {
        access_token: access_token.to_owned(),
        token_type: "Bearer".to_owned(),
        refresh_token: Some("refresh-1".to_owned()),
        expires_in: Some(1800),
        expires_at: Some(time::OffsetDateTime::now_utc().unix_timestamp() + 1800),
        scope: None,
        id_token: None,
    }
}

/// Verified OAuth2 credentials with a tenant selected.
#[allow(dead_code)]
pub fn oauth2_credentials(server: &MockServer) -> OAuth2Credentials {
    OAuth2Credentials::new(
        KeyPair::new("client-id".to_owned(), Some("client-secret".to_owned())),
        Some("https://app.example.com/callback".to_owned()),
        None,
    )
    .with_endpoints(mock_endpoints(server))
    .with_token(token("access-1"))
    .with_tenant_id(TENANT_ID)
}

static LOGGING_CONFIGURED: Once = Once::new();

/// Setup before test runs
pub fn do_setup() {
    LOGGING_CONFIGURED.call_once(|| tracing_subscriber::fmt().with_test_writer().init());
    info!("Setting up test environment");
}
