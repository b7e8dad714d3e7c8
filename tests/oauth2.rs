use miette::{IntoDiagnostic, Result};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xero_connect::{Error, KeyPair, OAuth2Credentials, credentials::Authorize};

mod test_utils;

use test_utils::{TENANT_ID, mock_endpoints, oauth2_credentials};

fn token_response(access_token: &str, refresh_token: Option<&str>) -> ResponseTemplate {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 1800,
        "scope": "offline_access accounting.transactions.read"
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "application/json")
        .set_body_json(body)
}

fn unverified(server: &MockServer) -> OAuth2Credentials {
    OAuth2Credentials::new(
        KeyPair::new("client-id".to_owned(), Some("client-secret".to_owned())),
        Some("https://app.example.com/callback".to_owned()),
        None,
    )
    .with_endpoints(mock_endpoints(server))
}

#[tokio::test]
async fn verify_exchanges_the_code() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(token_response("access-2", Some("refresh-2")))
        .expect(1)
        .mount(&server)
        .await;

    let mut credentials = unverified(&server);
    let (url, state) = credentials.generate_url().into_diagnostic()?;
    assert!(url.as_str().starts_with(&format!("{}/identity/connect/authorize?", server.uri())));
    assert!(matches!(credentials.oauth(), Err(Error::NotVerified)));

    credentials
        .verify(&format!(
            "https://app.example.com/callback?code=auth-code&state={}",
            state.secret()
        ))
        .await
        .into_diagnostic()?;

    let token = credentials.token().ok_or_else(|| miette::miette!("no token"))?;
    assert_eq!(token.access_token, "access-2");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-2"));
    assert!(!credentials.expired(time::Duration::seconds(30), None).into_diagnostic()?);
    Ok(())
}

#[tokio::test]
async fn verify_reports_every_failure_as_access_denied() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("Content-Type", "application/json")
                .set_body_json(json!({"error": "invalid_grant"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut credentials = unverified(&server).with_auth_state("expected");

    let denied = credentials
        .verify("https://app.example.com/callback?error=access_denied&state=expected")
        .await;
    assert!(matches!(denied, Err(Error::AccessDenied(ref e)) if e == "access_denied"));

    let mismatch = credentials
        .verify("https://app.example.com/callback?code=abc&state=forged")
        .await;
    assert!(matches!(mismatch, Err(Error::AccessDenied(ref e)) if e == "State Mismatch"));

    let rejected = credentials
        .verify("https://app.example.com/callback?code=abc&state=expected")
        .await;
    assert!(matches!(rejected, Err(Error::AccessDenied(_))));
    assert!(credentials.token().is_none());
    Ok(())
}

#[tokio::test]
async fn refresh_keeps_the_previous_refresh_token() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(token_response("access-3", None))
        .expect(1)
        .mount(&server)
        .await;

    let mut credentials = oauth2_credentials(&server);
    let token = credentials.refresh().await.into_diagnostic()?;
    assert_eq!(token.access_token, "access-3");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(
        credentials.token().map(|t| t.access_token.as_str()),
        Some("access-3")
    );
    Ok(())
}

#[tokio::test]
async fn refresh_preconditions() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut credentials = unverified(&server);
    match credentials.refresh().await {
        Err(Error::Credentials(message)) => {
            assert_eq!(message, "Cannot refresh token, no token is present.");
        }
        other => panic!("expected a credentials error, got {other:?}"),
    }

    let mut public = OAuth2Credentials::new(KeyPair::new("client-id".to_owned(), None), None, None)
        .with_endpoints(mock_endpoints(&server))
        .with_token(test_utils::token("access-1"));
    match public.refresh().await {
        Err(Error::Credentials(message)) => {
            assert_eq!(message, "Cannot refresh token, client_secret must be supplied.");
        }
        other => panic!("expected a credentials error, got {other:?}"),
    }

    let mut no_refresh_token = oauth2_credentials(&server);
    let mut token = test_utils::token("access-1");
    token.refresh_token = None;
    no_refresh_token = no_refresh_token.with_token(token);
    assert!(matches!(
        no_refresh_token.refresh().await,
        Err(Error::Credentials(message)) if message.contains("offline_access")
    ));
    Ok(())
}

#[tokio::test]
async fn default_tenant_is_the_first_connection() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_json(json!([
                    {
                        "id": "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0",
                        "authEventId": "11111111-2222-3333-4444-555555555555",
                        "tenantId": TENANT_ID,
                        "tenantType": "ORGANISATION",
                        "tenantName": "Demo Company (NZ)",
                        "createdDateUtc": "2024-03-01T10:20:30.1234567",
                        "updatedDateUtc": "2024-03-01T10:20:30"
                    },
                    {
                        "id": "9f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0",
                        "authEventId": null,
                        "tenantId": "8c3e2f5a-1b4d-4e8f-9a6c-0d2b8e4f1a3c",
                        "tenantType": "PRACTICEMANAGER"
                    }
                ])),
        )
        .expect(2)
        .mount(&server)
        .await;

    let mut credentials = oauth2_credentials(&server);
    credentials.set_tenant_id(None);

    let tenants = credentials.get_tenants(None).await.into_diagnostic()?;
    assert_eq!(tenants.len(), 2);
    assert_eq!(tenants[0].tenant_name.as_deref(), Some("Demo Company (NZ)"));
    assert!(tenants[1].auth_event_id.is_none());

    credentials.set_default_tenant().await.into_diagnostic()?;
    assert_eq!(credentials.tenant_id(), Some(TENANT_ID));
    Ok(())
}

#[tokio::test]
async fn tenants_can_be_filtered_by_auth_event() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .and(query_param("authEventId", "evt-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_json(json!([])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/connections"))
        .and(query_param("authEventId", "evt-2"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "Type": null,
            "Title": "Unauthorized",
            "Status": 401,
            "Detail": "TokenExpired: token expired at 01/01/2024 00:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = oauth2_credentials(&server);
    assert!(credentials.get_tenants(Some("evt-1")).await.into_diagnostic()?.is_empty());

    match credentials.get_tenants(Some("evt-2")).await {
        Err(error @ Error::Unauthorized { .. }) => {
            assert_eq!(error.problem(), Some("TokenExpired"));
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    Ok(())
}
