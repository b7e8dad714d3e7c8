use miette::{IntoDiagnostic, Result};
use serde_json::json;
use wiremock::matchers::{header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use xero_connect::{
    Error, PartnerCredentials, PrivateCredentials, PublicCredentials, Xero,
    credentials::Authorize,
};

mod test_utils;

use test_utils::{RSA_KEY, mock_endpoints};

fn form(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "application/x-www-form-urlencoded")
        .set_body_string(body)
}

#[tokio::test]
async fn public_flow_signs_with_the_access_token() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/RequestToken"))
        .and(header_regex("Authorization", r#"oauth_callback="https%3A%2F%2Fapp.example.com%2Fcb""#))
        .and(header_regex("Authorization", r#"oauth_signature_method="HMAC-SHA1""#))
        .respond_with(form(
            "oauth_token=request-token&oauth_token_secret=request-secret&oauth_callback_confirmed=true",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/AccessToken"))
        .and(header_regex("Authorization", r#"oauth_verifier="8675309""#))
        .and(header_regex("Authorization", r#"oauth_token="request-token""#))
        .respond_with(form(
            "oauth_token=access-token&oauth_token_secret=access-secret&oauth_expires_in=1800",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api.xro/2.0/Organisations"))
        .and(header_regex("Authorization", r#"^OAuth .*oauth_token="access-token""#))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_json(json!({"Status": "OK", "Organisations": [{"Name": "Demo"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut credentials = PublicCredentials::initiate(
        "consumer-key",
        "consumer-secret",
        Some("https://app.example.com/cb".to_owned()),
        Some("payroll.employees".to_owned()),
        Some(mock_endpoints(&server)),
    )
    .await
    .into_diagnostic()?;

    assert!(!credentials.verified());
    assert!(matches!(credentials.oauth(), Err(Error::NotVerified)));
    assert_eq!(
        credentials.url().into_diagnostic()?.as_str(),
        format!(
            "{}/oauth/Authorize?oauth_token=request-token&scope=payroll.employees",
            server.uri()
        )
    );

    credentials.verify("8675309").await.into_diagnostic()?;
    assert!(credentials.verified());
    assert!(!credentials.expired(time::Duration::seconds(30), None).into_diagnostic()?);
    assert!(credentials
        .expired(
            time::Duration::seconds(30),
            Some(time::OffsetDateTime::now_utc() + time::Duration::seconds(1790)),
        )
        .into_diagnostic()?);

    // OAuth1 applications are bound to one organisation, so no tenant is needed
    let xero = Xero::new(credentials).into_diagnostic()?;
    xero.organisations().all().await.into_diagnostic()?;
    Ok(())
}

#[tokio::test]
async fn token_endpoint_problems_are_classified() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/RequestToken"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("Content-Type", "text/html; charset=utf-8")
                .set_body_string(
                    "oauth_problem=consumer_key_unknown&oauth_problem_advice=Consumer%20key%20was%20not%20recognised",
                ),
        )
        .mount(&server)
        .await;

    let result = PublicCredentials::initiate(
        "wrong-key",
        "secret",
        None,
        None,
        Some(mock_endpoints(&server)),
    )
    .await;
    match result {
        Err(Error::Unauthorized { message, problem, .. }) => {
            assert_eq!(message, "Consumer key was not recognised");
            assert_eq!(problem.as_deref(), Some("consumer_key_unknown"));
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn partner_refresh_keeps_the_session_handle() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/RequestToken"))
        .and(header_regex("Authorization", r#"oauth_signature_method="RSA-SHA1""#))
        .respond_with(form("oauth_token=request-token&oauth_token_secret=request-secret"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/AccessToken"))
        .and(query_param("oauth_session_handle", "handle-1"))
        .and(header_regex("Authorization", r#"oauth_token="access-token""#))
        .respond_with(form("oauth_token=access-token-2&oauth_token_secret=access-secret-2"))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/AccessToken"))
        .respond_with(form(
            "oauth_token=access-token&oauth_token_secret=access-secret&oauth_session_handle=handle-1",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut credentials = PartnerCredentials::initiate(
        "consumer-key",
        "consumer-secret",
        RSA_KEY,
        None,
        None,
        Some(mock_endpoints(&server)),
    )
    .await
    .into_diagnostic()?;

    match credentials.refresh().await {
        Err(Error::Credentials(message)) => {
            assert_eq!(message, "Cannot refresh token, no session handle is present.");
        }
        other => panic!("expected a credentials error, got {other:?}"),
    }

    credentials.verify("1234").await.into_diagnostic()?;
    assert_eq!(
        credentials.state().oauth_session_handle.as_deref(),
        Some("handle-1")
    );

    credentials.refresh().await.into_diagnostic()?;
    let state = credentials.state();
    assert_eq!(state.public.oauth_token.as_deref(), Some("access-token-2"));
    assert_eq!(state.oauth_session_handle.as_deref(), Some("handle-1"));
    assert!(credentials.verified());
    Ok(())
}

#[tokio::test]
async fn private_credentials_sign_with_the_consumer_key() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api.xro/2.0/Accounts"))
        .and(header_regex("Authorization", r#"oauth_signature_method="RSA-SHA1""#))
        .and(header_regex("Authorization", r#"oauth_token="consumer-key""#))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_json(json!({"Status": "OK", "Accounts": []})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let credentials =
        PrivateCredentials::new("consumer-key", RSA_KEY, Some(mock_endpoints(&server)))
            .into_diagnostic()?;
    assert!(matches!(
        credentials.expired(time::Duration::seconds(30), None),
        Err(Error::Credentials(_))
    ));

    let xero = Xero::new(credentials).into_diagnostic()?;
    xero.accounting("Accounts").all().await.into_diagnostic()?;
    Ok(())
}

#[test]
fn private_credentials_reject_bad_keys() {
    assert!(matches!(
        PrivateCredentials::new("consumer-key", "not a key", None),
        Err(Error::InvalidRsaKey(_))
    ));
}
