//! OAuth2 grant requests against the hub token endpoint.
//!
//! Every grant is a form-encoded `POST` to `{serverUri}/api/rest/oauth2/token`
//! authenticated with the client's Basic credentials. Values are
//! percent-encoded with URI-component rules, so a space becomes `%20`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use tracing::{debug, info};

use super::error::{error_in_body, response_details};
use super::{AuthError, AuthParams};
use crate::api::{HttpRequest, HttpResponse, HttpTransport};
use crate::config::ServerConfig;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Length of the random `state` sent in the code flow
const STATE_LENGTH: usize = 32;

/// `Basic base64(clientId:clientSecret)`, independent of any user credential
pub fn basic_auth_header(config: &ServerConfig) -> String {
    let pair = format!("{}:{}", config.client_id, config.client_secret);
    format!("Basic {}", STANDARD.encode(pair))
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn join_form(fields: &[(&str, String)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn password_grant_body(login: &str, password: &str, scopes: &str) -> String {
    join_form(&[
        ("grant_type", "password".to_string()),
        ("access_type", "offline".to_string()),
        ("username", encode(login)),
        ("password", encode(password)),
        ("scope", encode(scopes)),
    ])
}

/// The landing URL is sent exactly as configured.
pub fn code_grant_body(code: &str, config: &ServerConfig) -> String {
    join_form(&[
        ("grant_type", "authorization_code".to_string()),
        ("code", encode(code)),
        ("client_id", encode(&config.client_id)),
        ("client_secret", encode(&config.client_secret)),
        ("redirect_uri", config.landing_url.clone()),
    ])
}

pub fn refresh_grant_body(refresh_token: &str) -> String {
    join_form(&[
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", encode(refresh_token)),
    ])
}

pub fn token_request(config: &ServerConfig, body: String) -> HttpRequest {
    HttpRequest::post(config.token_url())
        .header("Authorization", basic_auth_header(config))
        .header("Content-Type", FORM_CONTENT_TYPE)
        .body(body)
}

/// Where the user is sent to approve the client in the code flow
pub fn authorization_url(config: &ServerConfig, state: &str) -> String {
    let query = join_form(&[
        ("response_type", "code".to_string()),
        ("access_type", "offline".to_string()),
        ("client_id", encode(&config.client_id)),
        ("redirect_uri", encode(&config.landing_url)),
        ("scope", encode(&config.scopes)),
        ("state", encode(state)),
        ("request_credentials", "default".to_string()),
    ]);
    format!("{}?{}", config.authorize_url(), query)
}

/// Random alphanumeric `state` for the code flow
pub fn new_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// Map a token endpoint response to a credential or an `AuthServer` error
pub fn parse_token_response(response: &HttpResponse) -> Result<AuthParams, AuthError> {
    let status = response.status;
    if !status.is_success() {
        return Err(AuthError::AuthServer {
            status,
            details: response_details(&response.body),
        });
    }
    if let Some(details) = error_in_body(&response.body) {
        return Err(AuthError::AuthServer { status, details });
    }

    let params: AuthParams = response
        .json()
        .map_err(|e| AuthError::InvalidResponse(format!("token response: {}", e)))?;
    Ok(params.stamped())
}

async fn request_token(
    transport: &dyn HttpTransport,
    config: &ServerConfig,
    grant: &str,
    body: String,
) -> Result<AuthParams, AuthError> {
    debug!(grant, url = %config.token_url(), "Requesting token");
    let response = transport.send(token_request(config, body)).await?;
    parse_token_response(&response)
}

pub async fn obtain_token_by_credentials(
    transport: &dyn HttpTransport,
    config: &ServerConfig,
    login: &str,
    password: &str,
) -> Result<AuthParams, AuthError> {
    let body = password_grant_body(login, password, &config.scopes);
    let params = request_token(transport, config, "password", body).await?;
    info!("Token obtained with login/password");
    Ok(params)
}

pub async fn obtain_token_by_oauth_code(
    transport: &dyn HttpTransport,
    config: &ServerConfig,
    code: &str,
) -> Result<AuthParams, AuthError> {
    let body = code_grant_body(code, config);
    let params = request_token(transport, config, "authorization_code", body).await?;
    info!("Token obtained with authorization code");
    Ok(params)
}

/// Refresh grant. Rejections surface as `AuthError::Refresh`.
pub async fn refresh_access_token(
    transport: &dyn HttpTransport,
    config: &ServerConfig,
    refresh_token: &str,
) -> Result<AuthParams, AuthError> {
    request_token(transport, config, "refresh_token", refresh_grant_body(refresh_token))
        .await
        .map_err(AuthError::into_refresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeTransport;
    use reqwest::{Method, StatusCode};
    use serde_json::json;

    fn config_mock() -> ServerConfig {
        ServerConfig {
            server_uri: "http://fake-hub.ru".to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            scopes: "scope1 scope2".to_string(),
            landing_url: "ytoauth://landing.url".to_string(),
        }
    }

    fn token_ok() -> FakeTransport {
        FakeTransport::always(
            200,
            json!({"access_token": "fake-access-token", "refresh_token": "fake-refresh-token", "token_type": "bearer"}),
        )
    }

    #[tokio::test]
    async fn test_authorize_via_login_password() {
        let transport = token_ok();
        let params = obtain_token_by_credentials(&transport, &config_mock(), "log", "pass")
            .await
            .expect("token");
        assert_eq!(params.access_token, "fake-access-token");

        let request = transport.last_request();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "http://fake-hub.ru/api/rest/oauth2/token");
        assert_eq!(
            request.body.as_deref(),
            Some("grant_type=password&access_type=offline&username=log&password=pass&scope=scope1%20scope2")
        );
        assert_eq!(
            request.header_value("Authorization"),
            Some("Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=")
        );
        assert_eq!(
            request.header_value("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[tokio::test]
    async fn test_encodes_credentials() {
        let transport = token_ok();
        obtain_token_by_credentials(&transport, &config_mock(), "lo$g", "pa%ss")
            .await
            .expect("token");

        assert_eq!(
            transport.last_request().body.as_deref(),
            Some("grant_type=password&access_type=offline&username=lo%24g&password=pa%25ss&scope=scope1%20scope2")
        );
    }

    #[test]
    fn test_password_body_encodes_reserved_characters() {
        let body = password_grant_body("a&b=c d", "p+/?#", "s");
        assert_eq!(
            body,
            "grant_type=password&access_type=offline&username=a%26b%3Dc%20d&password=p%2B%2F%3F%23&scope=s"
        );
    }

    #[tokio::test]
    async fn test_basic_header_ignores_user_credentials() {
        for (login, password) in [("log", "pass"), ("other@example.com", "s3cr3t!"), ("", "")] {
            let transport = token_ok();
            obtain_token_by_credentials(&transport, &config_mock(), login, password)
                .await
                .expect("token");
            assert_eq!(
                transport.last_request().header_value("authorization"),
                Some("Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=")
            );
        }
    }

    #[tokio::test]
    async fn test_authorize_oauth2_code() {
        let transport = token_ok();
        obtain_token_by_oauth_code(&transport, &config_mock(), "fake-code")
            .await
            .expect("token");

        let request = transport.last_request();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "http://fake-hub.ru/api/rest/oauth2/token");
        assert_eq!(
            request.header_value("Authorization"),
            Some("Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=")
        );
        assert_eq!(
            request.body.as_deref(),
            Some("grant_type=authorization_code&code=fake-code&client_id=client-id&client_secret=client-secret&redirect_uri=ytoauth://landing.url")
        );
    }

    #[tokio::test]
    async fn test_refresh_grant_body() {
        let transport = token_ok();
        refresh_access_token(&transport, &config_mock(), "fake-refresh-token")
            .await
            .expect("token");
        assert_eq!(
            transport.last_request().body.as_deref(),
            Some("grant_type=refresh_token&refresh_token=fake-refresh-token")
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_auth_server_error() {
        let transport = FakeTransport::always(
            401,
            json!({"error": "invalid_grant", "error_description": "Bad credentials"}),
        );
        let err = obtain_token_by_credentials(&transport, &config_mock(), "log", "wrong")
            .await
            .expect_err("should fail");
        match err {
            AuthError::AuthServer { status, details } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(details, "Bad credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_coded_success_body_is_auth_server_error() {
        let transport = FakeTransport::always(200, json!({"error_code": 500}));
        let err = obtain_token_by_oauth_code(&transport, &config_mock(), "code")
            .await
            .expect_err("should fail");
        assert!(matches!(err, AuthError::AuthServer { status: StatusCode::OK, .. }));
    }

    #[tokio::test]
    async fn test_refresh_rejection_is_refresh_error() {
        let transport = FakeTransport::always(400, json!({"error": "invalid_grant"}));
        let err = refresh_access_token(&transport, &config_mock(), "stale")
            .await
            .expect_err("should fail");
        assert!(matches!(err, AuthError::Refresh { status: StatusCode::BAD_REQUEST, .. }));
    }

    #[tokio::test]
    async fn test_unparseable_token_response() {
        let transport = FakeTransport::always(200, json!({"unexpected": true}));
        let err = obtain_token_by_credentials(&transport, &config_mock(), "log", "pass")
            .await
            .expect_err("should fail");
        assert!(matches!(err, AuthError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let transport =
            FakeTransport::new(|_| Err(crate::api::TransportError::Other("connection refused".into())));
        let err = obtain_token_by_credentials(&transport, &config_mock(), "log", "pass")
            .await
            .expect_err("should fail");
        assert!(matches!(err, AuthError::Network(_)));
    }

    #[test]
    fn test_authorization_url() {
        let url = authorization_url(&config_mock(), "abc123");
        assert_eq!(
            url,
            "http://fake-hub.ru/api/rest/oauth2/auth?response_type=code&access_type=offline\
             &client_id=client-id&redirect_uri=ytoauth%3A%2F%2Flanding.url&scope=scope1%20scope2\
             &state=abc123&request_credentials=default"
        );
    }

    #[test]
    fn test_new_state() {
        let a = new_state();
        let b = new_state();
        assert_eq!(a.len(), STATE_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
