//! reqwest-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Transport over a pooled `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client })
    }

    /// Wrap an already configured client, sharing its connection pool
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn headers(request: &HttpRequest) -> Result<header::HeaderMap, TransportError> {
        let mut headers = header::HeaderMap::new();
        for (name, value) in &request.headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header name {}: {}", name, e)))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(format!("header value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let headers = Self::headers(&request)?;
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(method = %request.method, url = %request.url, status = status.as_u16(), "HTTP response");

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_converted() {
        let request = HttpRequest::post("http://localhost/token")
            .header("Authorization", "Basic abc")
            .header("Content-Type", "application/x-www-form-urlencoded");

        let headers = ReqwestTransport::headers(&request).expect("valid headers");
        assert_eq!(headers[header::AUTHORIZATION], "Basic abc");
        assert_eq!(headers[header::CONTENT_TYPE], "application/x-www-form-urlencoded");
    }

    #[test]
    fn test_invalid_header_value_is_rejected() {
        let request = HttpRequest::get("http://localhost/").header("Authorization", "bad\nvalue");
        assert!(matches!(
            ReqwestTransport::headers(&request),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
