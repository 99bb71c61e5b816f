use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::{Duration, Instant};

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Transport backed by a shared reqwest client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::Connection(error.to_string())
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else if error.is_body() || error.is_decode() {
        TransportError::Body(error.to_string())
    } else {
        TransportError::Connection(error.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[tracing::instrument(name = "http_call", skip_all, fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = Method::from_bytes(request.method.trim().to_uppercase().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("Invalid HTTP method: {}", e)))?;

        let mut builder = self.client.request(method, &request.url);
        for header in &request.headers {
            builder = builder.header(header.key.as_str(), header.value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(classify)?;

        let status_code = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        let elapsed = start.elapsed();

        tracing::debug!(status = status_code, elapsed_ms = elapsed.as_millis() as u64, "HTTP call finished");

        Ok(HttpResponse { status_code, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HeaderItem;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(header("X-Api-Key", "k1"))
            .and(body_string("user=bob"))
            .respond_with(ResponseTemplate::new(201).set_body_string("token=abc123"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let request = HttpRequest {
            method: "post".to_string(),
            url: format!("{}/login", server.uri()),
            headers: vec![HeaderItem::new("X-Api-Key", "k1")],
            body: Some("user=bob".to_string()),
        };

        let response = transport.send(&request).await.unwrap();

        assert_eq!(response.status_code, 201);
        assert_eq!(response.body, "token=abc123");
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let request = HttpRequest {
            method: "GET".to_string(),
            url: server.uri(),
            headers: vec![],
            body: None,
        };

        let response = transport.send(&request).await.unwrap();
        assert_eq!(response.status_code, 500);
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_millis(50)).unwrap();
        let request = HttpRequest {
            method: "GET".to_string(),
            url: server.uri(),
            headers: vec![],
            body: None,
        };

        let err = transport.send(&request).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert_eq!(err.code().formatted(), "E2001");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();
        let request = HttpRequest {
            method: "GET".to_string(),
            url: "http://127.0.0.1:1/".to_string(),
            headers: vec![],
            body: None,
        };

        assert!(transport.send(&request).await.is_err());
    }
}
