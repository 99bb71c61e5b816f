// Module: Transport
// The HTTP boundary of the engine. The runner only sees the trait, so tests
// can script responses and callers can plug their own client.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::ErrorCode;
use crate::protocol::HeaderItem;

/// Fully resolved request: every `{token}` has already been substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<HeaderItem>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
}

/// Failure of the call itself. Localized to one test, never aborts a run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl TransportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::HTTP_TIMEOUT,
            Self::Connection(_) => ErrorCode::HTTP_CONNECTION_ERROR,
            Self::InvalidRequest(_) => ErrorCode::HTTP_INVALID_REQUEST,
            Self::Body(_) => ErrorCode::HTTP_BODY_ERROR,
        }
    }
}

/// Contract for whatever sends requests on behalf of the runner.
///
/// Requires Send + Sync so one transport can be shared by every worker.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

    /// In-process transport answering from a closure and recording every request.
    pub(crate) struct ScriptedTransport {
        handler: Box<Handler>,
        delay: Duration,
        pub(crate) requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new<F>(handler: F) -> Self
        where
            F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Every call takes at least `delay`.
        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn urls(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect()
        }
    }

    pub(crate) fn ok(status_code: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status_code,
            body: body.to_string(),
        })
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.handler)(request)
        }
    }
}
