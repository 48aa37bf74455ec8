//! Status endpoint client.

use std::{future::Future, time::Duration};

use crate::error::FetchError;

/// Source of status endpoint bodies.
pub trait StatusSource: Send + Sync + 'static {
    /// Fetch one response body.
    fn fetch(&self) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// HTTP status source.
#[derive(Debug, Clone)]
pub struct HttpStatusSource {
    client: reqwest::Client,
    url: String,
}

impl HttpStatusSource {
    /// Build a source for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request { reason: e.to_string() })?;
        Ok(Self { client, url: url.into() })
    }

    /// Endpoint address.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl StatusSource for HttpStatusSource {
    fn fetch(&self) -> impl Future<Output = Result<String, FetchError>> + Send {
        let request = self.client.get(&self.url);
        async move {
            let response =
                request.send().await.map_err(|e| FetchError::Request { reason: e.to_string() })?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status { status: status.as_u16() });
            }
            response.text().await.map_err(|e| FetchError::Body { reason: e.to_string() })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    /// Serve exactly one canned HTTP response.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        format!("http://{addr}/metrics")
    }

    #[tokio::test]
    async fn fetch_returns_body() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-length: 17\r\nconnection: close\r\n\r\n{\"users\":[\"amy\"]}",
        )
        .await;
        let source = HttpStatusSource::new(url, Duration::from_secs(2)).unwrap();

        assert_eq!(source.fetch().await.unwrap(), r#"{"users":["amy"]}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let source = HttpStatusSource::new(url, Duration::from_secs(2)).unwrap();

        assert_eq!(source.fetch().await, Err(FetchError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source =
            HttpStatusSource::new(format!("http://{addr}/metrics"), Duration::from_secs(2)).unwrap();
        assert!(matches!(source.fetch().await, Err(FetchError::Request { .. })));
    }
}
