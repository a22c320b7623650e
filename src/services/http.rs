//! Upstream HTTP fetch capability
//!
//! Everything that talks to a provider goes through [`HttpFetch`], so tests
//! can swap the network for canned responses.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;

use crate::error::{redact_url, TransportError};

/// Status and body of a completed request. Non-2xx statuses are not errors
/// at this layer; callers decide what a status means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, invalid UTF-8 replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed fetcher with a response size cap
pub struct ReqwestFetcher {
    client: Client,
    max_body_bytes: u64,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, max_body_bytes: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .connect_timeout(Duration::from_secs(15))
            // Many IPTV panels run self-signed certificates
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            max_body_bytes,
        })
    }

    fn map_error(url: &str, err: reqwest::Error) -> TransportError {
        let url = redact_url(url);
        if err.is_timeout() {
            TransportError::Timeout { url }
        } else if err.is_connect() {
            TransportError::Connect {
                url,
                message: err.without_url().to_string(),
            }
        } else {
            TransportError::Other {
                url,
                message: err.without_url().to_string(),
            }
        }
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        tracing::debug!(url = %redact_url(url), "Upstream GET");

        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_error(url, e))?;
        let status = response.status().as_u16();

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes {
                return Err(TransportError::BodyTooLarge {
                    url: redact_url(url),
                    limit_bytes: self.max_body_bytes,
                });
            }
        }

        // Chunked responses carry no length; enforce the cap while reading
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::map_error(url, e))?;
            if body.len() as u64 + chunk.len() as u64 > self.max_body_bytes {
                return Err(TransportError::BodyTooLarge {
                    url: redact_url(url),
                    limit_bytes: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse { status, body })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP/1.1 response and returns its URL
    async fn serve_once(head: String, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/list.m3u?username=u&password=p", addr)
    }

    async fn fetch_capped(url: &str) -> Result<HttpResponse, TransportError> {
        let fetcher = ReqwestFetcher::new("test", 64).unwrap();
        fetcher.get(url, &[], Duration::from_secs(5)).await
    }

    fn assert_too_large(result: Result<HttpResponse, TransportError>) {
        let err = result.unwrap_err();
        match &err {
            TransportError::BodyTooLarge { url, limit_bytes } => {
                assert_eq!(*limit_bytes, 64);
                assert!(url.ends_with("/list.m3u"));
            }
            other => panic!("expected BodyTooLarge, got {:?}", other),
        }
        assert!(IngestError::from(err).is_retryable());
    }

    #[tokio::test]
    async fn test_declared_length_over_cap_is_rejected() {
        let body = vec![b'#'; 200];
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let url = serve_once(head, body).await;
        assert_too_large(fetch_capped(&url).await);
    }

    #[tokio::test]
    async fn test_chunked_body_over_cap_is_rejected() {
        let mut body = Vec::new();
        for _ in 0..4 {
            body.extend_from_slice(b"20\r\n");
            body.extend_from_slice(&[b'#'; 32]);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"0\r\n\r\n");
        let head =
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
                .to_string();
        let url = serve_once(head, body).await;
        assert_too_large(fetch_capped(&url).await);
    }

    #[tokio::test]
    async fn test_body_within_cap_is_returned() {
        let head =
            "HTTP/1.1 200 OK\r\nContent-Length: 7\r\nConnection: close\r\n\r\n".to_string();
        let url = serve_once(head, b"#EXTM3U".to_vec()).await;
        let response = fetch_capped(&url).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.text(), "#EXTM3U");
    }

    #[test]
    fn test_response_helpers() {
        let ok = HttpResponse {
            status: 204,
            body: b"caf\xc3\xa9".to_vec(),
        };
        assert!(ok.is_success());
        assert_eq!(ok.text(), "café");

        let redirect = HttpResponse {
            status: 302,
            body: Vec::new(),
        };
        assert!(!redirect.is_success());
    }
}
