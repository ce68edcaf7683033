use crate::app::ports::{HttpClientPort, HttpGetResult};
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// reqwest-backed client with a fixed per-request timeout for listings and
/// a separate one for archive downloads. No retries.
pub struct ReqwestHttp {
    client: Client,
    download_timeout: Duration,
}

impl ReqwestHttp {
    pub fn new(request_timeout: Duration, download_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("ans_ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, download_timeout })
    }

    async fn fetch(&self, url: &str, timeout: Option<Duration>) -> Result<HttpGetResult, FetchError> {
        let mut request = self.client.get(url);
        if let Some(t) = timeout {
            request = request.timeout(t);
        }
        let wrap = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let resp = request.send().await.map_err(wrap)?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await.map_err(wrap)?.to_vec();
        Ok(HttpGetResult { status, bytes, content_type })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpGetResult, FetchError> {
        self.fetch(url, None).await
    }

    async fn download(&self, url: &str) -> Result<HttpGetResult, FetchError> {
        self.fetch(url, Some(self.download_timeout)).await
    }
}
