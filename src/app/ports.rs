use crate::error::FetchError;
use async_trait::async_trait;

/// Read access to the remote file repository.
///
/// `get` is used for directory listings, `download` for archives, so an
/// implementation can apply a different timeout to each.
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpGetResult, FetchError>;

    async fn download(&self, url: &str) -> Result<HttpGetResult, FetchError> {
        self.get(url).await
    }
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, for HTML listings
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Turns a non-2xx response into an error
    pub fn error_for_status(self, url: &str) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Status {
                url: url.to_string(),
                status: self.status,
            })
        }
    }
}
