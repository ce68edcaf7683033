// Pipeline ingestion: quarter discovery, archive download and extraction

pub mod acquisition;
pub mod archive;
pub mod discovery;
pub mod listing;

pub use acquisition::{acquire_quarter, AcquisitionOutcome};
pub use archive::{extract, ExtractedArchive};
pub use discovery::{discover_quarters, DiscoveryOutcome, DiscoverySource};

#[cfg(test)]
pub(crate) mod tests {
    use crate::app::ports::{HttpClientPort, HttpGetResult};
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the remote repository. Unknown URLs behave
    /// like an unreachable host.
    #[derive(Default)]
    pub(crate) struct FakeHttp {
        responses: HashMap<String, HttpGetResult>,
        log: Mutex<Vec<String>>,
    }

    impl FakeHttp {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn page(self, url: &str, html: &str) -> Self {
            self.respond(url, 200, html.as_bytes().to_vec(), "text/html")
        }

        pub(crate) fn bytes(self, url: &str, bytes: &[u8]) -> Self {
            self.respond(url, 200, bytes.to_vec(), "application/zip")
        }

        pub(crate) fn status(self, url: &str, status: u16) -> Self {
            self.respond(url, status, b"error".to_vec(), "text/html")
        }

        fn respond(mut self, url: &str, status: u16, bytes: Vec<u8>, content_type: &str) -> Self {
            self.responses.insert(
                url.to_string(),
                HttpGetResult {
                    status,
                    bytes,
                    content_type: content_type.to_string(),
                },
            );
            self
        }

        pub(crate) fn requested(&self, url: &str) -> bool {
            self.log.lock().unwrap().iter().any(|u| u == url)
        }
    }

    #[async_trait]
    impl HttpClientPort for FakeHttp {
        async fn get(&self, url: &str) -> Result<HttpGetResult, FetchError> {
            self.log.lock().unwrap().push(url.to_string());
            self.responses.get(url).cloned().ok_or_else(|| FetchError::Transport {
                url: url.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }
}
