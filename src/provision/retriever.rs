use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ProvisionError;

/// Source of raw archive bytes for the provisioning engine.
#[async_trait]
pub trait Retrieve: Send + Sync {
    async fn retrieve(&self) -> Result<Vec<u8>, ProvisionError>;
}

/// Downloads the archive with an HTTP GET.
///
/// Anything other than a 200 response fails, and a bad status is reported
/// separately from a transport failure.
pub struct UrlRetriever {
    client: reqwest::Client,
    url: String,
}

impl UrlRetriever {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Retrieve for UrlRetriever {
    async fn retrieve(&self) -> Result<Vec<u8>, ProvisionError> {
        debug!(url = %self.url, "Downloading runtime archive");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProvisionError::Http {
                url: self.url.clone(),
                source: e,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ProvisionError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| ProvisionError::Http {
            url: self.url.clone(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}

/// Reads the archive from a local or staged path.
pub struct FileRetriever {
    path: PathBuf,
}

impl FileRetriever {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Retrieve for FileRetriever {
    async fn retrieve(&self) -> Result<Vec<u8>, ProvisionError> {
        debug!(path = %self.path.display(), "Reading runtime archive");
        Ok(tokio::fs::read(&self.path).await?)
    }
}

/// Tries a list of retrievers in order, returning the first success.
///
/// When every retriever fails, the combined error keeps each underlying
/// cause in try-order.
#[derive(Default)]
pub struct FallbackRetriever {
    chain: Vec<Box<dyn Retrieve>>,
}

impl FallbackRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, retriever: impl Retrieve + 'static) {
        self.chain.push(Box::new(retriever));
    }

    pub fn push_boxed(&mut self, retriever: Box<dyn Retrieve>) {
        self.chain.push(retriever);
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

#[async_trait]
impl Retrieve for FallbackRetriever {
    async fn retrieve(&self) -> Result<Vec<u8>, ProvisionError> {
        let mut causes = Vec::new();
        for retriever in &self.chain {
            match retriever.retrieve().await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    warn!("Archive retriever failed: {}", e);
                    causes.push(e);
                }
            }
        }
        Err(ProvisionError::RetrieversExhausted(causes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<u8>);

    #[async_trait]
    impl Retrieve for Fixed {
        async fn retrieve(&self) -> Result<Vec<u8>, ProvisionError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl Retrieve for Failing {
        async fn retrieve(&self) -> Result<Vec<u8>, ProvisionError> {
            Err(ProvisionError::Finalize("out of order".into()))
        }
    }

    #[tokio::test]
    async fn fallback_returns_first_success() {
        let mut chain = FallbackRetriever::new();
        chain.push(Failing);
        chain.push(Failing);
        chain.push(Fixed(b"archive".to_vec()));

        let data = chain.retrieve().await.unwrap();
        assert_eq!(data, b"archive");
    }

    #[tokio::test]
    async fn fallback_preserves_every_cause() {
        let mut chain = FallbackRetriever::new();
        chain.push(Failing);
        chain.push(Failing);
        chain.push(Failing);

        match chain.retrieve().await {
            Err(ProvisionError::RetrieversExhausted(causes)) => assert_eq!(causes.len(), 3),
            other => panic!("expected exhausted error, got {:?}", other.map(|d| d.len())),
        }
    }

    #[tokio::test]
    async fn file_retriever_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        std::fs::write(&path, b"zipbytes").unwrap();

        let data = FileRetriever::new(&path).retrieve().await.unwrap();
        assert_eq!(data, b"zipbytes");
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileRetriever::new(dir.path().join("gone.zip")).retrieve().await;
        assert!(matches!(result, Err(ProvisionError::Io(_))));
    }
}
