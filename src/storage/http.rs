//! Check files served from a static HTTP location.

use std::time::Duration;

use super::{Index, StorageError, StorageReader, INDEX_NAME};
use crate::model::CheckFile;

/// Reads `<url>/index.json` and `<url>/<name>`, the layout a status page
/// host serves its checks directory with.
#[derive(Debug, Clone)]
pub struct HttpStorage {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStorage {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let base_url = if url.starts_with("http://") || url.starts_with("https://") {
            url.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", url.trim_end_matches('/'))
        };

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { base_url, client })
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    async fn get_bytes(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.client.get(self.url_for(name)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(name.to_string()));
        }
        let body = response.error_for_status()?.bytes().await?;
        Ok(body.to_vec())
    }
}

impl StorageReader for HttpStorage {
    async fn get_index(&self) -> Result<Index, StorageError> {
        let body = self.get_bytes(INDEX_NAME).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch(&self, name: &str) -> Result<CheckFile, StorageError> {
        let body = self.get_bytes(name).await?;
        Ok(CheckFile::parse(name, &body)?)
    }
}
