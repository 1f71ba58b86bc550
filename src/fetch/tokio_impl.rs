//! Tokio filesystem fetcher
//!
//! Reads plain paths and `file:` URIs with `tokio::fs`, reporting progress
//! per chunk read.

use super::{parse_data_uri, strip_query, ByteProgress, FetchError, ResourceFetcher};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Tokio-based filesystem fetcher
///
/// Relative locators are resolved against an optional root directory.
#[derive(Clone, Debug, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    /// Create a fetcher resolving relative paths against the working directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fetcher resolving relative paths against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf, FetchError> {
        let locator = strip_query(locator);
        let path = if let Some(rest) = locator.strip_prefix("file://") {
            rest
        } else if let Some(rest) = locator.strip_prefix("file:") {
            rest
        } else if locator.contains("://") {
            return Err(FetchError::UnsupportedScheme(locator.to_string()));
        } else {
            locator
        };

        let path = Path::new(path);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

#[async_trait::async_trait]
impl ResourceFetcher for FileFetcher {
    async fn fetch(&self, locator: &str, progress: ByteProgress<'_>) -> Result<Vec<u8>, FetchError> {
        if let Some(data_uri) = parse_data_uri(locator)? {
            let len = data_uri.data.len() as u64;
            progress(len, len);
            return Ok(data_uri.data);
        }

        let path = self.resolve(locator)?;
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(locator.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let total = file.metadata().await?.len();
        let mut data = Vec::with_capacity(total as usize);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let read = file.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
            progress(data.len() as u64, total);
        }

        log::debug!("Read {} bytes from {}", data.len(), path.display());
        Ok(data)
    }

    fn fetcher_name(&self) -> &'static str {
        "Tokio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::no_progress;

    #[tokio::test]
    async fn test_file_fetcher_reads_file() {
        let dir = std::env::temp_dir().join(format!("archetype-import-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("model.bin"), [7u8; 100]).await.unwrap();

        let fetcher = FileFetcher::with_root(&dir);
        let data = fetcher.fetch("model.bin", &no_progress).await.unwrap();
        assert_eq!(data.len(), 100);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_fetcher_missing_file() {
        let fetcher = FileFetcher::new();
        let result = fetcher
            .fetch("definitely/not/here.glb", &no_progress)
            .await;
        assert!(matches!(result, Err(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_fetcher_rejects_http() {
        let fetcher = FileFetcher::new();
        let result = fetcher
            .fetch("https://example.com/model.glb", &no_progress)
            .await;
        assert!(matches!(result, Err(FetchError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_fetcher_name() {
        assert_eq!(FileFetcher::new().fetcher_name(), "Tokio");
    }
}
