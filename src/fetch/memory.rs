//! In-memory resource fetcher
//!
//! Serves resources from a locator → bytes map. Every request is logged so
//! callers (and tests) can check exactly which resources were touched.

use super::{ByteProgress, FetchError, ResourceFetcher};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// Default granularity of progress reports
const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Resource fetcher backed by an in-memory map
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    resources: RwLock<HashMap<String, Vec<u8>>>,
    failures: RwLock<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
    chunk_size: Option<usize>,
}

impl MemoryFetcher {
    /// Create an empty fetcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size of the chunks progress is reported in
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    /// Add a resource (builder style)
    pub fn with_resource(self, locator: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(locator, data);
        self
    }

    /// Add or replace a resource
    pub fn insert(&self, locator: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.resources.write().insert(locator.into(), data.into());
    }

    /// Make every fetch of `locator` fail with a remote error
    pub fn fail(&self, locator: impl Into<String>, message: impl Into<String>) {
        self.failures.write().insert(locator.into(), message.into());
    }

    /// All locators requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Number of fetches issued so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of fetches issued for one locator
    pub fn request_count_for(&self, locator: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|requested| requested.as_str() == locator)
            .count()
    }
}

#[async_trait::async_trait]
impl ResourceFetcher for MemoryFetcher {
    async fn fetch(&self, locator: &str, progress: ByteProgress<'_>) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().push(locator.to_string());

        if let Some(message) = self.failures.read().get(locator) {
            return Err(FetchError::Remote {
                locator: locator.to_string(),
                message: message.clone(),
            });
        }

        let data = self
            .resources
            .read()
            .get(locator)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(locator.to_string()))?;

        let total = data.len() as u64;
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let mut loaded = 0usize;
        while loaded < data.len() {
            loaded = (loaded + chunk_size).min(data.len());
            progress(loaded as u64, total);
        }

        log::debug!("Fetched {locator} from memory ({total} bytes)");
        Ok(data)
    }

    fn fetcher_name(&self) -> &'static str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::no_progress;

    #[test]
    fn test_fetch_existing() {
        let fetcher = MemoryFetcher::new().with_resource("a.bin", vec![1u8, 2, 3]);
        let data = futures::executor::block_on(fetcher.fetch("a.bin", &no_progress)).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(fetcher.requests(), vec!["a.bin".to_string()]);
    }

    #[test]
    fn test_fetch_missing() {
        let fetcher = MemoryFetcher::new();
        let result = futures::executor::block_on(fetcher.fetch("missing.bin", &no_progress));
        assert!(matches!(result, Err(FetchError::NotFound(_))));
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn test_fetch_injected_failure() {
        let fetcher = MemoryFetcher::new().with_resource("a.bin", vec![0u8]);
        fetcher.fail("a.bin", "connection reset");
        let result = futures::executor::block_on(fetcher.fetch("a.bin", &no_progress));
        assert!(matches!(result, Err(FetchError::Remote { .. })));
    }

    #[test]
    fn test_fetch_reports_chunked_progress() {
        let fetcher = MemoryFetcher::new()
            .with_chunk_size(4)
            .with_resource("a.bin", vec![0u8; 10]);
        let reports = Mutex::new(Vec::new());
        let record = |loaded: u64, total: u64| reports.lock().push((loaded, total));

        futures::executor::block_on(fetcher.fetch("a.bin", &record)).unwrap();
        assert_eq!(*reports.lock(), vec![(4, 10), (8, 10), (10, 10)]);
    }
}
