//! Resource fetching abstraction
//!
//! Every byte the pipeline reads (model files, external glTF buffers and
//! images, LDraw parts and colour tables) goes through a [`ResourceFetcher`].
//! Storage and transport are owned by the caller; this module only defines
//! the capability plus two implementations: an in-memory fetcher and, with
//! the `runtime-tokio` feature, a filesystem fetcher.

pub mod memory;
#[cfg(feature = "runtime-tokio")]
pub mod tokio_impl;

use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt::Debug;
use thiserror::Error;

pub use memory::MemoryFetcher;
#[cfg(feature = "runtime-tokio")]
pub use tokio_impl::FileFetcher;

/// Error type for resource fetching
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported locator scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Bad data URI")]
    BadDataUri,

    #[error("Remote error for {locator}: {message}")]
    Remote { locator: String, message: String },
}

/// Byte-level progress callback: `(loaded, total)`
///
/// Fetchers call it as data arrives. Reports are not validated here; the
/// progress aggregator discards malformed ones.
pub type ByteProgress<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Async resource fetcher
///
/// Uses async-trait so the pipeline can hold it as a trait object.
#[async_trait::async_trait]
pub trait ResourceFetcher: Send + Sync + Debug {
    /// Fetch the complete contents of `locator`
    async fn fetch(&self, locator: &str, progress: ByteProgress<'_>) -> Result<Vec<u8>, FetchError>;

    /// Get the name of this fetcher (for debugging)
    fn fetcher_name(&self) -> &'static str;
}

/// Progress callback that ignores every report
pub fn no_progress(_loaded: u64, _total: u64) {}

/// Strip the query string and fragment from a locator
pub fn strip_query(locator: &str) -> &str {
    let end = locator.find(['?', '#']).unwrap_or(locator.len());
    &locator[..end]
}

/// Resolve `relative` against the directory of `base`
///
/// Absolute references (`scheme://…` or a leading `/`) are returned as-is.
/// `.` and `..` segments are folded.
pub fn join_locator(base: &str, relative: &str) -> String {
    if relative.contains("://") || relative.starts_with('/') {
        return relative.to_string();
    }

    let base = strip_query(base);
    let dir = match base.rfind('/') {
        Some(index) => &base[..=index],
        None => "",
    };

    normalize_locator(&format!("{dir}{relative}"))
}

fn normalize_locator(locator: &str) -> String {
    let (prefix, path) = match locator.find("://") {
        Some(index) => {
            let rest = &locator[index + 3..];
            match rest.find('/') {
                Some(slash) => locator.split_at(index + 3 + slash + 1),
                None => return locator.to_string(),
            }
        }
        None if locator.starts_with('/') => locator.split_at(1),
        None => ("", locator),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    format!("{prefix}{}", segments.join("/"))
}

/// Payload of an RFC 2397 `data:` URI
#[derive(Debug, Clone, PartialEq)]
pub struct DataUri {
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

/// Decode `uri` if it is a `data:` URI
///
/// Returns `Ok(None)` for any other kind of locator.
pub fn parse_data_uri(uri: &str) -> Result<Option<DataUri>, FetchError> {
    let Some(prefix) = uri.get(..5) else {
        return Ok(None);
    };
    if !prefix.eq_ignore_ascii_case("data:") {
        return Ok(None);
    }

    let content = &uri[5..];
    let (params, payload) = content.split_once(',').ok_or(FetchError::BadDataUri)?;

    let (mime, base64) = match params.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (params, false),
    };
    let mime_type = (!mime.is_empty()).then(|| mime.to_string());

    let data = if base64 {
        STANDARD
            .decode(payload)
            .map_err(|_| FetchError::BadDataUri)?
    } else {
        payload.as_bytes().to_vec()
    };

    Ok(Some(DataUri { mime_type, data }))
}
