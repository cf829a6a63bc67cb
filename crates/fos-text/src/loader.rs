//! Resource loading boundary
//!
//! Fonts and coverage documents arrive as bytes through an injected
//! [`ResourceLoader`]; the transport is up to the embedder.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use url::Url;

use crate::{Result, TextError};

/// Future returned by [`ResourceLoader::load`]
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Arc<[u8]>>> + Send + 'a>>;

/// Fetch-by-URL capability
pub trait ResourceLoader: Send + Sync {
    fn load<'a>(&'a self, url: &'a Url) -> LoadFuture<'a>;
}

/// In-memory resources keyed by URL, counting every fetch
#[derive(Debug, Default)]
pub struct MemoryLoader {
    resources: RwLock<HashMap<String, Arc<[u8]>>>,
    fetches: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch, so concurrent requests overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with(self, url: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&self, url: &str, bytes: impl Into<Arc<[u8]>>) {
        self.resources.write().unwrap_or_else(|e| e.into_inner()).insert(url.to_owned(), bytes.into());
    }

    /// Fetches issued so far, found or not
    pub fn fetch_count(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    pub fn fetches_of(&self, url: &str) -> usize {
        self.fetches.lock().unwrap_or_else(|e| e.into_inner()).get(url).copied().unwrap_or(0)
    }
}

impl ResourceLoader for MemoryLoader {
    fn load<'a>(&'a self, url: &'a Url) -> LoadFuture<'a> {
        Box::pin(async move {
            self.total.fetch_add(1, Ordering::AcqRel);
            *self.fetches.lock().unwrap_or_else(|e| e.into_inner()).entry(url.to_string()).or_insert(0) += 1;
            if let Some(latency) = self.latency {
                smol::Timer::after(latency).await;
            }
            let found = self.resources.read().unwrap_or_else(|e| e.into_inner()).get(url.as_str()).cloned();
            found.ok_or_else(|| TextError::Fetch { url: url.to_string(), reason: "not found".into() })
        })
    }
}

/// Reads `file://` URLs from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl ResourceLoader for FileLoader {
    fn load<'a>(&'a self, url: &'a Url) -> LoadFuture<'a> {
        Box::pin(async move {
            if url.scheme() != "file" {
                return Err(TextError::Fetch {
                    url: url.to_string(),
                    reason: format!("unsupported scheme {}", url.scheme()),
                });
            }
            let path = url.to_file_path().map_err(|_| TextError::InvalidUrl(url.to_string()))?;
            tracing::debug!("Reading {}", path.display());
            let bytes = smol::fs::read(&path)
                .await
                .map_err(|e| TextError::Fetch { url: url.to_string(), reason: e.to_string() })?;
            Ok(Arc::from(bytes))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_loader_counts_fetches() {
        let loader = MemoryLoader::new().with("mem://a.json", b"{}".to_vec());
        let url = Url::parse("mem://a.json").unwrap();
        let missing = Url::parse("mem://b.json").unwrap();

        let bytes = smol::block_on(loader.load(&url)).unwrap();
        assert_eq!(&*bytes, b"{}");
        assert!(matches!(smol::block_on(loader.load(&missing)), Err(TextError::Fetch { .. })));
        assert_eq!(loader.fetch_count(), 2);
        assert_eq!(loader.fetches_of("mem://a.json"), 1);
    }

    #[test]
    fn test_file_loader() {
        let dir = std::env::temp_dir().join(format!("fos-text-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("font.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let bytes = smol::block_on(FileLoader.load(&url)).unwrap();
        assert_eq!(&*bytes, &[1, 2, 3]);

        let http = Url::parse("https://example.com/font.ttf").unwrap();
        assert!(matches!(smol::block_on(FileLoader.load(&http)), Err(TextError::Fetch { .. })));
        std::fs::remove_dir_all(&dir).ok();
    }
}
