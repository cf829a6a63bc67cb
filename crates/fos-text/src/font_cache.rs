//! Process-lifetime font object cache

use std::sync::Arc;

use fos_font::FontResource;
use url::Url;

use crate::loader::ResourceLoader;
use crate::memo::InflightCache;
use crate::{Result, TextError};

/// Parsed fonts keyed by source URL. Each URL is fetched and parsed once.
pub struct FontCache {
    loader: Arc<dyn ResourceLoader>,
    fonts: InflightCache<String, Arc<FontResource>>,
}

impl std::fmt::Debug for FontCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontCache").field("fonts", &self.fonts.len()).finish_non_exhaustive()
    }
}

impl FontCache {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self { loader, fonts: InflightCache::new() }
    }

    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    /// Fetch and parse a font, or return the cached one.
    ///
    /// Parsing runs on the blocking pool.
    pub async fn load(&self, url: &Url) -> Result<Arc<FontResource>> {
        self.fonts
            .get_or_try_init(url.to_string(), || async {
                let bytes = self.loader.load(url).await?;
                let key = url.to_string();
                let font = smol::unblock(move || FontResource::parse(key, bytes)).await?;
                tracing::debug!("Loaded font {} ({:?})", url, font.names().family);
                Ok::<_, TextError>(Arc::new(font))
            })
            .await
    }

    pub fn get(&self, url: &Url) -> Option<Arc<FontResource>> {
        self.fonts.get(&url.to_string())
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use fos_font::testing::TestFontBuilder;

    use super::*;
    use crate::loader::MemoryLoader;

    #[test]
    fn test_font_loaded_once() {
        let bytes = TestFontBuilder::new().block_glyphs("AB", 600).build();
        let loader = Arc::new(MemoryLoader::new().with("mem://fonts/a.ttf", bytes));
        let cache = FontCache::new(loader.clone());
        let url = Url::parse("mem://fonts/a.ttf").unwrap();

        let first = smol::block_on(cache.load(&url)).unwrap();
        let second = smol::block_on(cache.load(&url)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.fetch_count(), 1);
        assert_eq!(first.key().as_str(), "mem://fonts/a.ttf");
    }

    #[test]
    fn test_parse_failure_is_reported() {
        let loader = Arc::new(MemoryLoader::new().with("mem://fonts/bad.ttf", vec![0u8; 32]));
        let cache = FontCache::new(loader);
        let url = Url::parse("mem://fonts/bad.ttf").unwrap();
        assert!(matches!(smol::block_on(cache.load(&url)), Err(TextError::FontParsing(_))));
        assert!(cache.is_empty());
    }
}
