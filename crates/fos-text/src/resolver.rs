//! Per-character font resolution
//!
//! Splits text into runs that each use one font. Explicit candidate fonts
//! are tried first, then the coverage database. Whitespace, format
//! characters and uncovered characters reuse the font of the character
//! before them so they never split a run.

use std::collections::HashMap;
use std::sync::Arc;

use fos_font::FontResource;
use regex::Regex;
use url::Url;

use crate::config::{FontDescriptor, FontStyle, FontWeight, TextConfig};
use crate::coverage::CoverageDatabase;
use crate::font_cache::FontCache;
use crate::layout::FontRun;
use crate::shaping::is_zero_width;
use crate::{Result, TextError};

/// What to resolve fonts for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveRequest {
    pub lang: Option<String>,
    pub style: FontStyle,
    pub weight: FontWeight,
    /// Explicit candidates, tried before the coverage database
    pub fonts: Vec<FontDescriptor>,
}

impl ResolveRequest {
    pub fn from_config(config: &TextConfig) -> Self {
        Self {
            lang: config.lang.clone(),
            style: config.font_style,
            weight: config.font_weight,
            fonts: config.font.clone(),
        }
    }
}

/// Resolves text to font runs through the shared font cache
#[derive(Debug)]
pub struct FontResolver {
    fonts: FontCache,
    coverage: Option<CoverageDatabase>,
    base: Option<Url>,
}

impl FontResolver {
    pub fn new(fonts: FontCache, coverage: Option<CoverageDatabase>) -> Self {
        let base = coverage.as_ref().map(|c| c.base().clone());
        Self { fonts, coverage, base }
    }

    pub fn fonts(&self) -> &FontCache {
        &self.fonts
    }

    pub fn coverage(&self) -> Option<&CoverageDatabase> {
        self.coverage.as_ref()
    }

    /// Font URL of a descriptor; relative sources resolve against the data
    /// directory.
    fn source_url(&self, src: &str) -> Result<Url> {
        match Url::parse(src) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base {
                Some(base) => base.join(src).map_err(|e| TextError::InvalidUrl(format!("{src}: {e}"))),
                None => Err(TextError::InvalidUrl(format!("{src}: relative URL without a data directory"))),
            },
            Err(e) => Err(TextError::InvalidUrl(format!("{src}: {e}"))),
        }
    }

    /// Explicit candidates in lookup order: language matches first, then
    /// fonts without a language predicate. A style restriction applies
    /// unless it would exclude every candidate.
    fn candidates<'r>(&self, request: &'r ResolveRequest) -> Vec<&'r FontDescriptor> {
        let lang = request.lang.as_deref();
        let matches_lang = |font: &FontDescriptor| -> Option<bool> {
            let pattern = font.lang.as_deref()?;
            match Regex::new(pattern) {
                Ok(re) => Some(lang.is_some_and(|l| re.is_match(l))),
                Err(e) => {
                    tracing::warn!("Ignoring invalid language predicate {:?}: {}", pattern, e);
                    Some(false)
                }
            }
        };

        let mut specific = Vec::new();
        let mut generic = Vec::new();
        for font in &request.fonts {
            match matches_lang(font) {
                Some(true) => specific.push(font),
                Some(false) => {}
                None => generic.push(font),
            }
        }
        specific.extend(generic);

        let styled: Vec<_> = specific.iter().copied().filter(|f| f.style.is_none_or(|s| s == request.style)).collect();
        if styled.is_empty() { specific } else { styled }
    }

    /// Load the explicit candidates; failed fonts are skipped
    async fn load_candidates(&self, request: &ResolveRequest) -> Vec<Arc<FontResource>> {
        let mut loaded = Vec::new();
        for descriptor in self.candidates(request) {
            let font = match self.source_url(&descriptor.src) {
                Ok(url) => self.fonts.load(&url).await,
                Err(e) => Err(e),
            };
            match font {
                Ok(font) => loaded.push(font),
                Err(e) => tracing::warn!("Skipping font {}: {}", descriptor.src, e),
            }
        }
        loaded
    }

    /// Font of a coverage family, memoized per call. Font load failures
    /// leave the character uncovered; coverage fetch failures propagate.
    async fn coverage_font(
        &self,
        coverage: &CoverageDatabase,
        c: char,
        request: &ResolveRequest,
        families: &mut HashMap<String, Option<Arc<FontResource>>>,
    ) -> Result<Option<Arc<FontResource>>> {
        let Some(id) = coverage.family_id(c, request.lang.as_deref()).await? else {
            return Ok(None);
        };
        if let Some(font) = families.get(&id) {
            return Ok(font.clone());
        }
        let font = match coverage.face_url(&id, request.style, request.weight.0).await? {
            Some(url) => match self.fonts.load(&url).await {
                Ok(font) => Some(font),
                Err(e) => {
                    tracing::warn!("Coverage font {} for family {} failed to load: {}", url, id, e);
                    None
                }
            },
            None => None,
        };
        families.insert(id, font.clone());
        Ok(font)
    }

    /// Partition `text` into font runs over char indices.
    ///
    /// Runs whose characters no font could cover carry `None`; the
    /// typesetter lays them out with zero width.
    pub async fn resolve(&self, text: &str, request: &ResolveRequest) -> Result<Vec<FontRun>> {
        if request.fonts.is_empty() && self.coverage.is_none() {
            return Err(TextError::NoFontAvailable);
        }
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Ok(Vec::new());
        }

        let explicit = self.load_candidates(request).await;
        let mut families = HashMap::new();
        let mut slots: Vec<Option<Arc<FontResource>>> = Vec::with_capacity(chars.len());
        for &c in &chars {
            if c.is_whitespace() || is_zero_width(c) {
                slots.push(None);
                continue;
            }
            let font = match (explicit.iter().find(|f| f.has_char(c)), &self.coverage) {
                (Some(font), _) => Some(font.clone()),
                (None, Some(coverage)) => self.coverage_font(coverage, c, request, &mut families).await?,
                (None, None) => None,
            };
            slots.push(font);
        }

        // leading characters take the first resolved font, the rest inherit
        let first = slots.iter().flatten().next().cloned().or_else(|| explicit.first().cloned());
        let mut previous = first;
        for slot in &mut slots {
            match slot {
                Some(font) => previous = Some(font.clone()),
                None => *slot = previous.clone(),
            }
        }

        let mut runs: Vec<FontRun> = Vec::new();
        for (i, font) in slots.into_iter().enumerate() {
            match runs.last_mut() {
                Some(run) if same_font(&run.font, &font) => run.end = i + 1,
                _ => runs.push(FontRun { start: i, end: i + 1, font }),
            }
        }
        tracing::debug!(chars = chars.len(), runs = runs.len(), "resolved font runs");
        Ok(runs)
    }
}

fn same_font(a: &Option<Arc<FontResource>>, b: &Option<Arc<FontResource>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use fos_font::testing::TestFontBuilder;

    use super::*;
    use crate::loader::MemoryLoader;

    const DATA: &str = "mem://data/";

    fn loader() -> Arc<MemoryLoader> {
        Arc::new(
            MemoryLoader::new()
                .with("mem://fonts/latin.ttf", TestFontBuilder::new().family("Latin", "Regular").block_glyphs("AB ", 100).build())
                .with("mem://fonts/cyr.ttf", TestFontBuilder::new().family("Cyr", "Regular").block_glyphs("ж", 100).build())
                .with("mem://fonts/jp.ttf", TestFontBuilder::new().family("Jp", "Regular").block_glyphs("A", 100).build())
                .with("mem://fonts/broken.ttf", b"not a font".to_vec())
                .with(
                    "mem://data/codepoint-index/0000.json",
                    br#"{ "families": [ { "id": "fallback-sans", "ranges": "20-7e,e9" } ] }"#.to_vec(),
                )
                .with(
                    "mem://data/font-meta/fallback-sans.json",
                    br#"{ "family": "Fallback Sans", "faces": [ { "src": "fonts/fallback.ttf" } ] }"#.to_vec(),
                )
                .with("mem://data/fonts/fallback.ttf", TestFontBuilder::new().family("Fallback Sans", "Regular").block_glyphs("é", 100).build()),
        )
    }

    fn resolver(loader: Arc<MemoryLoader>, with_coverage: bool) -> FontResolver {
        let coverage = with_coverage.then(|| CoverageDatabase::new(Url::parse(DATA).unwrap(), loader.clone()));
        FontResolver::new(FontCache::new(loader), coverage)
    }

    fn request(fonts: &[FontDescriptor]) -> ResolveRequest {
        ResolveRequest { fonts: fonts.to_vec(), ..Default::default() }
    }

    fn family(run: &FontRun) -> Option<String> {
        run.font.as_ref().and_then(|f| f.names().family.clone())
    }

    fn spans(runs: &[FontRun]) -> Vec<(usize, usize, Option<String>)> {
        runs.iter().map(|r| (r.start, r.end, family(r))).collect()
    }

    #[test]
    fn test_explicit_fonts_split_runs() {
        let resolver = resolver(loader(), false);
        let fonts = [FontDescriptor::new("mem://fonts/latin.ttf"), FontDescriptor::new("mem://fonts/cyr.ttf")];
        let runs = smol::block_on(resolver.resolve("AB жж A", &request(&fonts))).unwrap();
        assert_eq!(
            spans(&runs),
            vec![
                (0, 3, Some("Latin".into())),
                (3, 6, Some("Cyr".into())),
                (6, 7, Some("Latin".into())),
            ]
        );
    }

    #[test]
    fn test_language_match_first() {
        let resolver = resolver(loader(), false);
        let fonts = [FontDescriptor::new("mem://fonts/latin.ttf"), FontDescriptor::new("mem://fonts/jp.ttf").with_lang("^ja")];

        let ja = ResolveRequest { lang: Some("ja-JP".into()), ..request(&fonts) };
        let runs = smol::block_on(resolver.resolve("A", &ja)).unwrap();
        assert_eq!(family(&runs[0]).as_deref(), Some("Jp"));

        // a non-matching predicate removes the candidate
        let en = ResolveRequest { lang: Some("en".into()), ..request(&fonts) };
        let runs = smol::block_on(resolver.resolve("A", &en)).unwrap();
        assert_eq!(family(&runs[0]).as_deref(), Some("Latin"));
    }

    #[test]
    fn test_style_filter_falls_back() {
        let resolver = resolver(loader(), false);
        let fonts = [FontDescriptor::new("mem://fonts/jp.ttf").with_style(FontStyle::Italic)];
        let runs = smol::block_on(resolver.resolve("A", &request(&fonts))).unwrap();
        assert_eq!(family(&runs[0]).as_deref(), Some("Jp"));
    }

    #[test]
    fn test_coverage_fallback() {
        let loader = loader();
        let resolver = resolver(loader.clone(), true);
        let fonts = [FontDescriptor::new("mem://fonts/latin.ttf")];
        let runs = smol::block_on(resolver.resolve("AéB", &request(&fonts))).unwrap();
        assert_eq!(
            spans(&runs),
            vec![(0, 1, Some("Latin".into())), (1, 2, Some("Fallback Sans".into())), (2, 3, Some("Latin".into()))]
        );
        assert_eq!(loader.fetches_of("mem://data/codepoint-index/0000.json"), 1);
    }

    #[test]
    fn test_relative_source_uses_data_directory() {
        let resolver = resolver(loader(), true);
        let fonts = [FontDescriptor::new("fonts/fallback.ttf")];
        let runs = smol::block_on(resolver.resolve("é", &request(&fonts))).unwrap();
        assert_eq!(family(&runs[0]).as_deref(), Some("Fallback Sans"));
    }

    #[test]
    fn test_leading_whitespace_takes_first_font() {
        let resolver = resolver(loader(), false);
        let fonts = [FontDescriptor::new("mem://fonts/latin.ttf")];
        let runs = smol::block_on(resolver.resolve("  \u{200D}A", &request(&fonts))).unwrap();
        assert_eq!(spans(&runs), vec![(0, 4, Some("Latin".into()))]);
    }

    #[test]
    fn test_failed_font_is_skipped() {
        let resolver = resolver(loader(), false);
        let fonts = [FontDescriptor::new("mem://fonts/broken.ttf"), FontDescriptor::new("mem://fonts/latin.ttf")];
        let runs = smol::block_on(resolver.resolve("A", &request(&fonts))).unwrap();
        assert_eq!(family(&runs[0]).as_deref(), Some("Latin"));

        let only_broken = [FontDescriptor::new("mem://fonts/broken.ttf")];
        let runs = smol::block_on(resolver.resolve("AB", &request(&only_broken))).unwrap();
        assert_eq!(spans(&runs), vec![(0, 2, None)]);
    }

    #[test]
    fn test_coverage_failure_propagates() {
        let resolver = resolver(Arc::new(MemoryLoader::new()), true);
        let err = smol::block_on(resolver.resolve("A", &request(&[]))).unwrap_err();
        assert!(matches!(err, TextError::Fetch { .. }));
    }

    #[test]
    fn test_no_font_source() {
        let resolver = resolver(loader(), false);
        let err = smol::block_on(resolver.resolve("A", &request(&[]))).unwrap_err();
        assert!(matches!(err, TextError::NoFontAvailable));
        assert!(smol::block_on(resolver.resolve("", &request(&[FontDescriptor::new("mem://fonts/latin.ttf")]))).unwrap().is_empty());
    }
}
