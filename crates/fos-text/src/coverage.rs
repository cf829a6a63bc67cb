//! Codepoint coverage database
//!
//! Coverage is split into buckets of 1024 code points
//! (`codepoint-index/{key:04x}.json`, key = `cp >> 10`). Each bucket lists
//! font families with the ranges they cover and an optional language
//! predicate. Families describe their faces in `font-meta/{id}.json`.
//! Buckets and descriptors are fetched once and kept for the process
//! lifetime.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::config::FontStyle;
use crate::loader::ResourceLoader;
use crate::memo::InflightCache;
use crate::{Result, TextError};

pub const BUCKET_SHIFT: u32 = 10;
pub const BUCKET_SIZE: u32 = 1 << BUCKET_SHIFT;

pub fn bucket_key(codepoint: u32) -> u32 {
    codepoint >> BUCKET_SHIFT
}

/// One bit per code point of a bucket
#[derive(Clone, PartialEq, Eq)]
pub struct BucketBits([u64; (BUCKET_SIZE / 64) as usize]);

impl Default for BucketBits {
    fn default() -> Self {
        Self([0; (BUCKET_SIZE / 64) as usize])
    }
}

impl std::fmt::Debug for BucketBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BucketBits({} set)", self.count())
    }
}

impl BucketBits {
    /// Set the bits of `ranges` that fall inside bucket `key`
    pub fn from_ranges(key: u32, ranges: &[(u32, u32)]) -> Self {
        let mut bits = Self::default();
        let base = key << BUCKET_SHIFT;
        let last = base + (BUCKET_SIZE - 1);
        for &(start, end) in ranges {
            let (lo, hi) = (start.max(base), end.min(last));
            for cp in lo..=hi {
                let offset = cp - base;
                bits.0[(offset / 64) as usize] |= 1 << (offset % 64);
            }
        }
        bits
    }

    /// `offset` is relative to the bucket start
    pub fn contains(&self, offset: u32) -> bool {
        offset < BUCKET_SIZE && self.0[(offset / 64) as usize] & (1 << (offset % 64)) != 0
    }

    pub fn count(&self) -> u32 {
        self.0.iter().map(|w| w.count_ones()).sum()
    }
}

/// A family entry of one bucket
#[derive(Debug, Clone)]
pub struct CoverageFamily {
    pub id: String,
    lang: Option<Regex>,
    bits: BucketBits,
}

impl CoverageFamily {
    pub fn covers(&self, codepoint: u32) -> bool {
        self.bits.contains(codepoint & (BUCKET_SIZE - 1))
    }

    pub fn has_lang(&self) -> bool {
        self.lang.is_some()
    }

    /// Entries without a predicate never match a language
    pub fn matches_lang(&self, lang: Option<&str>) -> bool {
        match (&self.lang, lang) {
            (Some(re), Some(lang)) => re.is_match(lang),
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BucketDocument {
    families: Vec<FamilyEntry>,
}

#[derive(Debug, Deserialize)]
struct FamilyEntry {
    id: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(deserialize_with = "ranges")]
    ranges: Vec<(u32, u32)>,
}

/// `"20-7e,a0,3000-303f"`: hexadecimal code points or inclusive ranges
fn ranges<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<(u32, u32)>, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse_ranges(&text).map_err(serde::de::Error::custom)
}

pub fn parse_ranges(text: &str) -> std::result::Result<Vec<(u32, u32)>, String> {
    let hex = |s: &str| u32::from_str_radix(s.trim(), 16).map_err(|_| format!("bad code point {s:?}"));
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (hex(start)?, hex(end)?);
                if start > end {
                    return Err(format!("inverted range {part:?}"));
                }
                Ok((start, end))
            }
            None => hex(part).map(|cp| (cp, cp)),
        })
        .collect()
}

/// Families covering one bucket, in document order
#[derive(Debug, Clone)]
pub struct CoverageBucket {
    pub key: u32,
    pub families: Vec<CoverageFamily>,
}

impl CoverageBucket {
    pub fn parse(key: u32, url: &str, bytes: &[u8]) -> Result<Self> {
        let doc: BucketDocument =
            serde_json::from_slice(bytes).map_err(|source| TextError::Coverage { url: url.to_owned(), source })?;
        let families = doc
            .families
            .into_iter()
            .map(|entry| {
                let lang = entry.lang.as_deref().and_then(|pattern| match Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!("Ignoring language predicate {:?} of {}: {}", pattern, entry.id, e);
                        None
                    }
                });
                CoverageFamily { bits: BucketBits::from_ranges(key, &entry.ranges), id: entry.id, lang }
            })
            .collect();
        Ok(Self { key, families })
    }

    /// Pick among the families covering `codepoint`, in document order:
    /// the first whose language predicate matches, then the first without a
    /// predicate, then simply the first. A family reserved for another
    /// language is only chosen when nothing neutral covers the code point.
    pub fn family_for(&self, codepoint: u32, lang: Option<&str>) -> Option<&CoverageFamily> {
        let covering: Vec<&CoverageFamily> = self.families.iter().filter(|f| f.covers(codepoint)).collect();
        let first = *covering.first()?;
        let matched = covering.iter().find(|f| f.matches_lang(lang));
        let neutral = covering.iter().find(|f| !f.has_lang());
        Some(matched.or(neutral).copied().unwrap_or(first))
    }
}

/// One downloadable face of a family
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FaceEntry {
    #[serde(default)]
    pub style: FontStyle,
    #[serde(default = "default_weight")]
    pub weight: u16,
    pub src: String,
}

fn default_weight() -> u16 {
    400
}

/// `font-meta/{id}.json`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FamilyDescriptor {
    pub family: String,
    pub faces: Vec<FaceEntry>,
}

impl FamilyDescriptor {
    /// Same style if possible, then the exact weight, then the nearest one.
    /// Ties go to the heavier face for requests of 400 and up.
    pub fn choose_face(&self, style: FontStyle, weight: u16) -> Option<&FaceEntry> {
        let styled: Vec<&FaceEntry> = self.faces.iter().filter(|f| f.style == style).collect();
        let candidates = if styled.is_empty() { self.faces.iter().collect() } else { styled };
        candidates.into_iter().min_by_key(|face| {
            let distance = face.weight.abs_diff(weight);
            let tie_break = match (face.weight > weight, weight >= 400) {
                (true, true) | (false, false) => 0,
                _ => 1,
            };
            (distance, tie_break)
        })
    }
}

/// Lazily fetched coverage buckets and family descriptors
pub struct CoverageDatabase {
    base: Url,
    loader: Arc<dyn ResourceLoader>,
    buckets: InflightCache<u32, Arc<CoverageBucket>>,
    families: InflightCache<String, Arc<FamilyDescriptor>>,
}

impl std::fmt::Debug for CoverageDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageDatabase")
            .field("base", &self.base.as_str())
            .field("buckets", &self.buckets.len())
            .field("families", &self.families.len())
            .finish()
    }
}

impl CoverageDatabase {
    /// `base` is treated as a directory
    pub fn new(mut base: Url, loader: Arc<dyn ResourceLoader>) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base, loader, buckets: InflightCache::new(), families: InflightCache::new() }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a path relative to the data directory
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| TextError::InvalidUrl(format!("{path}: {e}")))
    }

    pub async fn bucket(&self, key: u32) -> Result<Arc<CoverageBucket>> {
        self.buckets
            .get_or_try_init(key, || async move {
                let url = self.resolve(&format!("codepoint-index/{key:04x}.json"))?;
                let bytes = self.loader.load(&url).await?;
                let bucket = CoverageBucket::parse(key, url.as_str(), &bytes)?;
                tracing::debug!(key, families = bucket.families.len(), "coverage bucket fetched");
                Ok::<_, TextError>(Arc::new(bucket))
            })
            .await
    }

    pub async fn family(&self, id: &str) -> Result<Arc<FamilyDescriptor>> {
        self.families
            .get_or_try_init(id.to_owned(), || async {
                let url = self.resolve(&format!("font-meta/{id}.json"))?;
                let bytes = self.loader.load(&url).await?;
                let descriptor: FamilyDescriptor = serde_json::from_slice(&bytes)
                    .map_err(|source| TextError::Coverage { url: url.to_string(), source })?;
                Ok::<_, TextError>(Arc::new(descriptor))
            })
            .await
    }

    /// Covering family id for a code point, if the database knows one
    pub async fn family_id(&self, c: char, lang: Option<&str>) -> Result<Option<String>> {
        let bucket = self.bucket(bucket_key(c as u32)).await?;
        Ok(bucket.family_for(c as u32, lang).map(|f| f.id.clone()))
    }

    /// Font URL of the best face of a family
    pub async fn face_url(&self, family_id: &str, style: FontStyle, weight: u16) -> Result<Option<Url>> {
        let family = self.family(family_id).await?;
        match family.choose_face(style, weight) {
            Some(face) => self.resolve(&face.src).map(Some),
            None => Ok(None),
        }
    }

    pub fn cached_buckets(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;

    const LATIN: &str = r#"{ "families": [
        { "id": "serif-jp", "lang": "^ja", "ranges": "41-5a" },
        { "id": "fallback-sans", "ranges": "20-7e,a0" }
    ] }"#;

    #[test]
    fn test_parse_ranges() {
        assert_eq!(parse_ranges("20-7e, a0").unwrap(), vec![(0x20, 0x7e), (0xa0, 0xa0)]);
        assert!(parse_ranges("7e-20").is_err());
        assert!(parse_ranges("zz").is_err());
        assert!(parse_ranges("").unwrap().is_empty());
    }

    #[test]
    fn test_bits_clip_to_bucket() {
        let bits = BucketBits::from_ranges(1, &[(0x3f0, 0x410), (0x900, 0x900)]);
        assert_eq!(bits.count(), 0x11);
        assert!(bits.contains(0));
        assert!(bits.contains(0x10));
        assert!(!bits.contains(0x11));
    }

    #[test]
    fn test_family_selection() {
        let bucket = CoverageBucket::parse(0, "mem://0000.json", LATIN.as_bytes()).unwrap();
        assert_eq!(bucket.family_for('A' as u32, Some("ja-JP")).unwrap().id, "serif-jp");
        // a neutral family beats one reserved for another language
        assert_eq!(bucket.family_for('A' as u32, Some("en")).unwrap().id, "fallback-sans");
        assert_eq!(bucket.family_for('A' as u32, None).unwrap().id, "fallback-sans");
        assert_eq!(bucket.family_for('a' as u32, Some("ja")).unwrap().id, "fallback-sans");

        let reserved = CoverageBucket::parse(
            0,
            "mem://0000.json",
            br#"{ "families": [ { "id": "serif-jp", "lang": "^ja", "ranges": "41" } ] }"#,
        )
        .unwrap();
        assert_eq!(reserved.family_for('A' as u32, Some("en")).unwrap().id, "serif-jp");
        assert!(bucket.family_for(0x100, None).is_none());
    }

    #[test]
    fn test_malformed_bucket() {
        let err = CoverageBucket::parse(0, "mem://0000.json", br#"{ "families": [ { "id": "x", "ranges": "q" } ] }"#)
            .unwrap_err();
        assert!(matches!(err, TextError::Coverage { .. }));
    }

    #[test]
    fn test_face_choice() {
        let family: FamilyDescriptor = serde_json::from_str(
            r#"{ "family": "F", "faces": [
                { "style": "normal", "weight": 300, "src": "f-300.ttf" },
                { "style": "normal", "weight": 500, "src": "f-500.ttf" },
                { "style": "italic", "weight": 400, "src": "f-400i.ttf" }
            ] }"#,
        )
        .unwrap();
        assert_eq!(family.choose_face(FontStyle::Normal, 400).unwrap().src, "f-500.ttf");
        assert_eq!(family.choose_face(FontStyle::Normal, 399).unwrap().src, "f-300.ttf");
        assert_eq!(family.choose_face(FontStyle::Normal, 300).unwrap().src, "f-300.ttf");
        assert_eq!(family.choose_face(FontStyle::Italic, 900).unwrap().src, "f-400i.ttf");
    }

    #[test]
    fn test_bucket_fetched_once() {
        let loader = Arc::new(
            MemoryLoader::new()
                .with_latency(std::time::Duration::from_millis(5))
                .with("mem://data/codepoint-index/0000.json", LATIN.as_bytes().to_vec()),
        );
        let db = Arc::new(CoverageDatabase::new(Url::parse("mem://data").unwrap(), loader.clone()));

        let ids = smol::block_on(async {
            let a = smol::spawn({
                let db = db.clone();
                async move { db.family_id('A', None).await }
            });
            let b = smol::spawn({
                let db = db.clone();
                async move { db.family_id('b', None).await }
            });
            (a.await.unwrap(), b.await.unwrap())
        });
        assert_eq!(ids, (Some("serif-jp".to_owned()), Some("fallback-sans".to_owned())));
        assert_eq!(loader.fetches_of("mem://data/codepoint-index/0000.json"), 1);
        assert_eq!(db.cached_buckets(), 1);
    }
}
