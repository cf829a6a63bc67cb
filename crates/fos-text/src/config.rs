//! Pipeline and per-call text configuration
//!
//! Both deserialize from camelCase JSON with every field optional.

use std::collections::BTreeMap;
use std::time::Duration;

use fos_sdf::config::millis;
use fos_sdf::{AtlasConfig, SchedulerConfig};
use serde::{Deserialize, Deserializer};

use crate::{Result, TextError};

/// Process-wide pipeline settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Directory holding `codepoint-index/` and `font-meta/`
    pub data_base_url: Option<String>,
    pub default_sdf_glyph_size: u32,
    pub sdf_exponent: f32,
    /// Outline margin as a fraction of the tile
    pub sdf_margin: f32,
    pub texture_width: u32,
    pub max_texture_size: u32,
    pub max_raster_contexts: usize,
    #[serde(with = "millis")]
    pub context_idle_timeout: Duration,
    #[serde(with = "millis")]
    pub drain_time_slice: Duration,
    /// Glyphs per culling chunk
    pub chunk_size: usize,
    pub use_accelerated: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let atlas = AtlasConfig::default();
        let scheduler = SchedulerConfig::default();
        Self {
            data_base_url: None,
            default_sdf_glyph_size: 64,
            sdf_exponent: atlas.exponent,
            sdf_margin: atlas.margin,
            texture_width: atlas.texture_width,
            max_texture_size: atlas.max_texture_size,
            max_raster_contexts: scheduler.max_contexts,
            context_idle_timeout: scheduler.idle_timeout,
            drain_time_slice: scheduler.time_slice,
            chunk_size: 8192,
            use_accelerated: atlas.use_accelerated,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| TextError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_sdf_glyph_size == 0 {
            return Err(TextError::InvalidConfig("defaultSdfGlyphSize must be positive".into()));
        }
        if self.chunk_size == 0 {
            return Err(TextError::InvalidConfig("chunkSize must be positive".into()));
        }
        if self.max_texture_size < self.default_sdf_glyph_size {
            return Err(TextError::InvalidConfig("maxTextureSize is smaller than one tile".into()));
        }
        if !(self.sdf_exponent.is_finite() && self.sdf_exponent > 0.0) {
            return Err(TextError::InvalidConfig(format!("sdfExponent must be positive, got {}", self.sdf_exponent)));
        }
        if !(self.sdf_margin.is_finite() && self.sdf_margin >= 0.0) {
            return Err(TextError::InvalidConfig(format!("sdfMargin must not be negative, got {}", self.sdf_margin)));
        }
        Ok(())
    }

    pub fn with_data_base_url(mut self, url: impl Into<String>) -> Self {
        self.data_base_url = Some(url.into());
        self
    }

    pub fn with_sdf_glyph_size(mut self, size: u32) -> Self {
        self.default_sdf_glyph_size = size;
        self
    }

    pub fn with_texture_width(mut self, width: u32) -> Self {
        self.texture_width = width;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_accelerated(mut self, enabled: bool) -> Self {
        self.use_accelerated = enabled;
        self
    }

    pub fn atlas_config(&self) -> AtlasConfig {
        AtlasConfig {
            texture_width: self.texture_width,
            max_texture_size: self.max_texture_size,
            exponent: self.sdf_exponent,
            margin: self.sdf_margin,
            use_accelerated: self.use_accelerated,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_max_contexts(self.max_raster_contexts)
            .with_idle_timeout(self.context_idle_timeout)
            .with_time_slice(self.drain_time_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

/// Numeric weight; names map to their CSS values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "NumberOrName")]
pub struct FontWeight(pub u16);

impl FontWeight {
    pub const NORMAL: FontWeight = FontWeight(400);
    pub const BOLD: FontWeight = FontWeight(700);
}

impl Default for FontWeight {
    fn default() -> Self {
        Self::NORMAL
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrName {
    Number(f32),
    Name(String),
}

impl TryFrom<NumberOrName> for FontWeight {
    type Error = String;

    fn try_from(value: NumberOrName) -> std::result::Result<Self, String> {
        match value {
            NumberOrName::Number(n) if (1.0..=1000.0).contains(&n) => Ok(FontWeight(n.round() as u16)),
            NumberOrName::Number(n) => Err(format!("font weight {n} out of range")),
            NumberOrName::Name(name) => match name.as_str() {
                "thin" => Ok(FontWeight(100)),
                "light" => Ok(FontWeight(300)),
                "normal" | "regular" => Ok(FontWeight::NORMAL),
                "medium" => Ok(FontWeight(500)),
                "semibold" => Ok(FontWeight(600)),
                "bold" => Ok(FontWeight::BOLD),
                "black" => Ok(FontWeight(900)),
                other => other.parse::<u16>().map(FontWeight).map_err(|_| format!("unknown font weight {other:?}")),
            },
        }
    }
}

/// Line height: font-derived, a multiple of the font size, or a percentage
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(try_from = "NumberOrName")]
pub enum LineHeight {
    #[default]
    Normal,
    Multiple(f32),
    Percent(f32),
}

impl LineHeight {
    /// Fixed height in pixels, or `None` for font-derived
    pub fn resolve(self, font_size: f32) -> Option<f32> {
        match self {
            LineHeight::Normal => None,
            LineHeight::Multiple(m) => Some(m * font_size),
            LineHeight::Percent(p) => Some(p / 100.0 * font_size),
        }
    }
}

impl TryFrom<NumberOrName> for LineHeight {
    type Error = String;

    fn try_from(value: NumberOrName) -> std::result::Result<Self, String> {
        match value {
            NumberOrName::Number(n) => Ok(LineHeight::Multiple(n)),
            NumberOrName::Name(name) if name == "normal" => Ok(LineHeight::Normal),
            NumberOrName::Name(name) => parse_percent(&name)
                .map(LineHeight::Percent)
                .ok_or_else(|| format!("invalid line height {name:?}")),
        }
    }
}

fn parse_percent(text: &str) -> Option<f32> {
    text.trim().strip_suffix('%')?.trim().parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Auto,
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteSpace {
    #[default]
    Normal,
    Nowrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowWrap {
    #[default]
    Normal,
    BreakWord,
}

/// Horizontal anchor as a fraction of the block width
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(try_from = "NumberOrName")]
pub struct AnchorX(pub f32);

impl TryFrom<NumberOrName> for AnchorX {
    type Error = String;

    fn try_from(value: NumberOrName) -> std::result::Result<Self, String> {
        match value {
            NumberOrName::Number(n) => Ok(AnchorX(n)),
            NumberOrName::Name(name) => match name.as_str() {
                "left" => Ok(AnchorX(0.0)),
                "center" => Ok(AnchorX(0.5)),
                "right" => Ok(AnchorX(1.0)),
                other => parse_percent(other).map(|p| AnchorX(p / 100.0)).ok_or_else(|| format!("invalid anchorX {other:?}")),
            },
        }
    }
}

/// Vertical anchor: a fraction of the block height from the top, or a
/// named line of the first or last line
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "NumberOrName")]
pub enum AnchorY {
    Fraction(f32),
    Top,
    TopBaseline,
    TopCap,
    TopEx,
    Middle,
    BottomBaseline,
    BottomCap,
    Bottom,
}

impl Default for AnchorY {
    fn default() -> Self {
        AnchorY::Fraction(0.0)
    }
}

impl TryFrom<NumberOrName> for AnchorY {
    type Error = String;

    fn try_from(value: NumberOrName) -> std::result::Result<Self, String> {
        match value {
            NumberOrName::Number(n) => Ok(AnchorY::Fraction(n)),
            NumberOrName::Name(name) => match name.as_str() {
                "top" => Ok(AnchorY::Top),
                "top-baseline" => Ok(AnchorY::TopBaseline),
                "top-cap" => Ok(AnchorY::TopCap),
                "top-ex" => Ok(AnchorY::TopEx),
                "middle" => Ok(AnchorY::Middle),
                "bottom-baseline" => Ok(AnchorY::BottomBaseline),
                "bottom-cap" => Ok(AnchorY::BottomCap),
                "bottom" => Ok(AnchorY::Bottom),
                other => parse_percent(other)
                    .map(|p| AnchorY::Fraction(p / 100.0))
                    .ok_or_else(|| format!("invalid anchorY {other:?}")),
            },
        }
    }
}

/// Candidate font supplied by the caller
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "DescriptorRepr")]
pub struct FontDescriptor {
    /// Font URL, relative to the data directory when not absolute
    pub src: String,
    /// Regular expression tested against the requested language
    pub lang: Option<String>,
    /// Restricts the candidate to one style
    pub style: Option<FontStyle>,
}

impl FontDescriptor {
    pub fn new(src: impl Into<String>) -> Self {
        Self { src: src.into(), lang: None, style: None }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_style(mut self, style: FontStyle) -> Self {
        self.style = Some(style);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorRepr {
    Src(String),
    Full {
        src: String,
        #[serde(default)]
        lang: Option<String>,
        #[serde(default)]
        style: Option<FontStyle>,
    },
}

impl From<DescriptorRepr> for FontDescriptor {
    fn from(repr: DescriptorRepr) -> Self {
        match repr {
            DescriptorRepr::Src(src) => FontDescriptor::new(src),
            DescriptorRepr::Full { src, lang, style } => FontDescriptor { src, lang, style },
        }
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<FontDescriptor>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(FontDescriptor),
        Many(Vec<FontDescriptor>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(font) => vec![font],
        OneOrMany::Many(fonts) => fonts,
    })
}

/// Input of one pipeline call
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextConfig {
    pub text: String,
    #[serde(deserialize_with = "one_or_many")]
    pub font: Vec<FontDescriptor>,
    pub lang: Option<String>,
    pub font_size: f32,
    pub font_style: FontStyle,
    pub font_weight: FontWeight,
    pub letter_spacing: f32,
    pub line_height: LineHeight,
    /// `None` means unconstrained
    pub max_width: Option<f32>,
    pub direction: Direction,
    pub text_align: TextAlign,
    pub text_indent: f32,
    pub white_space: WhiteSpace,
    pub overflow_wrap: OverflowWrap,
    pub anchor_x: AnchorX,
    pub anchor_y: AnchorY,
    /// Character index to 0xRRGGBB, applying up to the next key
    pub color_ranges: BTreeMap<usize, u32>,
    /// Tile resolution; the pipeline default when absent
    pub sdf_glyph_size: Option<u32>,
    pub include_caret_positions: bool,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            text: String::new(),
            font: Vec::new(),
            lang: None,
            font_size: 16.0,
            font_style: FontStyle::Normal,
            font_weight: FontWeight::NORMAL,
            letter_spacing: 0.0,
            line_height: LineHeight::Normal,
            max_width: None,
            direction: Direction::Auto,
            text_align: TextAlign::Left,
            text_indent: 0.0,
            white_space: WhiteSpace::Normal,
            overflow_wrap: OverflowWrap::Normal,
            anchor_x: AnchorX::default(),
            anchor_y: AnchorY::default(),
            color_ranges: BTreeMap::new(),
            sdf_glyph_size: None,
            include_caret_positions: false,
        }
    }
}

impl TextConfig {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TextError::InvalidConfig(e.to_string()))
    }

    pub fn with_font(mut self, font: FontDescriptor) -> Self {
        self.font.push(font);
        self
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_max_width(mut self, max_width: f32) -> Self {
        self.max_width = Some(max_width);
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_align(mut self, align: TextAlign) -> Self {
        self.text_align = align;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_carets(mut self) -> Self {
        self.include_caret_positions = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.default_sdf_glyph_size, 64);
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.atlas_config(), AtlasConfig::default());
        assert_eq!(config.scheduler_config(), SchedulerConfig::default());
    }

    #[test]
    fn test_pipeline_from_json() {
        let config = PipelineConfig::from_json(
            r#"{ "dataBaseUrl": "https://cdn.example/fonts/", "drainTimeSlice": 8, "maxRasterContexts": 4 }"#,
        )
        .unwrap();
        assert_eq!(config.data_base_url.as_deref(), Some("https://cdn.example/fonts/"));
        assert_eq!(config.drain_time_slice, Duration::from_millis(8));
        assert_eq!(config.scheduler_config().max_contexts, 4);
        assert!(PipelineConfig::from_json(r#"{ "chunkSize": 0 }"#).is_err());
    }

    #[test]
    fn test_pipeline_rejects_unusable_sdf_encoding() {
        for json in [r#"{ "sdfExponent": 0 }"#, r#"{ "sdfExponent": -2.5 }"#, r#"{ "sdfMargin": -0.1 }"#] {
            assert!(matches!(PipelineConfig::from_json(json), Err(TextError::InvalidConfig(_))), "{json}");
        }
        let nan = PipelineConfig { sdf_exponent: f32::NAN, ..PipelineConfig::default() };
        assert!(nan.validate().is_err());
        assert!(PipelineConfig::from_json(r#"{ "sdfExponent": 3 }"#).is_ok());
    }

    #[test]
    fn test_text_config_from_json() {
        let config = TextConfig::from_json(
            r#"{
                "text": "hi",
                "font": "fonts/a.ttf",
                "fontWeight": "bold",
                "lineHeight": "150%",
                "anchorX": "center",
                "anchorY": "top-baseline",
                "overflowWrap": "break-word",
                "colorRanges": { "0": 16711680, "5": 255 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.font, vec![FontDescriptor::new("fonts/a.ttf")]);
        assert_eq!(config.font_weight, FontWeight::BOLD);
        assert_eq!(config.line_height.resolve(20.0), Some(30.0));
        assert_eq!(config.anchor_x, AnchorX(0.5));
        assert_eq!(config.anchor_y, AnchorY::TopBaseline);
        assert_eq!(config.overflow_wrap, OverflowWrap::BreakWord);
        assert_eq!(config.color_ranges.get(&5), Some(&255));
        assert_eq!(config.font_size, 16.0);
    }

    #[test]
    fn test_font_list_with_predicates() {
        let config = TextConfig::from_json(
            r#"{ "font": [ { "src": "jp.otf", "lang": "^ja" }, { "src": "it.ttf", "style": "italic" } ] }"#,
        )
        .unwrap();
        assert_eq!(config.font[0].lang.as_deref(), Some("^ja"));
        assert_eq!(config.font[1].style, Some(FontStyle::Italic));
    }

    #[test]
    fn test_invalid_values() {
        assert!(TextConfig::from_json(r#"{ "lineHeight": "tall" }"#).is_err());
        assert!(TextConfig::from_json(r#"{ "fontWeight": 4000 }"#).is_err());
        assert!(TextConfig::from_json(r#"{ "anchorY": "sideways" }"#).is_err());
    }
}
