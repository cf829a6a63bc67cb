//! Text layout module
//!
//! Positions resolved font runs into lines. Coordinates are in pixels with
//! y pointing up; before anchoring the block's top edge sits at y = 0 and
//! lines stack downwards.

mod carets;
mod typesetter;

pub use typesetter::typeset;

use std::collections::BTreeMap;
use std::sync::Arc;

use fos_font::{FontResource, GlyphId};

use crate::config::{
    AnchorX, AnchorY, Direction, LineHeight, OverflowWrap, TextAlign, TextConfig, WhiteSpace,
};

/// Characters `start..end` set in one font; `None` when no font could be
/// loaded for them.
#[derive(Debug, Clone)]
pub struct FontRun {
    pub start: usize,
    pub end: usize,
    pub font: Option<Arc<FontResource>>,
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl Rect {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect { x_min: self.x_min + dx, y_min: self.y_min + dy, x_max: self.x_max + dx, y_max: self.y_max + dy }
    }

    /// Union of all rects, zero when there are none
    pub fn union_all<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Rect {
        rects.into_iter().copied().reduce(|a, b| a.union(&b)).unwrap_or_default()
    }
}

/// A font at the requested size, with metrics in pixels
#[derive(Debug, Clone)]
pub struct TypesetFont {
    pub font: Arc<FontResource>,
    /// Font units to pixels
    pub scale: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
    pub cap_height: f32,
    pub x_height: f32,
}

impl TypesetFont {
    pub fn new(font: Arc<FontResource>, font_size: f32) -> Self {
        let metrics = *font.metrics();
        let scale = metrics.scale(font_size);
        Self {
            font,
            scale,
            ascender: metrics.ascender * scale,
            descender: metrics.descender * scale,
            line_gap: metrics.line_gap * scale,
            cap_height: metrics.cap_height * scale,
            x_height: metrics.x_height * scale,
        }
    }

    /// Natural line height in pixels
    pub fn line_height(&self) -> f32 {
        self.ascender - self.descender + self.line_gap
    }
}

/// One visible glyph, in visual order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphRunEntry {
    pub glyph: GlyphId,
    /// Index into [`TypesetResult::fonts`]
    pub font: usize,
    /// Glyph origin on the baseline
    pub x: f32,
    pub y: f32,
    /// Advance after justification and letter spacing
    pub advance: f32,
    /// Char index of the source character
    pub char_index: usize,
    pub line: usize,
    /// 0xRRGGBB from the color ranges
    pub color: Option<u32>,
}

/// One line; vertical positions are absolute y values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineBox {
    /// Char range
    pub start: usize,
    pub end: usize,
    /// Advance width, excluding trailing whitespace
    pub width: f32,
    pub height: f32,
    pub top: f32,
    pub baseline: f32,
    pub cap_line: f32,
    pub ex_line: f32,
    /// Ended by wrapping
    pub soft: bool,
}

/// Caret box of one source character
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaretRect {
    pub char_index: usize,
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
}

/// Bounds of a fixed-size slice of the glyph run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkBounds {
    /// Glyph range in [`TypesetResult::glyphs`]
    pub start: usize,
    pub end: usize,
    pub rect: Rect,
}

/// Layout parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TypesetParams {
    pub font_size: f32,
    pub letter_spacing: f32,
    pub line_height: LineHeight,
    pub max_width: Option<f32>,
    pub direction: Direction,
    pub align: TextAlign,
    pub indent: f32,
    pub white_space: WhiteSpace,
    pub overflow_wrap: OverflowWrap,
    pub anchor_x: AnchorX,
    pub anchor_y: AnchorY,
    pub color_ranges: BTreeMap<usize, u32>,
    pub include_carets: bool,
    /// Glyphs per culling chunk
    pub chunk_size: usize,
}

impl Default for TypesetParams {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            letter_spacing: 0.0,
            line_height: LineHeight::Normal,
            max_width: None,
            direction: Direction::Auto,
            align: TextAlign::Left,
            indent: 0.0,
            white_space: WhiteSpace::Normal,
            overflow_wrap: OverflowWrap::Normal,
            anchor_x: AnchorX::default(),
            anchor_y: AnchorY::default(),
            color_ranges: BTreeMap::new(),
            include_carets: false,
            chunk_size: 8192,
        }
    }
}

impl TypesetParams {
    pub fn from_config(config: &TextConfig, chunk_size: usize) -> Self {
        Self {
            font_size: config.font_size,
            letter_spacing: config.letter_spacing,
            line_height: config.line_height,
            max_width: config.max_width,
            direction: config.direction,
            align: config.text_align,
            indent: config.text_indent,
            white_space: config.white_space,
            overflow_wrap: config.overflow_wrap,
            anchor_x: config.anchor_x,
            anchor_y: config.anchor_y,
            color_ranges: config.color_ranges.clone(),
            include_carets: config.include_caret_positions,
            chunk_size,
        }
    }

    /// Color of a character: the value of the closest range key at or
    /// before it
    pub fn color_at(&self, char_index: usize) -> Option<u32> {
        self.color_ranges.range(..=char_index).next_back().map(|(_, color)| *color)
    }
}

/// Output of one layout call
#[derive(Debug, Clone, Default)]
pub struct TypesetResult {
    /// Visible glyphs, line by line in visual order
    pub glyphs: Vec<GlyphRunEntry>,
    pub fonts: Vec<TypesetFont>,
    pub lines: Vec<LineBox>,
    /// Layout box of the whole block
    pub block_bounds: Rect,
    /// Union of the glyphs' outline bounds
    pub visible_bounds: Rect,
    pub chunked_bounds: Vec<ChunkBounds>,
    /// One per character in char order, when requested
    pub carets: Option<Vec<CaretRect>>,
}

impl TypesetResult {
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Outline bounds of a glyph entry in layout coordinates
    pub fn glyph_bounds(&self, entry: &GlyphRunEntry) -> Rect {
        let font = &self.fonts[entry.font];
        let bounds = font.font.glyph(entry.glyph).path.bounds();
        Rect::new(
            entry.x + bounds.x_min * font.scale,
            entry.y + bounds.y_min * font.scale,
            entry.x + bounds.x_max * font.scale,
            entry.y + bounds.y_max * font.scale,
        )
    }
}
