//! fOS Text - Text to SDF glyph quads
//!
//! This crate turns Unicode text into positioned glyph quads backed by the
//! shared SDF atlas:
//! - Resource loading with one in-flight fetch per URL ([`loader`], [`memo`])
//! - Codepoint coverage lookup and per-character font resolution ([`coverage`], [`resolver`])
//! - Shaping with GSUB/GPOS or legacy kerning ([`shaping`])
//! - Bidi levels, line breaking and the typesetter ([`bidi`], [`linebreak`], [`layout`])
//! - The pipeline façade that sequences it all ([`TextPipeline`])

pub mod config;
pub mod loader;
pub mod memo;
pub mod font_cache;
pub mod coverage;
pub mod resolver;
pub mod bidi;
pub mod linebreak;
pub mod shaping;
pub mod layout;
mod pipeline;

pub use config::{
    AnchorX, AnchorY, Direction, FontDescriptor, FontStyle, FontWeight, LineHeight, OverflowWrap, PipelineConfig,
    TextAlign, TextConfig, WhiteSpace,
};
pub use coverage::CoverageDatabase;
pub use font_cache::FontCache;
pub use layout::{
    typeset, CaretRect, ChunkBounds, FontRun, GlyphRunEntry, LineBox, Rect, TypesetFont, TypesetParams,
    TypesetResult,
};
pub use loader::{FileLoader, MemoryLoader, ResourceLoader};
pub use pipeline::{GlyphQuad, PipelineResult, TextPipeline, Timings};
pub use resolver::{FontResolver, ResolveRequest};

use fos_font::FontError;
use fos_sdf::SdfError;

/// Text pipeline error types
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse font: {0}")]
    FontParsing(#[from] FontError),

    #[error("Malformed coverage document {url}: {source}")]
    Coverage {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid resource URL: {0}")]
    InvalidUrl(String),

    #[error("No font available for the requested text")]
    NoFontAvailable,

    #[error("SDF atlas error: {0}")]
    Sdf(#[from] SdfError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TextError>;
