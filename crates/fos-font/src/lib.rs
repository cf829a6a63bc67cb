//! fOS Font - Binary font parsing
//!
//! From-scratch OpenType/TrueType parser producing an in-memory
//! [`FontResource`]:
//! - Table directory, TrueType collections and WOFF 1.0 wrappers
//! - `cmap` formats 0, 4, 6 and 12
//! - `glyf`/`loca` outlines (simple and transformed composites)
//! - `CFF` Type 2 charstrings
//! - `GSUB`, `GPOS`, `GDEF` and `kern` shaping tables

pub mod reader;
pub mod inflate;
pub mod woff;
pub mod tables;
pub mod cmap;
pub mod glyf;
pub mod cff;
pub mod outline;
pub mod layout;
pub mod gdef;
pub mod gsub;
pub mod gpos;
pub mod kern;
mod font;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use font::{FontKey, FontMetrics, FontNames, FontResource, GlyphData, OutlineFormat, ShapingTables};
pub use inflate::DeflateError;
pub use outline::{BoundingBox, GlyphPath, OutlineBuilder, OutlineSource, PathCommand};
pub use reader::FontReader;

/// Glyph identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct GlyphId(pub u16);

/// Font parsing error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FontError {
    #[error("Invalid font magic: {0:#010x}")]
    InvalidMagic(u32),

    #[error("Required table not found: {0}")]
    TableNotFound(&'static str),

    #[error("Unexpected end of font data")]
    UnexpectedEof,

    #[error("Malformed table: {0}")]
    Malformed(&'static str),

    #[error("Unsupported {table} format {format}")]
    UnsupportedFormat { table: &'static str, format: u16 },

    #[error("Face index {0} out of range")]
    FaceIndexOutOfRange(u32),

    #[error("Inflate failed: {0}")]
    Deflate(#[from] DeflateError),

    #[error("Table {tag} decompressed to {actual} bytes, expected {expected}")]
    LengthMismatch { tag: String, expected: u32, actual: u32 },
}

pub type Result<T> = std::result::Result<T, FontError>;

/// Render a table tag for logs and errors.
pub fn tag_to_string(tag: [u8; 4]) -> String {
    tag.iter().map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' }).collect()
}
