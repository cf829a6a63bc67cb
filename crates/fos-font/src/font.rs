//! Parsed font resource
//!
//! A [`FontResource`] owns its font bytes and the decoded tables needed by
//! resolution, shaping and rasterization. Glyph outlines are decoded lazily
//! and kept for the life of the resource.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, RwLock};

use crate::cff::CffTable;
use crate::cmap::CmapTable;
use crate::gdef::GdefTable;
use crate::glyf::GlyfTable;
use crate::gpos::GposTable;
use crate::gsub::GsubTable;
use crate::kern::KernTable;
use crate::outline::{GlyphPath, OutlineBuilder, OutlineSource};
use crate::reader::{slice, FontReader};
use crate::tables::{name_ids, HeadTable, HheaTable, HmtxTable, MaxpTable, NameTable, Os2Table, PostTable};
use crate::woff::{decode_woff, is_woff};
use crate::{tag_to_string, FontError, GlyphId, Result};

const TTC_TAG: u32 = 0x7474_6366; // 'ttcf'
const SFNT_TRUETYPE: u32 = 0x0001_0000;
const SFNT_OTTO: u32 = 0x4F54_544F; // 'OTTO'
const SFNT_APPLE_TRUE: u32 = 0x7472_7565; // 'true'

/// Identity of a font resource (its source URL or buffer key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontKey(Arc<str>);

impl FontKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FontKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FontKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for FontKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

/// Vertical metrics in font units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub units_per_em: u16,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
    pub cap_height: f32,
    pub x_height: f32,
}

impl FontMetrics {
    /// Natural line height (ascender - descender + line gap)
    pub fn line_height(&self) -> f32 {
        self.ascender - self.descender + self.line_gap
    }

    /// Scale factor from font units to pixels at `font_size`
    pub fn scale(&self, font_size: f32) -> f32 {
        font_size / self.units_per_em.max(1) as f32
    }
}

/// Naming and style information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontNames {
    pub family: Option<String>,
    pub subfamily: Option<String>,
    pub weight: u16,
    pub italic: bool,
    pub italic_angle: f32,
    pub underline_position: i16,
    pub underline_thickness: i16,
}

/// Outline table flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineFormat {
    TrueType,
    Cff,
}

/// Decoded glyph: advance plus normalized outline
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphData {
    pub advance: u16,
    pub path: GlyphPath,
}

/// Optional shaping tables. Malformed tables are dropped with a warning.
#[derive(Debug, Clone, Default)]
pub struct ShapingTables {
    pub gsub: Option<GsubTable>,
    pub gpos: Option<GposTable>,
    pub gdef: Option<GdefTable>,
    pub kern: Option<KernTable>,
}

impl ShapingTables {
    pub fn is_empty(&self) -> bool {
        self.gsub.is_none() && self.gpos.is_none() && self.kern.is_none()
    }
}

#[derive(Debug)]
enum Outlines {
    Glyf { glyf: Range<usize>, loca: Range<usize>, index_to_loc_format: i16 },
    Cff { range: Range<usize>, table: CffTable },
}

/// A parsed font, shared read-only by all typesetting calls
pub struct FontResource {
    key: FontKey,
    data: Arc<[u8]>,
    tables: HashMap<[u8; 4], Range<usize>>,
    num_glyphs: u16,
    metrics: FontMetrics,
    names: FontNames,
    cmap: CmapTable,
    hmtx: HmtxTable,
    outlines: Outlines,
    shaping: ShapingTables,
    glyphs: RwLock<HashMap<GlyphId, Arc<GlyphData>>>,
}

impl fmt::Debug for FontResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontResource")
            .field("key", &self.key)
            .field("family", &self.names.family)
            .field("num_glyphs", &self.num_glyphs)
            .field("format", &self.outline_format())
            .finish_non_exhaustive()
    }
}

impl FontResource {
    /// Parse a font, TrueType collection (first face) or WOFF wrapper
    pub fn parse(key: impl Into<FontKey>, bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        Self::parse_index(key, bytes, 0)
    }

    /// Parse face `index` of a font buffer
    pub fn parse_index(key: impl Into<FontKey>, bytes: impl Into<Arc<[u8]>>, index: u32) -> Result<Self> {
        let key = key.into();
        let mut data: Arc<[u8]> = bytes.into();
        if is_woff(&data) {
            data = decode_woff(&data)?.into();
        }

        let face_offset = face_offset(&data, index)?;
        let tables = read_directory(&data, face_offset)?;
        let table = |tag: &[u8; 4], name: &'static str| -> Result<&[u8]> {
            let range = tables.get(tag).ok_or(FontError::TableNotFound(name))?;
            Ok(&data[range.clone()])
        };

        let head = HeadTable::parse(table(b"head", "head")?)?;
        let maxp = MaxpTable::parse(table(b"maxp", "maxp")?)?;
        let hhea = HheaTable::parse(table(b"hhea", "hhea")?)?;
        let hmtx = HmtxTable::parse(table(b"hmtx", "hmtx")?, hhea.number_of_h_metrics, maxp.num_glyphs)?;
        let cmap = CmapTable::parse(table(b"cmap", "cmap")?)?;

        let outlines = match (tables.get(b"glyf"), tables.get(b"loca"), tables.get(b"CFF ")) {
            (Some(glyf), Some(loca), _) => {
                Outlines::Glyf { glyf: glyf.clone(), loca: loca.clone(), index_to_loc_format: head.index_to_loc_format }
            }
            (_, _, Some(cff)) => Outlines::Cff { range: cff.clone(), table: CffTable::parse(&data[cff.clone()])? },
            _ => return Err(FontError::TableNotFound("glyf/loca or CFF")),
        };

        let os2 = optional(&tables, &data, b"OS/2", Os2Table::parse);
        let name = optional(&tables, &data, b"name", NameTable::parse);
        let post = optional(&tables, &data, b"post", PostTable::parse);

        let shaping = ShapingTables {
            gsub: optional(&tables, &data, b"GSUB", GsubTable::parse),
            gpos: optional(&tables, &data, b"GPOS", GposTable::parse),
            gdef: optional(&tables, &data, b"GDEF", GdefTable::parse),
            kern: optional(&tables, &data, b"kern", KernTable::parse),
        };

        let names = FontNames {
            family: name.as_ref().and_then(|n| {
                n.get(name_ids::TYPOGRAPHIC_FAMILY).or_else(|| n.get(name_ids::FAMILY)).map(str::to_owned)
            }),
            subfamily: name.as_ref().and_then(|n| {
                n.get(name_ids::TYPOGRAPHIC_SUBFAMILY).or_else(|| n.get(name_ids::SUBFAMILY)).map(str::to_owned)
            }),
            weight: os2.as_ref().map_or(400, |o| o.weight_class),
            italic: os2.as_ref().is_some_and(|o| o.fs_selection & Os2Table::ITALIC != 0) || head.mac_style & 0x2 != 0,
            italic_angle: post.map_or(0.0, |p| p.italic_angle),
            underline_position: post.map_or(0, |p| p.underline_position),
            underline_thickness: post.map_or(0, |p| p.underline_thickness),
        };

        let mut font = Self {
            key,
            data: data.clone(),
            tables,
            num_glyphs: maxp.num_glyphs,
            metrics: FontMetrics {
                units_per_em: head.units_per_em,
                ascender: hhea.ascender as f32,
                descender: hhea.descender as f32,
                line_gap: hhea.line_gap as f32,
                cap_height: 0.0,
                x_height: 0.0,
            },
            names,
            cmap,
            hmtx,
            outlines,
            shaping,
            glyphs: RwLock::new(HashMap::new()),
        };
        font.metrics = font.resolve_metrics(&hhea, os2.as_ref());

        tracing::info!(
            "Parsed font {} ({}): {} glyphs, {:?} outlines",
            font.key,
            font.names.family.as_deref().unwrap_or("unnamed"),
            font.num_glyphs,
            font.outline_format()
        );
        Ok(font)
    }

    fn resolve_metrics(&self, hhea: &HheaTable, os2: Option<&Os2Table>) -> FontMetrics {
        let upem = self.metrics.units_per_em as f32;
        let (ascender, descender, line_gap) = match os2 {
            Some(os2) if os2.use_typo_metrics() => {
                (os2.typo_ascender as f32, os2.typo_descender as f32, os2.typo_line_gap as f32)
            }
            _ => (hhea.ascender as f32, hhea.descender as f32, hhea.line_gap as f32),
        };
        let from_glyph = |c: char| {
            let glyph = self.glyph_index(c)?;
            let path = self.glyph(glyph).path.clone();
            (!path.is_empty()).then(|| path.bounds().y_max)
        };
        let cap_height = os2
            .and_then(|o| o.cap_height)
            .filter(|&h| h > 0)
            .map(f32::from)
            .or_else(|| from_glyph('H'))
            .unwrap_or(upem * 0.7);
        let x_height = os2
            .and_then(|o| o.x_height)
            .filter(|&h| h > 0)
            .map(f32::from)
            .or_else(|| from_glyph('x'))
            .unwrap_or(upem * 0.5);
        FontMetrics { units_per_em: self.metrics.units_per_em, ascender, descender, line_gap, cap_height, x_height }
    }

    pub fn key(&self) -> &FontKey {
        &self.key
    }

    pub fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    pub fn names(&self) -> &FontNames {
        &self.names
    }

    pub fn num_glyphs(&self) -> u16 {
        self.num_glyphs
    }

    pub fn shaping(&self) -> &ShapingTables {
        &self.shaping
    }

    pub fn cmap(&self) -> &CmapTable {
        &self.cmap
    }

    pub fn outline_format(&self) -> OutlineFormat {
        match self.outlines {
            Outlines::Glyf { .. } => OutlineFormat::TrueType,
            Outlines::Cff { .. } => OutlineFormat::Cff,
        }
    }

    /// Raw bytes of a table
    pub fn table_data(&self, tag: &[u8; 4]) -> Option<&[u8]> {
        self.tables.get(tag).map(|r| &self.data[r.clone()])
    }

    /// Glyph for a character; `None` when the font does not map it
    pub fn glyph_index(&self, c: char) -> Option<GlyphId> {
        self.cmap.glyph_index(c as u32)
    }

    pub fn has_char(&self, c: char) -> bool {
        self.glyph_index(c).is_some()
    }

    /// Horizontal advance in font units
    pub fn advance(&self, glyph: GlyphId) -> u16 {
        self.hmtx.advance(glyph.0)
    }

    /// Legacy kerning adjustment in font units
    pub fn kerning(&self, left: GlyphId, right: GlyphId) -> Option<i16> {
        self.shaping.kern.as_ref()?.get(left.0, right.0)
    }

    /// Raw outline data of a glyph, tagged by format
    pub fn outline_source(&self, glyph: GlyphId) -> Result<OutlineSource<'_>> {
        if glyph.0 >= self.num_glyphs {
            return Ok(OutlineSource::Empty);
        }
        match &self.outlines {
            Outlines::Glyf { glyf, loca, index_to_loc_format } => {
                GlyfTable::new(&self.data[glyf.clone()], &self.data[loca.clone()], *index_to_loc_format).source(glyph.0)
            }
            Outlines::Cff { range, table } => {
                table.charstring(&self.data[range.clone()], glyph.0).map(OutlineSource::Charstring)
            }
        }
    }

    /// Turn any outline source into path commands
    pub fn normalize(&self, source: &OutlineSource<'_>, builder: &mut dyn OutlineBuilder) -> Result<()> {
        match (source, &self.outlines) {
            (OutlineSource::Empty, _) => Ok(()),
            (OutlineSource::Simple(glyph), _) => {
                glyph.emit(builder);
                Ok(())
            }
            (OutlineSource::Composite(components), Outlines::Glyf { glyf, loca, index_to_loc_format }) => {
                GlyfTable::new(&self.data[glyf.clone()], &self.data[loca.clone()], *index_to_loc_format)
                    .emit_components(components, builder, 0)
            }
            (OutlineSource::Charstring(charstring), Outlines::Cff { range, table }) => {
                table.outline(&self.data[range.clone()], *charstring, builder)
            }
            _ => Err(FontError::Malformed("outline source does not belong to this font")),
        }
    }

    /// Decoded glyph, cached for the life of the font.
    ///
    /// A glyph whose outline fails to decode is cached as an empty path.
    pub fn glyph(&self, glyph: GlyphId) -> Arc<GlyphData> {
        if let Some(data) = self.glyphs.read().unwrap_or_else(|e| e.into_inner()).get(&glyph) {
            return data.clone();
        }

        let mut path = GlyphPath::new();
        if let Err(e) = self.outline_source(glyph).and_then(|source| self.normalize(&source, &mut path)) {
            tracing::warn!("Glyph {} of {} has a broken outline: {}", glyph.0, self.key, e);
            path = GlyphPath::new();
        }
        let data = Arc::new(GlyphData { advance: self.advance(glyph), path });

        let mut cache = self.glyphs.write().unwrap_or_else(|e| e.into_inner());
        cache.entry(glyph).or_insert(data).clone()
    }
}

/// Offset of the table directory for face `index`
fn face_offset(data: &[u8], index: u32) -> Result<usize> {
    let mut reader = FontReader::new(data);
    if reader.read_u32()? != TTC_TAG {
        return if index == 0 { Ok(0) } else { Err(FontError::FaceIndexOutOfRange(index)) };
    }
    let _version = reader.read_u32()?;
    let num_fonts = reader.read_u32()?;
    if index >= num_fonts {
        return Err(FontError::FaceIndexOutOfRange(index));
    }
    reader.skip(index as usize * 4)?;
    Ok(reader.read_u32()? as usize)
}

fn read_directory(data: &[u8], offset: usize) -> Result<HashMap<[u8; 4], Range<usize>>> {
    let mut reader = FontReader::at(data, offset)?;
    let version = reader.read_u32()?;
    if !matches!(version, SFNT_TRUETYPE | SFNT_OTTO | SFNT_APPLE_TRUE) {
        return Err(FontError::InvalidMagic(version));
    }
    let num_tables = reader.read_u16()?;
    reader.skip(6)?; // search range, entry selector, range shift

    let mut tables = HashMap::with_capacity(num_tables as usize);
    for _ in 0..num_tables {
        let tag = reader.read_tag()?;
        let _checksum = reader.read_u32()?;
        let start = reader.read_u32()? as usize;
        let length = reader.read_u32()? as usize;
        if slice(data, start, length).is_err() {
            tracing::warn!("Table {} lies outside the font data, ignoring it", tag_to_string(tag));
            continue;
        }
        tables.insert(tag, start..start + length);
    }
    Ok(tables)
}

/// Parse an optional table, logging and dropping it when malformed
fn optional<T>(tables: &HashMap<[u8; 4], Range<usize>>, data: &[u8], tag: &[u8; 4], parse: fn(&[u8]) -> Result<T>) -> Option<T> {
    let range = tables.get(tag)?;
    match parse(&data[range.clone()]) {
        Ok(table) => Some(table),
        Err(e) => {
            tracing::warn!("Ignoring malformed {} table: {}", tag_to_string(*tag), e);
            None
        }
    }
}
