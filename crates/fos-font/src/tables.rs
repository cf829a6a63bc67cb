//! Fixed-layout OpenType tables: head, hhea, maxp, hmtx, OS/2, name, post

use crate::reader::{slice, FontReader};
use crate::Result;

/// Head table (font header)
#[derive(Debug, Clone)]
pub struct HeadTable {
    pub units_per_em: u16,
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
    pub mac_style: u16,
    pub index_to_loc_format: i16,
}

impl HeadTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = FontReader::new(data);
        r.skip(18)?; // version, revision, checksum adjustment, magic, flags
        let units_per_em = r.read_u16()?;
        r.skip(16)?; // timestamps
        let x_min = r.read_i16()?;
        let y_min = r.read_i16()?;
        let x_max = r.read_i16()?;
        let y_max = r.read_i16()?;
        let mac_style = r.read_u16()?;
        r.skip(4)?; // lowest rec ppem, direction hint
        let index_to_loc_format = r.read_i16()?;

        Ok(Self { units_per_em, x_min, y_min, x_max, y_max, mac_style, index_to_loc_format })
    }
}

/// Hhea table (horizontal header)
#[derive(Debug, Clone)]
pub struct HheaTable {
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
    pub advance_width_max: u16,
    pub number_of_h_metrics: u16,
}

impl HheaTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = FontReader::new(data);
        r.skip(4)?; // version
        let ascender = r.read_i16()?;
        let descender = r.read_i16()?;
        let line_gap = r.read_i16()?;
        let advance_width_max = r.read_u16()?;
        r.skip(22)?; // min side bearings, extent, caret, reserved, metric format
        let number_of_h_metrics = r.read_u16()?;

        Ok(Self { ascender, descender, line_gap, advance_width_max, number_of_h_metrics })
    }
}

/// Maxp table (maximum profile)
#[derive(Debug, Clone)]
pub struct MaxpTable {
    pub num_glyphs: u16,
}

impl MaxpTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = FontReader::new(data);
        r.skip(4)?;
        Ok(Self { num_glyphs: r.read_u16()? })
    }
}

/// Horizontal metrics, expanded to one advance per glyph
#[derive(Debug, Clone)]
pub struct HmtxTable {
    advances: Vec<u16>,
}

impl HmtxTable {
    pub fn parse(data: &[u8], number_of_h_metrics: u16, num_glyphs: u16) -> Result<Self> {
        let mut r = FontReader::new(data);
        let long = number_of_h_metrics.max(1) as usize;
        let mut advances = Vec::with_capacity(num_glyphs as usize);
        for _ in 0..long {
            advances.push(r.read_u16()?);
            r.skip(2)?; // lsb
        }
        // Trailing glyphs repeat the last advance
        let last = advances.last().copied().unwrap_or(0);
        advances.resize((num_glyphs as usize).max(long), last);
        Ok(Self { advances })
    }

    pub fn advance(&self, glyph_id: u16) -> u16 {
        self.advances
            .get(glyph_id as usize)
            .or(self.advances.last())
            .copied()
            .unwrap_or(0)
    }
}

/// OS/2 table (subset used for metrics and style)
#[derive(Debug, Clone, Default)]
pub struct Os2Table {
    pub version: u16,
    pub weight_class: u16,
    pub fs_selection: u16,
    pub typo_ascender: i16,
    pub typo_descender: i16,
    pub typo_line_gap: i16,
    pub x_height: Option<i16>,
    pub cap_height: Option<i16>,
}

impl Os2Table {
    pub const USE_TYPO_METRICS: u16 = 1 << 7;
    pub const ITALIC: u16 = 1;

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = FontReader::new(data);
        let version = r.read_u16()?;
        r.skip(2)?; // xAvgCharWidth
        let weight_class = r.read_u16()?;
        // width class, fsType, sub/superscript, strikeout, family class,
        // panose, unicode ranges, vendor id
        r.set_pos(62)?;
        let fs_selection = r.read_u16()?;
        r.skip(4)?; // first/last char index
        let typo_ascender = r.read_i16()?;
        let typo_descender = r.read_i16()?;
        let typo_line_gap = r.read_i16()?;

        let (x_height, cap_height) = if version >= 2 && data.len() >= 90 {
            // win ascent/descent, code page ranges
            r.set_pos(86)?;
            (Some(r.read_i16()?), Some(r.read_i16()?))
        } else {
            (None, None)
        };

        Ok(Self {
            version,
            weight_class,
            fs_selection,
            typo_ascender,
            typo_descender,
            typo_line_gap,
            x_height,
            cap_height,
        })
    }

    pub fn use_typo_metrics(&self) -> bool {
        self.fs_selection & Self::USE_TYPO_METRICS != 0
    }
}

/// Name IDs
pub mod name_ids {
    pub const COPYRIGHT: u16 = 0;
    pub const FAMILY: u16 = 1;
    pub const SUBFAMILY: u16 = 2;
    pub const FULL_NAME: u16 = 4;
    pub const POSTSCRIPT_NAME: u16 = 6;
    pub const TYPOGRAPHIC_FAMILY: u16 = 16;
    pub const TYPOGRAPHIC_SUBFAMILY: u16 = 17;
}

/// Name record with its decoded string
#[derive(Debug, Clone)]
pub struct NameRecord {
    pub platform_id: u16,
    pub encoding_id: u16,
    pub language_id: u16,
    pub name_id: u16,
    pub value: String,
}

/// Name table
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    pub records: Vec<NameRecord>,
}

impl NameTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = FontReader::new(data);
        let _format = r.read_u16()?;
        let count = r.read_u16()?;
        let storage = r.read_u16()? as usize;

        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let platform_id = r.read_u16()?;
            let encoding_id = r.read_u16()?;
            let language_id = r.read_u16()?;
            let name_id = r.read_u16()?;
            let length = r.read_u16()? as usize;
            let offset = r.read_u16()? as usize;
            let Ok(bytes) = slice(data, storage + offset, length) else {
                continue;
            };
            let value = match (platform_id, encoding_id) {
                // UTF-16BE
                (0, _) | (3, 0) | (3, 1) | (3, 10) => {
                    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
                    String::from_utf16_lossy(&units)
                }
                // Mac Roman; ASCII subset is all that matters for family names
                (1, 0) => bytes.iter().map(|&b| if b < 0x80 { b as char } else { '\u{FFFD}' }).collect(),
                _ => continue,
            };
            records.push(NameRecord { platform_id, encoding_id, language_id, name_id, value });
        }
        Ok(Self { records })
    }

    /// Best string for a name ID: Windows English first, then anything.
    pub fn get(&self, name_id: u16) -> Option<&str> {
        let candidates = || self.records.iter().filter(move |r| r.name_id == name_id);
        candidates()
            .find(|r| r.platform_id == 3 && r.language_id == 0x0409)
            .or_else(|| candidates().next())
            .map(|r| r.value.as_str())
    }
}

/// Post table header
#[derive(Debug, Clone, Copy, Default)]
pub struct PostTable {
    pub italic_angle: f32,
    pub underline_position: i16,
    pub underline_thickness: i16,
    pub is_fixed_pitch: bool,
}

impl PostTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = FontReader::new(data);
        r.skip(4)?; // version
        let italic_angle = r.read_fixed()?;
        let underline_position = r.read_i16()?;
        let underline_thickness = r.read_i16()?;
        let is_fixed_pitch = r.read_u32()? != 0;
        Ok(Self { italic_angle, underline_position, underline_thickness, is_fixed_pitch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmtx_repeats_last_advance() {
        let data = [0x01, 0xF4, 0x00, 0x00, 0x02, 0x58, 0x00, 0x0A, 0x00, 0x05];
        let hmtx = HmtxTable::parse(&data, 2, 4).unwrap();
        assert_eq!(hmtx.advance(0), 500);
        assert_eq!(hmtx.advance(1), 600);
        assert_eq!(hmtx.advance(3), 600);
        assert_eq!(hmtx.advance(100), 600);
    }

    #[test]
    fn test_name_prefers_windows_english() {
        let mut data = vec![0, 0, 0, 2, 0, 30];
        // Mac record "Mac"
        data.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 1, 0, 3, 0, 0]);
        // Windows record "Win"
        data.extend_from_slice(&[0, 3, 0, 1, 0x04, 0x09, 0, 1, 0, 6, 0, 3]);
        data.extend_from_slice(b"Mac");
        data.extend_from_slice(&[0, b'W', 0, b'i', 0, b'n']);
        let name = NameTable::parse(&data).unwrap();
        assert_eq!(name.records.len(), 2);
        assert_eq!(name.get(name_ids::FAMILY), Some("Win"));
        assert_eq!(name.get(name_ids::SUBFAMILY), None);
    }
}
