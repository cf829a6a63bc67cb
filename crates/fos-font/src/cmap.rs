//! Character to glyph mapping (cmap table)
//!
//! The preferred subtable is decoded once into a codepoint map so lookups
//! during shaping are a single hash probe.

use std::collections::HashMap;

use crate::reader::{tail, FontReader};
use crate::{FontError, GlyphId, Result};

/// Decoded character map
#[derive(Debug, Clone, Default)]
pub struct CmapTable {
    map: HashMap<u32, u16>,
    /// (platform, encoding, format) of the subtable used
    source: (u16, u16, u16),
}

/// Subtable priority: Unicode full repertoire, then BMP, then Mac Roman.
fn encoding_priority(platform_id: u16, encoding_id: u16) -> Option<u8> {
    match (platform_id, encoding_id) {
        (0, 4) | (0, 6) | (3, 10) => Some(3),
        (0, 0..=3) | (3, 1) => Some(2),
        (1, 0) => Some(1),
        _ => None,
    }
}

impl CmapTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let _version = reader.read_u16()?;
        let num_tables = reader.read_u16()?;

        let mut candidates = Vec::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            let platform_id = reader.read_u16()?;
            let encoding_id = reader.read_u16()?;
            let offset = reader.read_u32()? as usize;
            if let Some(priority) = encoding_priority(platform_id, encoding_id) {
                candidates.push((priority, platform_id, encoding_id, offset));
            }
        }
        // Stable: equal priorities keep directory order
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let mut last_error = FontError::Malformed("cmap has no Unicode or Mac Roman subtable");
        for (_, platform_id, encoding_id, offset) in candidates {
            match tail(data, offset).and_then(|sub| parse_subtable(sub, platform_id == 1)) {
                Ok((format, map)) => {
                    return Ok(Self { map, source: (platform_id, encoding_id, format) });
                }
                Err(e) => {
                    tracing::debug!("Skipping cmap subtable ({}, {}): {}", platform_id, encoding_id, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Glyph for a codepoint; `.notdef` mappings count as absent
    pub fn glyph_index(&self, codepoint: u32) -> Option<GlyphId> {
        self.map.get(&codepoint).copied().filter(|&g| g != 0).map(GlyphId)
    }

    /// Every mapped codepoint, unordered
    pub fn codepoints(&self) -> impl Iterator<Item = u32> + '_ {
        self.map.iter().filter(|(_, g)| **g != 0).map(|(&c, _)| c)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// (platform, encoding, format) of the decoded subtable
    pub fn source(&self) -> (u16, u16, u16) {
        self.source
    }
}

fn parse_subtable(data: &[u8], mac_roman: bool) -> Result<(u16, HashMap<u32, u16>)> {
    let format = FontReader::new(data).read_u16()?;
    let mut map = HashMap::new();
    match format {
        0 => parse_format0(data, &mut map)?,
        4 => parse_format4(data, &mut map)?,
        6 => parse_format6(data, &mut map)?,
        12 => parse_format12(data, &mut map)?,
        _ => return Err(FontError::UnsupportedFormat { table: "cmap", format }),
    }
    if mac_roman {
        map = map.into_iter().map(|(code, glyph)| (mac_roman_to_unicode(code), glyph)).collect();
    }
    Ok((format, map))
}

/// Format 0: byte encoding table
fn parse_format0(data: &[u8], map: &mut HashMap<u32, u16>) -> Result<()> {
    let mut reader = FontReader::new(data);
    reader.skip(6)?; // format, length, language
    for (code, &glyph) in reader.read_bytes(256)?.iter().enumerate() {
        map.insert(code as u32, glyph as u16);
    }
    Ok(())
}

/// Format 4: segment mapping to delta values (BMP only)
fn parse_format4(data: &[u8], map: &mut HashMap<u32, u16>) -> Result<()> {
    let mut reader = FontReader::new(data);
    reader.skip(6)?; // format, length, language
    let seg_count = (reader.read_u16()? / 2) as usize;
    reader.skip(6)?; // search range, entry selector, range shift

    let end_codes = reader.read_u16_array(seg_count)?;
    reader.skip(2)?; // reserved pad
    let start_codes = reader.read_u16_array(seg_count)?;
    let id_deltas = reader.read_u16_array(seg_count)?;
    let ranges_offset = reader.pos();
    let id_range_offsets = reader.read_u16_array(seg_count)?;

    for seg in 0..seg_count {
        let (start, end) = (start_codes[seg], end_codes[seg]);
        if start > end {
            continue;
        }
        let delta = id_deltas[seg];
        let range_offset = id_range_offsets[seg] as usize;
        for code in start..=end {
            let glyph = if range_offset == 0 {
                code.wrapping_add(delta)
            } else {
                // idRangeOffset is relative to its own slot
                let at = ranges_offset + seg * 2 + range_offset + (code - start) as usize * 2;
                match FontReader::at(data, at).and_then(|mut r| r.read_u16()) {
                    Ok(0) | Err(_) => 0,
                    Ok(g) => g.wrapping_add(delta),
                }
            };
            if glyph != 0 {
                map.insert(code as u32, glyph);
            }
        }
    }
    Ok(())
}

/// Format 6: trimmed table mapping
fn parse_format6(data: &[u8], map: &mut HashMap<u32, u16>) -> Result<()> {
    let mut reader = FontReader::new(data);
    reader.skip(6)?; // format, length, language
    let first_code = reader.read_u16()? as u32;
    let count = reader.read_u16()? as usize;
    for (i, glyph) in reader.read_u16_array(count)?.into_iter().enumerate() {
        if glyph != 0 {
            map.insert(first_code + i as u32, glyph);
        }
    }
    Ok(())
}

/// Format 12: segmented coverage (full Unicode)
fn parse_format12(data: &[u8], map: &mut HashMap<u32, u16>) -> Result<()> {
    let mut reader = FontReader::new(data);
    reader.skip(12)?; // format, reserved, length, language
    let num_groups = reader.read_u32()?;
    for _ in 0..num_groups {
        let start_char = reader.read_u32()?;
        let end_char = reader.read_u32()?.min(0x10FFFF);
        let start_glyph = reader.read_u32()?;
        if start_char > end_char {
            continue;
        }
        for code in start_char..=end_char {
            let glyph = start_glyph + (code - start_char);
            if glyph > u16::MAX as u32 {
                break;
            }
            map.insert(code, glyph as u16);
        }
    }
    Ok(())
}

const MAC_ROMAN_HIGH: [u16; 128] = [
    0x00C4, 0x00C5, 0x00C7, 0x00C9, 0x00D1, 0x00D6, 0x00DC, 0x00E1,
    0x00E0, 0x00E2, 0x00E4, 0x00E3, 0x00E5, 0x00E7, 0x00E9, 0x00E8,
    0x00EA, 0x00EB, 0x00ED, 0x00EC, 0x00EE, 0x00EF, 0x00F1, 0x00F3,
    0x00F2, 0x00F4, 0x00F6, 0x00F5, 0x00FA, 0x00F9, 0x00FB, 0x00FC,
    0x2020, 0x00B0, 0x00A2, 0x00A3, 0x00A7, 0x2022, 0x00B6, 0x00DF,
    0x00AE, 0x00A9, 0x2122, 0x00B4, 0x00A8, 0x2260, 0x00C6, 0x00D8,
    0x221E, 0x00B1, 0x2264, 0x2265, 0x00A5, 0x00B5, 0x2202, 0x2211,
    0x220F, 0x03C0, 0x222B, 0x00AA, 0x00BA, 0x03A9, 0x00E6, 0x00F8,
    0x00BF, 0x00A1, 0x00AC, 0x221A, 0x0192, 0x2248, 0x2206, 0x00AB,
    0x00BB, 0x2026, 0x00A0, 0x00C0, 0x00C3, 0x00D5, 0x0152, 0x0153,
    0x2013, 0x2014, 0x201C, 0x201D, 0x2018, 0x2019, 0x00F7, 0x25CA,
    0x00FF, 0x0178, 0x2044, 0x20AC, 0x2039, 0x203A, 0xFB01, 0xFB02,
    0x2021, 0x00B7, 0x201A, 0x201E, 0x2030, 0x00C2, 0x00CA, 0x00C1,
    0x00CB, 0x00C8, 0x00CD, 0x00CE, 0x00CF, 0x00CC, 0x00D3, 0x00D4,
    0xF8FF, 0x00D2, 0x00DA, 0x00DB, 0x00D9, 0x0131, 0x02C6, 0x02DC,
    0x00AF, 0x02D8, 0x02D9, 0x02DA, 0x00B8, 0x02DD, 0x02DB, 0x02C7,
];

fn mac_roman_to_unicode(code: u32) -> u32 {
    match code {
        0..=0x7F => code,
        0x80..=0xFF => MAC_ROMAN_HIGH[(code - 0x80) as usize] as u32,
        _ => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmap_with(subtables: &[(u16, u16, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0, 0];
        out.extend_from_slice(&(subtables.len() as u16).to_be_bytes());
        let mut offset = 4 + subtables.len() * 8;
        for (platform, encoding, body) in subtables {
            out.extend_from_slice(&platform.to_be_bytes());
            out.extend_from_slice(&encoding.to_be_bytes());
            out.extend_from_slice(&(offset as u32).to_be_bytes());
            offset += body.len();
        }
        for (_, _, body) in subtables {
            out.extend_from_slice(body);
        }
        out
    }

    fn format6(first: u16, glyphs: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        for v in [6u16, (10 + glyphs.len() * 2) as u16, 0, first, glyphs.len() as u16] {
            out.extend_from_slice(&v.to_be_bytes());
        }
        for g in glyphs {
            out.extend_from_slice(&g.to_be_bytes());
        }
        out
    }

    fn format12(groups: &[(u32, u32, u32)]) -> Vec<u8> {
        let mut out = vec![0, 12, 0, 0];
        out.extend_from_slice(&((16 + groups.len() * 12) as u32).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(groups.len() as u32).to_be_bytes());
        for (s, e, g) in groups {
            out.extend_from_slice(&s.to_be_bytes());
            out.extend_from_slice(&e.to_be_bytes());
            out.extend_from_slice(&g.to_be_bytes());
        }
        out
    }

    #[test]
    fn test_prefers_full_unicode_subtable() {
        let data = cmap_with(&[
            (1, 0, format6(0x41, &[9])),
            (3, 1, format6(0x41, &[5, 6])),
            (3, 10, format12(&[(0x41, 0x42, 1), (0x1F600, 0x1F600, 3)])),
        ]);
        let cmap = CmapTable::parse(&data).unwrap();
        assert_eq!(cmap.source(), (3, 10, 12));
        assert_eq!(cmap.glyph_index(0x41), Some(GlyphId(1)));
        assert_eq!(cmap.glyph_index(0x1F600), Some(GlyphId(3)));
        assert_eq!(cmap.glyph_index(0x43), None);
    }

    #[test]
    fn test_falls_back_on_unsupported_format() {
        let mut format2 = vec![0u8, 2];
        format2.extend_from_slice(&[0; 8]);
        let data = cmap_with(&[(3, 10, format2), (0, 3, format6(0x30, &[4, 0, 5]))]);
        let cmap = CmapTable::parse(&data).unwrap();
        assert_eq!(cmap.source(), (0, 3, 6));
        assert_eq!(cmap.glyph_index(0x30), Some(GlyphId(4)));
        assert_eq!(cmap.glyph_index(0x31), None);
        assert_eq!(cmap.glyph_index(0x32), Some(GlyphId(5)));
    }

    #[test]
    fn test_mac_roman_format0() {
        let mut body = vec![0, 0, 1, 6, 0, 0];
        let mut glyphs = [0u8; 256];
        glyphs[0x41] = 7;
        glyphs[0x8A] = 8; // a with diaeresis
        body.extend_from_slice(&glyphs);
        let cmap = CmapTable::parse(&cmap_with(&[(1, 0, body)])).unwrap();
        assert_eq!(cmap.glyph_index('A' as u32), Some(GlyphId(7)));
        assert_eq!(cmap.glyph_index('ä' as u32), Some(GlyphId(8)));
    }

    #[test]
    fn test_no_usable_subtable() {
        let data = cmap_with(&[(2, 0, format6(0, &[1]))]);
        assert!(CmapTable::parse(&data).is_err());
    }
}
