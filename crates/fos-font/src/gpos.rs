//! OpenType GPOS (Glyph Positioning) table
//!
//! Supports single (1) and pair (2) adjustment, mark-to-base (4),
//! mark-to-mark (6), contextual (7, 8) and extension (9) lookups.
//! Device tables are ignored.

use crate::gdef::GdefTable;
use crate::layout::{ChainContext, ClassDef, Coverage, GlyphInfo, LayoutTable, Lookup, Skipper};
use crate::reader::{tail, FontReader};
use crate::{FontError, Result};

const MAX_NESTING: u8 = 6;

/// Value record for positioning adjustments (font units)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueRecord {
    pub x_placement: i16,
    pub y_placement: i16,
    pub x_advance: i16,
    pub y_advance: i16,
}

impl ValueRecord {
    pub fn parse(reader: &mut FontReader, format: u16) -> Result<Self> {
        let mut record = ValueRecord::default();
        if format & 0x0001 != 0 {
            record.x_placement = reader.read_i16()?;
        }
        if format & 0x0002 != 0 {
            record.y_placement = reader.read_i16()?;
        }
        if format & 0x0004 != 0 {
            record.x_advance = reader.read_i16()?;
        }
        if format & 0x0008 != 0 {
            record.y_advance = reader.read_i16()?;
        }
        // Device table offsets
        reader.skip(2 * (format & 0x00F0).count_ones() as usize)?;
        Ok(record)
    }

    /// Size in bytes for a given format
    pub fn size(format: u16) -> usize {
        2 * (format & 0x00FF).count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply_to(&self, position: &mut GlyphPosition) {
        position.x_offset += self.x_placement as i32;
        position.y_offset += self.y_placement as i32;
        position.x_advance += self.x_advance as i32;
        position.y_advance += self.y_advance as i32;
    }
}

/// Anchor point for mark attachment (formats 1-3; contour points ignored)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub x: i16,
    pub y: i16,
}

impl Anchor {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let format = reader.read_u16()?;
        if !(1..=3).contains(&format) {
            return Err(FontError::UnsupportedFormat { table: "Anchor", format });
        }
        Ok(Self { x: reader.read_i16()?, y: reader.read_i16()? })
    }
}

/// Positioning output for one glyph (font units)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphPosition {
    pub x_advance: i32,
    pub y_advance: i32,
    pub x_offset: i32,
    pub y_offset: i32,
    pub attachment: Option<Attachment>,
}

/// Pending mark attachment, resolved by [`GposTable::resolve_attachments`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    /// Index of the glyph this mark hangs on
    pub to: usize,
    /// Base anchor minus mark anchor
    pub dx: i32,
    pub dy: i32,
}

#[derive(Debug, Clone)]
pub enum PairPos {
    /// Format 1: per-glyph pair sets, sorted by second glyph
    Glyphs { coverage: Coverage, sets: Vec<Vec<(u16, ValueRecord, ValueRecord)>> },
    /// Format 2: class-pair matrix
    Classes {
        coverage: Coverage,
        class1: ClassDef,
        class2: ClassDef,
        class2_count: usize,
        values: Vec<(ValueRecord, ValueRecord)>,
    },
}

impl PairPos {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let format = reader.read_u16()?;
        let coverage = Coverage::parse_at(data, reader.read_u16()?)?;
        let format1 = reader.read_u16()?;
        let format2 = reader.read_u16()?;
        match format {
            1 => {
                let count = reader.read_u16()? as usize;
                let mut sets = Vec::with_capacity(count);
                for offset in reader.read_u16_array(count)? {
                    let mut sr = FontReader::at(data, offset as usize)?;
                    let pairs = sr.read_u16()?;
                    let mut set = Vec::with_capacity(pairs as usize);
                    for _ in 0..pairs {
                        let second = sr.read_u16()?;
                        let v1 = ValueRecord::parse(&mut sr, format1)?;
                        let v2 = ValueRecord::parse(&mut sr, format2)?;
                        set.push((second, v1, v2));
                    }
                    set.sort_by_key(|&(g, _, _)| g);
                    sets.push(set);
                }
                Ok(Self::Glyphs { coverage, sets })
            }
            2 => {
                let class1 = ClassDef::parse_at(data, reader.read_u16()?)?;
                let class2 = ClassDef::parse_at(data, reader.read_u16()?)?;
                let class1_count = reader.read_u16()? as usize;
                let class2_count = reader.read_u16()? as usize;
                let mut values = Vec::with_capacity(class1_count * class2_count);
                for _ in 0..class1_count * class2_count {
                    let v1 = ValueRecord::parse(&mut reader, format1)?;
                    let v2 = ValueRecord::parse(&mut reader, format2)?;
                    values.push((v1, v2));
                }
                Ok(Self::Classes { coverage, class1, class2, class2_count, values })
            }
            _ => Err(FontError::UnsupportedFormat { table: "GPOS pair", format }),
        }
    }

    /// Adjustments for a glyph pair
    pub fn get(&self, first: u16, second: u16) -> Option<(ValueRecord, ValueRecord)> {
        match self {
            Self::Glyphs { coverage, sets } => {
                let set = sets.get(coverage.get(first)? as usize)?;
                let i = set.binary_search_by_key(&second, |&(g, _, _)| g).ok()?;
                Some((set[i].1, set[i].2))
            }
            Self::Classes { coverage, class1, class2, class2_count, values } => {
                coverage.get(first)?;
                let index = class1.get(first) as usize * class2_count + class2.get(second) as usize;
                values.get(index).copied()
            }
        }
    }
}

/// Mark attachment subtable (mark-to-base or mark-to-mark)
#[derive(Debug, Clone)]
pub struct MarkAttach {
    pub mark_coverage: Coverage,
    pub target_coverage: Coverage,
    /// (mark class, mark anchor) per mark coverage index
    pub marks: Vec<(u16, Anchor)>,
    /// Anchors per target coverage index, indexed by mark class
    pub targets: Vec<Vec<Option<Anchor>>>,
}

impl MarkAttach {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let format = reader.read_u16()?;
        if format != 1 {
            return Err(FontError::UnsupportedFormat { table: "GPOS mark", format });
        }
        let mark_coverage = Coverage::parse_at(data, reader.read_u16()?)?;
        let target_coverage = Coverage::parse_at(data, reader.read_u16()?)?;
        let class_count = reader.read_u16()? as usize;
        let mark_array = tail(data, reader.read_u16()? as usize)?;
        let target_array = tail(data, reader.read_u16()? as usize)?;

        let mut mr = FontReader::new(mark_array);
        let mark_count = mr.read_u16()?;
        let mut marks = Vec::with_capacity(mark_count as usize);
        for _ in 0..mark_count {
            let class = mr.read_u16()?;
            let anchor_offset = mr.read_u16()? as usize;
            marks.push((class, Anchor::parse(tail(mark_array, anchor_offset)?)?));
        }

        let mut tr = FontReader::new(target_array);
        let target_count = tr.read_u16()?;
        let mut targets = Vec::with_capacity(target_count as usize);
        for _ in 0..target_count {
            let mut anchors = Vec::with_capacity(class_count);
            for offset in tr.read_u16_array(class_count)? {
                anchors.push(match offset {
                    0 => None,
                    o => Some(Anchor::parse(tail(target_array, o as usize)?)?),
                });
            }
            targets.push(anchors);
        }
        Ok(Self { mark_coverage, target_coverage, marks, targets })
    }

    /// (mark anchor, target anchor) when both glyphs are covered
    pub fn anchors(&self, mark: u16, target: u16) -> Option<(Anchor, Anchor)> {
        let &(class, mark_anchor) = self.marks.get(self.mark_coverage.get(mark)? as usize)?;
        let target_anchor = self.targets.get(self.target_coverage.get(target)? as usize)?.get(class as usize)?.as_ref()?;
        Some((mark_anchor, *target_anchor))
    }
}

#[derive(Debug, Clone)]
pub enum GposSubtable {
    Single { coverage: Coverage, values: Vec<ValueRecord> },
    Pair(PairPos),
    MarkToBase(MarkAttach),
    MarkToMark(MarkAttach),
    Context(ChainContext),
}

impl GposSubtable {
    fn parse(lookup_type: u16, data: &[u8]) -> Result<Option<Self>> {
        let subtable = match lookup_type {
            1 => {
                let mut reader = FontReader::new(data);
                let format = reader.read_u16()?;
                let coverage = Coverage::parse_at(data, reader.read_u16()?)?;
                let value_format = reader.read_u16()?;
                let values = match format {
                    1 => vec![ValueRecord::parse(&mut reader, value_format)?],
                    2 => {
                        let count = reader.read_u16()?;
                        (0..count).map(|_| ValueRecord::parse(&mut reader, value_format)).collect::<Result<_>>()?
                    }
                    _ => return Err(FontError::UnsupportedFormat { table: "GPOS single", format }),
                };
                Self::Single { coverage, values }
            }
            2 => Self::Pair(PairPos::parse(data)?),
            4 => Self::MarkToBase(MarkAttach::parse(data)?),
            6 => Self::MarkToMark(MarkAttach::parse(data)?),
            7 => Self::Context(ChainContext::parse_context(data)?),
            8 => Self::Context(ChainContext::parse_chained(data)?),
            _ => return Ok(None),
        };
        Ok(Some(subtable))
    }
}

/// Parsed GPOS table
#[derive(Debug, Clone)]
pub struct GposTable {
    pub layout: LayoutTable<GposSubtable>,
}

impl GposTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Self { layout: LayoutTable::parse(data, 9, GposSubtable::parse)? })
    }

    /// Apply one lookup across the buffer
    pub fn apply_lookup(
        &self,
        lookup_index: u16,
        glyphs: &[GlyphInfo],
        positions: &mut [GlyphPosition],
        mask: u32,
        gdef: Option<&GdefTable>,
    ) {
        let Some(lookup) = self.layout.lookups.get(lookup_index as usize) else {
            return;
        };
        let skipper = skipper_for(lookup, gdef);
        let mut i = 0;
        while i < glyphs.len() {
            if glyphs[i].mask & mask == 0 || skipper.skips(glyphs[i].glyph_id) {
                i += 1;
                continue;
            }
            i = self.apply_at(lookup, glyphs, positions, i, gdef, 0).unwrap_or(i + 1);
        }
    }

    fn apply_at(
        &self,
        lookup: &Lookup<GposSubtable>,
        glyphs: &[GlyphInfo],
        positions: &mut [GlyphPosition],
        index: usize,
        gdef: Option<&GdefTable>,
        depth: u8,
    ) -> Option<usize> {
        let skipper = skipper_for(lookup, gdef);
        let glyph_id = glyphs.get(index)?.glyph_id;
        for subtable in &lookup.subtables {
            match subtable {
                GposSubtable::Single { coverage, values } => {
                    let Some(c) = coverage.get(glyph_id) else {
                        continue;
                    };
                    // Format 1 shares one record across the coverage
                    let value = if values.len() == 1 { values.first() } else { values.get(c as usize) };
                    let Some(value) = value else {
                        continue;
                    };
                    value.apply_to(&mut positions[index]);
                    return Some(index + 1);
                }
                GposSubtable::Pair(pair) => {
                    let Some(next) = skipper.next(glyphs, index) else {
                        continue;
                    };
                    let Some((v1, v2)) = pair.get(glyph_id, glyphs[next].glyph_id) else {
                        continue;
                    };
                    v1.apply_to(&mut positions[index]);
                    v2.apply_to(&mut positions[next]);
                    return Some(if v2.is_empty() { index + 1 } else { next + 1 });
                }
                GposSubtable::MarkToBase(attach) => {
                    if !attach.mark_coverage.contains(glyph_id) {
                        continue;
                    }
                    let is_mark = |g: u16| match gdef {
                        Some(gdef) => gdef.is_mark(g),
                        None => attach.mark_coverage.contains(g),
                    };
                    let Some(base) = (0..index).rev().find(|&j| !is_mark(glyphs[j].glyph_id) && !skipper.skips(glyphs[j].glyph_id)) else {
                        continue;
                    };
                    let Some((mark_anchor, base_anchor)) = attach.anchors(glyph_id, glyphs[base].glyph_id) else {
                        continue;
                    };
                    positions[index].attachment = Some(attachment(base, mark_anchor, base_anchor));
                    return Some(index + 1);
                }
                GposSubtable::MarkToMark(attach) => {
                    let Some(prev) = skipper.prev(glyphs, index) else {
                        continue;
                    };
                    let Some((mark_anchor, target_anchor)) = attach.anchors(glyph_id, glyphs[prev].glyph_id) else {
                        continue;
                    };
                    positions[index].attachment = Some(attachment(prev, mark_anchor, target_anchor));
                    return Some(index + 1);
                }
                GposSubtable::Context(context) => {
                    if depth >= MAX_NESTING {
                        continue;
                    }
                    let Some((matched, records)) = context.match_at(glyphs, index, &skipper) else {
                        continue;
                    };
                    for record in records {
                        let (Some(&pos), Some(nested)) =
                            (matched.get(record.sequence_index as usize), self.layout.lookups.get(record.lookup_index as usize))
                        else {
                            continue;
                        };
                        self.apply_at(nested, glyphs, positions, pos, gdef, depth + 1);
                    }
                    return Some(matched.last().copied().unwrap_or(index) + 1);
                }
            }
        }
        None
    }

    /// Turn pending mark attachments into offsets relative to each mark's pen position
    pub fn resolve_attachments(positions: &mut [GlyphPosition]) {
        for i in 0..positions.len() {
            let Some(attachment) = positions[i].attachment else {
                continue;
            };
            if attachment.to >= i {
                continue;
            }
            let pen_distance: i32 = positions[attachment.to..i].iter().map(|p| p.x_advance).sum();
            let target = positions[attachment.to];
            positions[i].x_offset = target.x_offset + attachment.dx - pen_distance;
            positions[i].y_offset = target.y_offset + attachment.dy;
        }
    }
}

fn attachment(to: usize, mark: Anchor, target: Anchor) -> Attachment {
    Attachment { to, dx: target.x as i32 - mark.x as i32, dy: target.y as i32 - mark.y as i32 }
}

fn skipper_for<'a, T>(lookup: &Lookup<T>, gdef: Option<&'a GdefTable>) -> Skipper<'a> {
    Skipper { flag: lookup.flag, mark_filtering_set: lookup.mark_filtering_set, gdef }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(ids: &[u16]) -> Vec<GlyphInfo> {
        ids.iter().enumerate().map(|(i, &glyph_id)| GlyphInfo { glyph_id, cluster: i, mask: 1 }).collect()
    }

    fn table(subtables: Vec<GposSubtable>) -> GposTable {
        GposTable {
            layout: LayoutTable {
                scripts: Vec::new(),
                features: Vec::new(),
                lookups: vec![Lookup { lookup_type: 0, flag: 0, mark_filtering_set: None, subtables }],
            },
        }
    }

    #[test]
    fn test_value_record_parse_skips_devices() {
        let data = [0xFF, 0xF6, 0, 0, 0, 0, 0, 7];
        let mut reader = FontReader::new(&data);
        // x_advance + x_placement device + y_advance device
        let record = ValueRecord::parse(&mut reader, 0x0004 | 0x0010 | 0x0080).unwrap();
        assert_eq!(record.x_advance, -10);
        assert_eq!(reader.remaining(), 2);
        assert_eq!(ValueRecord::size(0x0005), 4);
    }

    #[test]
    fn test_pair_class_kerning() {
        let pair = PairPos::Classes {
            coverage: Coverage::Glyphs(vec![1]),
            class1: ClassDef::Empty,
            class2: ClassDef::Array { start_glyph: 2, classes: vec![1] },
            class2_count: 2,
            values: vec![
                (ValueRecord::default(), ValueRecord::default()),
                (ValueRecord { x_advance: -80, ..Default::default() }, ValueRecord::default()),
            ],
        };
        let gpos = table(vec![GposSubtable::Pair(pair)]);
        let glyphs = buffer(&[1, 2, 1, 3]);
        let mut positions = vec![GlyphPosition { x_advance: 500, ..Default::default() }; 4];
        gpos.apply_lookup(0, &glyphs, &mut positions, 1, None);
        assert_eq!(positions[0].x_advance, 420);
        assert_eq!(positions[2].x_advance, 500);
    }

    #[test]
    fn test_mark_to_base_offsets() {
        let attach = MarkAttach {
            mark_coverage: Coverage::Glyphs(vec![5]),
            target_coverage: Coverage::Glyphs(vec![1]),
            marks: vec![(0, Anchor { x: 100, y: 0 })],
            targets: vec![vec![Some(Anchor { x: 250, y: 600 })]],
        };
        let gpos = table(vec![GposSubtable::MarkToBase(attach)]);
        let glyphs = buffer(&[1, 5]);
        let mut positions = vec![
            GlyphPosition { x_advance: 500, ..Default::default() },
            GlyphPosition { x_advance: 0, ..Default::default() },
        ];
        gpos.apply_lookup(0, &glyphs, &mut positions, 1, None);
        GposTable::resolve_attachments(&mut positions);
        assert_eq!(positions[1].x_offset, 250 - 100 - 500);
        assert_eq!(positions[1].y_offset, 600);
    }
}
