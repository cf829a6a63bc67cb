//! OpenType GSUB (Glyph Substitution) table
//!
//! Supports single (1), multiple (2), alternate (3, parsed only), ligature
//! (4), contextual (5), chained contextual (6) and extension (7) lookups.

use crate::gdef::GdefTable;
use crate::layout::{ChainContext, Coverage, GlyphInfo, LayoutTable, Lookup, Skipper};
use crate::reader::{tail, FontReader};
use crate::{FontError, Result};

/// Nested lookups deeper than this are ignored
const MAX_NESTING: u8 = 6;

#[derive(Debug, Clone)]
pub enum SingleSubst {
    /// Format 1: delta added to the glyph ID
    Delta { coverage: Coverage, delta: i16 },
    /// Format 2: substitute per coverage index
    Array { coverage: Coverage, substitutes: Vec<u16> },
}

impl SingleSubst {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let format = reader.read_u16()?;
        let coverage = Coverage::parse_at(data, reader.read_u16()?)?;
        match format {
            1 => Ok(Self::Delta { coverage, delta: reader.read_i16()? }),
            2 => {
                let count = reader.read_u16()? as usize;
                Ok(Self::Array { coverage, substitutes: reader.read_u16_array(count)? })
            }
            _ => Err(FontError::UnsupportedFormat { table: "GSUB single", format }),
        }
    }

    pub fn substitute(&self, glyph_id: u16) -> Option<u16> {
        match self {
            Self::Delta { coverage, delta } => {
                coverage.get(glyph_id)?;
                Some((glyph_id as i32 + *delta as i32) as u16)
            }
            Self::Array { coverage, substitutes } => substitutes.get(coverage.get(glyph_id)? as usize).copied(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ligature {
    pub glyph: u16,
    /// Components after the first (covered) glyph
    pub components: Vec<u16>,
}

#[derive(Debug, Clone)]
pub enum GsubSubtable {
    Single(SingleSubst),
    Multiple { coverage: Coverage, sequences: Vec<Vec<u16>> },
    Alternate { coverage: Coverage, alternates: Vec<Vec<u16>> },
    Ligature { coverage: Coverage, sets: Vec<Vec<Ligature>> },
    Context(ChainContext),
}

impl GsubSubtable {
    fn parse(lookup_type: u16, data: &[u8]) -> Result<Option<Self>> {
        let subtable = match lookup_type {
            1 => Self::Single(SingleSubst::parse(data)?),
            2 => {
                let (coverage, sequences) = parse_sequences(data)?;
                Self::Multiple { coverage, sequences }
            }
            3 => {
                let (coverage, alternates) = parse_sequences(data)?;
                Self::Alternate { coverage, alternates }
            }
            4 => parse_ligatures(data)?,
            5 => Self::Context(ChainContext::parse_context(data)?),
            6 => Self::Context(ChainContext::parse_chained(data)?),
            _ => return Ok(None),
        };
        Ok(Some(subtable))
    }
}

/// Coverage plus one glyph array per covered glyph (types 2 and 3)
fn parse_sequences(data: &[u8]) -> Result<(Coverage, Vec<Vec<u16>>)> {
    let mut reader = FontReader::new(data);
    let format = reader.read_u16()?;
    if format != 1 {
        return Err(FontError::UnsupportedFormat { table: "GSUB sequence", format });
    }
    let coverage = Coverage::parse_at(data, reader.read_u16()?)?;
    let count = reader.read_u16()? as usize;
    let sequences = reader
        .read_u16_array(count)?
        .into_iter()
        .map(|offset| {
            let mut sr = FontReader::at(data, offset as usize)?;
            let n = sr.read_u16()? as usize;
            sr.read_u16_array(n)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((coverage, sequences))
}

fn parse_ligatures(data: &[u8]) -> Result<GsubSubtable> {
    let mut reader = FontReader::new(data);
    let format = reader.read_u16()?;
    if format != 1 {
        return Err(FontError::UnsupportedFormat { table: "GSUB ligature", format });
    }
    let coverage = Coverage::parse_at(data, reader.read_u16()?)?;
    let set_count = reader.read_u16()? as usize;
    let mut sets = Vec::with_capacity(set_count);
    for set_offset in reader.read_u16_array(set_count)? {
        let set = tail(data, set_offset as usize)?;
        let mut sr = FontReader::new(set);
        let lig_count = sr.read_u16()? as usize;
        let mut ligatures = Vec::with_capacity(lig_count);
        for lig_offset in sr.read_u16_array(lig_count)? {
            let mut lr = FontReader::at(set, lig_offset as usize)?;
            let glyph = lr.read_u16()?;
            let component_count = lr.read_u16()? as usize;
            let components = lr.read_u16_array(component_count.saturating_sub(1))?;
            ligatures.push(Ligature { glyph, components });
        }
        sets.push(ligatures);
    }
    Ok(GsubSubtable::Ligature { coverage, sets })
}

/// Parsed GSUB table
#[derive(Debug, Clone)]
pub struct GsubTable {
    pub layout: LayoutTable<GsubSubtable>,
}

impl GsubTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Self { layout: LayoutTable::parse(data, 7, GsubSubtable::parse)? })
    }

    /// Apply one lookup across the buffer to glyphs whose mask intersects `mask`
    pub fn apply_lookup(&self, lookup_index: u16, glyphs: &mut Vec<GlyphInfo>, mask: u32, gdef: Option<&GdefTable>) {
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
            i = self.apply_at(lookup, glyphs, i, gdef, 0).unwrap_or(i + 1);
        }
    }

    /// Apply the first matching subtable at `index`; returns the next index
    fn apply_at(&self, lookup: &Lookup<GsubSubtable>, glyphs: &mut Vec<GlyphInfo>, index: usize, gdef: Option<&GdefTable>, depth: u8) -> Option<usize> {
        let skipper = skipper_for(lookup, gdef);
        let glyph_id = glyphs.get(index)?.glyph_id;
        for subtable in &lookup.subtables {
            match subtable {
                GsubSubtable::Single(single) => {
                    if let Some(substitute) = single.substitute(glyph_id) {
                        glyphs[index].glyph_id = substitute;
                        return Some(index + 1);
                    }
                }
                GsubSubtable::Multiple { coverage, sequences } => {
                    let Some(sequence) = coverage.get(glyph_id).and_then(|c| sequences.get(c as usize)) else {
                        continue;
                    };
                    let template = glyphs[index];
                    glyphs.splice(index..=index, sequence.iter().map(|&g| GlyphInfo { glyph_id: g, ..template }));
                    return Some(index + sequence.len());
                }
                // Alternates are only chosen on request
                GsubSubtable::Alternate { .. } => {}
                GsubSubtable::Ligature { coverage, sets } => {
                    let Some(set) = coverage.get(glyph_id).and_then(|c| sets.get(c as usize)) else {
                        continue;
                    };
                    for ligature in set {
                        let mut positions = Vec::with_capacity(ligature.components.len());
                        let mut at = index;
                        let matched = ligature.components.iter().all(|&component| {
                            match skipper.next(glyphs, at) {
                                Some(next) if glyphs[next].glyph_id == component => {
                                    positions.push(next);
                                    at = next;
                                    true
                                }
                                _ => false,
                            }
                        });
                        if !matched {
                            continue;
                        }
                        let cluster = positions.iter().map(|&p| glyphs[p].cluster).fold(glyphs[index].cluster, usize::min);
                        glyphs[index].glyph_id = ligature.glyph;
                        glyphs[index].cluster = cluster;
                        for &p in positions.iter().rev() {
                            glyphs.remove(p);
                        }
                        return Some(index + 1);
                    }
                }
                GsubSubtable::Context(context) => {
                    if depth >= MAX_NESTING {
                        continue;
                    }
                    let Some((positions, records)) = context.match_at(glyphs, index, &skipper) else {
                        continue;
                    };
                    let mut positions = positions;
                    let mut end = positions.last().copied().unwrap_or(index) + 1;
                    for record in records {
                        let Some(&pos) = positions.get(record.sequence_index as usize) else {
                            continue;
                        };
                        let Some(nested) = self.layout.lookups.get(record.lookup_index as usize) else {
                            continue;
                        };
                        let before = glyphs.len();
                        if self.apply_at(nested, glyphs, pos, gdef, depth + 1).is_none() {
                            continue;
                        }
                        let delta = glyphs.len() as isize - before as isize;
                        if delta != 0 {
                            for p in positions.iter_mut().filter(|p| **p > pos) {
                                *p = p.saturating_add_signed(delta);
                            }
                            end = end.saturating_add_signed(delta);
                        }
                    }
                    return Some(end.max(index + 1));
                }
            }
        }
        None
    }
}

fn skipper_for<'a, T>(lookup: &Lookup<T>, gdef: Option<&'a GdefTable>) -> Skipper<'a> {
    Skipper { flag: lookup.flag, mark_filtering_set: lookup.mark_filtering_set, gdef }
}
