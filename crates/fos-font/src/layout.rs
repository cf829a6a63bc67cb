//! Common OpenType layout structures shared by GSUB and GPOS
//!
//! Script list -> feature list -> lookup list, coverage and class tables,
//! lookup flags and the chained-context rule matcher.

use crate::gdef::GdefTable;
use crate::reader::{tail, FontReader};
use crate::{FontError, Result};

/// Coverage table (maps glyph IDs to coverage indices)
#[derive(Debug, Clone)]
pub enum Coverage {
    /// Format 1: sorted glyph IDs
    Glyphs(Vec<u16>),
    /// Format 2: (start, end, start coverage index) ranges
    Ranges(Vec<(u16, u16, u16)>),
}

impl Coverage {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let format = reader.read_u16()?;
        let count = reader.read_u16()? as usize;
        match format {
            1 => Ok(Self::Glyphs(reader.read_u16_array(count)?)),
            2 => {
                let mut ranges = Vec::with_capacity(count);
                for _ in 0..count {
                    ranges.push((reader.read_u16()?, reader.read_u16()?, reader.read_u16()?));
                }
                Ok(Self::Ranges(ranges))
            }
            _ => Err(FontError::UnsupportedFormat { table: "Coverage", format }),
        }
    }

    /// Parse a coverage table at `offset` from the start of `data`
    pub fn parse_at(data: &[u8], offset: u16) -> Result<Self> {
        Self::parse(tail(data, offset as usize)?)
    }

    /// Coverage index for a glyph ID
    pub fn get(&self, glyph_id: u16) -> Option<u16> {
        match self {
            Self::Glyphs(glyphs) => glyphs.binary_search(&glyph_id).ok().map(|i| i as u16),
            Self::Ranges(ranges) => {
                let i = ranges.partition_point(|&(_, end, _)| end < glyph_id);
                let &(start, end, base) = ranges.get(i)?;
                (start <= glyph_id && glyph_id <= end).then(|| base + (glyph_id - start))
            }
        }
    }

    pub fn contains(&self, glyph_id: u16) -> bool {
        self.get(glyph_id).is_some()
    }
}

/// Class definition table
#[derive(Debug, Clone, Default)]
pub enum ClassDef {
    /// No table: everything is class 0
    #[default]
    Empty,
    Array { start_glyph: u16, classes: Vec<u16> },
    Ranges(Vec<(u16, u16, u16)>),
}

impl ClassDef {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        match reader.read_u16()? {
            1 => {
                let start_glyph = reader.read_u16()?;
                let count = reader.read_u16()? as usize;
                Ok(Self::Array { start_glyph, classes: reader.read_u16_array(count)? })
            }
            2 => {
                let count = reader.read_u16()? as usize;
                let mut ranges = Vec::with_capacity(count);
                for _ in 0..count {
                    ranges.push((reader.read_u16()?, reader.read_u16()?, reader.read_u16()?));
                }
                Ok(Self::Ranges(ranges))
            }
            format => Err(FontError::UnsupportedFormat { table: "ClassDef", format }),
        }
    }

    /// Parse at an offset; a zero offset means "no table"
    pub fn parse_at(data: &[u8], offset: u16) -> Result<Self> {
        if offset == 0 {
            return Ok(Self::Empty);
        }
        Self::parse(tail(data, offset as usize)?)
    }

    /// Class of a glyph (0 when unassigned)
    pub fn get(&self, glyph_id: u16) -> u16 {
        match self {
            Self::Empty => 0,
            Self::Array { start_glyph, classes } => glyph_id
                .checked_sub(*start_glyph)
                .and_then(|i| classes.get(i as usize))
                .copied()
                .unwrap_or(0),
            Self::Ranges(ranges) => {
                let i = ranges.partition_point(|&(_, end, _)| end < glyph_id);
                match ranges.get(i) {
                    Some(&(start, _, class)) if start <= glyph_id => class,
                    _ => 0,
                }
            }
        }
    }
}

/// Language system: feature indices enabled for a script/language
#[derive(Debug, Clone, Default)]
pub struct LangSys {
    pub required_feature: Option<u16>,
    pub feature_indices: Vec<u16>,
}

impl LangSys {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let _lookup_order = reader.read_u16()?;
        let required = reader.read_u16()?;
        let count = reader.read_u16()? as usize;
        Ok(Self {
            required_feature: (required != 0xFFFF).then_some(required),
            feature_indices: reader.read_u16_array(count)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Script {
    pub tag: [u8; 4],
    pub default_lang_sys: Option<LangSys>,
    pub lang_systems: Vec<([u8; 4], LangSys)>,
}

#[derive(Debug, Clone)]
pub struct Feature {
    pub tag: [u8; 4],
    pub lookup_indices: Vec<u16>,
}

/// Lookup flag bits
pub mod lookup_flag {
    pub const RIGHT_TO_LEFT: u16 = 0x0001;
    pub const IGNORE_BASE_GLYPHS: u16 = 0x0002;
    pub const IGNORE_LIGATURES: u16 = 0x0004;
    pub const IGNORE_MARKS: u16 = 0x0008;
    pub const USE_MARK_FILTERING_SET: u16 = 0x0010;
    pub const MARK_ATTACHMENT_TYPE: u16 = 0xFF00;
}

/// A lookup with its parsed subtables
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub lookup_type: u16,
    pub flag: u16,
    pub mark_filtering_set: Option<u16>,
    pub subtables: Vec<T>,
}

/// Script, feature and lookup lists of a GSUB or GPOS table
#[derive(Debug, Clone)]
pub struct LayoutTable<T> {
    pub scripts: Vec<Script>,
    pub features: Vec<Feature>,
    pub lookups: Vec<Lookup<T>>,
}

/// Parses one subtable of a given (non-extension) lookup type.
/// `Ok(None)` means the type or format is not supported and is skipped.
pub type SubtableParser<T> = fn(u16, &[u8]) -> Result<Option<T>>;

impl<T> LayoutTable<T> {
    /// Parse the shared header; `extension_type` is 7 for GSUB and 9 for GPOS
    pub fn parse(data: &[u8], extension_type: u16, parse_subtable: SubtableParser<T>) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let major = reader.read_u16()?;
        let _minor = reader.read_u16()?;
        if major != 1 {
            return Err(FontError::UnsupportedFormat { table: "layout", format: major });
        }
        let script_list = reader.read_u16()? as usize;
        let feature_list = reader.read_u16()? as usize;
        let lookup_list = reader.read_u16()? as usize;

        let scripts = parse_scripts(tail(data, script_list)?)?;
        let features = parse_features(tail(data, feature_list)?)?;
        let lookups = parse_lookups(tail(data, lookup_list)?, extension_type, parse_subtable)?;
        Ok(Self { scripts, features, lookups })
    }

    /// Lookup indices for the requested features, in lookup-list order.
    ///
    /// Each entry carries the feature tag that enabled it. The script falls
    /// back to `DFLT`, then `latn`, then the first script in the font.
    pub fn lookups_for(&self, script: [u8; 4], lang: Option<[u8; 4]>, features: &[[u8; 4]]) -> Vec<(u16, [u8; 4])> {
        let script = self
            .scripts
            .iter()
            .find(|s| s.tag == script)
            .or_else(|| self.scripts.iter().find(|s| &s.tag == b"DFLT"))
            .or_else(|| self.scripts.iter().find(|s| &s.tag == b"latn"))
            .or_else(|| self.scripts.first());
        let Some(script) = script else {
            return Vec::new();
        };
        let lang_sys = lang
            .and_then(|l| script.lang_systems.iter().find(|(tag, _)| *tag == l).map(|(_, ls)| ls))
            .or(script.default_lang_sys.as_ref())
            .or_else(|| script.lang_systems.first().map(|(_, ls)| ls));
        let Some(lang_sys) = lang_sys else {
            return Vec::new();
        };

        let mut selected: Vec<(u16, [u8; 4])> = Vec::new();
        let indices = lang_sys.required_feature.iter().chain(lang_sys.feature_indices.iter());
        for &fi in indices {
            let Some(feature) = self.features.get(fi as usize) else {
                continue;
            };
            let required = lang_sys.required_feature == Some(fi);
            if !required && !features.contains(&feature.tag) {
                continue;
            }
            for &li in &feature.lookup_indices {
                if (li as usize) < self.lookups.len() && !selected.iter().any(|(l, _)| *l == li) {
                    selected.push((li, feature.tag));
                }
            }
        }
        selected.sort_by_key(|(l, _)| *l);
        selected
    }
}

fn parse_scripts(data: &[u8]) -> Result<Vec<Script>> {
    let mut reader = FontReader::new(data);
    let count = reader.read_u16()?;
    let mut scripts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = reader.read_tag()?;
        let offset = reader.read_u16()? as usize;
        let script_data = tail(data, offset)?;

        let mut sr = FontReader::new(script_data);
        let default_offset = sr.read_u16()? as usize;
        let lang_count = sr.read_u16()?;
        let mut lang_systems = Vec::with_capacity(lang_count as usize);
        for _ in 0..lang_count {
            let lang_tag = sr.read_tag()?;
            let lang_offset = sr.read_u16()? as usize;
            lang_systems.push((lang_tag, LangSys::parse(tail(script_data, lang_offset)?)?));
        }
        let default_lang_sys = if default_offset == 0 {
            None
        } else {
            Some(LangSys::parse(tail(script_data, default_offset)?)?)
        };
        scripts.push(Script { tag, default_lang_sys, lang_systems });
    }
    Ok(scripts)
}

fn parse_features(data: &[u8]) -> Result<Vec<Feature>> {
    let mut reader = FontReader::new(data);
    let count = reader.read_u16()?;
    let mut features = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = reader.read_tag()?;
        let offset = reader.read_u16()? as usize;
        let mut fr = FontReader::at(data, offset)?;
        let _params = fr.read_u16()?;
        let lookup_count = fr.read_u16()? as usize;
        features.push(Feature { tag, lookup_indices: fr.read_u16_array(lookup_count)? });
    }
    Ok(features)
}

fn parse_lookups<T>(data: &[u8], extension_type: u16, parse_subtable: SubtableParser<T>) -> Result<Vec<Lookup<T>>> {
    let mut reader = FontReader::new(data);
    let count = reader.read_u16()? as usize;
    let offsets = reader.read_u16_array(count)?;

    let mut lookups = Vec::with_capacity(count);
    for (index, offset) in offsets.into_iter().enumerate() {
        let lookup_data = tail(data, offset as usize)?;
        let mut lr = FontReader::new(lookup_data);
        let mut lookup_type = lr.read_u16()?;
        let flag = lr.read_u16()?;
        let sub_count = lr.read_u16()? as usize;
        let sub_offsets = lr.read_u16_array(sub_count)?;
        let mark_filtering_set = if flag & lookup_flag::USE_MARK_FILTERING_SET != 0 {
            Some(lr.read_u16()?)
        } else {
            None
        };

        let mut subtables = Vec::with_capacity(sub_count);
        for sub_offset in sub_offsets {
            let mut sub = tail(lookup_data, sub_offset as usize)?;
            if lookup_type == extension_type {
                // Extension: format, real type, 32-bit offset
                let mut er = FontReader::new(sub);
                let _format = er.read_u16()?;
                lookup_type = er.read_u16()?;
                let ext_offset = er.read_u32()? as usize;
                sub = tail(sub, ext_offset)?;
            }
            match parse_subtable(lookup_type, sub) {
                Ok(Some(parsed)) => subtables.push(parsed),
                Ok(None) => {}
                Err(e) => tracing::debug!("Skipping lookup {} subtable (type {}): {}", index, lookup_type, e),
            }
        }
        lookups.push(Lookup { lookup_type, flag, mark_filtering_set, subtables });
    }
    Ok(lookups)
}

/// One glyph in a shaping buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphInfo {
    pub glyph_id: u16,
    /// Index of the first source character this glyph came from
    pub cluster: usize,
    /// Feature mask bits this glyph participates in
    pub mask: u32,
}

/// Does a lookup with this flag skip over `glyph_id`?
pub fn should_skip(glyph_id: u16, flag: u16, mark_filtering_set: Option<u16>, gdef: Option<&GdefTable>) -> bool {
    let Some(gdef) = gdef else {
        return false;
    };
    match gdef.glyph_class(glyph_id) {
        1 => flag & lookup_flag::IGNORE_BASE_GLYPHS != 0,
        2 => flag & lookup_flag::IGNORE_LIGATURES != 0,
        3 => {
            if flag & lookup_flag::IGNORE_MARKS != 0 {
                return true;
            }
            if let Some(set) = mark_filtering_set {
                return !gdef.mark_set_contains(set, glyph_id);
            }
            let attach_type = (flag & lookup_flag::MARK_ATTACHMENT_TYPE) >> 8;
            attach_type != 0 && gdef.mark_attach_class(glyph_id) != attach_type
        }
        _ => false,
    }
}

/// Glyph-skipping cursor over a buffer for one lookup
#[derive(Clone, Copy)]
pub struct Skipper<'a> {
    pub flag: u16,
    pub mark_filtering_set: Option<u16>,
    pub gdef: Option<&'a GdefTable>,
}

impl Skipper<'_> {
    pub fn skips(&self, glyph_id: u16) -> bool {
        should_skip(glyph_id, self.flag, self.mark_filtering_set, self.gdef)
    }

    /// Next non-skipped index after `from`
    pub fn next(&self, glyphs: &[GlyphInfo], from: usize) -> Option<usize> {
        (from + 1..glyphs.len()).find(|&i| !self.skips(glyphs[i].glyph_id))
    }

    /// Previous non-skipped index before `from`
    pub fn prev(&self, glyphs: &[GlyphInfo], from: usize) -> Option<usize> {
        (0..from).rev().find(|&i| !self.skips(glyphs[i].glyph_id))
    }
}

/// Nested lookup application inside a context rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupRecord {
    pub sequence_index: u16,
    pub lookup_index: u16,
}

fn read_records(reader: &mut FontReader, count: usize) -> Result<Vec<LookupRecord>> {
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(LookupRecord { sequence_index: reader.read_u16()?, lookup_index: reader.read_u16()? });
    }
    Ok(records)
}

/// Rule of a glyph- or class-based context subtable
#[derive(Debug, Clone)]
pub struct ChainRule {
    pub backtrack: Vec<u16>,
    /// Input sequence after the first glyph
    pub input: Vec<u16>,
    pub lookahead: Vec<u16>,
    pub records: Vec<LookupRecord>,
}

/// Contextual and chained-contextual subtables (GSUB 5/6, GPOS 7/8).
///
/// Plain contexts are chained contexts with empty backtrack and lookahead.
#[derive(Debug, Clone)]
pub enum ChainContext {
    Glyphs { coverage: Coverage, rule_sets: Vec<Vec<ChainRule>> },
    Classes {
        coverage: Coverage,
        backtrack_classes: ClassDef,
        input_classes: ClassDef,
        lookahead_classes: ClassDef,
        rule_sets: Vec<Vec<ChainRule>>,
    },
    Coverages {
        backtrack: Vec<Coverage>,
        input: Vec<Coverage>,
        lookahead: Vec<Coverage>,
        records: Vec<LookupRecord>,
    },
}

impl ChainContext {
    /// Parse a plain context subtable (GSUB 5 / GPOS 7)
    pub fn parse_context(data: &[u8]) -> Result<Self> {
        Self::parse_impl(data, false)
    }

    /// Parse a chained context subtable (GSUB 6 / GPOS 8)
    pub fn parse_chained(data: &[u8]) -> Result<Self> {
        Self::parse_impl(data, true)
    }

    fn parse_impl(data: &[u8], chained: bool) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let format = reader.read_u16()?;
        match format {
            1 | 2 => {
                let coverage = Coverage::parse_at(data, reader.read_u16()?)?;
                let (backtrack_classes, input_classes, lookahead_classes) = if format == 2 {
                    if chained {
                        let b = ClassDef::parse_at(data, reader.read_u16()?)?;
                        let i = ClassDef::parse_at(data, reader.read_u16()?)?;
                        let l = ClassDef::parse_at(data, reader.read_u16()?)?;
                        (b, i, l)
                    } else {
                        (ClassDef::Empty, ClassDef::parse_at(data, reader.read_u16()?)?, ClassDef::Empty)
                    }
                } else {
                    (ClassDef::Empty, ClassDef::Empty, ClassDef::Empty)
                };
                let set_count = reader.read_u16()? as usize;
                let set_offsets = reader.read_u16_array(set_count)?;
                let mut rule_sets = Vec::with_capacity(set_count);
                for offset in set_offsets {
                    if offset == 0 {
                        rule_sets.push(Vec::new());
                        continue;
                    }
                    let set = tail(data, offset as usize)?;
                    let mut sr = FontReader::new(set);
                    let rule_count = sr.read_u16()? as usize;
                    let mut rules = Vec::with_capacity(rule_count);
                    for rule_offset in sr.read_u16_array(rule_count)? {
                        let mut rr = FontReader::at(set, rule_offset as usize)?;
                        rules.push(if chained { parse_chain_rule(&mut rr)? } else { parse_context_rule(&mut rr)? });
                    }
                    rule_sets.push(rules);
                }
                if format == 1 {
                    Ok(Self::Glyphs { coverage, rule_sets })
                } else {
                    Ok(Self::Classes { coverage, backtrack_classes, input_classes, lookahead_classes, rule_sets })
                }
            }
            3 if chained => {
                let backtrack = read_coverages(&mut reader, data)?;
                let input = read_coverages(&mut reader, data)?;
                let lookahead = read_coverages(&mut reader, data)?;
                let count = reader.read_u16()? as usize;
                let records = read_records(&mut reader, count)?;
                Ok(Self::Coverages { backtrack, input, lookahead, records })
            }
            3 => {
                let glyph_count = reader.read_u16()? as usize;
                let record_count = reader.read_u16()? as usize;
                let input = reader
                    .read_u16_array(glyph_count)?
                    .into_iter()
                    .map(|o| Coverage::parse_at(data, o))
                    .collect::<Result<Vec<_>>>()?;
                let records = read_records(&mut reader, record_count)?;
                Ok(Self::Coverages { backtrack: Vec::new(), input, lookahead: Vec::new(), records })
            }
            _ => Err(FontError::UnsupportedFormat { table: "context", format }),
        }
    }

    /// Try to match at `index`; returns matched input positions and the records
    pub fn match_at(&self, glyphs: &[GlyphInfo], index: usize, skipper: &Skipper) -> Option<(Vec<usize>, &[LookupRecord])> {
        let first = glyphs.get(index)?.glyph_id;
        match self {
            Self::Glyphs { coverage, rule_sets } => {
                let rules = rule_sets.get(coverage.get(first)? as usize)?;
                rules.iter().find_map(|rule| {
                    match_rule(glyphs, index, skipper, rule, &|g, v| g == v, &|g, v| g == v, &|g, v| g == v)
                        .map(|positions| (positions, rule.records.as_slice()))
                })
            }
            Self::Classes { coverage, backtrack_classes, input_classes, lookahead_classes, rule_sets } => {
                coverage.get(first)?;
                let rules = rule_sets.get(input_classes.get(first) as usize)?;
                rules.iter().find_map(|rule| {
                    match_rule(
                        glyphs,
                        index,
                        skipper,
                        rule,
                        &|g, v| backtrack_classes.get(g) == v,
                        &|g, v| input_classes.get(g) == v,
                        &|g, v| lookahead_classes.get(g) == v,
                    )
                    .map(|positions| (positions, rule.records.as_slice()))
                })
            }
            Self::Coverages { backtrack, input, lookahead, records } => {
                let (first_cov, rest) = input.split_first()?;
                if !first_cov.contains(first) {
                    return None;
                }
                let mut positions = vec![index];
                let mut at = index;
                for cov in rest {
                    at = skipper.next(glyphs, at)?;
                    if !cov.contains(glyphs[at].glyph_id) {
                        return None;
                    }
                    positions.push(at);
                }
                let mut back = index;
                for cov in backtrack {
                    back = skipper.prev(glyphs, back)?;
                    if !cov.contains(glyphs[back].glyph_id) {
                        return None;
                    }
                }
                let mut ahead = at;
                for cov in lookahead {
                    ahead = skipper.next(glyphs, ahead)?;
                    if !cov.contains(glyphs[ahead].glyph_id) {
                        return None;
                    }
                }
                Some((positions, records.as_slice()))
            }
        }
    }
}

type Matcher<'m> = &'m dyn Fn(u16, u16) -> bool;

fn match_rule(
    glyphs: &[GlyphInfo],
    index: usize,
    skipper: &Skipper,
    rule: &ChainRule,
    backtrack: Matcher,
    input: Matcher,
    lookahead: Matcher,
) -> Option<Vec<usize>> {
    let mut positions = vec![index];
    let mut at = index;
    for &value in &rule.input {
        at = skipper.next(glyphs, at)?;
        if !input(glyphs[at].glyph_id, value) {
            return None;
        }
        positions.push(at);
    }
    let mut back = index;
    for &value in &rule.backtrack {
        back = skipper.prev(glyphs, back)?;
        if !backtrack(glyphs[back].glyph_id, value) {
            return None;
        }
    }
    let mut ahead = at;
    for &value in &rule.lookahead {
        ahead = skipper.next(glyphs, ahead)?;
        if !lookahead(glyphs[ahead].glyph_id, value) {
            return None;
        }
    }
    Some(positions)
}

fn parse_context_rule(reader: &mut FontReader) -> Result<ChainRule> {
    let glyph_count = reader.read_u16()? as usize;
    let record_count = reader.read_u16()? as usize;
    let input = reader.read_u16_array(glyph_count.saturating_sub(1))?;
    let records = read_records(reader, record_count)?;
    Ok(ChainRule { backtrack: Vec::new(), input, lookahead: Vec::new(), records })
}

fn parse_chain_rule(reader: &mut FontReader) -> Result<ChainRule> {
    let backtrack_count = reader.read_u16()? as usize;
    let backtrack = reader.read_u16_array(backtrack_count)?;
    let input_count = reader.read_u16()? as usize;
    let input = reader.read_u16_array(input_count.saturating_sub(1))?;
    let lookahead_count = reader.read_u16()? as usize;
    let lookahead = reader.read_u16_array(lookahead_count)?;
    let record_count = reader.read_u16()? as usize;
    let records = read_records(reader, record_count)?;
    Ok(ChainRule { backtrack, input, lookahead, records })
}

fn read_coverages(reader: &mut FontReader, data: &[u8]) -> Result<Vec<Coverage>> {
    let count = reader.read_u16()? as usize;
    reader.read_u16_array(count)?.into_iter().map(|o| Coverage::parse_at(data, o)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(glyph_id: u16) -> GlyphInfo {
        GlyphInfo { glyph_id, cluster: 0, mask: 1 }
    }

    #[test]
    fn test_coverage_formats() {
        let f1 = Coverage::parse(&[0, 1, 0, 3, 0, 5, 0, 9, 0, 12]).unwrap();
        assert_eq!(f1.get(9), Some(1));
        assert_eq!(f1.get(10), None);

        let f2 = Coverage::parse(&[0, 2, 0, 2, 0, 10, 0, 20, 0, 0, 0, 30, 0, 31, 0, 11]).unwrap();
        assert_eq!(f2.get(15), Some(5));
        assert_eq!(f2.get(31), Some(12));
        assert_eq!(f2.get(25), None);
        assert_eq!(f2.get(5), None);
    }

    #[test]
    fn test_class_def_formats() {
        let f1 = ClassDef::parse(&[0, 1, 0, 10, 0, 2, 0, 3, 0, 4]).unwrap();
        assert_eq!(f1.get(11), 4);
        assert_eq!(f1.get(9), 0);
        let f2 = ClassDef::parse(&[0, 2, 0, 1, 0, 5, 0, 8, 0, 2]).unwrap();
        assert_eq!(f2.get(6), 2);
        assert_eq!(f2.get(9), 0);
        assert_eq!(ClassDef::Empty.get(6), 0);
    }

    #[test]
    fn test_coverage_context_match() {
        let ctx = ChainContext::Coverages {
            backtrack: vec![Coverage::Glyphs(vec![1])],
            input: vec![Coverage::Glyphs(vec![2]), Coverage::Glyphs(vec![3])],
            lookahead: vec![Coverage::Glyphs(vec![4])],
            records: vec![LookupRecord { sequence_index: 0, lookup_index: 7 }],
        };
        let skipper = Skipper { flag: 0, mark_filtering_set: None, gdef: None };
        let glyphs: Vec<_> = [1, 2, 3, 4].into_iter().map(info).collect();
        let (positions, records) = ctx.match_at(&glyphs, 1, &skipper).unwrap();
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(records[0].lookup_index, 7);

        let no_lookahead: Vec<_> = [1, 2, 3, 5].into_iter().map(info).collect();
        assert!(ctx.match_at(&no_lookahead, 1, &skipper).is_none());
        assert!(ctx.match_at(&glyphs, 0, &skipper).is_none());
    }

    #[test]
    fn test_glyph_rule_match() {
        let ctx = ChainContext::Glyphs {
            coverage: Coverage::Glyphs(vec![5]),
            rule_sets: vec![vec![ChainRule { backtrack: vec![], input: vec![6, 7], lookahead: vec![], records: vec![] }]],
        };
        let skipper = Skipper { flag: 0, mark_filtering_set: None, gdef: None };
        let glyphs: Vec<_> = [5, 6, 7].into_iter().map(info).collect();
        assert_eq!(ctx.match_at(&glyphs, 0, &skipper).unwrap().0, vec![0, 1, 2]);
        let short: Vec<_> = [5, 6].into_iter().map(info).collect();
        assert!(ctx.match_at(&short, 0, &skipper).is_none());
    }
}
