//! Per-font glyph shaping
//!
//! Maps one font run to glyphs, then runs the font's `GSUB` lookups
//! (positional forms first, then the generic substitution features) and its
//! `GPOS` lookups. Fonts without a `GPOS` kerning feature fall back to the
//! legacy `kern` table. Advances and offsets stay in font units; the
//! typesetter scales them.

pub mod arabic;

use std::collections::HashSet;

use fos_font::gpos::{GlyphPosition, GposTable};
use fos_font::layout::GlyphInfo;
use fos_font::{FontResource, GlyphId};

use crate::linebreak::is_hard_break;
use arabic::PositionalForm;

/// Set on every glyph; selects the generic features
const GLOBAL_MASK: u32 = 1;

const FORM_FEATURES: [[u8; 4]; 4] = [*b"isol", *b"init", *b"medi", *b"fina"];

const SUBSTITUTION_FEATURES: [[u8; 4]; 7] = [*b"ccmp", *b"locl", *b"rlig", *b"liga", *b"clig", *b"calt", *b"rclt"];

const POSITIONING_FEATURES: [[u8; 4]; 4] = [*b"kern", *b"mark", *b"mkmk", *b"dist"];

/// Width of a tab in spaces
const TAB_SPACES: i32 = 4;

fn form_mask(form: PositionalForm) -> u32 {
    match form {
        PositionalForm::Isolated => 2,
        PositionalForm::Initial => 4,
        PositionalForm::Medial => 8,
        PositionalForm::Final => 16,
    }
}

fn feature_mask(tag: [u8; 4]) -> u32 {
    match &tag {
        b"isol" => form_mask(PositionalForm::Isolated),
        b"init" => form_mask(PositionalForm::Initial),
        b"medi" => form_mask(PositionalForm::Medial),
        b"fina" => form_mask(PositionalForm::Final),
        _ => GLOBAL_MASK,
    }
}

/// Characters that take no space: controls, hard breaks and default
/// ignorables such as ZWJ or the BOM.
pub fn is_zero_width(c: char) -> bool {
    c != '\t'
        && (c.is_control()
            || is_hard_break(c)
            || matches!(c, '\u{00AD}' | '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2069}' | '\u{FEFF}'))
}

/// OpenType script tag of the first strongly-scripted character
pub fn script_tag(chars: &[char]) -> [u8; 4] {
    for &c in chars {
        let tag = match c as u32 {
            0x0600..=0x06FF | 0x0750..=0x077F | 0x08A0..=0x08FF | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF => *b"arab",
            0x0590..=0x05FF | 0xFB1D..=0xFB4F => *b"hebr",
            0x0400..=0x052F => *b"cyrl",
            0x0370..=0x03FF | 0x1F00..=0x1FFF => *b"grek",
            _ if c.is_alphabetic() => *b"latn",
            _ => continue,
        };
        return tag;
    }
    *b"latn"
}

/// A shaped glyph (font units)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapedGlyph {
    pub glyph_id: GlyphId,
    /// Char index of the first character this glyph came from
    pub cluster: usize,
    pub x_advance: i32,
    pub x_offset: i32,
    pub y_offset: i32,
}

/// Shaped glyphs of one font run, in logical order
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedRun {
    pub glyphs: Vec<ShapedGlyph>,
    pub font_size: f32,
    pub units_per_em: u16,
}

impl ShapedRun {
    /// Font units to pixels
    pub fn scale(&self) -> f32 {
        self.font_size / self.units_per_em.max(1) as f32
    }

    /// Total advance in pixels
    pub fn width(&self) -> f32 {
        self.glyphs.iter().map(|g| g.x_advance as f32).sum::<f32>() * self.scale()
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

/// Shapes character runs with a single font
pub struct TextShaper<'f> {
    font: &'f FontResource,
    script: Option<[u8; 4]>,
    language: Option<[u8; 4]>,
}

impl<'f> TextShaper<'f> {
    pub fn new(font: &'f FontResource) -> Self {
        Self { font, script: None, language: None }
    }

    /// Force a script tag instead of detecting it from the text
    pub fn with_script(mut self, script: [u8; 4]) -> Self {
        self.script = Some(script);
        self
    }

    pub fn with_language(mut self, language: [u8; 4]) -> Self {
        self.language = Some(language);
        self
    }

    /// Shape `chars`, whose first character sits at char index `base` of the
    /// whole text. Clusters in the result are absolute char indices.
    pub fn shape(&self, chars: &[char], base: usize, font_size: f32) -> ShapedRun {
        let font = self.font;
        let tables = font.shaping();
        let gdef = tables.gdef.as_ref();
        let script = self.script.unwrap_or_else(|| script_tag(chars));

        let space = font.glyph_index(' ');
        let forms = arabic::positional_forms(chars);
        let mut infos: Vec<GlyphInfo> = chars
            .iter()
            .zip(&forms)
            .enumerate()
            .map(|(i, (&c, form))| {
                let glyph = match c {
                    '\t' => space,
                    c => font.glyph_index(c),
                }
                .unwrap_or_default();
                GlyphInfo { glyph_id: glyph.0, cluster: i, mask: GLOBAL_MASK | form.map_or(0, form_mask) }
            })
            .collect();

        if let Some(gsub) = &tables.gsub {
            let mut applied = HashSet::new();
            for features in [&FORM_FEATURES[..], &SUBSTITUTION_FEATURES[..]] {
                for (lookup, tag) in gsub.layout.lookups_for(script, self.language, features) {
                    if applied.insert(lookup) {
                        gsub.apply_lookup(lookup, &mut infos, feature_mask(tag), gdef);
                    }
                }
            }
        }

        let tab = space.map_or(0, |s| font.advance(s) as i32) * TAB_SPACES;
        let mut positions: Vec<GlyphPosition> = infos
            .iter()
            .map(|info| {
                let c = chars.get(info.cluster).copied().unwrap_or_default();
                let x_advance = if c == '\t' {
                    tab
                } else if is_zero_width(c) || gdef.is_some_and(|g| g.is_mark(info.glyph_id)) {
                    0
                } else {
                    font.advance(GlyphId(info.glyph_id)) as i32
                };
                GlyphPosition { x_advance, ..Default::default() }
            })
            .collect();

        let mut kerned = false;
        if let Some(gpos) = &tables.gpos {
            for (lookup, tag) in gpos.layout.lookups_for(script, self.language, &POSITIONING_FEATURES) {
                kerned |= &tag == b"kern";
                gpos.apply_lookup(lookup, &infos, &mut positions, feature_mask(tag), gdef);
            }
            GposTable::resolve_attachments(&mut positions);
        }
        if !kerned {
            self.apply_kern_table(&infos, &mut positions);
        }

        let glyphs = infos
            .iter()
            .zip(&positions)
            .map(|(info, pos)| ShapedGlyph {
                glyph_id: GlyphId(info.glyph_id),
                cluster: base + info.cluster,
                x_advance: pos.x_advance,
                x_offset: pos.x_offset,
                y_offset: pos.y_offset,
            })
            .collect();

        ShapedRun { glyphs, font_size, units_per_em: font.metrics().units_per_em }
    }

    /// Legacy pair kerning between each glyph and the next non-mark glyph
    fn apply_kern_table(&self, infos: &[GlyphInfo], positions: &mut [GlyphPosition]) {
        if self.font.shaping().kern.is_none() {
            return;
        }
        let gdef = self.font.shaping().gdef.as_ref();
        let is_mark = |g: u16| gdef.is_some_and(|d| d.is_mark(g));
        for i in 0..infos.len() {
            if is_mark(infos[i].glyph_id) {
                continue;
            }
            let Some(j) = (i + 1..infos.len()).find(|&j| !is_mark(infos[j].glyph_id)) else {
                break;
            };
            if let Some(value) = self.font.kerning(GlyphId(infos[i].glyph_id), GlyphId(infos[j].glyph_id)) {
                positions[i].x_advance += value as i32;
            }
        }
    }
}
