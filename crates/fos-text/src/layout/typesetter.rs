//! Typesetter
//!
//! Shapes each font run in logical order, wraps the glyphs into lines,
//! justifies soft-wrapped lines, reorders every line visually and stacks
//! the lines downwards from y = 0. The block is then moved so the anchor
//! point lands on the origin.

use std::ops::Range;
use std::sync::Arc;

use fos_font::GlyphId;

use super::carets::{group_units, line_carets};
use super::{CaretRect, ChunkBounds, FontRun, GlyphRunEntry, LineBox, Rect, TypesetFont, TypesetParams, TypesetResult};
use crate::bidi::{self, BidiInfo, Level};
use crate::config::{AnchorY, Direction, OverflowWrap, TextAlign, WhiteSpace};
use crate::linebreak::{
    break_opportunities, is_breaking_space, is_hard_break, BreakOpportunity, LineBreaker, LineSpan, WrapItem,
    WrapOptions,
};
use crate::shaping::{is_zero_width, TextShaper};

/// A shaped glyph in logical order, pixels
#[derive(Debug, Clone, Copy)]
struct Item {
    glyph: GlyphId,
    font: Option<usize>,
    cluster: usize,
    advance: f32,
    x_offset: f32,
    y_offset: f32,
}

/// Vertical metrics of one line
#[derive(Debug, Clone, Copy)]
struct LineMetrics {
    ascender: f32,
    descender: f32,
    cap_height: f32,
    x_height: f32,
    natural_height: f32,
}

impl LineMetrics {
    /// Em-proportional metrics for lines without any font
    fn fallback(font_size: f32) -> Self {
        Self {
            ascender: 0.8 * font_size,
            descender: -0.2 * font_size,
            cap_height: 0.7 * font_size,
            x_height: 0.5 * font_size,
            natural_height: font_size,
        }
    }

    fn of(fonts: &[TypesetFont], used: &[usize], font_size: f32) -> Self {
        if used.is_empty() {
            return Self::fallback(font_size);
        }
        used.iter().map(|&i| &fonts[i]).fold(
            Self {
                ascender: f32::MIN,
                descender: f32::MAX,
                cap_height: 0.0,
                x_height: 0.0,
                natural_height: 0.0,
            },
            |m, f| Self {
                ascender: m.ascender.max(f.ascender),
                descender: m.descender.min(f.descender),
                cap_height: m.cap_height.max(f.cap_height),
                x_height: m.x_height.max(f.x_height),
                natural_height: m.natural_height.max(f.line_height()),
            },
        )
    }
}

/// A measured line before positioning
#[derive(Debug, Clone)]
struct MeasuredLine {
    span: LineSpan,
    chars: Range<usize>,
    /// Item index after the last non-trailing item
    content_end: usize,
    width: f32,
    indent: f32,
    metrics: LineMetrics,
}

/// Glyphs that stay together when reordering: a base and its marks
#[derive(Debug, Clone)]
struct Unit {
    items: Range<usize>,
    level: Level,
    width: f32,
}

/// Lay out resolved runs. Runs index chars; characters outside every run
/// or in a run without a font take no space.
pub fn typeset(text: &str, runs: &[FontRun], params: &TypesetParams) -> TypesetResult {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return TypesetResult { carets: params.include_carets.then(Vec::new), ..Default::default() };
    }

    let (fonts, char_fonts) = font_table(runs, chars.len(), params.font_size);
    let mut items = shape_items(&chars, &char_fonts, &fonts, params);
    let spans = wrap(&chars, &items, params);

    let base = match params.direction {
        Direction::Ltr => Some(Level::LTR),
        Direction::Rtl => Some(Level::RTL),
        Direction::Auto => None,
    };
    let bidi = BidiInfo::new(&chars, base);
    let rtl_base = bidi.base_level.is_rtl();

    let mut measured: Vec<MeasuredLine> = spans.iter().map(|span| measure(&chars, &items, &fonts, *span, params)).collect();
    let justify_width = params.max_width.filter(|w| w.is_finite() && params.align == TextAlign::Justify);
    if let Some(max_width) = justify_width {
        for line in measured.iter_mut().filter(|l| l.span.soft) {
            justify(&chars, &mut items, line, max_width);
        }
    }

    let block_width = params
        .max_width
        .filter(|w| w.is_finite())
        .unwrap_or_else(|| measured.iter().map(|l| l.width + l.indent).fold(0.0, f32::max));

    let mut glyphs = Vec::new();
    let mut lines = Vec::with_capacity(measured.len());
    let mut carets: Vec<CaretRect> = Vec::new();
    let mut top = 0.0f32;

    for (line_index, line) in measured.iter().enumerate() {
        let metrics = line.metrics;
        let height = params.line_height.resolve(params.font_size).unwrap_or(metrics.natural_height);
        let content_height = metrics.ascender - metrics.descender;
        let baseline = top - (height - content_height) / 2.0 - metrics.ascender;

        let full = line.width + line.indent;
        let offset = match params.align {
            TextAlign::Left => 0.0,
            TextAlign::Center => (block_width - full) / 2.0,
            TextAlign::Right => block_width - full,
            TextAlign::Justify if rtl_base => block_width - full,
            TextAlign::Justify => 0.0,
        };
        // trailing whitespace sits left of the content in right-to-left lines
        let trailing: f32 = items[line.content_end..line.span.end].iter().map(|i| i.advance).sum();
        let start_x = if rtl_base { offset - trailing } else { offset + line.indent };

        let levels = if line.chars.is_empty() { Vec::new() } else { bidi.line_levels(line.chars.clone()) };
        let level_of = |item: &Item| {
            let offset = item.cluster.checked_sub(line.chars.start);
            offset.and_then(|i| levels.get(i)).copied().unwrap_or(bidi.base_level)
        };
        mirror_glyphs(&chars, &mut items[line.span.start..line.span.end], &fonts, &level_of);

        let units = reorder_units(&chars, &items, line.span.start..line.span.end, &level_of);
        let order = if levels.iter().any(|l| l.is_rtl()) {
            bidi::reorder(&units.iter().map(|u| u.level).collect::<Vec<_>>())
        } else {
            (0..units.len()).collect()
        };

        let mut extents = vec![(0.0f32, 0.0f32); units.len()];
        let mut pen = start_x;
        for &u in &order {
            let unit = &units[u];
            let mut relative = 0.0;
            for item in &items[unit.items.clone()] {
                let visible = item.font.filter(|&font| {
                    !is_zero_width(chars[item.cluster]) && !fonts[font].font.glyph(item.glyph).path.is_empty()
                });
                if let Some(font) = visible {
                    glyphs.push(GlyphRunEntry {
                        glyph: item.glyph,
                        font,
                        x: pen + relative + item.x_offset,
                        y: baseline + item.y_offset,
                        advance: item.advance,
                        char_index: item.cluster,
                        line: line_index,
                        color: params.color_at(item.cluster),
                    });
                }
                relative += item.advance;
            }
            extents[u] = (pen, pen + unit.width);
            pen += unit.width;
        }

        if params.include_carets {
            let logical = units
                .iter()
                .zip(&extents)
                .map(|(unit, &(left, right))| (items[unit.items.start].cluster, left, right, unit.level.is_rtl()))
                .collect();
            let grouped = group_units(logical, line.chars.end);
            line_carets(&grouped, baseline + metrics.descender, baseline + metrics.ascender, &mut carets);
        }

        lines.push(LineBox {
            start: line.chars.start,
            end: line.chars.end,
            width: line.width,
            height,
            top,
            baseline,
            cap_line: baseline + metrics.cap_height,
            ex_line: baseline + metrics.x_height,
            soft: line.span.soft,
        });
        top -= height;
    }

    let height = -top;
    let (dx, dy) = anchor_offset(params, block_width, height, &lines);
    for glyph in &mut glyphs {
        glyph.x += dx;
        glyph.y += dy;
    }
    for line in &mut lines {
        line.top += dy;
        line.baseline += dy;
        line.cap_line += dy;
        line.ex_line += dy;
    }
    for caret in &mut carets {
        caret.left += dx;
        caret.right += dx;
        caret.bottom += dy;
        caret.top += dy;
    }
    carets.sort_by_key(|c| c.char_index);

    let mut result = TypesetResult {
        glyphs,
        fonts,
        lines,
        block_bounds: Rect::new(0.0, -height, block_width, 0.0).translate(dx, dy),
        visible_bounds: Rect::default(),
        chunked_bounds: Vec::new(),
        carets: params.include_carets.then_some(carets),
    };
    let ink: Vec<Rect> = result.glyphs.iter().map(|g| result.glyph_bounds(g)).collect();
    result.visible_bounds = Rect::union_all(&ink);
    let chunk_size = params.chunk_size.max(1);
    result.chunked_bounds = ink
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, rects)| ChunkBounds {
            start: i * chunk_size,
            end: i * chunk_size + rects.len(),
            rect: Rect::union_all(rects),
        })
        .collect();

    tracing::trace!(
        chars = chars.len(),
        glyphs = result.glyphs.len(),
        lines = result.lines.len(),
        "typeset block"
    );
    result
}

/// Distinct fonts in first-use order, and the font index of every char
fn font_table(runs: &[FontRun], len: usize, font_size: f32) -> (Vec<TypesetFont>, Vec<Option<usize>>) {
    let mut fonts: Vec<TypesetFont> = Vec::new();
    let mut char_fonts = vec![None; len];
    for run in runs {
        let Some(font) = &run.font else {
            continue;
        };
        let index = match fonts.iter().position(|f| Arc::ptr_eq(&f.font, font)) {
            Some(index) => index,
            None => {
                fonts.push(TypesetFont::new(font.clone(), font_size));
                fonts.len() - 1
            }
        };
        let end = run.end.min(len);
        for slot in &mut char_fonts[run.start.min(end)..end] {
            *slot = Some(index);
        }
    }
    (fonts, char_fonts)
}

fn shape_items(chars: &[char], char_fonts: &[Option<usize>], fonts: &[TypesetFont], params: &TypesetParams) -> Vec<Item> {
    let mut items = Vec::with_capacity(chars.len());
    let mut start = 0;
    while start < chars.len() {
        let font = char_fonts[start];
        let end = (start..chars.len()).find(|&i| char_fonts[i] != font).unwrap_or(chars.len());
        match font {
            Some(index) => {
                let run = TextShaper::new(&fonts[index].font).shape(&chars[start..end], start, params.font_size);
                let scale = run.scale();
                items.extend(run.glyphs.iter().map(|g| {
                    let mut advance = g.x_advance as f32 * scale;
                    if advance != 0.0 {
                        advance += params.letter_spacing;
                    }
                    Item {
                        glyph: g.glyph_id,
                        font: Some(index),
                        cluster: g.cluster,
                        advance,
                        x_offset: g.x_offset as f32 * scale,
                        y_offset: g.y_offset as f32 * scale,
                    }
                }));
            }
            None => items.extend((start..end).map(|cluster| Item {
                glyph: GlyphId(0),
                font: None,
                cluster,
                advance: 0.0,
                x_offset: 0.0,
                y_offset: 0.0,
            })),
        }
        start = end;
    }
    items
}

/// Break opportunities sit after the last character of a glyph's cluster
fn wrap(chars: &[char], items: &[Item], params: &TypesetParams) -> Vec<LineSpan> {
    let opportunities = break_opportunities(chars);
    let wrap_items: Vec<WrapItem> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let next_cluster = items.get(i + 1).map_or(chars.len(), |next| next.cluster);
            let opportunity = if next_cluster > item.cluster {
                opportunities[next_cluster - 1]
            } else {
                BreakOpportunity::NoBreak
            };
            let c = chars[item.cluster];
            WrapItem { advance: item.advance, opportunity, whitespace: c.is_whitespace() && !is_hard_break(c) }
        })
        .collect();

    LineBreaker::wrap(
        &wrap_items,
        WrapOptions {
            max_width: params.max_width.unwrap_or(f32::INFINITY),
            wrap: params.white_space == WhiteSpace::Normal,
            break_words: params.overflow_wrap == OverflowWrap::BreakWord,
            indent: params.indent,
        },
    )
}

fn is_trailing(c: char) -> bool {
    c.is_whitespace() || is_zero_width(c)
}

fn measure(chars: &[char], items: &[Item], fonts: &[TypesetFont], span: LineSpan, params: &TypesetParams) -> MeasuredLine {
    let char_start = items.get(span.start).map_or(chars.len(), |i| i.cluster);
    let char_end = items.get(span.end).map_or(chars.len(), |i| i.cluster);

    let mut content_end = span.end;
    while content_end > span.start && is_trailing(chars[items[content_end - 1].cluster]) {
        content_end -= 1;
    }
    let width = items[span.start..content_end].iter().map(|i| i.advance).sum();

    let mut used: Vec<usize> = Vec::new();
    for font in items[span.start..span.end].iter().filter_map(|i| i.font) {
        if !used.contains(&font) {
            used.push(font);
        }
    }
    // empty lines borrow the font of the nearest glyph
    if used.is_empty() {
        let nearest = items[..span.start].iter().rev().chain(&items[span.end..]).find_map(|i| i.font);
        used.extend(nearest);
    }

    MeasuredLine {
        span,
        chars: char_start..char_end.max(char_start),
        content_end,
        width,
        indent: if span.paragraph_start { params.indent } else { 0.0 },
        metrics: LineMetrics::of(fonts, &used, params.font_size),
    }
}

/// Spread the slack of a soft-wrapped line over its breaking spaces
fn justify(chars: &[char], items: &mut [Item], line: &mut MeasuredLine, max_width: f32) {
    let target = max_width - line.indent;
    let slack = target - line.width;
    let spaces: Vec<usize> =
        (line.span.start..line.content_end).filter(|&i| is_breaking_space(chars[items[i].cluster])).collect();
    if slack <= 0.0 || spaces.is_empty() {
        return;
    }
    let extra = slack / spaces.len() as f32;
    for i in spaces {
        items[i].advance += extra;
    }
    line.width = target;
}

/// Use the mirrored counterpart of glyphs at right-to-left levels when the
/// font has one
fn mirror_glyphs(chars: &[char], items: &mut [Item], fonts: &[TypesetFont], level_of: impl Fn(&Item) -> Level) {
    for item in items {
        if !level_of(item).is_rtl() {
            continue;
        }
        let Some(font) = item.font else {
            continue;
        };
        if let Some(glyph) = bidi::mirror(chars[item.cluster]).and_then(|m| fonts[font].font.glyph_index(m)) {
            item.glyph = glyph;
        }
    }
}

/// Group a line's items into reorderable units. Zero-advance marks stay
/// with the glyph before them.
fn reorder_units(chars: &[char], items: &[Item], range: Range<usize>, level_of: impl Fn(&Item) -> Level) -> Vec<Unit> {
    let mut units: Vec<Unit> = Vec::new();
    for i in range {
        let item = &items[i];
        let c = chars[item.cluster];
        let attaches = item.advance == 0.0 && item.font.is_some() && !is_trailing(c);
        match units.last_mut() {
            Some(unit) if attaches => {
                unit.items.end = i + 1;
                unit.width += item.advance;
            }
            _ => units.push(Unit { items: i..i + 1, level: level_of(item), width: item.advance }),
        }
    }
    units
}

/// Translation that puts the anchor point on the origin
fn anchor_offset(params: &TypesetParams, width: f32, height: f32, lines: &[LineBox]) -> (f32, f32) {
    let dx = -params.anchor_x.0 * width;
    let first = lines.first();
    let last = lines.last();
    let dy = match params.anchor_y {
        AnchorY::Fraction(f) => f * height,
        AnchorY::Top => 0.0,
        AnchorY::TopBaseline => -first.map_or(0.0, |l| l.baseline),
        AnchorY::TopCap => -first.map_or(0.0, |l| l.cap_line),
        AnchorY::TopEx => -first.map_or(0.0, |l| l.ex_line),
        AnchorY::Middle => height / 2.0,
        AnchorY::BottomBaseline => -last.map_or(0.0, |l| l.baseline),
        AnchorY::BottomCap => -last.map_or(0.0, |l| l.cap_line),
        AnchorY::Bottom => height,
    };
    (dx, dy)
}
