//! Edge case tests for fos-font
//!
//! Synthetic fonts from the test builder, cross-checked against ttf-parser
//! where both parsers expose the same data.

use fos_font::layout::GlyphInfo;
use fos_font::testing::TestFontBuilder;
use fos_font::*;

fn directory(data: &[u8]) -> Vec<([u8; 4], usize, usize)> {
    let count = u16::from_be_bytes([data[4], data[5]]) as usize;
    (0..count)
        .map(|i| {
            let rec = &data[12 + i * 16..28 + i * 16];
            let offset = u32::from_be_bytes([rec[8], rec[9], rec[10], rec[11]]) as usize;
            let length = u32::from_be_bytes([rec[12], rec[13], rec[14], rec[15]]) as usize;
            ([rec[0], rec[1], rec[2], rec[3]], offset, length)
        })
        .collect()
}

fn rename_table(data: &mut [u8], from: &[u8; 4], to: &[u8; 4]) {
    let count = u16::from_be_bytes([data[4], data[5]]) as usize;
    for i in 0..count {
        let at = 12 + i * 16;
        if &data[at..at + 4] == from {
            data[at..at + 4].copy_from_slice(to);
        }
    }
}

fn latin_font() -> TestFontBuilder {
    TestFontBuilder::new().block_glyphs("ABCHx ", 600).contour_glyph(
        Some('o'),
        550,
        vec![vec![(50, 250, true), (50, 500, false), (275, 500, true), (500, 500, false), (500, 250, true), (500, 0, false), (275, 0, true), (50, 0, false)]],
    )
}

// ============================================================================
// CROSS-CHECK WITH TTF-PARSER
// ============================================================================

#[test]
fn test_matches_ttf_parser_metrics_and_cmap() {
    let data = latin_font().metrics(900, -250, 100).build();
    let ours = FontResource::parse("test://latin", data.clone()).unwrap();
    let reference = ttf_parser::Face::parse(&data, 0).unwrap();

    assert_eq!(ours.metrics().units_per_em, reference.units_per_em());
    assert_eq!(ours.metrics().ascender, reference.ascender() as f32);
    assert_eq!(ours.metrics().descender, reference.descender() as f32);
    assert_eq!(ours.metrics().line_gap, reference.line_gap() as f32);
    assert_eq!(ours.num_glyphs(), reference.number_of_glyphs());

    for c in "ABCHxo ".chars() {
        let glyph = ours.glyph_index(c).unwrap();
        let reference_glyph = reference.glyph_index(c).unwrap();
        assert_eq!(glyph.0, reference_glyph.0, "glyph index for {c:?}");
        assert_eq!(Some(ours.advance(glyph)), reference.glyph_hor_advance(reference_glyph));
    }
    assert!(ours.glyph_index('Z').is_none());
}

#[test]
fn test_outline_bounds_match_ttf_parser() {
    let data = latin_font().build();
    let ours = FontResource::parse("test://latin", data.clone()).unwrap();
    let reference = ttf_parser::Face::parse(&data, 0).unwrap();
    for c in "ABo".chars() {
        let glyph = ours.glyph_index(c).unwrap();
        let bounds = ours.glyph(glyph).path.bounds();
        let rect = reference.glyph_bounding_box(ttf_parser::GlyphId(glyph.0)).unwrap();
        assert_eq!(bounds.x_min, rect.x_min as f32);
        assert_eq!(bounds.y_max, rect.y_max as f32);
    }
}

// ============================================================================
// ROUND TRIP: CMAP -> OUTLINE
// ============================================================================

#[test]
fn test_every_mapped_visible_codepoint_has_outline() {
    for cff in [false, true] {
        let font = FontResource::parse("test://rt", latin_font().cff(cff).build()).unwrap();
        let mut checked = 0;
        for cp in font.cmap().codepoints() {
            let c = char::from_u32(cp).unwrap();
            if c.is_whitespace() {
                continue;
            }
            let glyph = font.glyph_index(c).unwrap();
            assert!(!font.glyph(glyph).path.is_degenerate(), "{c:?} (cff = {cff})");
            checked += 1;
        }
        assert_eq!(checked, 6);
    }
}

#[test]
fn test_supplementary_plane_uses_format12() {
    let font = FontResource::parse("test://emoji", TestFontBuilder::new().block_glyphs("A\u{1F600}", 800).build()).unwrap();
    assert_eq!(font.cmap().source(), (3, 10, 12));
    assert_eq!(font.glyph_index('\u{1F600}'), Some(GlyphId(2)));
    assert_eq!(font.glyph_index('A'), Some(GlyphId(1)));
}

// ============================================================================
// CONTAINERS
// ============================================================================

#[test]
fn test_woff_parses_like_sfnt() {
    let builder = latin_font();
    let sfnt = FontResource::parse("test://sfnt", builder.build()).unwrap();
    let woff = FontResource::parse("test://woff", builder.build_woff()).unwrap();
    assert_eq!(sfnt.num_glyphs(), woff.num_glyphs());
    assert_eq!(sfnt.metrics(), woff.metrics());
    let o = sfnt.glyph_index('o').unwrap();
    assert_eq!(sfnt.glyph(o), woff.glyph(o));
}

#[test]
fn test_true_type_collection() {
    let sfnt = latin_font().build();
    let shift = 16u32;
    let mut ttc = Vec::new();
    ttc.extend_from_slice(b"ttcf");
    ttc.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    ttc.extend_from_slice(&1u32.to_be_bytes());
    ttc.extend_from_slice(&shift.to_be_bytes());
    let mut face = sfnt.clone();
    for (i, (_, offset, _)) in directory(&sfnt).into_iter().enumerate() {
        let at = 12 + i * 16 + 8;
        face[at..at + 4].copy_from_slice(&(offset as u32 + shift).to_be_bytes());
    }
    ttc.extend_from_slice(&face);

    let font = FontResource::parse_index("test://ttc", ttc.clone(), 0).unwrap();
    assert!(font.has_char('A'));
    assert_eq!(FontResource::parse_index("test://ttc", ttc, 1).unwrap_err(), FontError::FaceIndexOutOfRange(1));
}

#[test]
fn test_garbage_is_rejected() {
    let err = FontResource::parse("test://junk", b"definitely not a font".to_vec()).unwrap_err();
    assert!(matches!(err, FontError::InvalidMagic(_)));
    assert_eq!(FontResource::parse("test://empty", Vec::new()).unwrap_err(), FontError::UnexpectedEof);
}

// ============================================================================
// MANDATORY VS OPTIONAL TABLES
// ============================================================================

#[test]
fn test_missing_mandatory_tables_fail() {
    for (tag, name) in [(b"cmap", "cmap"), (b"head", "head"), (b"hmtx", "hmtx"), (b"maxp", "maxp")] {
        let mut data = latin_font().build();
        rename_table(&mut data, tag, b"zzzz");
        assert_eq!(FontResource::parse("test://broken", data).unwrap_err(), FontError::TableNotFound(name));
    }
    let mut data = latin_font().build();
    rename_table(&mut data, b"glyf", b"zzzz");
    assert_eq!(FontResource::parse("test://broken", data).unwrap_err(), FontError::TableNotFound("glyf/loca or CFF"));
}

#[test]
fn test_malformed_gsub_degrades() {
    let builder = latin_font();
    let (a, b, c) = (builder.glyph_for('A').unwrap(), builder.glyph_for('B').unwrap(), builder.glyph_for('C').unwrap());
    let mut data = builder.ligature(&[a, b], c).kern(a, b, -40).build();
    let (_, gsub_at, _) = directory(&data).into_iter().find(|(t, _, _)| t == b"GSUB").unwrap();
    // Unknown major version
    data[gsub_at..gsub_at + 2].copy_from_slice(&[0, 9]);
    let font = FontResource::parse("test://bad-gsub", data).unwrap();
    assert!(font.shaping().gsub.is_none());
    assert_eq!(font.kerning(GlyphId(a), GlyphId(b)), Some(-40));
}

// ============================================================================
// METRICS
// ============================================================================

#[test]
fn test_cap_and_x_height_sources() {
    let explicit = FontResource::parse("test://h", latin_font().heights(690, 480).build()).unwrap();
    assert_eq!(explicit.metrics().cap_height, 690.0);
    assert_eq!(explicit.metrics().x_height, 480.0);

    // From the H and x outlines
    let measured = FontResource::parse("test://m", latin_font().build()).unwrap();
    assert_eq!(measured.metrics().cap_height, 700.0);
    assert_eq!(measured.metrics().x_height, 700.0);

    // Neither available
    let bare = FontResource::parse("test://b", TestFontBuilder::new().units_per_em(2000).block_glyphs("1", 500).build()).unwrap();
    assert_eq!(bare.metrics().cap_height, 1400.0);
    assert_eq!(bare.metrics().x_height, 1000.0);
}

#[test]
fn test_typo_metrics_flag() {
    let font = FontResource::parse("test://typo", latin_font().typo_metrics(750, -250, 200).build()).unwrap();
    assert_eq!(font.metrics().ascender, 750.0);
    assert_eq!(font.metrics().line_gap, 200.0);
    assert_eq!(font.metrics().line_height(), 1200.0);
    assert_eq!(font.metrics().scale(16.0), 0.016);
}

#[test]
fn test_names_and_style() {
    let font = FontResource::parse("test://names", latin_font().family("Demo Serif", "Bold Italic").weight(700).italic(true).build())
        .unwrap();
    let names = font.names();
    assert_eq!(names.family.as_deref(), Some("Demo Serif"));
    assert_eq!(names.subfamily.as_deref(), Some("Bold Italic"));
    assert_eq!(names.weight, 700);
    assert!(names.italic);
    assert_eq!(names.italic_angle, -12.0);
    assert_eq!(names.underline_thickness, 50);
}

// ============================================================================
// OUTLINES
// ============================================================================

#[test]
fn test_composite_glyph_offsets_components() {
    let builder = latin_font();
    let a = builder.glyph_for('A').unwrap();
    let builder = builder.composite_glyph(Some('Å'), 600, vec![(a, 0, 0), (a, 100, 800)]);
    let font = FontResource::parse("test://composite", builder.build()).unwrap();
    let glyph = font.glyph_index('Å').unwrap();
    assert!(matches!(font.outline_source(glyph).unwrap(), OutlineSource::Composite(ref c) if c.len() == 2));
    let bounds = font.glyph(glyph).path.bounds();
    assert_eq!(bounds.y_max, 1500.0);
    assert_eq!(bounds.x_max, 640.0);
}

#[test]
fn test_cff_quadratic_contour_bounds() {
    let tt = FontResource::parse("test://o-tt", latin_font().build()).unwrap();
    let cff = FontResource::parse("test://o-cff", latin_font().cff(true).build()).unwrap();
    let o = tt.glyph_index('o').unwrap();
    assert!(matches!(cff.outline_source(o).unwrap(), OutlineSource::Charstring(_)));
    let (a, b) = (tt.glyph(o).path.bounds(), cff.glyph(o).path.bounds());
    // Control-point bounds differ after quad-to-cubic conversion; on-curve extremes agree
    assert!((a.x_min - b.x_min).abs() < 0.01 && (a.y_min - b.y_min).abs() < 0.01);
    assert!(b.width() <= a.width() + 0.01);
}

#[test]
fn test_out_of_range_glyph_is_empty() {
    let font = FontResource::parse("test://range", latin_font().build()).unwrap();
    let glyph = font.glyph(GlyphId(999));
    assert!(glyph.path.is_empty());
}

// ============================================================================
// SHAPING TABLES
// ============================================================================

#[test]
fn test_ligature_lookup_from_built_font() {
    let builder = latin_font();
    let (a, b, c) = (builder.glyph_for('A').unwrap(), builder.glyph_for('B').unwrap(), builder.glyph_for('C').unwrap());
    let font = FontResource::parse("test://liga", builder.ligature(&[a, b], c).build()).unwrap();
    let gsub = font.shaping().gsub.as_ref().unwrap();
    let lookups = gsub.layout.lookups_for(*b"latn", None, &[*b"liga"]);
    assert_eq!(lookups, vec![(0, *b"liga")]);

    let mut glyphs: Vec<GlyphInfo> =
        [a, b, a].iter().enumerate().map(|(i, &glyph_id)| GlyphInfo { glyph_id, cluster: i, mask: 1 }).collect();
    gsub.apply_lookup(0, &mut glyphs, 1, font.shaping().gdef.as_ref());
    assert_eq!(glyphs.iter().map(|g| g.glyph_id).collect::<Vec<_>>(), vec![c, a]);
    assert_eq!(glyphs[1].cluster, 2);
}

#[test]
fn test_gpos_pair_from_built_font() {
    let builder = latin_font();
    let (a, b) = (builder.glyph_for('A').unwrap(), builder.glyph_for('B').unwrap());
    let font = FontResource::parse("test://gpos", builder.gpos_kern(a, b, -70).build()).unwrap();
    let gpos = font.shaping().gpos.as_ref().unwrap();
    assert_eq!(gpos.layout.lookups_for(*b"DFLT", None, &[*b"kern"]).len(), 1);
    let subtable = &gpos.layout.lookups[0].subtables[0];
    let fos_font::gpos::GposSubtable::Pair(pair) = subtable else {
        panic!("expected a pair subtable");
    };
    assert_eq!(pair.get(a, b).unwrap().0.x_advance, -70);
    assert!(pair.get(b, a).is_none());
}

#[test]
fn test_gdef_marks_from_built_font() {
    let builder = latin_font();
    let x = builder.glyph_for('x').unwrap();
    let font = FontResource::parse("test://gdef", builder.mark(x).build()).unwrap();
    let gdef = font.shaping().gdef.as_ref().unwrap();
    assert!(gdef.is_mark(x));
    assert!(!gdef.is_mark(1));
}
