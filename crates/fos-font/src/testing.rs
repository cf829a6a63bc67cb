//! Synthetic font builder for tests
//!
//! Writes small but structurally complete sfnt buffers: TrueType (`glyf`)
//! or CFF outlines, format 4/12 `cmap`, `hmtx`, `kern`, `GSUB`, `GPOS`,
//! `GDEF`, `OS/2`, `name` and `post`.

use crate::woff::{build_sfnt, encode_woff};

/// Point of a test contour: (x, y, on-curve)
pub type TestPoint = (i16, i16, bool);

#[derive(Debug, Clone)]
enum TestShape {
    Contours(Vec<Vec<TestPoint>>),
    /// (glyph id, dx, dy) references
    Composite(Vec<(u16, i16, i16)>),
}

#[derive(Debug, Clone)]
struct TestGlyph {
    codepoint: Option<char>,
    advance: u16,
    shape: TestShape,
}

/// Builder for synthetic fonts. Glyph 0 is an empty `.notdef`.
#[derive(Debug, Clone)]
pub struct TestFontBuilder {
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    line_gap: i16,
    cap_height: i16,
    x_height: i16,
    use_typo_metrics: bool,
    typo: Option<(i16, i16, i16)>,
    family: String,
    subfamily: String,
    weight: u16,
    italic: bool,
    cff: bool,
    glyphs: Vec<TestGlyph>,
    kern_pairs: Vec<(u16, u16, i16)>,
    gpos_pairs: Vec<(u16, u16, i16)>,
    ligatures: Vec<(Vec<u16>, u16)>,
    substitutions: Vec<([u8; 4], u16, u16)>,
    marks: Vec<u16>,
}

impl Default for TestFontBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFontBuilder {
    pub fn new() -> Self {
        Self {
            units_per_em: 1000,
            ascender: 800,
            descender: -200,
            line_gap: 0,
            cap_height: 0,
            x_height: 0,
            use_typo_metrics: false,
            typo: None,
            family: "Test Sans".to_owned(),
            subfamily: "Regular".to_owned(),
            weight: 400,
            italic: false,
            cff: false,
            glyphs: vec![TestGlyph { codepoint: None, advance: 500, shape: TestShape::Contours(Vec::new()) }],
            kern_pairs: Vec::new(),
            gpos_pairs: Vec::new(),
            ligatures: Vec::new(),
            substitutions: Vec::new(),
            marks: Vec::new(),
        }
    }

    pub fn units_per_em(mut self, units_per_em: u16) -> Self {
        self.units_per_em = units_per_em;
        self
    }

    /// hhea ascender, descender and line gap
    pub fn metrics(mut self, ascender: i16, descender: i16, line_gap: i16) -> Self {
        self.ascender = ascender;
        self.descender = descender;
        self.line_gap = line_gap;
        self
    }

    /// OS/2 typo metrics with the USE_TYPO_METRICS bit set
    pub fn typo_metrics(mut self, ascender: i16, descender: i16, line_gap: i16) -> Self {
        self.typo = Some((ascender, descender, line_gap));
        self.use_typo_metrics = true;
        self
    }

    /// OS/2 cap and x heights (0 leaves them unset)
    pub fn heights(mut self, cap_height: i16, x_height: i16) -> Self {
        self.cap_height = cap_height;
        self.x_height = x_height;
        self
    }

    pub fn family(mut self, family: &str, subfamily: &str) -> Self {
        self.family = family.to_owned();
        self.subfamily = subfamily.to_owned();
        self
    }

    pub fn weight(mut self, weight: u16) -> Self {
        self.weight = weight;
        self
    }

    pub fn italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }

    /// Write CFF outlines instead of glyf/loca
    pub fn cff(mut self, cff: bool) -> Self {
        self.cff = cff;
        self
    }

    /// Id the next added glyph will get
    pub fn next_glyph_id(&self) -> u16 {
        self.glyphs.len() as u16
    }

    /// Glyph whose outline is an axis-aligned rectangle
    pub fn rect_glyph(self, c: Option<char>, advance: u16, x0: i16, y0: i16, x1: i16, y1: i16) -> Self {
        let contour = vec![(x0, y0, true), (x0, y1, true), (x1, y1, true), (x1, y0, true)];
        self.contour_glyph(c, advance, vec![contour])
    }

    /// Glyph with arbitrary contours (off-curve points are quadratic controls)
    pub fn contour_glyph(mut self, c: Option<char>, advance: u16, contours: Vec<Vec<TestPoint>>) -> Self {
        self.glyphs.push(TestGlyph { codepoint: c, advance, shape: TestShape::Contours(contours) });
        self
    }

    /// Glyph without outline (spaces)
    pub fn empty_glyph(mut self, c: char, advance: u16) -> Self {
        self.glyphs.push(TestGlyph { codepoint: Some(c), advance, shape: TestShape::Contours(Vec::new()) });
        self
    }

    /// TrueType composite of earlier glyphs; CFF fonts flatten it
    pub fn composite_glyph(mut self, c: Option<char>, advance: u16, components: Vec<(u16, i16, i16)>) -> Self {
        self.glyphs.push(TestGlyph { codepoint: c, advance, shape: TestShape::Composite(components) });
        self
    }

    /// Rectangle glyph for every character of `chars`, with a uniform advance
    pub fn block_glyphs(mut self, chars: &str, advance: u16) -> Self {
        for c in chars.chars() {
            self = if c.is_whitespace() {
                self.empty_glyph(c, advance)
            } else {
                let w = advance as i16;
                self.rect_glyph(Some(c), advance, w / 10, 0, w - w / 10, 700)
            };
        }
        self
    }

    /// Glyph id mapped to a character
    pub fn glyph_for(&self, c: char) -> Option<u16> {
        self.glyphs.iter().position(|g| g.codepoint == Some(c)).map(|i| i as u16)
    }

    pub fn kern(mut self, left: u16, right: u16, value: i16) -> Self {
        self.kern_pairs.push((left, right, value));
        self
    }

    /// GPOS `kern` pair adjustment on the first glyph's advance
    pub fn gpos_kern(mut self, left: u16, right: u16, value: i16) -> Self {
        self.gpos_pairs.push((left, right, value));
        self
    }

    /// GSUB `liga` ligature
    pub fn ligature(mut self, components: &[u16], ligature: u16) -> Self {
        self.ligatures.push((components.to_vec(), ligature));
        self
    }

    /// Single substitution under a feature tag
    pub fn substitution(mut self, feature: [u8; 4], from: u16, to: u16) -> Self {
        self.substitutions.push((feature, from, to));
        self
    }

    /// Classify a glyph as a mark in GDEF
    pub fn mark(mut self, glyph: u16) -> Self {
        self.marks.push(glyph);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut tables: Vec<([u8; 4], Vec<u8>)> = vec![
            (*b"head", self.head()),
            (*b"hhea", self.hhea()),
            (*b"maxp", self.maxp()),
            (*b"hmtx", self.hmtx()),
            (*b"cmap", self.cmap()),
            (*b"OS/2", self.os2()),
            (*b"name", self.name()),
            (*b"post", self.post()),
        ];
        if self.cff {
            tables.push((*b"CFF ", self.cff_table()));
        } else {
            let (glyf, loca) = self.glyf_loca();
            tables.push((*b"glyf", glyf));
            tables.push((*b"loca", loca));
        }
        if !self.kern_pairs.is_empty() {
            tables.push((*b"kern", self.kern_table()));
        }
        if !self.ligatures.is_empty() || !self.substitutions.is_empty() {
            tables.push((*b"GSUB", self.gsub()));
        }
        if !self.gpos_pairs.is_empty() {
            tables.push((*b"GPOS", self.gpos()));
        }
        if !self.marks.is_empty() {
            tables.push((*b"GDEF", self.gdef()));
        }
        let flavor = if self.cff { 0x4F54_544F } else { 0x0001_0000 };
        build_sfnt(flavor, tables)
    }

    /// The same font wrapped as WOFF
    pub fn build_woff(&self) -> Vec<u8> {
        // The sfnt written by `build` always has a valid directory
        encode_woff(&self.build()).unwrap_or_default()
    }

    fn contours_of(&self, glyph: u16, dx: i16, dy: i16, depth: u8, out: &mut Vec<Vec<TestPoint>>) {
        let Some(g) = self.glyphs.get(glyph as usize) else {
            return;
        };
        match &g.shape {
            TestShape::Contours(contours) => {
                out.extend(contours.iter().map(|c| c.iter().map(|&(x, y, on)| (x + dx, y + dy, on)).collect()));
            }
            TestShape::Composite(components) if depth < 4 => {
                for &(child, cx, cy) in components {
                    self.contours_of(child, dx + cx, dy + cy, depth + 1, out);
                }
            }
            TestShape::Composite(_) => {}
        }
    }

    fn bounds(&self, glyph: u16) -> Option<(i16, i16, i16, i16)> {
        let mut contours = Vec::new();
        self.contours_of(glyph, 0, 0, 0, &mut contours);
        let points: Vec<_> = contours.into_iter().flatten().collect();
        let first = points.first()?;
        Some(points.iter().fold((first.0, first.1, first.0, first.1), |(x0, y0, x1, y1), &(x, y, _)| {
            (x0.min(x), y0.min(y), x1.max(x), y1.max(y))
        }))
    }

    fn font_bounds(&self) -> (i16, i16, i16, i16) {
        (0..self.glyphs.len() as u16)
            .filter_map(|g| self.bounds(g))
            .reduce(|a, b| (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)))
            .unwrap_or_default()
    }

    fn head(&self) -> Vec<u8> {
        let (x0, y0, x1, y1) = self.font_bounds();
        let mut w = Writer::default();
        w.u32(0x0001_0000);
        w.u32(0x0001_0000);
        w.u32(0); // checksum adjustment, filled in by build_sfnt
        w.u32(0x5F0F_3CF5);
        w.u16(0);
        w.u16(self.units_per_em);
        w.zeros(16);
        for v in [x0, y0, x1, y1] {
            w.i16(v);
        }
        w.u16(if self.italic { 0x2 } else { 0 });
        w.u16(8);
        w.i16(2);
        w.i16(1); // long loca offsets
        w.i16(0);
        w.0
    }

    fn hhea(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.u32(0x0001_0000);
        w.i16(self.ascender);
        w.i16(self.descender);
        w.i16(self.line_gap);
        w.u16(self.glyphs.iter().map(|g| g.advance).max().unwrap_or(0));
        w.zeros(22);
        w.u16(self.glyphs.len() as u16);
        w.0
    }

    fn maxp(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.u32(0x0000_5000);
        w.u16(self.glyphs.len() as u16);
        w.0
    }

    fn hmtx(&self) -> Vec<u8> {
        let mut w = Writer::default();
        for (i, glyph) in self.glyphs.iter().enumerate() {
            w.u16(glyph.advance);
            w.i16(self.bounds(i as u16).map_or(0, |b| b.0));
        }
        w.0
    }

    fn cmap(&self) -> Vec<u8> {
        let mut mapped: Vec<(u32, u16)> =
            self.glyphs.iter().enumerate().filter_map(|(i, g)| g.codepoint.map(|c| (c as u32, i as u16))).collect();
        mapped.sort();
        let bmp: Vec<_> = mapped.iter().copied().filter(|&(c, _)| c < 0xFFFF).collect();
        let supplementary = mapped.iter().any(|&(c, _)| c > 0xFFFF);

        // Format 4: one segment per character plus the 0xFFFF terminator
        let mut f4 = Writer::default();
        let seg_count = bmp.len() + 1;
        f4.u16(4);
        f4.u16((16 + seg_count * 8) as u16);
        f4.u16(0);
        f4.u16((seg_count * 2) as u16);
        let search = 2 * (1u16 << (seg_count as u16).ilog2());
        f4.u16(search);
        f4.u16((seg_count as u16).ilog2() as u16);
        f4.u16((seg_count * 2) as u16 - search);
        for &(c, _) in &bmp {
            f4.u16(c as u16);
        }
        f4.u16(0xFFFF);
        f4.u16(0);
        for &(c, _) in &bmp {
            f4.u16(c as u16);
        }
        f4.u16(0xFFFF);
        for &(c, g) in &bmp {
            f4.u16(g.wrapping_sub(c as u16));
        }
        f4.u16(1);
        f4.zeros(seg_count * 2);

        let mut f12 = Writer::default();
        if supplementary {
            f12.u16(12);
            f12.u16(0);
            f12.u32((16 + mapped.len() * 12) as u32);
            f12.u32(0);
            f12.u32(mapped.len() as u32);
            for &(c, g) in &mapped {
                f12.u32(c);
                f12.u32(c);
                f12.u32(g as u32);
            }
        }

        let mut w = Writer::default();
        w.u16(0);
        let records = if supplementary { 2 } else { 1 };
        w.u16(records);
        let f4_offset = 4 + 8 * records as u32;
        w.u16(3);
        w.u16(1);
        w.u32(f4_offset);
        if supplementary {
            w.u16(3);
            w.u16(10);
            w.u32(f4_offset + f4.0.len() as u32);
        }
        w.bytes(&f4.0);
        w.bytes(&f12.0);
        w.0
    }

    fn glyf_loca(&self) -> (Vec<u8>, Vec<u8>) {
        let mut glyf = Writer::default();
        let mut loca = Writer::default();
        for (i, glyph) in self.glyphs.iter().enumerate() {
            loca.u32(glyf.0.len() as u32);
            let (x0, y0, x1, y1) = self.bounds(i as u16).unwrap_or_default();
            match &glyph.shape {
                TestShape::Contours(contours) if contours.is_empty() => {}
                TestShape::Contours(contours) => {
                    glyf.i16(contours.len() as i16);
                    for v in [x0, y0, x1, y1] {
                        glyf.i16(v);
                    }
                    let mut end = 0u16;
                    for contour in contours {
                        end += contour.len() as u16;
                        glyf.u16(end - 1);
                    }
                    glyf.u16(0); // no instructions
                    let points: Vec<_> = contours.iter().flatten().collect();
                    for p in &points {
                        glyf.u8(if p.2 { 0x01 } else { 0x00 });
                    }
                    let (mut px, mut py) = (0i16, 0i16);
                    for p in &points {
                        glyf.i16(p.0 - px);
                        px = p.0;
                    }
                    for p in &points {
                        glyf.i16(p.1 - py);
                        py = p.1;
                    }
                }
                TestShape::Composite(components) => {
                    glyf.i16(-1);
                    for v in [x0, y0, x1, y1] {
                        glyf.i16(v);
                    }
                    for (n, &(child, dx, dy)) in components.iter().enumerate() {
                        // ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES (| MORE_COMPONENTS)
                        let more = if n + 1 < components.len() { 0x0020 } else { 0 };
                        glyf.u16(0x0003 | more);
                        glyf.u16(child);
                        glyf.i16(dx);
                        glyf.i16(dy);
                    }
                }
            }
            glyf.align(2);
        }
        loca.u32(glyf.0.len() as u32);
        (glyf.0, loca.0)
    }

    fn charstring(&self, glyph: u16) -> Vec<u8> {
        let mut contours = Vec::new();
        self.contours_of(glyph, 0, 0, 0, &mut contours);
        let mut cs = Writer::default();
        let (mut cx, mut cy) = (0.0f32, 0.0f32);
        for contour in &contours {
            let Some(start) = contour.iter().position(|p| p.2) else {
                continue;
            };
            let n = contour.len();
            let (sx, sy) = (contour[start].0 as f32, contour[start].1 as f32);
            cs_number(&mut cs, sx - cx);
            cs_number(&mut cs, sy - cy);
            cs.u8(21); // rmoveto
            (cx, cy) = (sx, sy);
            let mut k = 1;
            while k <= n {
                let p = contour[(start + k) % n];
                let (px, py) = (p.0 as f32, p.1 as f32);
                if p.2 {
                    cs_number(&mut cs, px - cx);
                    cs_number(&mut cs, py - cy);
                    cs.u8(5); // rlineto
                    (cx, cy) = (px, py);
                    k += 1;
                    continue;
                }
                // Quadratic control: end at the next on-curve point or the implied midpoint
                let next = contour[(start + k + 1) % n];
                let (ex, ey, step) = if next.2 {
                    (next.0 as f32, next.1 as f32, 2)
                } else {
                    ((px + next.0 as f32) / 2.0, (py + next.1 as f32) / 2.0, 1)
                };
                let c1 = (cx + 2.0 / 3.0 * (px - cx), cy + 2.0 / 3.0 * (py - cy));
                let c2 = (ex + 2.0 / 3.0 * (px - ex), ey + 2.0 / 3.0 * (py - ey));
                for v in [c1.0 - cx, c1.1 - cy, c2.0 - c1.0, c2.1 - c1.1, ex - c2.0, ey - c2.1] {
                    cs_number(&mut cs, v);
                }
                cs.u8(8); // rrcurveto
                (cx, cy) = (ex, ey);
                k += step;
            }
        }
        cs.u8(14); // endchar
        cs.0
    }

    fn cff_table(&self) -> Vec<u8> {
        let charstrings: Vec<Vec<u8>> = (0..self.glyphs.len() as u16).map(|g| self.charstring(g)).collect();
        let name_index = cff_index(&[self.family.replace(' ', "").into_bytes()]);
        let empty_index = cff_index(&[]);

        // Top DICT uses fixed-width operands so its size is known up front
        let top_dict_len = 5 + 1 + 5 + 5 + 1;
        let top_index_len = 2 + 1 + 2 * 4 + top_dict_len;
        let charstrings_at = 4 + name_index.len() + top_index_len + empty_index.len() * 2;
        let charstrings_index = cff_index(&charstrings);
        let private_at = charstrings_at + charstrings_index.len();

        let mut top = Writer::default();
        cff_int5(&mut top, charstrings_at as i32);
        top.u8(17); // CharStrings
        cff_int5(&mut top, 0);
        cff_int5(&mut top, private_at as i32);
        top.u8(18); // Private (size 0)
        debug_assert_eq!(top.0.len(), top_dict_len);

        let mut w = Writer::default();
        w.bytes(&[1, 0, 4, 4]);
        w.bytes(&name_index);
        w.bytes(&cff_index(&[top.0]));
        w.bytes(&empty_index); // strings
        w.bytes(&empty_index); // global subrs
        w.bytes(&charstrings_index);
        w.0
    }

    fn kern_table(&self) -> Vec<u8> {
        let mut pairs = self.kern_pairs.clone();
        pairs.sort_by_key(|&(l, r, _)| (l, r));
        let mut w = Writer::default();
        w.u16(0);
        w.u16(1);
        w.u16(0);
        w.u16((14 + pairs.len() * 6) as u16);
        w.u16(0x0001); // horizontal, format 0
        w.u16(pairs.len() as u16);
        w.zeros(6);
        for (l, r, v) in pairs {
            w.u16(l);
            w.u16(r);
            w.i16(v);
        }
        w.0
    }

    fn gsub(&self) -> Vec<u8> {
        let mut features: Vec<([u8; 4], Vec<u8>, u16)> = Vec::new();
        if !self.ligatures.is_empty() {
            features.push((*b"liga", ligature_subtable(&self.ligatures), 4));
        }
        let mut tags: Vec<[u8; 4]> = Vec::new();
        for (tag, _, _) in &self.substitutions {
            if !tags.contains(tag) {
                tags.push(*tag);
            }
        }
        for tag in tags {
            let pairs: Vec<(u16, u16)> = self.substitutions.iter().filter(|s| s.0 == tag).map(|s| (s.1, s.2)).collect();
            features.push((tag, single_subtable(&pairs), 1));
        }
        layout_table(&features)
    }

    fn gpos(&self) -> Vec<u8> {
        let mut firsts: Vec<u16> = self.gpos_pairs.iter().map(|p| p.0).collect();
        firsts.sort();
        firsts.dedup();
        let mut w = Writer::default();
        w.u16(1);
        let coverage_at = w.placeholder();
        w.u16(0x0004); // x advance on the first glyph
        w.u16(0);
        w.u16(firsts.len() as u16);
        let set_slots: Vec<usize> = firsts.iter().map(|_| w.placeholder()).collect();
        for (slot, first) in set_slots.into_iter().zip(&firsts) {
            w.patch(slot);
            let mut set: Vec<_> = self.gpos_pairs.iter().filter(|p| p.0 == *first).collect();
            set.sort_by_key(|p| p.1);
            w.u16(set.len() as u16);
            for p in set {
                w.u16(p.1);
                w.i16(p.2);
            }
        }
        w.patch(coverage_at);
        w.bytes(&coverage(&firsts));
        layout_table(&[(*b"kern", w.0, 2)])
    }

    fn gdef(&self) -> Vec<u8> {
        let mut marks = self.marks.clone();
        marks.sort();
        marks.dedup();
        let mut w = Writer::default();
        w.u32(0x0001_0000);
        w.u16(12); // glyph class def
        w.u16(0);
        w.u16(0);
        w.u16(0);
        w.u16(2);
        w.u16(marks.len() as u16);
        for m in marks {
            w.u16(m);
            w.u16(m);
            w.u16(3);
        }
        w.0
    }

    fn os2(&self) -> Vec<u8> {
        let (typo_asc, typo_desc, typo_gap) = self.typo.unwrap_or((self.ascender, self.descender, self.line_gap));
        let mut fs_selection = if self.italic { 0x0001 } else { 0x0040 };
        if self.use_typo_metrics {
            fs_selection |= 0x0080;
        }
        let mut w = Writer::default();
        w.u16(4);
        w.i16(500);
        w.u16(self.weight);
        w.u16(5);
        w.zeros(54); // fsType .. achVendID
        w.u16(fs_selection);
        w.u16(0x20);
        w.u16(0xFFFF);
        w.i16(typo_asc);
        w.i16(typo_desc);
        w.i16(typo_gap);
        w.u16(self.ascender.max(0) as u16);
        w.u16(self.descender.unsigned_abs());
        w.zeros(8);
        w.i16(self.x_height);
        w.i16(self.cap_height);
        w.zeros(6);
        debug_assert_eq!(w.0.len(), 96);
        w.0
    }

    fn name(&self) -> Vec<u8> {
        let strings: Vec<(u16, Vec<u8>)> = [(1, &self.family), (2, &self.subfamily)]
            .into_iter()
            .map(|(id, s)| (id, s.encode_utf16().flat_map(u16::to_be_bytes).collect()))
            .collect();
        let mut w = Writer::default();
        w.u16(0);
        w.u16(strings.len() as u16);
        w.u16((6 + 12 * strings.len()) as u16);
        let mut offset = 0u16;
        for (id, bytes) in &strings {
            w.u16(3);
            w.u16(1);
            w.u16(0x0409);
            w.u16(*id);
            w.u16(bytes.len() as u16);
            w.u16(offset);
            offset += bytes.len() as u16;
        }
        for (_, bytes) in &strings {
            w.bytes(bytes);
        }
        w.0
    }

    fn post(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.u32(0x0003_0000);
        w.i32(if self.italic { -12 << 16 } else { 0 });
        w.i16(-100);
        w.i16(50);
        w.u32(0);
        w.zeros(16);
        w.0
    }
}

/// Big-endian byte writer
#[derive(Default)]
struct Writer(Vec<u8>);

impl Writer {
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }
    fn i16(&mut self, v: i16) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }
    fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }
    fn bytes(&mut self, v: &[u8]) {
        self.0.extend_from_slice(v);
    }
    fn zeros(&mut self, n: usize) {
        self.0.resize(self.0.len() + n, 0);
    }
    fn align(&mut self, n: usize) {
        while self.0.len() % n != 0 {
            self.0.push(0);
        }
    }
    /// Reserve an Offset16 to be patched later
    fn placeholder(&mut self) -> usize {
        self.u16(0);
        self.0.len() - 2
    }
    /// Point a placeholder at the current end
    fn patch(&mut self, at: usize) {
        let offset = self.0.len() as u16;
        self.0[at..at + 2].copy_from_slice(&offset.to_be_bytes());
    }
}

fn coverage(glyphs: &[u16]) -> Vec<u8> {
    let mut w = Writer::default();
    w.u16(1);
    w.u16(glyphs.len() as u16);
    for &g in glyphs {
        w.u16(g);
    }
    w.0
}

fn single_subtable(pairs: &[(u16, u16)]) -> Vec<u8> {
    let mut pairs = pairs.to_vec();
    pairs.sort();
    let mut w = Writer::default();
    w.u16(2);
    let coverage_at = w.placeholder();
    w.u16(pairs.len() as u16);
    for &(_, to) in &pairs {
        w.u16(to);
    }
    w.patch(coverage_at);
    w.bytes(&coverage(&pairs.iter().map(|p| p.0).collect::<Vec<_>>()));
    w.0
}

fn ligature_subtable(ligatures: &[(Vec<u16>, u16)]) -> Vec<u8> {
    let mut firsts: Vec<u16> = ligatures.iter().filter_map(|(c, _)| c.first().copied()).collect();
    firsts.sort();
    firsts.dedup();
    let mut w = Writer::default();
    w.u16(1);
    let coverage_at = w.placeholder();
    w.u16(firsts.len() as u16);
    let set_slots: Vec<usize> = firsts.iter().map(|_| w.placeholder()).collect();
    for (slot, first) in set_slots.into_iter().zip(&firsts) {
        w.patch(slot);
        let set_start = w.0.len();
        // Longest ligatures first
        let mut set: Vec<_> = ligatures.iter().filter(|(c, _)| c.first() == Some(first)).collect();
        set.sort_by_key(|(c, _)| std::cmp::Reverse(c.len()));
        w.u16(set.len() as u16);
        let lig_slots: Vec<usize> = set.iter().map(|_| w.placeholder()).collect();
        for (lig_slot, (components, glyph)) in lig_slots.into_iter().zip(set) {
            let offset = (w.0.len() - set_start) as u16;
            w.0[lig_slot..lig_slot + 2].copy_from_slice(&offset.to_be_bytes());
            w.u16(*glyph);
            w.u16(components.len() as u16);
            for &c in &components[1..] {
                w.u16(c);
            }
        }
    }
    w.patch(coverage_at);
    w.bytes(&coverage(&firsts));
    w.0
}

/// GSUB/GPOS with a DFLT script enabling one feature per lookup
fn layout_table(features: &[([u8; 4], Vec<u8>, u16)]) -> Vec<u8> {
    let n = features.len() as u16;
    let mut w = Writer::default();
    w.u32(0x0001_0000);
    let script_list = w.placeholder();
    let feature_list = w.placeholder();
    let lookup_list = w.placeholder();

    w.patch(script_list);
    w.u16(1);
    w.bytes(b"DFLT");
    w.u16(8); // script table right after the record
    w.u16(4); // default LangSys
    w.u16(0);
    w.u16(0);
    w.u16(0xFFFF);
    w.u16(n);
    for i in 0..n {
        w.u16(i);
    }

    w.patch(feature_list);
    let feature_list_start = w.0.len();
    w.u16(n);
    for (i, (tag, _, _)) in features.iter().enumerate() {
        w.bytes(tag);
        w.u16((2 + 6 * n as usize + 6 * i) as u16);
    }
    debug_assert_eq!(w.0.len() - feature_list_start, 2 + 6 * n as usize);
    for i in 0..n {
        w.u16(0);
        w.u16(1);
        w.u16(i);
    }

    w.patch(lookup_list);
    let lookup_list_start = w.0.len();
    w.u16(n);
    let slots: Vec<usize> = features.iter().map(|_| w.placeholder()).collect();
    for (slot, (_, subtable, lookup_type)) in slots.into_iter().zip(features) {
        let offset = (w.0.len() - lookup_list_start) as u16;
        w.0[slot..slot + 2].copy_from_slice(&offset.to_be_bytes());
        w.u16(*lookup_type);
        w.u16(0);
        w.u16(1);
        w.u16(8);
        w.bytes(subtable);
        w.align(2);
    }
    w.0
}

fn cff_index(items: &[Vec<u8>]) -> Vec<u8> {
    let mut w = Writer::default();
    w.u16(items.len() as u16);
    if items.is_empty() {
        return w.0;
    }
    w.u8(4);
    let mut offset = 1u32;
    w.u32(offset);
    for item in items {
        offset += item.len() as u32;
        w.u32(offset);
    }
    for item in items {
        w.bytes(item);
    }
    w.0
}

/// Five-byte DICT integer
fn cff_int5(w: &mut Writer, v: i32) {
    w.u8(29);
    w.i32(v);
}

/// Charstring operand: small ints compactly, everything else as 16.16
fn cs_number(w: &mut Writer, v: f32) {
    if v.fract() == 0.0 && (-107.0..=107.0).contains(&v) {
        w.u8((v as i32 + 139) as u8);
    } else if v.fract() == 0.0 && (-32768.0..=32767.0).contains(&v) {
        w.u8(28);
        w.i16(v as i16);
    } else {
        w.u8(255);
        w.i32((v * 65536.0).round() as i32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FontResource, GlyphId, OutlineFormat};

    #[test]
    fn test_builder_round_trips_through_parser() {
        let builder = TestFontBuilder::new().block_glyphs("AB ", 600);
        let font = FontResource::parse("test://ab", builder.build()).unwrap();
        assert_eq!(font.num_glyphs(), 4);
        let a = font.glyph_index('A').unwrap();
        assert_eq!(font.advance(a), 600);
        assert!(!font.glyph(a).path.is_degenerate());
        assert!(font.glyph(font.glyph_index(' ').unwrap()).path.is_empty());
        assert_eq!(font.names().family.as_deref(), Some("Test Sans"));
    }

    #[test]
    fn test_cff_builder_produces_same_bounds() {
        let tt = TestFontBuilder::new().block_glyphs("H", 600);
        let cff = tt.clone().cff(true);
        let tt_font = FontResource::parse("test://tt", tt.build()).unwrap();
        let cff_font = FontResource::parse("test://cff", cff.build()).unwrap();
        assert_eq!(cff_font.outline_format(), OutlineFormat::Cff);
        let g = GlyphId(1);
        assert_eq!(tt_font.glyph(g).path.bounds(), cff_font.glyph(g).path.bounds());
    }
}
