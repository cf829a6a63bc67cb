//! Compact Font Format (CFF) outlines
//!
//! Parses the INDEX/DICT structures of a `CFF ` table and runs Type 2
//! charstrings, emitting cubic outlines.

use std::collections::HashMap;

use crate::outline::OutlineBuilder;
use crate::reader::{tail, FontReader};
use crate::{FontError, Result};

const MAX_STACK: usize = 48;
const MAX_SUBR_DEPTH: u8 = 10;

mod dict_op {
    pub const PRIVATE: u16 = 18;
    pub const SUBRS: u16 = 19;
    pub const CHAR_STRINGS: u16 = 17;
    pub const ROS: u16 = 1230;
    pub const FD_ARRAY: u16 = 1236;
    pub const FD_SELECT: u16 = 1237;
}

/// An INDEX structure, stored as offsets into the CFF table
#[derive(Debug, Clone, Default)]
pub struct CffIndex {
    /// Position of the byte preceding object data (offsets are 1-based)
    base: usize,
    offsets: Vec<u32>,
}

impl CffIndex {
    /// Parse an INDEX at `pos`; returns it with the position after its data
    pub fn parse(cff: &[u8], pos: usize) -> Result<(Self, usize)> {
        let mut r = FontReader::at(cff, pos)?;
        let count = r.read_u16()? as usize;
        if count == 0 {
            return Ok((Self::default(), pos + 2));
        }
        let off_size = r.read_u8()?;
        let mut offsets = Vec::with_capacity(count + 1);
        for _ in 0..=count {
            offsets.push(r.read_offset(off_size)?);
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) || offsets[0] != 1 {
            return Err(FontError::Malformed("CFF INDEX offsets"));
        }
        let base = pos + r.pos() - 1;
        let end = base + offsets[count] as usize;
        if end > cff.len() {
            return Err(FontError::UnexpectedEof);
        }
        Ok((Self { base, offsets }, end))
    }

    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get<'a>(&self, cff: &'a [u8], index: usize) -> Option<&'a [u8]> {
        let start = *self.offsets.get(index)? as usize;
        let end = *self.offsets.get(index + 1)? as usize;
        cff.get(self.base + start..self.base + end)
    }
}

/// Parsed DICT: operator -> operands
#[derive(Debug, Clone, Default)]
pub struct Dict(HashMap<u16, Vec<f64>>);

impl Dict {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = FontReader::new(data);
        let mut operands = Vec::new();
        let mut entries = HashMap::new();
        while r.remaining() > 0 {
            let b0 = r.read_u8()?;
            match b0 {
                0..=11 | 13..=21 => {
                    entries.insert(b0 as u16, std::mem::take(&mut operands));
                }
                12 => {
                    let b1 = r.read_u8()?;
                    entries.insert(1200 + b1 as u16, std::mem::take(&mut operands));
                }
                28 => operands.push(r.read_i16()? as f64),
                29 => operands.push(r.read_i32()? as f64),
                30 => operands.push(read_real(&mut r)?),
                32..=246 => operands.push(b0 as f64 - 139.0),
                247..=250 => operands.push(((b0 as f64 - 247.0) * 256.0) + r.read_u8()? as f64 + 108.0),
                251..=254 => operands.push(-((b0 as f64 - 251.0) * 256.0) - r.read_u8()? as f64 - 108.0),
                _ => return Err(FontError::Malformed("CFF DICT operand")),
            }
        }
        Ok(Self(entries))
    }

    pub fn get(&self, op: u16) -> Option<&[f64]> {
        self.0.get(&op).map(Vec::as_slice)
    }

    fn offset(&self, op: u16) -> Option<usize> {
        self.get(op)?.first().map(|&v| v as usize)
    }

    /// (size, offset) of the Private DICT
    fn private(&self) -> Option<(usize, usize)> {
        match self.get(dict_op::PRIVATE)? {
            [size, offset] => Some((*size as usize, *offset as usize)),
            _ => None,
        }
    }
}

/// Real number operand: packed BCD nibbles
fn read_real(r: &mut FontReader) -> Result<f64> {
    let mut text = String::new();
    'outer: loop {
        let byte = r.read_u8()?;
        for nibble in [byte >> 4, byte & 0x0F] {
            match nibble {
                0..=9 => text.push((b'0' + nibble) as char),
                0xA => text.push('.'),
                0xB => text.push('E'),
                0xC => text.push_str("E-"),
                0xE => text.push('-'),
                0xF => break 'outer,
                _ => return Err(FontError::Malformed("CFF real")),
            }
        }
    }
    text.parse().map_err(|_| FontError::Malformed("CFF real"))
}

/// Glyph -> font DICT mapping of CID-keyed fonts
#[derive(Debug, Clone)]
enum FdSelect {
    Format0(Vec<u8>),
    /// (first glyph, fd) ranges plus sentinel
    Format3(Vec<(u16, u8)>, u16),
}

impl FdSelect {
    fn parse(cff: &[u8], pos: usize, num_glyphs: usize) -> Result<Self> {
        let mut r = FontReader::at(cff, pos)?;
        match r.read_u8()? {
            0 => Ok(Self::Format0(r.read_bytes(num_glyphs)?.to_vec())),
            3 => {
                let count = r.read_u16()?;
                let mut ranges = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    ranges.push((r.read_u16()?, r.read_u8()?));
                }
                Ok(Self::Format3(ranges, r.read_u16()?))
            }
            format => Err(FontError::UnsupportedFormat { table: "CFF FDSelect", format: format as u16 }),
        }
    }

    fn font_dict(&self, glyph_id: u16) -> usize {
        match self {
            Self::Format0(fds) => fds.get(glyph_id as usize).copied().unwrap_or(0) as usize,
            Self::Format3(ranges, sentinel) => {
                if glyph_id >= *sentinel {
                    return 0;
                }
                let i = ranges.partition_point(|&(first, _)| first <= glyph_id);
                i.checked_sub(1).map_or(0, |i| ranges[i].1 as usize)
            }
        }
    }
}

/// Outline program of one glyph, borrowed from the font data
#[derive(Debug, Clone, Copy)]
pub struct Charstring<'a> {
    pub code: &'a [u8],
    pub font_dict: usize,
}

/// Parsed CFF table (offsets only; the bytes stay in the font buffer)
#[derive(Debug, Clone)]
pub struct CffTable {
    char_strings: CffIndex,
    global_subrs: CffIndex,
    /// Local subrs per font DICT; one entry for non-CID fonts
    local_subrs: Vec<CffIndex>,
    fd_select: Option<FdSelect>,
}

impl CffTable {
    pub fn parse(cff: &[u8]) -> Result<Self> {
        let mut r = FontReader::new(cff);
        let major = r.read_u8()?;
        let _minor = r.read_u8()?;
        let header_size = r.read_u8()? as usize;
        if major != 1 {
            return Err(FontError::UnsupportedFormat { table: "CFF", format: major as u16 });
        }

        let (_names, pos) = CffIndex::parse(cff, header_size)?;
        let (top_dicts, pos) = CffIndex::parse(cff, pos)?;
        let (_strings, pos) = CffIndex::parse(cff, pos)?;
        let (global_subrs, _) = CffIndex::parse(cff, pos)?;

        let top = Dict::parse(top_dicts.get(cff, 0).ok_or(FontError::Malformed("CFF top DICT"))?)?;
        let char_strings_at = top.offset(dict_op::CHAR_STRINGS).ok_or(FontError::TableNotFound("CFF CharStrings"))?;
        let (char_strings, _) = CffIndex::parse(cff, char_strings_at)?;

        let (local_subrs, fd_select) = if top.get(dict_op::ROS).is_some() {
            let fd_array_at = top.offset(dict_op::FD_ARRAY).ok_or(FontError::Malformed("CID font without FDArray"))?;
            let fd_select_at = top.offset(dict_op::FD_SELECT).ok_or(FontError::Malformed("CID font without FDSelect"))?;
            let (fd_array, _) = CffIndex::parse(cff, fd_array_at)?;
            let mut subrs = Vec::with_capacity(fd_array.len());
            for i in 0..fd_array.len() {
                let font_dict = Dict::parse(fd_array.get(cff, i).ok_or(FontError::UnexpectedEof)?)?;
                subrs.push(private_subrs(cff, &font_dict)?);
            }
            (subrs, Some(FdSelect::parse(cff, fd_select_at, char_strings.len())?))
        } else {
            (vec![private_subrs(cff, &top)?], None)
        };

        Ok(Self { char_strings, global_subrs, local_subrs, fd_select })
    }

    pub fn glyph_count(&self) -> usize {
        self.char_strings.len()
    }

    pub fn is_cid(&self) -> bool {
        self.fd_select.is_some()
    }

    /// The charstring program for a glyph
    pub fn charstring<'a>(&self, cff: &'a [u8], glyph_id: u16) -> Result<Charstring<'a>> {
        let code = self.char_strings.get(cff, glyph_id as usize).ok_or(FontError::Malformed("glyph id beyond CharStrings"))?;
        let font_dict = self.fd_select.as_ref().map_or(0, |fds| fds.font_dict(glyph_id));
        Ok(Charstring { code, font_dict })
    }

    /// Execute a charstring, emitting its outline
    pub fn outline(&self, cff: &[u8], charstring: Charstring, builder: &mut dyn OutlineBuilder) -> Result<()> {
        let empty = CffIndex::default();
        let local = self.local_subrs.get(charstring.font_dict).unwrap_or(&empty);
        let mut vm = CharstringVm {
            cff,
            global_subrs: &self.global_subrs,
            local_subrs: local,
            builder,
            stack: Vec::with_capacity(MAX_STACK),
            x: 0.0,
            y: 0.0,
            stems: 0,
            width_seen: false,
            path_open: false,
            transient: [0.0; 32],
        };
        vm.run(charstring.code, 0)?;
        vm.close_path();
        Ok(())
    }
}

fn private_subrs(cff: &[u8], dict: &Dict) -> Result<CffIndex> {
    let Some((size, offset)) = dict.private() else {
        return Ok(CffIndex::default());
    };
    let private = tail(cff, offset)?.get(..size).ok_or(FontError::UnexpectedEof)?;
    let private = Dict::parse(private)?;
    match private.offset(dict_op::SUBRS) {
        // Subrs offset is relative to the Private DICT
        Some(subrs) => Ok(CffIndex::parse(cff, offset + subrs)?.0),
        None => Ok(CffIndex::default()),
    }
}

/// Subroutine index bias
fn subr_bias(count: usize) -> i32 {
    if count < 1240 {
        107
    } else if count < 33900 {
        1131
    } else {
        32768
    }
}

/// Type 2 charstring interpreter
struct CharstringVm<'a, 'b> {
    cff: &'a [u8],
    global_subrs: &'a CffIndex,
    local_subrs: &'a CffIndex,
    builder: &'b mut dyn OutlineBuilder,
    stack: Vec<f32>,
    x: f32,
    y: f32,
    stems: usize,
    width_seen: bool,
    path_open: bool,
    transient: [f32; 32],
}

enum Flow {
    Continue,
    Return,
    End,
}

impl CharstringVm<'_, '_> {
    fn push(&mut self, v: f32) -> Result<()> {
        if self.stack.len() >= MAX_STACK {
            return Err(FontError::Malformed("charstring stack overflow"));
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<f32> {
        self.stack.pop().ok_or(FontError::Malformed("charstring stack underflow"))
    }

    /// Drop the leading advance-width operand on the first stack-clearing op
    fn take_width(&mut self, has_width: bool) {
        if !self.width_seen {
            self.width_seen = true;
            if has_width && !self.stack.is_empty() {
                self.stack.remove(0);
            }
        }
    }

    fn count_stems(&mut self) {
        let odd = self.stack.len() % 2 == 1;
        self.take_width(odd);
        self.stems += self.stack.len() / 2;
        self.stack.clear();
    }

    fn close_path(&mut self) {
        if self.path_open {
            self.builder.close();
            self.path_open = false;
        }
    }

    fn move_to(&mut self, dx: f32, dy: f32) {
        self.close_path();
        self.x += dx;
        self.y += dy;
        self.builder.move_to(self.x, self.y);
        self.path_open = true;
    }

    fn line_to(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
        self.builder.line_to(self.x, self.y);
    }

    fn curve_to(&mut self, d: [f32; 6]) {
        let (x1, y1) = (self.x + d[0], self.y + d[1]);
        let (x2, y2) = (x1 + d[2], y1 + d[3]);
        self.x = x2 + d[4];
        self.y = y2 + d[5];
        self.builder.curve_to(x1, y1, x2, y2, self.x, self.y);
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.stack.len() < n {
            return Err(FontError::Malformed("charstring operand count"));
        }
        Ok(())
    }

    fn call_subr(&mut self, global: bool, depth: u8) -> Result<Flow> {
        if depth >= MAX_SUBR_DEPTH {
            return Err(FontError::Malformed("charstring subroutine nesting"));
        }
        let subrs = if global { self.global_subrs } else { self.local_subrs };
        let index = self.pop()? as i32 + subr_bias(subrs.len());
        let code = usize::try_from(index)
            .ok()
            .and_then(|i| subrs.get(self.cff, i))
            .ok_or(FontError::Malformed("charstring subroutine index"))?;
        match self.run(code, depth + 1)? {
            Flow::End => Ok(Flow::End),
            _ => Ok(Flow::Continue),
        }
    }

    fn run(&mut self, code: &[u8], depth: u8) -> Result<Flow> {
        let mut r = FontReader::new(code);
        while r.remaining() > 0 {
            let b0 = r.read_u8()?;
            match b0 {
                // Operands
                28 => self.push(r.read_i16()? as f32)?,
                32..=246 => self.push(b0 as f32 - 139.0)?,
                247..=250 => {
                    let v = (b0 as f32 - 247.0) * 256.0 + r.read_u8()? as f32 + 108.0;
                    self.push(v)?;
                }
                251..=254 => {
                    let v = -(b0 as f32 - 251.0) * 256.0 - r.read_u8()? as f32 - 108.0;
                    self.push(v)?;
                }
                255 => self.push(r.read_fixed()?)?,

                // Hints
                1 | 3 | 18 | 23 => self.count_stems(),
                19 | 20 => {
                    // hintmask / cntrmask: pending operands are implicit vstems
                    self.count_stems();
                    r.skip(self.stems.div_ceil(8))?;
                }

                // Path construction
                21 => {
                    self.take_width(self.stack.len() > 2);
                    self.require(2)?;
                    let (dx, dy) = (self.stack[0], self.stack[1]);
                    self.move_to(dx, dy);
                    self.stack.clear();
                }
                22 => {
                    self.take_width(self.stack.len() > 1);
                    self.require(1)?;
                    let dx = self.stack[0];
                    self.move_to(dx, 0.0);
                    self.stack.clear();
                }
                4 => {
                    self.take_width(self.stack.len() > 1);
                    self.require(1)?;
                    let dy = self.stack[0];
                    self.move_to(0.0, dy);
                    self.stack.clear();
                }
                5 => {
                    let args = std::mem::take(&mut self.stack);
                    for pair in args.chunks_exact(2) {
                        self.line_to(pair[0], pair[1]);
                    }
                }
                6 | 7 => {
                    let args = std::mem::take(&mut self.stack);
                    let mut horizontal = b0 == 6;
                    for &d in &args {
                        if horizontal {
                            self.line_to(d, 0.0);
                        } else {
                            self.line_to(0.0, d);
                        }
                        horizontal = !horizontal;
                    }
                }
                8 => {
                    let args = std::mem::take(&mut self.stack);
                    for c in args.chunks_exact(6) {
                        self.curve_to([c[0], c[1], c[2], c[3], c[4], c[5]]);
                    }
                }
                24 => {
                    // rcurveline
                    let args = std::mem::take(&mut self.stack);
                    if args.len() < 8 {
                        return Err(FontError::Malformed("rcurveline operands"));
                    }
                    let (curves, line) = args.split_at(args.len() - 2);
                    for c in curves.chunks_exact(6) {
                        self.curve_to([c[0], c[1], c[2], c[3], c[4], c[5]]);
                    }
                    self.line_to(line[0], line[1]);
                }
                25 => {
                    // rlinecurve
                    let args = std::mem::take(&mut self.stack);
                    if args.len() < 8 {
                        return Err(FontError::Malformed("rlinecurve operands"));
                    }
                    let (lines, c) = args.split_at(args.len() - 6);
                    for pair in lines.chunks_exact(2) {
                        self.line_to(pair[0], pair[1]);
                    }
                    self.curve_to([c[0], c[1], c[2], c[3], c[4], c[5]]);
                }
                26 => {
                    // vvcurveto
                    let mut args = std::mem::take(&mut self.stack);
                    let mut dx1 = 0.0;
                    if args.len() % 2 == 1 {
                        dx1 = args.remove(0);
                    }
                    for c in args.chunks_exact(4) {
                        self.curve_to([dx1, c[0], c[1], c[2], 0.0, c[3]]);
                        dx1 = 0.0;
                    }
                }
                27 => {
                    // hhcurveto
                    let mut args = std::mem::take(&mut self.stack);
                    let mut dy1 = 0.0;
                    if args.len() % 2 == 1 {
                        dy1 = args.remove(0);
                    }
                    for c in args.chunks_exact(4) {
                        self.curve_to([c[0], dy1, c[1], c[2], c[3], 0.0]);
                        dy1 = 0.0;
                    }
                }
                30 | 31 => {
                    // vhcurveto / hvcurveto
                    let args = std::mem::take(&mut self.stack);
                    let mut horizontal = b0 == 31;
                    let mut i = 0;
                    while i + 4 <= args.len() {
                        let last = if args.len() - (i + 4) == 1 { args[i + 4] } else { 0.0 };
                        let c = &args[i..i + 4];
                        if horizontal {
                            self.curve_to([c[0], 0.0, c[1], c[2], last, c[3]]);
                        } else {
                            self.curve_to([0.0, c[0], c[1], c[2], c[3], last]);
                        }
                        horizontal = !horizontal;
                        i += 4;
                    }
                }

                // Subroutines
                10 => {
                    if let Flow::End = self.call_subr(false, depth)? {
                        return Ok(Flow::End);
                    }
                }
                29 => {
                    if let Flow::End = self.call_subr(true, depth)? {
                        return Ok(Flow::End);
                    }
                }
                11 => return Ok(Flow::Return),
                14 => {
                    // endchar; a trailing seac accent (4 operands) is ignored
                    let has_width = self.stack.len() == 1 || self.stack.len() == 5;
                    self.take_width(has_width);
                    self.stack.clear();
                    self.close_path();
                    return Ok(Flow::End);
                }

                12 => self.escape(r.read_u8()?)?,
                _ => return Err(FontError::Malformed("reserved charstring operator")),
            }
        }
        Ok(Flow::Continue)
    }

    fn escape(&mut self, op: u8) -> Result<()> {
        match op {
            // flex family
            34 => {
                self.require(7)?;
                let a = std::mem::take(&mut self.stack);
                let y0 = self.y;
                self.curve_to([a[0], 0.0, a[1], a[2], a[3], 0.0]);
                let dy = y0 - self.y;
                self.curve_to([a[4], 0.0, a[5], dy, a[6], 0.0]);
            }
            35 => {
                self.require(13)?;
                let a = std::mem::take(&mut self.stack);
                self.curve_to([a[0], a[1], a[2], a[3], a[4], a[5]]);
                self.curve_to([a[6], a[7], a[8], a[9], a[10], a[11]]);
            }
            36 => {
                self.require(9)?;
                let a = std::mem::take(&mut self.stack);
                self.curve_to([a[0], a[1], a[2], a[3], a[4], 0.0]);
                // Returns to the starting height
                let dy6 = -(a[1] + a[3] + a[7]);
                self.curve_to([a[5], 0.0, a[6], a[7], a[8], dy6]);
            }
            37 => {
                self.require(11)?;
                let a = std::mem::take(&mut self.stack);
                let (x0, y0) = (self.x, self.y);
                let dx: f32 = a[0] + a[2] + a[4] + a[6] + a[8];
                let dy: f32 = a[1] + a[3] + a[5] + a[7] + a[9];
                self.curve_to([a[0], a[1], a[2], a[3], a[4], a[5]]);
                let (x1, y1) = (self.x + a[6], self.y + a[7]);
                let (x2, y2) = (x1 + a[8], y1 + a[9]);
                let (ex, ey) = if dx.abs() > dy.abs() { (x0 + dx + a[10], y0) } else { (x0, y0 + dy + a[10]) };
                self.builder.curve_to(x1, y1, x2, y2, ex, ey);
                self.x = ex;
                self.y = ey;
            }

            // Arithmetic and storage
            3 | 4 => {
                let b = self.pop()?;
                let a = self.pop()?;
                let v = if op == 3 { a != 0.0 && b != 0.0 } else { a != 0.0 || b != 0.0 };
                self.push(if v { 1.0 } else { 0.0 })?;
            }
            5 => {
                let a = self.pop()?;
                self.push(if a == 0.0 { 1.0 } else { 0.0 })?;
            }
            9 => {
                let a = self.pop()?;
                self.push(a.abs())?;
            }
            10 | 11 | 12 | 24 => {
                let b = self.pop()?;
                let a = self.pop()?;
                let v = match op {
                    10 => a + b,
                    11 => a - b,
                    12 if b != 0.0 => a / b,
                    12 => 0.0,
                    _ => a * b,
                };
                self.push(v)?;
            }
            14 => {
                let a = self.pop()?;
                self.push(-a)?;
            }
            15 => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(if a == b { 1.0 } else { 0.0 })?;
            }
            18 => {
                self.pop()?;
            }
            20 => {
                let i = self.pop()? as usize;
                let v = self.pop()?;
                if let Some(slot) = self.transient.get_mut(i) {
                    *slot = v;
                }
            }
            21 => {
                let i = self.pop()? as usize;
                let v = self.transient.get(i).copied().unwrap_or(0.0);
                self.push(v)?;
            }
            22 => {
                let v2 = self.pop()?;
                let v1 = self.pop()?;
                let s2 = self.pop()?;
                let s1 = self.pop()?;
                self.push(if v1 <= v2 { s1 } else { s2 })?;
            }
            26 => {
                let a = self.pop()?;
                self.push(a.max(0.0).sqrt())?;
            }
            27 => {
                let a = self.pop()?;
                self.push(a)?;
                self.push(a)?;
            }
            28 => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b)?;
                self.push(a)?;
            }
            29 => {
                let i = self.pop()?;
                let len = self.stack.len();
                let idx = if i < 0.0 { 0 } else { i as usize };
                let v = len
                    .checked_sub(idx + 1)
                    .map(|at| self.stack[at])
                    .ok_or(FontError::Malformed("charstring index operator"))?;
                self.push(v)?;
            }
            30 => {
                let j = self.pop()? as i32;
                let n = self.pop()? as usize;
                let len = self.stack.len();
                if n > len {
                    return Err(FontError::Malformed("charstring roll operator"));
                }
                if n > 0 {
                    let shift = j.rem_euclid(n as i32) as usize;
                    self.stack[len - n..].rotate_right(shift);
                }
            }
            // dotsection and other deprecated hints
            0 => self.stack.clear(),
            _ => return Err(FontError::UnsupportedFormat { table: "charstring escape", format: op as u16 }),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::{GlyphPath, PathCommand};

    /// Encode an integer operand in charstring form
    fn num(v: i32) -> Vec<u8> {
        match v {
            -107..=107 => vec![(v + 139) as u8],
            108..=1131 => {
                let v = v - 108;
                vec![(v / 256 + 247) as u8, (v % 256) as u8]
            }
            -1131..=-108 => {
                let v = -v - 108;
                vec![(v / 256 + 251) as u8, (v % 256) as u8]
            }
            _ => {
                let b = (v as i16).to_be_bytes();
                vec![28, b[0], b[1]]
            }
        }
    }

    fn program(parts: &[&[i32]], ops: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for (args, op) in parts.iter().zip(ops) {
            for &a in *args {
                out.extend(num(a));
            }
            out.push(*op);
        }
        out
    }

    fn run(code: &[u8]) -> Result<GlyphPath> {
        let table = CffTable {
            char_strings: CffIndex::default(),
            global_subrs: CffIndex::default(),
            local_subrs: vec![CffIndex::default()],
            fd_select: None,
        };
        let mut path = GlyphPath::new();
        table.outline(&[], Charstring { code, font_dict: 0 }, &mut path)?;
        Ok(path)
    }

    #[test]
    fn test_width_and_box() {
        // width 500, rmoveto 100 0, hlineto 300 700 -300, endchar
        let code = program(&[&[500, 100, 0], &[300, 700, -300], &[]], &[21, 6, 14]);
        let path = run(&code).unwrap();
        assert_eq!(
            path.commands,
            vec![
                PathCommand::MoveTo(100.0, 0.0),
                PathCommand::LineTo(400.0, 0.0),
                PathCommand::LineTo(400.0, 700.0),
                PathCommand::LineTo(100.0, 700.0),
                PathCommand::Close,
            ]
        );
    }

    #[test]
    fn test_hintmask_skips_mask_bytes() {
        // hstemhm with 2 stems, hintmask with 1 implicit vstem -> 3 stems, 1 mask byte
        let mut code = program(&[&[0, 10, 20, 10], &[50, 20]], &[18, 19]);
        code.push(0xFF); // mask byte that would otherwise be read as an operand
        code.extend(program(&[&[0, 0], &[10, 10], &[]], &[21, 5, 14]));
        let path = run(&code).unwrap();
        assert_eq!(path.commands[1], PathCommand::LineTo(10.0, 10.0));
    }

    #[test]
    fn test_curves() {
        // rmoveto 0 0; hvcurveto 10 10 10 10 5 (final extra)
        let code = program(&[&[0, 0], &[10, 10, 10, 10, 5], &[]], &[21, 31, 14]);
        let path = run(&code).unwrap();
        assert_eq!(path.commands[1], PathCommand::CurveTo(10.0, 0.0, 20.0, 10.0, 25.0, 20.0));
    }

    #[test]
    fn test_large_operands() {
        let code = program(&[&[-1000, 2000], &[]], &[21, 14]);
        let path = run(&code).unwrap();
        assert_eq!(path.commands[0], PathCommand::MoveTo(-1000.0, 2000.0));
    }

    #[test]
    fn test_subr_bias() {
        assert_eq!(subr_bias(0), 107);
        assert_eq!(subr_bias(1239), 107);
        assert_eq!(subr_bias(1240), 1131);
        assert_eq!(subr_bias(33900), 32768);
    }

    #[test]
    fn test_dict_operands() {
        // 1000 (two bytes), -5, real 0.001 (nibbles 0 a 0 0 1 f), operator 17
        let data = [0xFA, 0x7C, 0x86, 0x1E, 0x0A, 0x00, 0x1F, 17];
        let dict = Dict::parse(&data).unwrap();
        let ops = dict.get(17).unwrap();
        assert_eq!(ops[0], 1000.0);
        assert_eq!(ops[1], -5.0);
        assert!((ops[2] - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_fd_select_format3() {
        let fds = FdSelect::Format3(vec![(0, 2), (10, 1)], 20);
        assert_eq!(fds.font_dict(0), 2);
        assert_eq!(fds.font_dict(9), 2);
        assert_eq!(fds.font_dict(10), 1);
        assert_eq!(fds.font_dict(25), 0);
    }

    #[test]
    fn test_stack_underflow_is_error() {
        assert!(run(&[21]).is_err());
    }
}
