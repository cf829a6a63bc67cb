//! Glyph outline parsing (glyf/loca tables)

use crate::outline::{OutlineBuilder, OutlineSource, Transform, TransformBuilder};
use crate::reader::FontReader;
use crate::{FontError, Result};

/// Composite nesting deeper than this is treated as a cycle
const MAX_COMPONENT_DEPTH: u8 = 8;

const ON_CURVE: u8 = 0x01;
const X_SHORT: u8 = 0x02;
const Y_SHORT: u8 = 0x04;
const REPEAT: u8 = 0x08;
const X_SAME_OR_POSITIVE: u8 = 0x10;
const Y_SAME_OR_POSITIVE: u8 = 0x20;

const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const ARGS_ARE_XY_VALUES: u16 = 0x0002;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;
const SCALED_COMPONENT_OFFSET: u16 = 0x0800;

/// Contour point in font units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub on_curve: bool,
}

/// Decoded simple glyph: one point list per contour
#[derive(Debug, Clone, Default)]
pub struct SimpleGlyph {
    pub contours: Vec<Vec<Point>>,
}

/// How a component is positioned relative to its parent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentAnchor {
    /// Offset already folded into the transform
    Offset,
    /// Align parent point `parent` with child point `child`
    Points { parent: u16, child: u16 },
}

/// One reference inside a composite glyph
#[derive(Debug, Clone, Copy)]
pub struct Component {
    pub glyph_id: u16,
    pub transform: Transform,
    pub anchor: ComponentAnchor,
}

/// View over the glyf and loca tables
#[derive(Clone, Copy)]
pub struct GlyfTable<'a> {
    glyf: &'a [u8],
    loca: &'a [u8],
    long_offsets: bool,
}

impl<'a> GlyfTable<'a> {
    pub fn new(glyf: &'a [u8], loca: &'a [u8], index_to_loc_format: i16) -> Self {
        Self { glyf, loca, long_offsets: index_to_loc_format != 0 }
    }

    /// Number of glyphs the loca table can address
    pub fn glyph_count(&self) -> usize {
        let entry = if self.long_offsets { 4 } else { 2 };
        (self.loca.len() / entry).saturating_sub(1)
    }

    fn offset(&self, glyph_id: u16) -> Result<usize> {
        let mut reader = FontReader::new(self.loca);
        if self.long_offsets {
            reader.skip(glyph_id as usize * 4)?;
            Ok(reader.read_u32()? as usize)
        } else {
            // Short format stores offset / 2
            reader.skip(glyph_id as usize * 2)?;
            Ok(reader.read_u16()? as usize * 2)
        }
    }

    /// Raw glyph record; empty for glyphs without outlines
    fn glyph_data(&self, glyph_id: u16) -> Result<&'a [u8]> {
        let start = self.offset(glyph_id)?;
        let end = self.offset(glyph_id.checked_add(1).ok_or(FontError::Malformed("loca"))?)?;
        if end < start {
            return Err(FontError::Malformed("loca offsets decrease"));
        }
        self.glyf.get(start..end).ok_or(FontError::UnexpectedEof)
    }

    /// Decode a glyph into its tagged outline source
    pub fn source(&self, glyph_id: u16) -> Result<OutlineSource<'a>> {
        let data = self.glyph_data(glyph_id)?;
        if data.is_empty() {
            return Ok(OutlineSource::Empty);
        }
        let mut reader = FontReader::new(data);
        let num_contours = reader.read_i16()?;
        reader.skip(8)?; // bbox, recomputed from points

        if num_contours >= 0 {
            parse_simple(&mut reader, num_contours as u16).map(OutlineSource::Simple)
        } else {
            parse_components(&mut reader).map(OutlineSource::Composite)
        }
    }

    /// Emit a glyph's outline, resolving components recursively
    pub fn outline(&self, glyph_id: u16, builder: &mut dyn OutlineBuilder) -> Result<()> {
        match self.source(glyph_id)? {
            OutlineSource::Simple(glyph) => {
                glyph.emit(builder);
                Ok(())
            }
            OutlineSource::Composite(components) => self.emit_components(&components, builder, 0),
            _ => Ok(()),
        }
    }

    /// Emit the components of a composite glyph
    pub fn emit_components(&self, components: &[Component], builder: &mut dyn OutlineBuilder, depth: u8) -> Result<()> {
        if depth >= MAX_COMPONENT_DEPTH {
            return Err(FontError::Malformed("composite glyph nesting too deep"));
        }
        let mut placed: Vec<Point> = Vec::new();
        for component in components {
            let child_points = self.points(component.glyph_id, depth + 1)?;
            let transform = place(component, &mut placed, &child_points)?;

            let mut transformed = TransformBuilder { inner: &mut *builder, transform };
            match self.source(component.glyph_id)? {
                OutlineSource::Simple(glyph) => glyph.emit(&mut transformed),
                OutlineSource::Composite(nested) => self.emit_components(&nested, &mut transformed, depth + 1)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// All points of a glyph after component placement, in point-number order
    fn points(&self, glyph_id: u16, depth: u8) -> Result<Vec<Point>> {
        if depth >= MAX_COMPONENT_DEPTH {
            return Err(FontError::Malformed("composite glyph nesting too deep"));
        }
        match self.source(glyph_id)? {
            OutlineSource::Simple(glyph) => Ok(glyph.contours.into_iter().flatten().collect()),
            OutlineSource::Composite(components) => {
                let mut placed: Vec<Point> = Vec::new();
                for component in &components {
                    let child = self.points(component.glyph_id, depth + 1)?;
                    place(component, &mut placed, &child)?;
                }
                Ok(placed)
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// Final transform of a component; appends its transformed points to `placed`
fn place(component: &Component, placed: &mut Vec<Point>, child: &[Point]) -> Result<Transform> {
    let mut transform = component.transform;
    if let ComponentAnchor::Points { parent, child: child_point } = component.anchor {
        let p = placed.get(parent as usize).ok_or(FontError::Malformed("component parent point"))?;
        let c = child.get(child_point as usize).ok_or(FontError::Malformed("component child point"))?;
        let (cx, cy) = transform.apply(c.x, c.y);
        transform.e += p.x - cx;
        transform.f += p.y - cy;
    }
    placed.extend(child.iter().map(|pt| {
        let (x, y) = transform.apply(pt.x, pt.y);
        Point { x, y, on_curve: pt.on_curve }
    }));
    Ok(transform)
}

fn parse_simple(reader: &mut FontReader, num_contours: u16) -> Result<SimpleGlyph> {
    if num_contours == 0 {
        return Ok(SimpleGlyph::default());
    }
    let end_points = reader.read_u16_array(num_contours as usize)?;
    let num_points = end_points.last().map_or(0, |&e| e as usize + 1);
    if end_points.windows(2).any(|w| w[1] < w[0]) {
        return Err(FontError::Malformed("glyf contour end points"));
    }

    let instruction_length = reader.read_u16()? as usize;
    reader.skip(instruction_length)?;

    let mut flags = Vec::with_capacity(num_points);
    while flags.len() < num_points {
        let flag = reader.read_u8()?;
        flags.push(flag);
        if flag & REPEAT != 0 {
            let repeat_count = reader.read_u8()? as usize;
            for _ in 0..repeat_count {
                flags.push(flag);
            }
        }
    }
    flags.truncate(num_points);

    let xs = read_coords(reader, &flags, X_SHORT, X_SAME_OR_POSITIVE)?;
    let ys = read_coords(reader, &flags, Y_SHORT, Y_SAME_OR_POSITIVE)?;

    let mut contours = Vec::with_capacity(end_points.len());
    let mut start = 0usize;
    for &end in &end_points {
        let end = end as usize;
        contours.push(
            (start..=end)
                .map(|i| Point { x: xs[i] as f32, y: ys[i] as f32, on_curve: flags[i] & ON_CURVE != 0 })
                .collect(),
        );
        start = end + 1;
    }
    Ok(SimpleGlyph { contours })
}

fn read_coords(reader: &mut FontReader, flags: &[u8], short: u8, same_or_positive: u8) -> Result<Vec<i32>> {
    let mut coords = Vec::with_capacity(flags.len());
    let mut value = 0i32;
    for &flag in flags {
        if flag & short != 0 {
            let delta = reader.read_u8()? as i32;
            value += if flag & same_or_positive != 0 { delta } else { -delta };
        } else if flag & same_or_positive == 0 {
            value += reader.read_i16()? as i32;
        }
        coords.push(value);
    }
    Ok(coords)
}

fn parse_components(reader: &mut FontReader) -> Result<Vec<Component>> {
    let mut components = Vec::new();
    loop {
        let flags = reader.read_u16()?;
        let glyph_id = reader.read_u16()?;

        let (arg1, arg2) = if flags & ARG_1_AND_2_ARE_WORDS != 0 {
            if flags & ARGS_ARE_XY_VALUES != 0 {
                (reader.read_i16()? as i32, reader.read_i16()? as i32)
            } else {
                (reader.read_u16()? as i32, reader.read_u16()? as i32)
            }
        } else if flags & ARGS_ARE_XY_VALUES != 0 {
            (reader.read_i8()? as i32, reader.read_i8()? as i32)
        } else {
            (reader.read_u8()? as i32, reader.read_u8()? as i32)
        };

        let mut transform = Transform::IDENTITY;
        if flags & WE_HAVE_A_SCALE != 0 {
            let scale = reader.read_f2dot14()?;
            transform.a = scale;
            transform.d = scale;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            transform.a = reader.read_f2dot14()?;
            transform.d = reader.read_f2dot14()?;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            transform.a = reader.read_f2dot14()?;
            transform.b = reader.read_f2dot14()?;
            transform.c = reader.read_f2dot14()?;
            transform.d = reader.read_f2dot14()?;
        }

        let anchor = if flags & ARGS_ARE_XY_VALUES != 0 {
            let (dx, dy) = (arg1 as f32, arg2 as f32);
            if flags & SCALED_COMPONENT_OFFSET != 0 {
                let linear = Transform { e: 0.0, f: 0.0, ..transform };
                (transform.e, transform.f) = linear.apply(dx, dy);
            } else {
                transform.e = dx;
                transform.f = dy;
            }
            ComponentAnchor::Offset
        } else {
            ComponentAnchor::Points { parent: arg1 as u16, child: arg2 as u16 }
        };

        components.push(Component { glyph_id, transform, anchor });
        if flags & MORE_COMPONENTS == 0 {
            return Ok(components);
        }
    }
}

impl SimpleGlyph {
    /// Emit the contours with implied on-curve midpoints between off-curve pairs
    pub fn emit<B: OutlineBuilder + ?Sized>(&self, builder: &mut B) {
        for contour in &self.contours {
            emit_contour(contour, builder);
        }
    }
}

fn midpoint(a: &Point, b: &Point) -> Point {
    Point { x: (a.x + b.x) / 2.0, y: (a.y + b.y) / 2.0, on_curve: true }
}

fn emit_contour<B: OutlineBuilder + ?Sized>(points: &[Point], builder: &mut B) {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return;
    };
    if points.len() < 2 {
        return;
    }

    // Start on an on-curve point, synthesizing one if the contour has none
    let (start, rest): (Point, Vec<Point>) = if first.on_curve {
        (*first, points[1..].to_vec())
    } else if last.on_curve {
        (*last, points[..points.len() - 1].to_vec())
    } else {
        (midpoint(last, first), points.to_vec())
    };

    builder.move_to(start.x, start.y);
    let mut pending: Option<Point> = None;
    for p in &rest {
        match (p.on_curve, pending) {
            (true, None) => builder.line_to(p.x, p.y),
            (true, Some(ctrl)) => {
                builder.quad_to(ctrl.x, ctrl.y, p.x, p.y);
                pending = None;
            }
            (false, None) => pending = Some(*p),
            (false, Some(ctrl)) => {
                let mid = midpoint(&ctrl, p);
                builder.quad_to(ctrl.x, ctrl.y, mid.x, mid.y);
                pending = Some(*p);
            }
        }
    }
    if let Some(ctrl) = pending {
        builder.quad_to(ctrl.x, ctrl.y, start.x, start.y);
    }
    builder.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::{GlyphPath, PathCommand};

    fn pt(x: f32, y: f32, on_curve: bool) -> Point {
        Point { x, y, on_curve }
    }

    #[test]
    fn test_contour_with_implied_midpoints() {
        let glyph = SimpleGlyph {
            contours: vec![vec![pt(0.0, 0.0, true), pt(10.0, 10.0, false), pt(20.0, 10.0, false), pt(30.0, 0.0, true)]],
        };
        let mut path = GlyphPath::new();
        glyph.emit(&mut path);
        assert_eq!(
            path.commands,
            vec![
                PathCommand::MoveTo(0.0, 0.0),
                PathCommand::QuadTo(10.0, 10.0, 15.0, 10.0),
                PathCommand::QuadTo(20.0, 10.0, 30.0, 0.0),
                PathCommand::Close,
            ]
        );
    }

    #[test]
    fn test_all_off_curve_contour() {
        let glyph = SimpleGlyph {
            contours: vec![vec![
                pt(0.0, 10.0, false),
                pt(10.0, 0.0, false),
                pt(0.0, -10.0, false),
                pt(-10.0, 0.0, false),
            ]],
        };
        let mut path = GlyphPath::new();
        glyph.emit(&mut path);
        assert_eq!(path.commands[0], PathCommand::MoveTo(-5.0, 5.0));
        assert_eq!(path.commands.len(), 6);
        assert_eq!(path.commands[4], PathCommand::QuadTo(-10.0, 0.0, -5.0, 5.0));
    }

    #[test]
    fn test_parse_components_with_scale_and_points() {
        let mut data = Vec::new();
        // Component 1: words, xy offset (100, -20), uniform scale 0.5, more
        data.extend_from_slice(&(ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES | WE_HAVE_A_SCALE | MORE_COMPONENTS).to_be_bytes());
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&100i16.to_be_bytes());
        data.extend_from_slice(&(-20i16).to_be_bytes());
        data.extend_from_slice(&0x2000u16.to_be_bytes());
        // Component 2: byte point numbers 4 and 1
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&5u16.to_be_bytes());
        data.extend_from_slice(&[4, 1]);

        let components = parse_components(&mut FontReader::new(&data)).unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].glyph_id, 3);
        assert_eq!(components[0].transform.apply(10.0, 10.0), (105.0, -15.0));
        assert_eq!(components[1].anchor, ComponentAnchor::Points { parent: 4, child: 1 });
    }
}
