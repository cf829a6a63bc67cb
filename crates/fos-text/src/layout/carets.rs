//! Caret rectangles

use std::ops::Range;

use super::CaretRect;

/// Horizontal extent covering a range of source characters
#[derive(Debug, Clone, PartialEq)]
pub(super) struct CaretUnit {
    pub chars: Range<usize>,
    pub left: f32,
    pub right: f32,
    pub rtl: bool,
}

/// Merge glyph units that start at the same character and assign each
/// unit the characters up to the next unit's start. Units must be in
/// logical order.
pub(super) fn group_units(units: Vec<(usize, f32, f32, bool)>, line_end: usize) -> Vec<CaretUnit> {
    let mut grouped: Vec<CaretUnit> = Vec::with_capacity(units.len());
    for (start, left, right, rtl) in units {
        match grouped.last_mut() {
            Some(last) if last.chars.start == start => {
                last.left = last.left.min(left);
                last.right = last.right.max(right);
            }
            _ => grouped.push(CaretUnit { chars: start..start, left, right, rtl }),
        }
    }
    for i in 0..grouped.len() {
        let end = grouped.get(i + 1).map_or(line_end, |next| next.chars.start);
        grouped[i].chars.end = end.max(grouped[i].chars.start);
    }
    grouped
}

/// Split each unit evenly among its characters, right to left inside
/// right-to-left units.
pub(super) fn line_carets(units: &[CaretUnit], bottom: f32, top: f32, out: &mut Vec<CaretRect>) {
    for unit in units {
        let count = unit.chars.len();
        if count == 0 {
            continue;
        }
        let width = (unit.right - unit.left) / count as f32;
        for (k, char_index) in unit.chars.clone().enumerate() {
            let slot = if unit.rtl { count - 1 - k } else { k };
            let left = unit.left + slot as f32 * width;
            out.push(CaretRect { char_index, left, right: left + width, bottom, top });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_units() {
        // a decomposed character (two glyphs at char 0), then a two-char ligature
        let units = group_units(vec![(0, 0.0, 10.0, false), (0, 10.0, 15.0, false), (1, 15.0, 35.0, false)], 3);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].chars, 0..1);
        assert_eq!((units[0].left, units[0].right), (0.0, 15.0));
        assert_eq!(units[1].chars, 1..3);
    }

    #[test]
    fn test_split_rtl() {
        let units = [CaretUnit { chars: 4..6, left: 0.0, right: 20.0, rtl: true }];
        let mut carets = Vec::new();
        line_carets(&units, -2.0, 8.0, &mut carets);
        assert_eq!(carets[0], CaretRect { char_index: 4, left: 10.0, right: 20.0, bottom: -2.0, top: 8.0 });
        assert_eq!(carets[1].left, 0.0);
    }
}
