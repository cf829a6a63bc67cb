//! Line breaking (simplified UAX #14) and greedy wrapping

/// Line break opportunity after a character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakOpportunity {
    NoBreak,
    AllowBreak,
    MustBreak,
}

/// Opportunity after each character
pub fn break_opportunities(chars: &[char]) -> Vec<BreakOpportunity> {
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| match c {
            // CRLF breaks once, after the LF
            '\r' if chars.get(i + 1) == Some(&'\n') => BreakOpportunity::NoBreak,
            c if is_hard_break(c) => BreakOpportunity::MustBreak,
            c if is_breaking_space(c) || is_dash(c) || is_cjk(c) => BreakOpportunity::AllowBreak,
            _ => BreakOpportunity::NoBreak,
        })
        .collect()
}

pub fn is_hard_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}')
}

/// Spaces that allow a break and take part in justification.
/// No-break spaces are excluded.
pub fn is_breaking_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{1680}' | '\u{2000}'..='\u{2006}' | '\u{2008}'..='\u{200B}' | '\u{205F}' | '\u{3000}')
}

fn is_dash(c: char) -> bool {
    matches!(c, '-' | '\u{00AD}' | '\u{058A}' | '\u{2010}' | '\u{2012}' | '\u{2013}' | '\u{2014}')
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3040..=0x309F | 0x30A0..=0x30FF | 0xAC00..=0xD7AF)
}

/// One unit of wrapping (a glyph)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WrapItem {
    pub advance: f32,
    pub opportunity: BreakOpportunity,
    /// Whitespace hangs past the edge instead of forcing a wrap
    pub whitespace: bool,
}

/// A line as a range of items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
    /// Ended by wrapping rather than a hard break or the end of text
    pub soft: bool,
    /// First line of a paragraph
    pub paragraph_start: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WrapOptions {
    pub max_width: f32,
    pub wrap: bool,
    /// Break inside words that do not fit on their own line
    pub break_words: bool,
    /// Leading offset of each paragraph's first line
    pub indent: f32,
}

const WIDTH_EPSILON: f32 = 1e-3;

pub struct LineBreaker;

impl LineBreaker {
    /// Greedy wrapping. Lines end after hard breaks, at the last allowed
    /// break before an overflowing item, or before the item itself when
    /// `break_words` is set. Otherwise the line overflows.
    pub fn wrap(items: &[WrapItem], options: WrapOptions) -> Vec<LineSpan> {
        let mut lines = Vec::new();
        if items.is_empty() {
            return lines;
        }
        let wrapping = options.wrap && options.max_width.is_finite();
        let mut start = 0;
        let mut paragraph_start = true;
        let mut x = options.indent;
        let mut last_break: Option<usize> = None;
        let mut i = 0;

        while i < items.len() {
            let item = items[i];
            if item.opportunity == BreakOpportunity::MustBreak {
                lines.push(LineSpan { start, end: i + 1, soft: false, paragraph_start });
                start = i + 1;
                paragraph_start = true;
                x = options.indent;
                last_break = None;
                i += 1;
                continue;
            }

            let overflows = x + item.advance > options.max_width + WIDTH_EPSILON;
            if wrapping && overflows && !item.whitespace && i > start {
                let end = match last_break {
                    Some(b) => Some(b + 1),
                    None if options.break_words => Some(i),
                    None => None,
                };
                if let Some(end) = end {
                    lines.push(LineSpan { start, end, soft: true, paragraph_start });
                    start = end;
                    paragraph_start = false;
                    x = 0.0;
                    last_break = None;
                    i = start;
                    continue;
                }
            }

            x += item.advance;
            if item.opportunity == BreakOpportunity::AllowBreak {
                last_break = Some(i);
            }
            i += 1;
        }

        // the text's last line, possibly empty after a trailing hard break
        lines.push(LineSpan { start, end: items.len(), soft: false, paragraph_start });
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(text: &str, advance: f32) -> Vec<WrapItem> {
        let chars: Vec<char> = text.chars().collect();
        break_opportunities(&chars)
            .into_iter()
            .zip(&chars)
            .map(|(opportunity, c)| WrapItem { advance, opportunity, whitespace: c.is_whitespace() })
            .collect()
    }

    fn spans(lines: &[LineSpan]) -> Vec<(usize, usize)> {
        lines.iter().map(|l| (l.start, l.end)).collect()
    }

    fn options(max_width: f32) -> WrapOptions {
        WrapOptions { max_width, wrap: true, break_words: false, indent: 0.0 }
    }

    #[test]
    fn test_break_opportunities() {
        let chars: Vec<char> = "a b-c\r\nd".chars().collect();
        let ops = break_opportunities(&chars);
        assert_eq!(ops[1], BreakOpportunity::AllowBreak);
        assert_eq!(ops[3], BreakOpportunity::AllowBreak);
        assert_eq!(ops[5], BreakOpportunity::NoBreak);
        assert_eq!(ops[6], BreakOpportunity::MustBreak);
        assert_eq!(ops[7], BreakOpportunity::NoBreak);
        assert!(!is_breaking_space('\u{00A0}'));
    }

    #[test]
    fn test_wrap_at_space() {
        let lines = LineBreaker::wrap(&items("aaa bbb", 10.0), options(50.0));
        assert_eq!(spans(&lines), vec![(0, 4), (4, 7)]);
        assert!(lines[0].soft);
        assert!(!lines[1].soft);
        assert!(!lines[1].paragraph_start);
    }

    #[test]
    fn test_trailing_space_hangs() {
        // the space after "aaaaa" reaches past the edge without wrapping
        let lines = LineBreaker::wrap(&items("aaaaa bb", 10.0), options(50.0));
        assert_eq!(spans(&lines), vec![(0, 6), (6, 8)]);
    }

    #[test]
    fn test_overflow_without_break() {
        let lines = LineBreaker::wrap(&items("aaaaaaa", 10.0), options(30.0));
        assert_eq!(spans(&lines), vec![(0, 7)]);

        let broken = LineBreaker::wrap(&items("aaaaaaa", 10.0), WrapOptions { break_words: true, ..options(30.0) });
        assert_eq!(spans(&broken), vec![(0, 3), (3, 6), (6, 7)]);
    }

    #[test]
    fn test_hard_breaks_and_indent() {
        let opts = WrapOptions { indent: 20.0, ..options(50.0) };
        let lines = LineBreaker::wrap(&items("aaa\naa aa", 10.0), opts);
        assert_eq!(spans(&lines), vec![(0, 4), (4, 7), (7, 9)]);
        assert!(lines[1].paragraph_start);
        assert!(!lines[2].paragraph_start);

        let trailing = LineBreaker::wrap(&items("a\n", 10.0), options(50.0));
        assert_eq!(spans(&trailing), vec![(0, 2), (2, 2)]);
    }

    #[test]
    fn test_nowrap() {
        let lines = LineBreaker::wrap(&items("aaa bbb", 10.0), WrapOptions { wrap: false, ..options(20.0) });
        assert_eq!(lines.len(), 1);
    }
}
