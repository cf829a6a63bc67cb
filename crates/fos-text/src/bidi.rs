//! Unicode Bidirectional Algorithm (UAX #9)
//!
//! Levels are resolved once for the whole text (P2-P3, X1-X8, W1-W7,
//! N1-N2, I1-I2). Line-level rules L1-L2 run per physical line after
//! wrapping, on whatever items the caller lays out (glyphs here).
//!
//! Isolating run sequences are approximated by level runs.

use std::ops::Range;

/// Bidirectional character type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidiClass {
    L,
    R,
    AL,
    EN,
    ES,
    ET,
    AN,
    CS,
    NSM,
    BN,
    B,
    S,
    WS,
    ON,
    LRE,
    LRO,
    RLE,
    RLO,
    PDF,
    LRI,
    RLI,
    FSI,
    PDI,
}

impl BidiClass {
    /// Class of a character from a compact table of the common scripts
    pub fn of(c: char) -> Self {
        use BidiClass::*;
        match c as u32 {
            0x0009 | 0x000B | 0x001F => S,
            0x000A | 0x000D | 0x001C..=0x001E | 0x0085 | 0x2029 => B,
            0x000C | 0x0020 | 0x2000..=0x200A | 0x2028 | 0x205F | 0x3000 => WS,
            0x0000..=0x0008 | 0x000E..=0x001B | 0x007F..=0x0084 | 0x0086..=0x009F | 0x00AD => BN,
            0x0030..=0x0039 | 0x00B2 | 0x00B3 | 0x00B9 | 0x06F0..=0x06F9 | 0x2070 | 0x2074..=0x2079 => EN,
            0x0023..=0x0025 | 0x00A2..=0x00A5 | 0x00B0 | 0x00B1 | 0x066A | 0x2030..=0x2034 | 0x20A0..=0x20CF => ET,
            0x002B | 0x002D => ES,
            0x002C | 0x002E | 0x002F | 0x003A | 0x00A0 | 0x060C | 0x202F => CS,
            0x0041..=0x005A | 0x0061..=0x007A | 0x00AA | 0x00B5 | 0x00BA => L,
            0x00C0..=0x00D6 | 0x00D8..=0x00F6 | 0x00F8..=0x02B8 => L,
            0x0021..=0x007E | 0x00A1..=0x00BF | 0x00D7 | 0x00F7 => ON,
            0x0300..=0x036F | 0x0483..=0x0489 => NSM,

            // Hebrew
            0x0591..=0x05BD | 0x05BF | 0x05C1 | 0x05C2 | 0x05C4 | 0x05C5 | 0x05C7 => NSM,
            0x0590..=0x05FF | 0x07C0..=0x085F | 0xFB1D..=0xFB4F => R,

            // Arabic
            0x0600..=0x0605 | 0x0660..=0x0669 | 0x066B | 0x066C | 0x06DD => AN,
            0x0610..=0x061A | 0x064B..=0x065F | 0x0670 | 0x06D6..=0x06DC | 0x06DF..=0x06E4 => NSM,
            0x06E7 | 0x06E8 | 0x06EA..=0x06ED | 0x0711 | 0x0730..=0x074A | 0x08D3..=0x08E1 | 0x08E3..=0x08FF => NSM,
            0xFD3E | 0xFD3F => ON,
            0x0600..=0x07BF | 0x0860..=0x08FF | 0xFB50..=0xFDFF | 0xFE70..=0xFEFE => AL,
            0xFEFF => BN,

            // General punctuation and formatting
            0x200B..=0x200D | 0x2060..=0x2065 | 0x206A..=0x206F => BN,
            0x200E => L,
            0x200F => R,
            0x202A => LRE,
            0x202B => RLE,
            0x202C => PDF,
            0x202D => LRO,
            0x202E => RLO,
            0x2066 => LRI,
            0x2067 => RLI,
            0x2068 => FSI,
            0x2069 => PDI,
            0x2010..=0x2027 | 0x2035..=0x205E => ON,
            0x2190..=0x2BFF | 0x3001..=0x3003 | 0x3008..=0x3011 | 0xFE50..=0xFE6F => ON,
            0xFE00..=0xFE0F | 0x20D0..=0x20FF => NSM,
            0x1F000..=0x1FAFF => ON,

            _ => L,
        }
    }

    pub fn is_strong(self) -> bool {
        matches!(self, BidiClass::L | BidiClass::R | BidiClass::AL)
    }

    fn is_isolate_control(self) -> bool {
        matches!(self, BidiClass::LRI | BidiClass::RLI | BidiClass::FSI | BidiClass::PDI)
    }

    /// Removed from resolution by X9
    fn is_removed(self) -> bool {
        matches!(
            self,
            BidiClass::BN | BidiClass::LRE | BidiClass::RLE | BidiClass::LRO | BidiClass::RLO | BidiClass::PDF
        )
    }

    /// Neutral or isolate, resolved by N1/N2
    fn is_neutral(self) -> bool {
        matches!(self, BidiClass::B | BidiClass::S | BidiClass::WS | BidiClass::ON) || self.is_isolate_control()
    }
}

/// Embedding level, even for left-to-right
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Level(pub u8);

impl Level {
    pub const MAX_DEPTH: u8 = 125;
    pub const LTR: Level = Level(0);
    pub const RTL: Level = Level(1);

    pub fn is_rtl(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn is_ltr(self) -> bool {
        !self.is_rtl()
    }

    /// Direction as a strong class
    fn strong(self) -> BidiClass {
        if self.is_rtl() { BidiClass::R } else { BidiClass::L }
    }

    fn next_rtl(self) -> Option<Level> {
        let next = (self.0 + 1) | 1;
        (next <= Self::MAX_DEPTH).then_some(Level(next))
    }

    fn next_ltr(self) -> Option<Level> {
        let next = (self.0 + 2) & !1;
        (next <= Self::MAX_DEPTH).then_some(Level(next))
    }
}

/// Resolved levels of a text
#[derive(Debug, Clone)]
pub struct BidiInfo {
    pub base_level: Level,
    /// Original classes, one per char
    pub classes: Vec<BidiClass>,
    /// Levels after implicit resolution, before line rules
    pub levels: Vec<Level>,
}

impl BidiInfo {
    /// `base` of `None` takes the direction of the first strong character
    pub fn new(chars: &[char], base: Option<Level>) -> Self {
        let classes: Vec<BidiClass> = chars.iter().map(|&c| BidiClass::of(c)).collect();
        let base_level = base.unwrap_or_else(|| first_strong(&classes).unwrap_or(Level::LTR));

        let mut resolved = classes.clone();
        let mut levels = explicit_levels(&mut resolved, base_level);
        resolve_runs(&mut resolved, &mut levels, base_level);
        Self { base_level, classes, levels }
    }

    pub fn has_rtl(&self) -> bool {
        self.base_level.is_rtl() || self.levels.iter().any(|l| l.is_rtl())
    }

    /// Levels of one line with L1 applied: separators, and whitespace
    /// before them or at the line end, return to the paragraph level.
    pub fn line_levels(&self, line: Range<usize>) -> Vec<Level> {
        let mut levels = self.levels[line.clone()].to_vec();
        let classes = &self.classes[line];
        let trailing = |class: BidiClass| {
            matches!(class, BidiClass::WS | BidiClass::BN) || class.is_isolate_control() || class.is_removed()
        };
        let mut reset_tail = true;
        for i in (0..levels.len()).rev() {
            match classes[i] {
                BidiClass::S | BidiClass::B => {
                    levels[i] = self.base_level;
                    reset_tail = true;
                }
                class if trailing(class) => {
                    if reset_tail {
                        levels[i] = self.base_level;
                    }
                }
                _ => reset_tail = false,
            }
        }
        levels
    }
}

/// P2/P3, skipping isolates
fn first_strong(classes: &[BidiClass]) -> Option<Level> {
    let mut depth = 0usize;
    for &class in classes {
        match class {
            BidiClass::LRI | BidiClass::RLI | BidiClass::FSI => depth += 1,
            BidiClass::PDI => depth = depth.saturating_sub(1),
            BidiClass::B if depth == 0 => return None,
            BidiClass::L if depth == 0 => return Some(Level::LTR),
            BidiClass::R | BidiClass::AL if depth == 0 => return Some(Level::RTL),
            _ => {}
        }
    }
    None
}

#[derive(Clone, Copy)]
struct StackEntry {
    level: Level,
    override_class: Option<BidiClass>,
    isolate: bool,
}

/// X1-X8. Overrides rewrite `classes` in place.
fn explicit_levels(classes: &mut [BidiClass], base: Level) -> Vec<Level> {
    let mut levels = vec![base; classes.len()];
    let mut stack = vec![StackEntry { level: base, override_class: None, isolate: false }];
    let mut overflow_isolates = 0u32;
    let mut overflow_embeddings = 0u32;
    let mut valid_isolates = 0u32;

    for i in 0..classes.len() {
        let top = *stack.last().unwrap_or(&StackEntry { level: base, override_class: None, isolate: false });
        let class = classes[i];
        match class {
            BidiClass::RLE | BidiClass::LRE | BidiClass::RLO | BidiClass::LRO => {
                levels[i] = top.level;
                let rtl = matches!(class, BidiClass::RLE | BidiClass::RLO);
                let next = if rtl { top.level.next_rtl() } else { top.level.next_ltr() };
                match next {
                    Some(level) if overflow_isolates == 0 && overflow_embeddings == 0 => {
                        let override_class = match class {
                            BidiClass::RLO => Some(BidiClass::R),
                            BidiClass::LRO => Some(BidiClass::L),
                            _ => None,
                        };
                        stack.push(StackEntry { level, override_class, isolate: false });
                    }
                    _ if overflow_isolates == 0 => overflow_embeddings += 1,
                    _ => {}
                }
            }
            BidiClass::RLI | BidiClass::LRI | BidiClass::FSI => {
                levels[i] = top.level;
                if let Some(strong) = top.override_class {
                    classes[i] = strong;
                }
                let rtl = match class {
                    BidiClass::RLI => true,
                    BidiClass::LRI => false,
                    _ => isolate_is_rtl(&classes[i + 1..]),
                };
                let next = if rtl { top.level.next_rtl() } else { top.level.next_ltr() };
                match next {
                    Some(level) if overflow_isolates == 0 && overflow_embeddings == 0 => {
                        valid_isolates += 1;
                        stack.push(StackEntry { level, override_class: None, isolate: true });
                    }
                    _ => overflow_isolates += 1,
                }
            }
            BidiClass::PDI => {
                if overflow_isolates > 0 {
                    overflow_isolates -= 1;
                } else if valid_isolates > 0 {
                    overflow_embeddings = 0;
                    while stack.len() > 1 {
                        let popped = stack.pop().map(|e| e.isolate).unwrap_or(false);
                        if popped {
                            break;
                        }
                    }
                    valid_isolates -= 1;
                }
                let top = stack.last().copied().unwrap_or(top);
                levels[i] = top.level;
                if let Some(strong) = top.override_class {
                    classes[i] = strong;
                }
            }
            BidiClass::PDF => {
                levels[i] = top.level;
                if overflow_isolates == 0 {
                    if overflow_embeddings > 0 {
                        overflow_embeddings -= 1;
                    } else if !top.isolate && stack.len() > 1 {
                        stack.pop();
                    }
                }
            }
            BidiClass::B => levels[i] = base,
            BidiClass::BN => levels[i] = top.level,
            _ => {
                levels[i] = top.level;
                if let Some(strong) = top.override_class {
                    classes[i] = strong;
                }
            }
        }
    }
    levels
}

/// FSI: direction of the first strong character before the matching PDI
fn isolate_is_rtl(rest: &[BidiClass]) -> bool {
    let mut depth = 0usize;
    for &class in rest {
        match class {
            BidiClass::LRI | BidiClass::RLI | BidiClass::FSI => depth += 1,
            BidiClass::PDI if depth == 0 => return false,
            BidiClass::PDI => depth -= 1,
            BidiClass::L if depth == 0 => return false,
            BidiClass::R | BidiClass::AL if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

/// W1-W7, N1-N2 and I1-I2 over each level run
fn resolve_runs(classes: &mut [BidiClass], levels: &mut [Level], base: Level) {
    // X9: removed characters do not take part in runs
    let kept: Vec<usize> = (0..classes.len()).filter(|&i| !classes[i].is_removed()).collect();
    let mut start = 0;
    while start < kept.len() {
        let level = levels[kept[start]];
        let mut end = start;
        while end < kept.len() && levels[kept[end]] == level {
            end += 1;
        }
        let before = if start == 0 { base } else { levels[kept[start - 1]] };
        let after = if end == kept.len() { base } else { levels[kept[end]] };
        let sos = level.max(before).strong();
        let eos = level.max(after).strong();

        let indices = &kept[start..end];
        let mut run: Vec<BidiClass> = indices.iter().map(|&i| classes[i]).collect();
        resolve_weak(&mut run, sos);
        resolve_neutral(&mut run, sos, eos, level);
        for (&i, &class) in indices.iter().zip(&run) {
            classes[i] = class;
            levels[i] = implicit_level(level, class);
        }
        start = end;
    }

    // removed characters follow their predecessor
    for i in 0..classes.len() {
        if classes[i].is_removed() {
            levels[i] = if i == 0 { base } else { levels[i - 1] };
        }
    }
}

fn resolve_weak(run: &mut [BidiClass], sos: BidiClass) {
    use BidiClass::*;

    // W1
    let mut prev = sos;
    for class in run.iter_mut() {
        if *class == NSM {
            *class = if prev.is_isolate_control() { ON } else { prev };
        }
        prev = *class;
    }

    // W2, W3
    let mut last_strong = sos;
    for class in run.iter_mut() {
        match *class {
            L | R | AL => last_strong = *class,
            EN if last_strong == AL => *class = AN,
            _ => {}
        }
    }
    for class in run.iter_mut() {
        if *class == AL {
            *class = R;
        }
    }

    // W4
    for i in 1..run.len().saturating_sub(1) {
        let (prev, next) = (run[i - 1], run[i + 1]);
        run[i] = match run[i] {
            ES if prev == EN && next == EN => EN,
            CS if prev == next && matches!(prev, EN | AN) => prev,
            other => other,
        };
    }

    // W5
    let mut i = 0;
    while i < run.len() {
        if run[i] != ET {
            i += 1;
            continue;
        }
        let start = i;
        while i < run.len() && run[i] == ET {
            i += 1;
        }
        let touches_en = (start > 0 && run[start - 1] == EN) || (i < run.len() && run[i] == EN);
        if touches_en {
            run[start..i].fill(EN);
        }
    }

    // W6
    for class in run.iter_mut() {
        if matches!(*class, ES | ET | CS) {
            *class = ON;
        }
    }

    // W7
    let mut last_strong = sos;
    for class in run.iter_mut() {
        match *class {
            L | R => last_strong = *class,
            EN if last_strong == L => *class = L,
            _ => {}
        }
    }
}

fn resolve_neutral(run: &mut [BidiClass], sos: BidiClass, eos: BidiClass, level: Level) {
    let direction = |class: BidiClass| match class {
        BidiClass::L => Some(BidiClass::L),
        BidiClass::R | BidiClass::EN | BidiClass::AN => Some(BidiClass::R),
        _ => None,
    };
    let mut i = 0;
    while i < run.len() {
        if !run[i].is_neutral() {
            i += 1;
            continue;
        }
        let start = i;
        while i < run.len() && run[i].is_neutral() {
            i += 1;
        }
        let before = if start == 0 { sos } else { direction(run[start - 1]).unwrap_or(sos) };
        let after = if i == run.len() { eos } else { direction(run[i]).unwrap_or(eos) };
        // N1, else N2
        let resolved = if before == after { before } else { level.strong() };
        run[start..i].fill(resolved);
    }
}

/// I1/I2
fn implicit_level(level: Level, class: BidiClass) -> Level {
    match (level.is_rtl(), class) {
        (false, BidiClass::R) => Level(level.0 + 1),
        (false, BidiClass::AN | BidiClass::EN) => Level(level.0 + 2),
        (true, BidiClass::L | BidiClass::EN | BidiClass::AN) => Level(level.0 + 1),
        _ => level,
    }
}

/// L2: visual order of items with the given levels, as logical indices
pub fn reorder(levels: &[Level]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..levels.len()).collect();
    let Some(highest) = levels.iter().map(|l| l.0).max() else {
        return order;
    };
    let Some(lowest_odd) = levels.iter().map(|l| l.0).filter(|l| l & 1 == 1).min() else {
        return order;
    };
    for level in (lowest_odd..=highest).rev() {
        let mut i = 0;
        while i < order.len() {
            if levels[order[i]].0 < level {
                i += 1;
                continue;
            }
            let start = i;
            while i < order.len() && levels[order[i]].0 >= level {
                i += 1;
            }
            order[start..i].reverse();
        }
    }
    order
}

/// Mirrored counterpart for right-to-left display
pub fn mirror(c: char) -> Option<char> {
    let mirrored = match c {
        '(' => ')',
        ')' => '(',
        '[' => ']',
        ']' => '[',
        '{' => '}',
        '}' => '{',
        '<' => '>',
        '>' => '<',
        '«' => '»',
        '»' => '«',
        '‹' => '›',
        '›' => '‹',
        '⁅' => '⁆',
        '⁆' => '⁅',
        '≤' => '≥',
        '≥' => '≤',
        '⟨' => '⟩',
        '⟩' => '⟨',
        '⟪' => '⟫',
        '⟫' => '⟪',
        '〈' => '〉',
        '〉' => '〈',
        '《' => '》',
        '》' => '《',
        '「' => '」',
        '」' => '「',
        '【' => '】',
        '】' => '【',
        _ => return None,
    };
    Some(mirrored)
}
