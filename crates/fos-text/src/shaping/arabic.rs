//! Arabic joining analysis
//!
//! Picks the positional form of every joining letter from its neighbours,
//! skipping transparent marks. The forms select the `isol`/`init`/`medi`/
//! `fina` GSUB features.

/// Joining type (Unicode ArabicShaping)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoiningType {
    /// Joins the preceding letter only
    Right,
    /// Joins the following letter only
    Left,
    Dual,
    /// Joins both sides without changing form (tatweel, ZWJ)
    Causing,
    #[default]
    NonJoining,
    /// Marks; ignored by the analysis
    Transparent,
}

impl JoiningType {
    /// Can connect to the letter before it in logical order
    fn joins_previous(self) -> bool {
        matches!(self, JoiningType::Right | JoiningType::Dual | JoiningType::Causing)
    }

    /// Can connect to the letter after it in logical order
    fn joins_next(self) -> bool {
        matches!(self, JoiningType::Left | JoiningType::Dual | JoiningType::Causing)
    }
}

/// Positional form of a joining letter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionalForm {
    Isolated,
    Initial,
    Medial,
    Final,
}

impl PositionalForm {
    pub fn feature_tag(self) -> [u8; 4] {
        match self {
            PositionalForm::Isolated => *b"isol",
            PositionalForm::Initial => *b"init",
            PositionalForm::Medial => *b"medi",
            PositionalForm::Final => *b"fina",
        }
    }
}

pub fn joining_type(c: char) -> JoiningType {
    match c as u32 {
        0x0622..=0x0625 | 0x0627 | 0x0629 | 0x062F..=0x0632 | 0x0648 | 0x0671..=0x0673 | 0x0675..=0x0677 => {
            JoiningType::Right
        }
        0x0688..=0x0699 | 0x06C0 | 0x06C3..=0x06CB | 0x06CD | 0x06CF | 0x06D2 | 0x06D3 | 0x06D5 | 0x06EE | 0x06EF => {
            JoiningType::Right
        }
        0x0710 | 0x0715..=0x0719 | 0x071E | 0x0728 | 0x072A | 0x072C | 0x072F | 0x074D => JoiningType::Right,

        0x0626 | 0x0628 | 0x062A..=0x062E | 0x0633..=0x063F | 0x0641..=0x0647 | 0x0649 | 0x064A => JoiningType::Dual,
        0x066E | 0x066F | 0x0678..=0x0687 | 0x069A..=0x06BF | 0x06C1 | 0x06C2 | 0x06CC | 0x06CE => JoiningType::Dual,
        0x06D0 | 0x06D1 | 0x06FA..=0x06FC | 0x06FF | 0x0750..=0x077F | 0x08A0..=0x08C7 => JoiningType::Dual,
        0x0712..=0x072F | 0x074E | 0x074F | 0x07CA..=0x07EA | 0x0840..=0x0858 => JoiningType::Dual,

        0x0640 | 0x07FA | 0x200D => JoiningType::Causing,

        0x0610..=0x061A | 0x064B..=0x065F | 0x0670 | 0x06D6..=0x06DC | 0x06DF..=0x06E4 => JoiningType::Transparent,
        0x06E7 | 0x06E8 | 0x06EA..=0x06ED | 0x0711 | 0x0730..=0x074A | 0x07EB..=0x07F3 => JoiningType::Transparent,
        0x0859..=0x085B | 0x08D3..=0x08E1 | 0x08E3..=0x08FF | 0x0300..=0x036F | 0xFE00..=0xFE0F => {
            JoiningType::Transparent
        }

        _ => JoiningType::NonJoining,
    }
}

/// Form of every character; `None` for characters that take no form
/// feature (non-joining letters, causing characters, marks).
pub fn positional_forms(chars: &[char]) -> Vec<Option<PositionalForm>> {
    let types: Vec<JoiningType> = chars.iter().map(|&c| joining_type(c)).collect();
    let mut forms = vec![None; chars.len()];

    let mut prev: Option<usize> = None;
    for i in 0..types.len() {
        let current = types[i];
        if current == JoiningType::Transparent {
            continue;
        }
        if matches!(current, JoiningType::Right | JoiningType::Left | JoiningType::Dual) {
            let joined_before = prev.is_some_and(|p| types[p].joins_next()) && current.joins_previous();
            let next = types[i + 1..].iter().find(|t| **t != JoiningType::Transparent);
            let joined_after = next.is_some_and(|t| t.joins_previous()) && current.joins_next();
            forms[i] = Some(match (joined_before, joined_after) {
                (false, false) => PositionalForm::Isolated,
                (false, true) => PositionalForm::Initial,
                (true, true) => PositionalForm::Medial,
                (true, false) => PositionalForm::Final,
            });
        }
        prev = Some(i);
    }
    forms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forms(text: &str) -> Vec<Option<PositionalForm>> {
        positional_forms(&text.chars().collect::<Vec<_>>())
    }

    #[test]
    fn test_joining_types() {
        assert_eq!(joining_type('ب'), JoiningType::Dual);
        assert_eq!(joining_type('ا'), JoiningType::Right);
        assert_eq!(joining_type('\u{064E}'), JoiningType::Transparent);
        assert_eq!(joining_type('ء'), JoiningType::NonJoining);
        assert_eq!(joining_type('a'), JoiningType::NonJoining);
    }

    #[test]
    fn test_dual_joining_word() {
        use PositionalForm::*;
        // beh beh beh
        assert_eq!(forms("ببب"), vec![Some(Initial), Some(Medial), Some(Final)]);
        assert_eq!(forms("ب"), vec![Some(Isolated)]);
    }

    #[test]
    fn test_right_joining_breaks_the_chain() {
        use PositionalForm::*;
        // beh alef beh: alef joins back only, so the last beh stands alone
        assert_eq!(forms("باب"), vec![Some(Initial), Some(Final), Some(Isolated)]);
    }

    #[test]
    fn test_marks_are_transparent() {
        use PositionalForm::*;
        assert_eq!(forms("ب\u{064E}ب"), vec![Some(Initial), None, Some(Final)]);
        // tatweel joins both neighbours
        assert_eq!(forms("ب\u{0640}"), vec![Some(Initial), None]);
    }
}
