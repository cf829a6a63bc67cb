//! GDEF (Glyph Definition) table

use crate::layout::{ClassDef, Coverage};
use crate::reader::{tail, FontReader};
use crate::Result;

/// Glyph classes from the GDEF glyph class definition
pub mod glyph_class {
    pub const BASE: u16 = 1;
    pub const LIGATURE: u16 = 2;
    pub const MARK: u16 = 3;
    pub const COMPONENT: u16 = 4;
}

#[derive(Debug, Clone, Default)]
pub struct GdefTable {
    glyph_classes: ClassDef,
    mark_attach_classes: ClassDef,
    mark_glyph_sets: Vec<Coverage>,
}

impl GdefTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let _major = reader.read_u16()?;
        let minor = reader.read_u16()?;
        let glyph_class_offset = reader.read_u16()?;
        let _attach_list = reader.read_u16()?;
        let _lig_caret_list = reader.read_u16()?;
        let mark_attach_offset = reader.read_u16()?;
        let mark_sets_offset = if minor >= 2 { reader.read_u16()? } else { 0 };

        let mut mark_glyph_sets = Vec::new();
        if mark_sets_offset != 0 {
            let sets = tail(data, mark_sets_offset as usize)?;
            let mut sr = FontReader::new(sets);
            let _format = sr.read_u16()?;
            let count = sr.read_u16()?;
            for _ in 0..count {
                let offset = sr.read_u32()? as usize;
                mark_glyph_sets.push(Coverage::parse(tail(sets, offset)?)?);
            }
        }

        Ok(Self {
            glyph_classes: ClassDef::parse_at(data, glyph_class_offset)?,
            mark_attach_classes: ClassDef::parse_at(data, mark_attach_offset)?,
            mark_glyph_sets,
        })
    }

    /// Glyph class (see [`glyph_class`]); 0 when unclassified
    pub fn glyph_class(&self, glyph_id: u16) -> u16 {
        self.glyph_classes.get(glyph_id)
    }

    pub fn is_mark(&self, glyph_id: u16) -> bool {
        self.glyph_class(glyph_id) == glyph_class::MARK
    }

    pub fn mark_attach_class(&self, glyph_id: u16) -> u16 {
        self.mark_attach_classes.get(glyph_id)
    }

    pub fn mark_set_contains(&self, set: u16, glyph_id: u16) -> bool {
        self.mark_glyph_sets.get(set as usize).is_some_and(|c| c.contains(glyph_id))
    }
}
