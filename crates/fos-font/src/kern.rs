//! Legacy `kern` table (format 0 pair lists)
//!
//! Both the Microsoft (version 0) and Apple (version 1.0) headers are read.
//! Only horizontal, non cross-stream subtables contribute.

use std::collections::HashMap;

use crate::reader::{tail, FontReader};
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct KernTable {
    pairs: HashMap<(u16, u16), i16>,
}

impl KernTable {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = FontReader::new(data);
        let version = reader.read_u16()?;
        let apple = version == 1;
        let table_count = if apple {
            let _minor = reader.read_u16()?;
            reader.read_u32()?
        } else {
            reader.read_u16()? as u32
        };

        let mut pairs = HashMap::new();
        for _ in 0..table_count {
            let start = reader.pos();
            let (length, format, horizontal, cross_stream) = if apple {
                let length = reader.read_u32()? as usize;
                let coverage = reader.read_u16()?;
                let _tuple_index = reader.read_u16()?;
                // Apple bit 15 marks vertical text
                (length, coverage & 0xFF, coverage & 0x8000 == 0, coverage & 0x4000 != 0)
            } else {
                let _sub_version = reader.read_u16()?;
                let length = reader.read_u16()? as usize;
                let coverage = reader.read_u16()?;
                (length, coverage >> 8, coverage & 0x1 != 0, coverage & 0x4 != 0)
            };

            if format == 0 && horizontal && !cross_stream {
                let body = tail(data, reader.pos())?;
                let mut br = FontReader::new(body);
                let count = br.read_u16()?;
                br.skip(6)?;
                for _ in 0..count {
                    let left = br.read_u16()?;
                    let right = br.read_u16()?;
                    let value = br.read_i16()?;
                    pairs.insert((left, right), value);
                }
            }

            // 16-bit lengths overflow on large subtables; stop at the last readable one
            if length == 0 || reader.set_pos(start + length).is_err() {
                break;
            }
        }
        Ok(Self { pairs })
    }

    /// Kerning adjustment in font units
    pub fn get(&self, left: u16, right: u16) -> Option<i16> {
        self.pairs.get(&(left, right)).copied()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format0(pairs: &[(u16, u16, i16)], coverage: u16) -> Vec<u8> {
        let mut sub = Vec::new();
        sub.extend_from_slice(&(pairs.len() as u16).to_be_bytes());
        sub.extend_from_slice(&[0; 6]);
        for &(l, r, v) in pairs {
            sub.extend_from_slice(&l.to_be_bytes());
            sub.extend_from_slice(&r.to_be_bytes());
            sub.extend_from_slice(&v.to_be_bytes());
        }
        let mut data = vec![0, 0, 0, 1, 0, 0];
        data.extend_from_slice(&((sub.len() + 6) as u16).to_be_bytes());
        data.extend_from_slice(&coverage.to_be_bytes());
        data.extend_from_slice(&sub);
        data
    }

    #[test]
    fn test_microsoft_format0() {
        let kern = KernTable::parse(&format0(&[(1, 2, -50), (3, 4, 20)], 0x0001)).unwrap();
        assert_eq!(kern.get(1, 2), Some(-50));
        assert_eq!(kern.get(3, 4), Some(20));
        assert_eq!(kern.get(2, 1), None);
        assert_eq!(kern.len(), 2);
    }

    #[test]
    fn test_vertical_subtable_ignored() {
        let kern = KernTable::parse(&format0(&[(1, 2, -50)], 0x0000)).unwrap();
        assert!(kern.is_empty());
    }
}
