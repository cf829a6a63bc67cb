//! Big-endian binary reader for font data

use crate::{FontError, Result};

/// Binary reader with bounds checking
#[derive(Clone)]
pub struct FontReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FontReader<'a> {
    /// Create a new reader
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a reader over `data[offset..]`
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        Ok(Self::new(tail(data, offset)?))
    }

    /// Get current position
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Set position
    pub fn set_pos(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(FontError::UnexpectedEof);
        }
        self.pos = pos;
        Ok(())
    }

    /// Skip bytes
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(FontError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(FontError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read u8
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read i8
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read big-endian u16
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read big-endian i16
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Read big-endian 24-bit unsigned
    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    /// Read big-endian u32
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read big-endian i32
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read Fixed 16.16
    pub fn read_fixed(&mut self) -> Result<f32> {
        Ok(self.read_i32()? as f32 / 65536.0)
    }

    /// Read F2Dot14
    pub fn read_f2dot14(&mut self) -> Result<f32> {
        Ok(self.read_i16()? as f32 / 16384.0)
    }

    /// Read an offset of `size` bytes (1..=4), as used by CFF
    pub fn read_offset(&mut self, size: u8) -> Result<u32> {
        match size {
            1 => Ok(self.read_u8()? as u32),
            2 => Ok(self.read_u16()? as u32),
            3 => self.read_u24(),
            4 => self.read_u32(),
            _ => Err(FontError::Malformed("offset size")),
        }
    }

    /// Read 4-byte tag
    pub fn read_tag(&mut self) -> Result<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// Read bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Read `n` consecutive u16 values
    pub fn read_u16_array(&mut self, n: usize) -> Result<Vec<u16>> {
        let bytes = self.take(n.checked_mul(2).ok_or(FontError::UnexpectedEof)?)?;
        Ok(bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
    }

    /// Remaining bytes
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// The whole underlying buffer
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

/// `data[offset..]`, bounds checked
pub fn tail(data: &[u8], offset: usize) -> Result<&[u8]> {
    data.get(offset..).ok_or(FontError::UnexpectedEof)
}

/// `data[offset..offset + len]`, bounds checked
pub fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.checked_add(len).ok_or(FontError::UnexpectedEof)?;
    data.get(offset..end).ok_or(FontError::UnexpectedEof)
}

/// Read a big-endian u16 at an absolute offset
pub fn u16_at(data: &[u8], offset: usize) -> Result<u16> {
    let b = slice(data, offset, 2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u16() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut reader = FontReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u16().unwrap(), 0x5678);
        assert_eq!(reader.read_u16(), Err(FontError::UnexpectedEof));
    }

    #[test]
    fn test_read_tag() {
        let data = b"headtest";
        let mut reader = FontReader::new(data);
        assert_eq!(reader.read_tag().unwrap(), *b"head");
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_offsets_and_fixed() {
        let data = [0x01, 0x02, 0x03, 0x00, 0x01, 0x80, 0x00, 0x40, 0x00];
        let mut reader = FontReader::new(&data);
        assert_eq!(reader.read_offset(3).unwrap(), 0x010203);
        assert_eq!(reader.read_fixed().unwrap(), 1.5);
        assert_eq!(reader.read_f2dot14().unwrap(), 1.0);
    }

    #[test]
    fn test_slice_bounds() {
        let data = [0u8; 4];
        assert!(slice(&data, 2, 2).is_ok());
        assert!(slice(&data, 3, 2).is_err());
        assert!(slice(&data, usize::MAX, 2).is_err());
        assert!(FontReader::at(&data, 5).is_err());
    }
}
