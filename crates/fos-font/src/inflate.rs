//! DEFLATE decompression (RFC 1950/1951)
//!
//! Inflator for the zlib-wrapped table payloads of WOFF files.

/// DEFLATE decompression error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeflateError {
    #[error("Invalid zlib header")]
    InvalidHeader,
    #[error("Invalid block type")]
    InvalidBlockType,
    #[error("Invalid Huffman code")]
    InvalidHuffmanCode,
    #[error("Invalid distance")]
    InvalidDistance,
    #[error("Invalid length")]
    InvalidLength,
    #[error("Adler-32 checksum mismatch")]
    ChecksumMismatch,
    #[error("Unexpected end of compressed data")]
    UnexpectedEof,
    #[error("Output exceeds {0} bytes")]
    OutputOverflow(usize),
}

const CODE_LENGTH_ORDER: [usize; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13,
];

/// Inflate zlib-wrapped data (2-byte header + DEFLATE + 4-byte Adler-32).
///
/// `limit` caps the decompressed size; WOFF always knows the expected
/// original length up front.
pub fn inflate_zlib(data: &[u8], limit: usize) -> Result<Vec<u8>, DeflateError> {
    if data.len() < 6 {
        return Err(DeflateError::InvalidHeader);
    }
    let cmf = data[0];
    let flg = data[1];
    if cmf & 0x0F != 8 || cmf >> 4 > 7 {
        return Err(DeflateError::InvalidHeader);
    }
    if ((cmf as u16) << 8 | flg as u16) % 31 != 0 {
        return Err(DeflateError::InvalidHeader);
    }
    // Preset dictionaries never occur in font data
    if flg & 0x20 != 0 {
        return Err(DeflateError::InvalidHeader);
    }

    let (body, trailer) = data[2..].split_at(data.len() - 6);
    let output = inflate_raw(body, limit)?;

    let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if stored != adler32(&output) {
        return Err(DeflateError::ChecksumMismatch);
    }
    Ok(output)
}

/// Inflate raw DEFLATE data (no header/trailer)
pub fn inflate_raw(data: &[u8], limit: usize) -> Result<Vec<u8>, DeflateError> {
    let mut reader = BitReader::new(data);
    let mut output = Vec::with_capacity(limit.min(data.len().saturating_mul(4)));

    loop {
        let bfinal = reader.read_bits(1)? == 1;
        match reader.read_bits(2)? {
            0 => inflate_stored(&mut reader, &mut output, limit)?,
            1 => {
                let (lit, dist) = fixed_trees()?;
                inflate_codes(&mut reader, &mut output, &lit, &dist, limit)?;
            }
            2 => {
                let (lit, dist) = dynamic_trees(&mut reader)?;
                inflate_codes(&mut reader, &mut output, &lit, &dist, limit)?;
            }
            _ => return Err(DeflateError::InvalidBlockType),
        }
        if bfinal {
            return Ok(output);
        }
    }
}

/// Adler-32 checksum
pub fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65521;
    // Largest n with 255n(n+1)/2 + (n+1)(MOD-1) < 2^32
    const NMAX: usize = 5552;
    let mut a = 1u32;
    let mut b = 0u32;
    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += byte as u32;
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

fn inflate_stored(reader: &mut BitReader, output: &mut Vec<u8>, limit: usize) -> Result<(), DeflateError> {
    reader.align_to_byte();
    let len = reader.read_u16_le()?;
    let nlen = reader.read_u16_le()?;
    if len != !nlen {
        return Err(DeflateError::InvalidLength);
    }
    if output.len() + len as usize > limit {
        return Err(DeflateError::OutputOverflow(limit));
    }
    let bytes = reader.read_bytes(len as usize)?;
    output.extend_from_slice(bytes);
    Ok(())
}

fn fixed_trees() -> Result<(HuffmanTree, HuffmanTree), DeflateError> {
    let mut lengths = [0u8; 288];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    Ok((HuffmanTree::from_lengths(&lengths)?, HuffmanTree::from_lengths(&[5u8; 30])?))
}

fn dynamic_trees(reader: &mut BitReader) -> Result<(HuffmanTree, HuffmanTree), DeflateError> {
    let hlit = reader.read_bits(5)? as usize + 257;
    let hdist = reader.read_bits(5)? as usize + 1;
    let hclen = reader.read_bits(4)? as usize + 4;

    let mut code_lengths = [0u8; 19];
    for &slot in CODE_LENGTH_ORDER.iter().take(hclen) {
        code_lengths[slot] = reader.read_bits(3)? as u8;
    }
    let code_length_tree = HuffmanTree::from_lengths(&code_lengths)?;

    let mut lengths = vec![0u8; hlit + hdist];
    let mut i = 0;
    while i < lengths.len() {
        let sym = code_length_tree.decode(reader)?;
        let (value, count) = match sym {
            0..=15 => (sym as u8, 1),
            16 => {
                let prev = *i.checked_sub(1).and_then(|p| lengths.get(p)).ok_or(DeflateError::InvalidHuffmanCode)?;
                (prev, reader.read_bits(2)? as usize + 3)
            }
            17 => (0, reader.read_bits(3)? as usize + 3),
            18 => (0, reader.read_bits(7)? as usize + 11),
            _ => return Err(DeflateError::InvalidHuffmanCode),
        };
        if i + count > lengths.len() {
            return Err(DeflateError::InvalidHuffmanCode);
        }
        lengths[i..i + count].fill(value);
        i += count;
    }
    if lengths[256] == 0 {
        // No end-of-block code
        return Err(DeflateError::InvalidHuffmanCode);
    }

    Ok((HuffmanTree::from_lengths(&lengths[..hlit])?, HuffmanTree::from_lengths(&lengths[hlit..])?))
}

fn inflate_codes(
    reader: &mut BitReader,
    output: &mut Vec<u8>,
    lit_len_tree: &HuffmanTree,
    dist_tree: &HuffmanTree,
    limit: usize,
) -> Result<(), DeflateError> {
    loop {
        let sym = lit_len_tree.decode(reader)?;
        if sym < 256 {
            if output.len() >= limit {
                return Err(DeflateError::OutputOverflow(limit));
            }
            output.push(sym as u8);
            continue;
        }
        if sym == 256 {
            return Ok(());
        }

        let len_idx = (sym - 257) as usize;
        if len_idx >= LENGTH_BASE.len() {
            return Err(DeflateError::InvalidLength);
        }
        let length = LENGTH_BASE[len_idx] as usize + reader.read_bits(LENGTH_EXTRA[len_idx] as usize)? as usize;

        let dist_sym = dist_tree.decode(reader)? as usize;
        if dist_sym >= DIST_BASE.len() {
            return Err(DeflateError::InvalidDistance);
        }
        let distance = DIST_BASE[dist_sym] as usize + reader.read_bits(DIST_EXTRA[dist_sym] as usize)? as usize;
        if distance > output.len() {
            return Err(DeflateError::InvalidDistance);
        }
        if output.len() + length > limit {
            return Err(DeflateError::OutputOverflow(limit));
        }

        // Byte-wise so overlapping matches repeat correctly
        let start = output.len() - distance;
        for k in 0..length {
            let byte = output[start + k];
            output.push(byte);
        }
    }
}

/// LSB-first bit reader for DEFLATE streams
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buffer: u32,
    bits_in_buffer: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, bit_buffer: 0, bits_in_buffer: 0 }
    }

    /// Fill the buffer up to `count` bits if input allows; returns bits available.
    fn fill(&mut self, count: usize) -> usize {
        while self.bits_in_buffer < count && self.pos < self.data.len() {
            self.bit_buffer |= (self.data[self.pos] as u32) << self.bits_in_buffer;
            self.pos += 1;
            self.bits_in_buffer += 8;
        }
        self.bits_in_buffer
    }

    fn read_bits(&mut self, count: usize) -> Result<u32, DeflateError> {
        if count == 0 {
            return Ok(0);
        }
        if self.fill(count) < count {
            return Err(DeflateError::UnexpectedEof);
        }
        let result = self.bit_buffer & ((1u32 << count) - 1);
        self.drop_bits(count);
        Ok(result)
    }

    /// Peek up to `count` bits; missing bits at end of input read as zero.
    fn peek_bits(&mut self, count: usize) -> (u32, usize) {
        let available = self.fill(count);
        (self.bit_buffer & ((1u32 << count) - 1), available)
    }

    fn drop_bits(&mut self, count: usize) {
        self.bit_buffer >>= count;
        self.bits_in_buffer -= count;
    }

    fn align_to_byte(&mut self) {
        let extra = self.bits_in_buffer % 8;
        self.drop_bits(extra);
    }

    /// Next whole byte, draining buffered bits first. Requires byte alignment.
    fn next_byte(&mut self) -> Result<u8, DeflateError> {
        if self.bits_in_buffer >= 8 {
            let byte = self.bit_buffer as u8;
            self.drop_bits(8);
            return Ok(byte);
        }
        let byte = *self.data.get(self.pos).ok_or(DeflateError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_u16_le(&mut self) -> Result<u16, DeflateError> {
        let lo = self.next_byte()?;
        let hi = self.next_byte()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DeflateError> {
        // Return any whole bytes still buffered to the input
        let buffered = self.bits_in_buffer / 8;
        self.pos -= buffered;
        self.bit_buffer = 0;
        self.bits_in_buffer = 0;

        let end = self.pos + count;
        let bytes = self.data.get(self.pos..end).ok_or(DeflateError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }
}

/// Table-driven canonical Huffman decoder
struct HuffmanTree {
    /// Indexed by bit-reversed code: (symbol, code length)
    table: Vec<(u16, u8)>,
    max_bits: usize,
}

impl HuffmanTree {
    fn from_lengths(lengths: &[u8]) -> Result<Self, DeflateError> {
        let max_bits = lengths.iter().copied().max().unwrap_or(0) as usize;
        if max_bits == 0 {
            // Permitted for an unused distance alphabet; decoding from it fails
            return Ok(Self { table: vec![(0, 0)], max_bits: 0 });
        }
        if max_bits > 15 {
            return Err(DeflateError::InvalidHuffmanCode);
        }

        let mut bl_count = [0u32; 16];
        for &len in lengths {
            if len > 0 {
                bl_count[len as usize] += 1;
            }
        }
        let mut next_code = [0u32; 16];
        let mut code = 0u32;
        for bits in 1..=max_bits {
            code = (code + bl_count[bits - 1]) << 1;
            next_code[bits] = code;
        }

        let table_size = 1usize << max_bits;
        let mut table = vec![(0u16, 0u8); table_size];
        for (sym, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let len = len as usize;
            let code = next_code[len];
            next_code[len] += 1;
            if code >= 1 << len {
                // Over-subscribed code
                return Err(DeflateError::InvalidHuffmanCode);
            }
            let mut idx = reverse_bits(code, len) as usize;
            while idx < table_size {
                table[idx] = (sym as u16, len as u8);
                idx += 1 << len;
            }
        }
        Ok(Self { table, max_bits })
    }

    fn decode(&self, reader: &mut BitReader) -> Result<u16, DeflateError> {
        if self.max_bits == 0 {
            return Err(DeflateError::InvalidHuffmanCode);
        }
        let (bits, available) = reader.peek_bits(self.max_bits);
        let (sym, len) = self.table[bits as usize];
        if len == 0 {
            return Err(DeflateError::InvalidHuffmanCode);
        }
        if len as usize > available {
            return Err(DeflateError::UnexpectedEof);
        }
        reader.drop_bits(len as usize);
        Ok(sym)
    }
}

fn reverse_bits(value: u32, bits: usize) -> u32 {
    value.reverse_bits() >> (32 - bits)
}

/// Wrap `data` in a zlib stream made of stored blocks.
///
/// Used when writing WOFF files in tests; real encoders compress.
#[cfg(any(test, feature = "test-util"))]
pub fn zlib_stored(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x78, 0x01];
    let mut chunks = data.chunks(0xFFFF).peekable();
    if chunks.peek().is_none() {
        out.extend_from_slice(&[0x01, 0x00, 0x00, 0xFF, 0xFF]);
    }
    while let Some(chunk) = chunks.next() {
        out.push(if chunks.peek().is_none() { 1 } else { 0 });
        let len = chunk.len() as u16;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&adler32(data).to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// zlib level 9 of "hello hello hello hello" (fixed Huffman block)
    const FIXED: [u8; 16] = [
        0x78, 0xda, 0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x57, 0xc8, 0x40, 0x27, 0x01, 0x68, 0x03, 0x08, 0xb1,
    ];

    /// zlib level 9 of a pangram paragraph (dynamic Huffman block)
    const DYNAMIC: [u8; 118] = [
        0x78, 0xda, 0xb5, 0xcb, 0xd7, 0x19, 0x83, 0x20, 0x00, 0x45, 0xe1, 0x55, 0x6e, 0x16, 0xc8, 0x97,
        0x62, 0xda, 0x16, 0x79, 0x70, 0x01, 0x50, 0x9a, 0x52, 0xa4, 0x89, 0x30, 0x7d, 0x58, 0x22, 0xcf,
        0xe7, 0x3f, 0xa3, 0x64, 0xf0, 0x59, 0x4d, 0x2b, 0x68, 0x70, 0xc5, 0x82, 0xbb, 0x03, 0x4b, 0x36,
        0x5b, 0x84, 0xdb, 0x59, 0x40, 0xea, 0x59, 0x93, 0x56, 0x31, 0x3b, 0x71, 0xc6, 0xf8, 0x37, 0xfc,
        0x25, 0xdd, 0x99, 0x0a, 0xda, 0x51, 0x51, 0x49, 0x82, 0xab, 0x9d, 0xf5, 0xd4, 0x98, 0x85, 0x56,
        0x3e, 0xbb, 0xd0, 0x5f, 0x11, 0x4f, 0xb8, 0x5c, 0x6f, 0xf7, 0xe1, 0xf1, 0x7c, 0xbd, 0x3f, 0x20,
        0x74, 0x9a, 0x19, 0x17, 0x52, 0x2d, 0xab, 0x36, 0xd6, 0x6d, 0x3e, 0xc4, 0x94, 0xf7, 0x72, 0xd4,
        0xf6, 0x03, 0xe8, 0x64, 0x4c, 0x6c,
    ];

    fn pangram() -> Vec<u8> {
        let mut text = "The quick brown fox jumps over the lazy dog. ".repeat(3);
        text.push_str("Pack my box with five dozen liquor jugs! 0123456789 abcdefghijklmnopqrstuvwxyz");
        text.into_bytes()
    }

    #[test]
    fn test_inflate_stored() {
        let data = [
            0b00000001, // bfinal=1, btype=00
            0x04, 0x00, // LEN = 4
            0xFB, 0xFF, // NLEN = ~4
            b't', b'e', b's', b't',
        ];
        assert_eq!(inflate_raw(&data, 16).unwrap(), b"test");
    }

    #[test]
    fn test_inflate_fixed_block() {
        assert_eq!(inflate_zlib(&FIXED, 1024).unwrap(), b"hello hello hello hello");
    }

    #[test]
    fn test_inflate_dynamic_block() {
        let expected = pangram();
        assert_eq!(expected.len(), 213);
        assert_eq!(inflate_zlib(&DYNAMIC, 1024).unwrap(), expected);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut data = FIXED;
        data[15] ^= 0xFF;
        assert_eq!(inflate_zlib(&data, 1024), Err(DeflateError::ChecksumMismatch));
    }

    #[test]
    fn test_output_limit() {
        assert_eq!(inflate_zlib(&FIXED, 10), Err(DeflateError::OutputOverflow(10)));
    }

    #[test]
    fn test_zlib_header_check() {
        assert_eq!(inflate_zlib(&[0x78], 16), Err(DeflateError::InvalidHeader));
        assert_eq!(inflate_zlib(&[0x78, 0x9D, 0, 0, 0, 0], 16), Err(DeflateError::InvalidHeader));
    }

    #[test]
    fn test_stored_writer_round_trip() {
        let data: Vec<u8> = (0..70_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let packed = zlib_stored(&data);
        assert_eq!(inflate_zlib(&packed, data.len()).unwrap(), data);
        assert_eq!(inflate_zlib(&zlib_stored(&[]), 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_adler32_known_value() {
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }
}
