//! WOFF 1.0 decoder
//!
//! Inflates each zlib-compressed table and re-frames the result as a plain
//! sfnt buffer with recomputed checksums and 4-byte aligned table offsets.

use crate::reader::{slice, FontReader};
use crate::{inflate, tag_to_string, FontError, Result};

/// WOFF signature 'wOFF'
pub const WOFF_SIGNATURE: u32 = 0x774F_4646;

const WOFF_HEADER_SIZE: usize = 44;
const WOFF_ENTRY_SIZE: usize = 20;

/// WOFF table directory entry
#[derive(Debug, Clone, Copy)]
struct WoffTableEntry {
    tag: [u8; 4],
    offset: u32,
    comp_length: u32,
    orig_length: u32,
}

/// Is this buffer a WOFF 1.0 file?
pub fn is_woff(data: &[u8]) -> bool {
    data.len() >= 4 && u32::from_be_bytes([data[0], data[1], data[2], data[3]]) == WOFF_SIGNATURE
}

/// Decode WOFF1 to a raw OpenType/TrueType buffer
pub fn decode_woff(data: &[u8]) -> Result<Vec<u8>> {
    let mut reader = FontReader::new(data);

    let signature = reader.read_u32()?;
    if signature != WOFF_SIGNATURE {
        return Err(FontError::InvalidMagic(signature));
    }
    let flavor = reader.read_u32()?;
    let length = reader.read_u32()?;
    let num_tables = reader.read_u16()?;
    let _reserved = reader.read_u16()?;
    let total_sfnt_size = reader.read_u32()?;
    // version, metadata and private blocks carry nothing the parser needs
    reader.set_pos(WOFF_HEADER_SIZE)?;

    if length as usize != data.len() {
        tracing::debug!("WOFF header length {} differs from buffer size {}", length, data.len());
    }

    let mut tables = Vec::with_capacity(num_tables as usize);
    for _ in 0..num_tables {
        let entry = WoffTableEntry {
            tag: reader.read_tag()?,
            offset: reader.read_u32()?,
            comp_length: reader.read_u32()?,
            orig_length: reader.read_u32()?,
        };
        let _orig_checksum = reader.read_u32()?;

        let payload = slice(data, entry.offset as usize, entry.comp_length as usize)?;
        let table = if entry.comp_length < entry.orig_length {
            inflate::inflate_zlib(payload, entry.orig_length as usize)?
        } else if entry.comp_length == entry.orig_length {
            payload.to_vec()
        } else {
            return Err(FontError::Malformed("WOFF table longer than its original"));
        };
        if table.len() != entry.orig_length as usize {
            return Err(FontError::LengthMismatch {
                tag: tag_to_string(entry.tag),
                expected: entry.orig_length,
                actual: table.len() as u32,
            });
        }
        tables.push((entry.tag, table));
    }

    let sfnt = build_sfnt(flavor, tables);
    if sfnt.len() != total_sfnt_size as usize {
        tracing::debug!("WOFF totalSfntSize {} differs from rebuilt size {}", total_sfnt_size, sfnt.len());
    }
    tracing::debug!("Decoded WOFF: {} tables, {} bytes", num_tables, sfnt.len());
    Ok(sfnt)
}

/// OpenType table checksum: sum of big-endian u32 words, zero padded
pub fn table_checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

/// Assemble an sfnt buffer from (tag, data) pairs.
///
/// Records are sorted by tag, tables are 4-byte aligned, checksums are
/// recomputed and `head.checkSumAdjustment` is rewritten.
pub fn build_sfnt(flavor: u32, mut tables: Vec<([u8; 4], Vec<u8>)>) -> Vec<u8> {
    tables.sort_by(|a, b| a.0.cmp(&b.0));
    let num_tables = tables.len() as u16;

    let entry_selector = if num_tables == 0 { 0 } else { 15 - num_tables.leading_zeros() as u16 };
    let search_range = (1u16 << entry_selector) * 16;
    let range_shift = (num_tables * 16).saturating_sub(search_range);

    let header_size = 12 + tables.len() * 16;
    let mut output = Vec::with_capacity(header_size + tables.iter().map(|t| padded(t.1.len())).sum::<usize>());
    output.extend_from_slice(&flavor.to_be_bytes());
    output.extend_from_slice(&num_tables.to_be_bytes());
    output.extend_from_slice(&search_range.to_be_bytes());
    output.extend_from_slice(&entry_selector.to_be_bytes());
    output.extend_from_slice(&range_shift.to_be_bytes());

    let mut offset = header_size;
    let mut head_offset = None;
    for (tag, data) in &tables {
        if tag == b"head" {
            head_offset = Some(offset);
        }
        let checksum = if tag == b"head" && data.len() >= 12 {
            let mut zeroed = data.clone();
            zeroed[8..12].fill(0);
            table_checksum(&zeroed)
        } else {
            table_checksum(data)
        };
        output.extend_from_slice(tag);
        output.extend_from_slice(&checksum.to_be_bytes());
        output.extend_from_slice(&(offset as u32).to_be_bytes());
        output.extend_from_slice(&(data.len() as u32).to_be_bytes());
        offset += padded(data.len());
    }
    for (_, data) in &tables {
        output.extend_from_slice(data);
        output.resize(padded(output.len()), 0);
    }

    if let Some(head) = head_offset.filter(|&h| h + 12 <= output.len()) {
        output[head + 8..head + 12].fill(0);
        let adjustment = 0xB1B0_AFBAu32.wrapping_sub(table_checksum(&output));
        output[head + 8..head + 12].copy_from_slice(&adjustment.to_be_bytes());
    }
    output
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Wrap an sfnt buffer as WOFF with zlib stored-block payloads.
#[cfg(any(test, feature = "test-util"))]
pub fn encode_woff(sfnt: &[u8]) -> Result<Vec<u8>> {
    let mut reader = FontReader::new(sfnt);
    let flavor = reader.read_u32()?;
    let num_tables = reader.read_u16()?;
    reader.skip(6)?;

    let mut entries = Vec::with_capacity(num_tables as usize);
    for _ in 0..num_tables {
        let tag = reader.read_tag()?;
        let checksum = reader.read_u32()?;
        let offset = reader.read_u32()? as usize;
        let length = reader.read_u32()? as usize;
        let table = slice(sfnt, offset, length)?;
        let compressed = inflate::zlib_stored(table);
        // Tables stay uncompressed unless compression helps
        let payload = if compressed.len() < table.len() { compressed } else { table.to_vec() };
        entries.push(WoffPayload { tag, checksum, orig_length: length as u32, payload });
    }
    Ok(assemble_woff(flavor, sfnt.len() as u32, &entries))
}

/// One table as stored in a WOFF body
#[cfg(any(test, feature = "test-util"))]
pub struct WoffPayload {
    pub tag: [u8; 4],
    pub checksum: u32,
    pub orig_length: u32,
    pub payload: Vec<u8>,
}

/// Lay out a WOFF header, directory and 4-byte aligned body.
#[cfg(any(test, feature = "test-util"))]
pub fn assemble_woff(flavor: u32, total_sfnt_size: u32, entries: &[WoffPayload]) -> Vec<u8> {
    let body_start = WOFF_HEADER_SIZE + entries.len() * WOFF_ENTRY_SIZE;
    let mut directory = Vec::new();
    let mut body = Vec::new();
    for entry in entries {
        directory.extend_from_slice(&entry.tag);
        directory.extend_from_slice(&((body_start + body.len()) as u32).to_be_bytes());
        directory.extend_from_slice(&(entry.payload.len() as u32).to_be_bytes());
        directory.extend_from_slice(&entry.orig_length.to_be_bytes());
        directory.extend_from_slice(&entry.checksum.to_be_bytes());
        body.extend_from_slice(&entry.payload);
        body.resize(padded(body.len()), 0);
    }

    let total = body_start + body.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&WOFF_SIGNATURE.to_be_bytes());
    out.extend_from_slice(&flavor.to_be_bytes());
    out.extend_from_slice(&(total as u32).to_be_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&total_sfnt_size.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    // No metadata or private block
    out.extend_from_slice(&[0u8; 20]);
    out.extend_from_slice(&directory);
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_table() -> Vec<u8> {
        let mut head = vec![0u8; 54];
        head[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
        head[18..20].copy_from_slice(&1000u16.to_be_bytes());
        head
    }

    #[test]
    fn test_checksum_padding() {
        assert_eq!(table_checksum(&[0, 0, 0, 1, 0x80]), 1 + 0x8000_0000);
    }

    #[test]
    fn test_build_sfnt_alignment_and_adjustment() {
        let sfnt = build_sfnt(0x0001_0000, vec![(*b"zzzz", vec![1, 2, 3]), (*b"head", head_table())]);
        // Directory sorted by tag
        assert_eq!(&sfnt[12..16], b"head");
        assert_eq!(&sfnt[28..32], b"zzzz");
        let head_offset = u32::from_be_bytes([sfnt[20], sfnt[21], sfnt[22], sfnt[23]]) as usize;
        let zzzz_offset = u32::from_be_bytes([sfnt[36], sfnt[37], sfnt[38], sfnt[39]]) as usize;
        assert_eq!(head_offset % 4, 0);
        assert_eq!(zzzz_offset, head_offset + 56);
        assert_eq!(sfnt.len() % 4, 0);
        assert_eq!(table_checksum(&sfnt), 0xB1B0_AFBA);
    }

    #[test]
    fn test_woff_round_trip() {
        let big = (0..400u32).map(|i| (i % 3) as u8).collect::<Vec<_>>();
        let sfnt = build_sfnt(0x0001_0000, vec![(*b"head", head_table()), (*b"blob", big.clone())]);
        let woff = encode_woff(&sfnt).unwrap();
        assert!(is_woff(&woff));
        let decoded = decode_woff(&woff).unwrap();
        assert_eq!(decoded, sfnt);
    }

    #[test]
    fn test_woff_inflates_compressed_table() {
        // zlib level 9 of "hello hello hello hello"
        let compressed = vec![
            0x78, 0xda, 0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x57, 0xc8, 0x40, 0x27, 0x01, 0x68, 0x03, 0x08, 0xb1,
        ];
        let text = b"hello hello hello hello".to_vec();
        let woff = assemble_woff(
            0x0001_0000,
            0,
            &[WoffPayload { tag: *b"text", checksum: 0, orig_length: text.len() as u32, payload: compressed }],
        );
        let decoded = decode_woff(&woff).unwrap();
        let expected = build_sfnt(0x0001_0000, vec![(*b"text", text)]);
        assert_eq!(decoded, expected);
        assert_eq!(&decoded[28..51], b"hello hello hello hello");
    }

    #[test]
    fn test_length_mismatch() {
        let compressed = vec![
            0x78, 0xda, 0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x57, 0xc8, 0x40, 0x27, 0x01, 0x68, 0x03, 0x08, 0xb1,
        ];
        let woff = assemble_woff(
            0x0001_0000,
            0,
            &[WoffPayload { tag: *b"text", checksum: 0, orig_length: 40, payload: compressed }],
        );
        assert!(matches!(decode_woff(&woff), Err(FontError::LengthMismatch { expected: 40, actual: 23, .. })));
    }

    #[test]
    fn test_rejects_non_woff() {
        assert_eq!(decode_woff(b"OTTO\0\0\0\0"), Err(FontError::InvalidMagic(0x4F54_544F)));
    }

    #[test]
    fn test_truncated_payload() {
        let sfnt = build_sfnt(0x0001_0000, vec![(*b"head", head_table())]);
        let mut woff = encode_woff(&sfnt).unwrap();
        woff.truncate(woff.len() - 8);
        assert_eq!(decode_woff(&woff), Err(FontError::UnexpectedEof));
    }
}
