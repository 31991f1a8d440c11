//! Bag-of-cells serialization.
//!
//! # Layout written by [`serialize`]
//!
//! ```text
//! b5ee9c72                      magic
//! flags|size                    0x40 (crc32c) | bytes per cell index
//! off_bytes                     bytes for the total data size
//! cells, roots, absent          `size` bytes each (roots = 1, absent = 0)
//! tot_cells_size                `off_bytes` bytes
//! root index                    `size` bytes (always 0)
//! cell data                     d1 d2 data ref-indices, parents before children
//! crc32c                        little endian, over everything above
//! ```
//!
//! [`deserialize`] also accepts payloads with an offset index, without a
//! checksum, or with several roots (the first one wins).

use std::collections::HashSet;
use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use crc::{Crc, CRC_32_ISCSI};

use crate::cell::{BitString, Cell};
use crate::error::CodecError;

const MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];
const FLAG_HAS_INDEX: u8 = 0x80;
const FLAG_HAS_CRC: u8 = 0x40;
const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

// ---------------------------------------------------------------------------
// Boc
// ---------------------------------------------------------------------------

/// Serialized bag of cells, convertible to either display encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boc(Vec<u8>);

impl Boc {
    pub fn from_cell(root: &Arc<Cell>) -> Self {
        Boc(serialize(root))
    }

    /// Parse hex or base64 payload text.
    pub fn from_text(text: &str) -> Result<Self, CodecError> {
        Ok(Boc(decode_payload_text(text)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn root(&self) -> Result<Arc<Cell>, CodecError> {
        deserialize(&self.0)
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Standard alphabet, padded.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

/// Decode payload text as hex when it looks like hex, otherwise as base64
/// (standard or URL-safe, padding optional). Whitespace is ignored.
pub fn decode_payload_text(text: &str) -> Result<Vec<u8>, CodecError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(CodecError::Payload("payload is empty".to_string()));
    }
    if compact.len() % 2 == 0 && compact.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex::decode(&compact).map_err(|e| CodecError::Payload(e.to_string()));
    }
    for engine in [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD] {
        if let Ok(bytes) = engine.decode(&compact) {
            return Ok(bytes);
        }
    }
    Err(CodecError::Payload(
        "expected hex or base64 encoded bag of cells".to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Serialize
// ---------------------------------------------------------------------------

/// Serialize a single-root bag of cells with a CRC32-C trailer.
pub fn serialize(root: &Arc<Cell>) -> Vec<u8> {
    let order = topological_order(root);
    let index: std::collections::HashMap<[u8; 32], usize> = order
        .iter()
        .enumerate()
        .map(|(i, c)| (c.hash(), i))
        .collect();

    let size = bytes_for(order.len());
    let mut data = Vec::new();
    for cell in &order {
        data.extend_from_slice(&cell.descriptors());
        data.extend_from_slice(&cell.bits().padded_bytes());
        for r in cell.refs() {
            write_uint(&mut data, index[&r.hash()], size);
        }
    }
    let off_bytes = bytes_for(data.len());

    let mut out = Vec::with_capacity(data.len() + 32);
    out.extend_from_slice(&MAGIC);
    out.push(FLAG_HAS_CRC | size as u8);
    out.push(off_bytes as u8);
    write_uint(&mut out, order.len(), size);
    write_uint(&mut out, 1, size);
    write_uint(&mut out, 0, size);
    write_uint(&mut out, data.len(), off_bytes);
    write_uint(&mut out, 0, size);
    out.extend_from_slice(&data);
    let crc = CASTAGNOLI.checksum(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Unique cells, parents before children, siblings in reference order.
fn topological_order(root: &Arc<Cell>) -> Vec<Arc<Cell>> {
    fn visit(cell: &Arc<Cell>, seen: &mut HashSet<[u8; 32]>, post: &mut Vec<Arc<Cell>>) {
        if !seen.insert(cell.hash()) {
            return;
        }
        for r in cell.refs().iter().rev() {
            visit(r, seen, post);
        }
        post.push(Arc::clone(cell));
    }

    let mut seen = HashSet::new();
    let mut post = Vec::new();
    visit(root, &mut seen, &mut post);
    post.reverse();
    post
}

fn bytes_for(value: usize) -> usize {
    let bits = usize::BITS - value.leading_zeros();
    (bits as usize).div_ceil(8).max(1)
}

fn write_uint(out: &mut Vec<u8>, value: usize, bytes: usize) {
    for shift in (0..bytes).rev() {
        out.push((value >> (shift * 8)) as u8);
    }
}

// ---------------------------------------------------------------------------
// Deserialize
// ---------------------------------------------------------------------------

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.bytes.len());
        let Some(end) = end else {
            return Err(CodecError::Boc(format!(
                "truncated: need {n} bytes at offset {}, have {}",
                self.pos,
                self.bytes.len() - self.pos
            )));
        };
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn uint(&mut self, n: usize) -> Result<usize, CodecError> {
        Ok(self
            .take(n)?
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
    }
}

struct RawCell {
    bits: BitString,
    refs: Vec<usize>,
}

/// Parse a bag of cells and return its first root.
pub fn deserialize(bytes: &[u8]) -> Result<Arc<Cell>, CodecError> {
    let mut r = Reader { bytes, pos: 0 };
    if r.take(4)? != MAGIC {
        return Err(CodecError::Boc("unknown magic prefix".to_string()));
    }
    let flags = r.byte()?;
    let size = usize::from(flags & 0x07);
    if !(1..=4).contains(&size) {
        return Err(CodecError::Boc(format!("invalid reference size {size}")));
    }
    let off_bytes = usize::from(r.byte()?);
    if !(1..=8).contains(&off_bytes) {
        return Err(CodecError::Boc(format!("invalid offset size {off_bytes}")));
    }
    let cell_count = r.uint(size)?;
    let root_count = r.uint(size)?;
    let absent = r.uint(size)?;
    let total_size = r.uint(off_bytes)?;
    if cell_count == 0 || root_count == 0 {
        return Err(CodecError::Boc("no cells or no roots".to_string()));
    }
    if absent != 0 {
        return Err(CodecError::Boc("absent cells are not supported".to_string()));
    }
    // Every root index takes `size` bytes and every cell at least two
    // descriptor bytes; counts the input cannot hold are rejected before
    // anything is allocated.
    let remaining = r.remaining();
    if root_count.saturating_mul(size) > remaining {
        return Err(CodecError::Boc(format!(
            "header declares {root_count} roots but only {remaining} bytes follow"
        )));
    }
    if cell_count.saturating_mul(2) > remaining {
        return Err(CodecError::Boc(format!(
            "header declares {cell_count} cells but only {remaining} bytes follow"
        )));
    }
    let mut roots = Vec::with_capacity(root_count);
    for _ in 0..root_count {
        roots.push(r.uint(size)?);
    }
    if flags & FLAG_HAS_INDEX != 0 {
        r.take(cell_count.saturating_mul(off_bytes))?;
    }
    let data_start = r.pos;
    let mut raw = Vec::with_capacity(cell_count);
    for i in 0..cell_count {
        let d1 = r.byte()?;
        let d2 = r.byte()?;
        if d1 & 0x08 != 0 {
            return Err(CodecError::Boc(format!("cell {i} is exotic; exotic cells are not supported")));
        }
        if d1 & 0x10 != 0 {
            return Err(CodecError::Boc(format!("cell {i} carries stored hashes; not supported")));
        }
        let ref_count = usize::from(d1 & 0x07);
        if ref_count > 4 {
            return Err(CodecError::Boc(format!("cell {i} declares {ref_count} references")));
        }
        let data_len = usize::from(d2).div_ceil(2);
        let data = r.take(data_len)?;
        let bits = BitString::from_padded(data, d2 % 2 == 1)?;
        let mut refs = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let target = r.uint(size)?;
            if target <= i || target >= cell_count {
                return Err(CodecError::Boc(format!(
                    "cell {i} references invalid index {target}"
                )));
            }
            refs.push(target);
        }
        raw.push(RawCell { bits, refs });
    }
    if r.pos - data_start != total_size {
        return Err(CodecError::Boc(format!(
            "cell data is {} bytes, header declares {total_size}",
            r.pos - data_start
        )));
    }
    if flags & FLAG_HAS_CRC != 0 {
        let body_end = r.pos;
        let stored = r.take(4)?;
        let expected = CASTAGNOLI.checksum(&bytes[..body_end]).to_le_bytes();
        if stored != expected {
            return Err(CodecError::Boc("crc32c checksum mismatch".to_string()));
        }
    }

    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for (i, raw_cell) in raw.into_iter().enumerate().rev() {
        let refs = raw_cell
            .refs
            .iter()
            .map(|&t| built[t].clone().ok_or_else(|| CodecError::Boc(format!("cell {t} unresolved"))))
            .collect::<Result<Vec<_>, _>>()?;
        built[i] = Some(Arc::new(Cell::new(raw_cell.bits, refs)?));
    }
    let root = roots[0];
    built
        .get(root)
        .cloned()
        .flatten()
        .ok_or_else(|| CodecError::Boc(format!("root index {root} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellBuilder;

    fn foo_cell(x: u128) -> Arc<Cell> {
        let mut b = CellBuilder::new();
        b.store_uint(x, 32).unwrap();
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn single_cell_matches_reference_encoding() {
        let boc = Boc::from_cell(&foo_cell(42));
        assert_eq!(boc.to_base64(), "te6cckEBAQEABgAACAAAACoFpvBE");
        assert_eq!(boc.to_hex(), "b5ee9c724101010100060000080000002a05a6f044");
    }

    #[test]
    fn parses_reference_payload() {
        let root = Boc::from_text("te6cckEBAQEABgAACAAAAEmTxmY2").unwrap().root().unwrap();
        assert_eq!(root.slice().load_uint(32).unwrap(), 73);
    }

    #[test]
    fn hex_and_base64_decode_to_same_bytes() {
        let a = decode_payload_text("te6cckEBAQEABgAACAAAACoFpvBE").unwrap();
        let b = decode_payload_text("b5ee9c724101010100060000080000002a05a6f044").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn whitespace_inside_payload_is_ignored() {
        let bytes = decode_payload_text("  b5ee9c72 41010101\n00060000080000002a05a6f044 ").unwrap();
        assert_eq!(bytes.len(), 21);
    }

    #[test]
    fn garbage_text_is_rejected() {
        let err = decode_payload_text("invalid-base64-string!@#").unwrap_err();
        assert!(matches!(err, CodecError::Payload(_)), "got: {err}");
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bytes = Boc::from_cell(&foo_cell(42)).as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = deserialize(&bytes).unwrap_err();
        assert_eq!(err.to_string(), "invalid BoC: crc32c checksum mismatch");
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = Boc::from_cell(&foo_cell(42)).as_bytes().to_vec();
        let err = deserialize(&bytes[..12]).unwrap_err();
        assert!(err.to_string().contains("truncated"), "got: {err}");
    }

    #[test]
    fn oversized_root_count_is_rejected_before_allocating() {
        let bytes = hex::decode("b5ee9c720401ffffffffffffffff0000000000").unwrap();
        let err = deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("4294967295 roots"), "got: {err}");
    }

    #[test]
    fn oversized_cell_count_is_rejected_before_allocating() {
        let bytes = hex::decode("b5ee9c720401ffffffff00000001000000000000000000").unwrap();
        let err = deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("4294967295 cells"), "got: {err}");
    }

    #[test]
    fn shared_children_are_stored_once() {
        let leaf = foo_cell(7);
        let mut b = CellBuilder::new();
        b.store_ref(Arc::clone(&leaf)).unwrap().store_ref(leaf).unwrap();
        let root = Arc::new(b.build().unwrap());
        let bytes = serialize(&root);
        // cells count follows the 0x41 flags byte and the off_bytes byte
        assert_eq!(bytes[6], 2);
        let parsed = deserialize(&bytes).unwrap();
        assert_eq!(parsed.hash(), root.hash());
    }

    #[test]
    fn tree_survives_serialization() {
        let mut inner = CellBuilder::new();
        inner.store_uint(1, 1).unwrap().store_ref(foo_cell(3)).unwrap();
        let inner = Arc::new(inner.build().unwrap());
        let mut b = CellBuilder::new();
        b.store_uint(0xab, 8).unwrap().store_ref(inner).unwrap().store_ref(foo_cell(9)).unwrap();
        let root = Arc::new(b.build().unwrap());

        let parsed = deserialize(&serialize(&root)).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(parsed.refs()[1].slice().load_uint(32).unwrap(), 9);
    }
}
