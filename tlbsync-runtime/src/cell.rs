//! Cell model: bit strings, immutable cells, builders and read cursors.
//!
//! A cell holds at most [`MAX_BITS`] data bits and [`MAX_REFS`] references.
//! Only ordinary (non-exotic, level 0) cells are modelled.

use std::fmt;
use std::sync::{Arc, OnceLock};

use sha2::{Digest, Sha256};

use crate::error::CodecError;

pub const MAX_BITS: usize = 1023;
pub const MAX_REFS: usize = 4;

/// Widest integer a builder or slice moves in one call.
pub const MAX_INT_BITS: usize = 128;

// ---------------------------------------------------------------------------
// BitString
// ---------------------------------------------------------------------------

/// Growable sequence of bits, most significant bit first within each byte.
///
/// Unused trailing bits of the last byte are always zero.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitString {
    bytes: Vec<u8>,
    len: usize,
}

impl BitString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        BitString {
            bytes: bytes.to_vec(),
            len: bytes.len() * 8,
        }
    }

    /// Parse a string of `0`/`1` characters.
    pub fn from_binary_str(s: &str) -> Option<Self> {
        let mut bits = BitString::new();
        for c in s.chars() {
            match c {
                '0' => bits.push(false),
                '1' => bits.push(true),
                _ => return None,
            }
        }
        Some(bits)
    }

    /// Parse hex digits with an optional trailing `_` completion tag
    /// (`8_` is the single bit `1`).
    pub fn from_hex_tag(s: &str) -> Option<Self> {
        let (digits, completed) = match s.strip_suffix('_') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let mut bits = BitString::new();
        for c in digits.chars() {
            let nibble = c.to_digit(16)?;
            for shift in (0..4).rev() {
                bits.push((nibble >> shift) & 1 == 1);
            }
        }
        if completed {
            while bits.len > 0 && !bits.get(bits.len - 1) {
                bits.truncate(bits.len - 1);
            }
            if bits.len == 0 {
                return None;
            }
            bits.truncate(bits.len - 1);
        }
        Some(bits)
    }

    /// Recover bits from cell data written with a completion tag.
    pub fn from_padded(bytes: &[u8], completed: bool) -> Result<Self, CodecError> {
        let mut bits = BitString::from_bytes(bytes);
        if completed {
            let last = bytes
                .last()
                .copied()
                .ok_or_else(|| CodecError::Boc("empty data with completion tag".to_string()))?;
            if last == 0 {
                return Err(CodecError::Boc("completion tag missing in last data byte".to_string()));
            }
            let trailing = last.trailing_zeros() as usize;
            bits.truncate(bits.len - trailing - 1);
        }
        Ok(bits)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.len % 8 == 0
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        (self.bytes[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            self.bytes[self.len / 8] |= 1 << (7 - self.len % 8);
        }
        self.len += 1;
    }

    pub fn extend(&mut self, other: &BitString) {
        for i in 0..other.len {
            self.push(other.get(i));
        }
    }

    fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        self.len = len;
        self.bytes.truncate(len.div_ceil(8));
        if len % 8 != 0 {
            let mask = 0xffu8 << (8 - len % 8);
            if let Some(last) = self.bytes.last_mut() {
                *last &= mask;
            }
        }
    }

    /// Raw bytes; trailing bits of a partial last byte are zero.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes with the completion tag appended when not byte aligned.
    pub fn padded_bytes(&self) -> Vec<u8> {
        let mut out = self.bytes.clone();
        if self.len % 8 != 0 {
            let last = out.len() - 1;
            out[last] |= 1 << (7 - self.len % 8);
        }
        out
    }

    pub fn to_binary_string(&self) -> String {
        (0..self.len).map(|i| if self.get(i) { '1' } else { '0' }).collect()
    }

    pub fn starts_with(&self, prefix: &BitString) -> bool {
        prefix.len <= self.len && (0..prefix.len).all(|i| self.get(i) == prefix.get(i))
    }
}

impl fmt::Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitString({}:{})", self.len, self.to_binary_string())
    }
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// An ordinary cell.
pub struct Cell {
    bits: BitString,
    refs: Vec<Arc<Cell>>,
    meta: OnceLock<(u16, [u8; 32])>,
}

impl Cell {
    pub fn new(bits: BitString, refs: Vec<Arc<Cell>>) -> Result<Self, CodecError> {
        if bits.len() > MAX_BITS {
            return Err(CodecError::CellOverflow(format!(
                "{} bits exceed the {MAX_BITS}-bit limit",
                bits.len()
            )));
        }
        if refs.len() > MAX_REFS {
            return Err(CodecError::CellOverflow(format!(
                "{} references exceed the {MAX_REFS}-reference limit",
                refs.len()
            )));
        }
        Ok(Cell {
            bits,
            refs,
            meta: OnceLock::new(),
        })
    }

    pub fn empty() -> Self {
        Cell {
            bits: BitString::new(),
            refs: Vec::new(),
            meta: OnceLock::new(),
        }
    }

    pub fn bits(&self) -> &BitString {
        &self.bits
    }

    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    /// `d1` (reference count) and `d2` (data length descriptor).
    pub fn descriptors(&self) -> [u8; 2] {
        let len = self.bits.len();
        let d2 = len.div_ceil(8) + len / 8;
        [self.refs.len() as u8, d2 as u8]
    }

    pub fn depth(&self) -> u16 {
        self.meta().0
    }

    /// SHA-256 representation hash.
    pub fn hash(&self) -> [u8; 32] {
        self.meta().1
    }

    fn meta(&self) -> &(u16, [u8; 32]) {
        self.meta.get_or_init(|| {
            let depth = self
                .refs
                .iter()
                .map(|r| r.depth() + 1)
                .max()
                .unwrap_or(0);
            let mut hasher = Sha256::new();
            hasher.update(self.descriptors());
            hasher.update(self.bits.padded_bytes());
            for r in &self.refs {
                hasher.update(r.depth().to_be_bytes());
            }
            for r in &self.refs {
                hasher.update(r.hash());
            }
            (depth, hasher.finalize().into())
        })
    }

    pub fn slice(&self) -> CellSlice<'_> {
        CellSlice {
            cell: self,
            bit_pos: 0,
            ref_pos: 0,
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("bits", &self.bits)
            .field("refs", &self.refs)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CellBuilder
// ---------------------------------------------------------------------------

/// Append-only writer producing a [`Cell`].
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    bits: BitString,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    fn reserve(&self, bits: usize) -> Result<(), CodecError> {
        if self.bits.len() + bits > MAX_BITS {
            return Err(CodecError::CellOverflow(format!(
                "cannot store {bits} more bits after {}",
                self.bits.len()
            )));
        }
        Ok(())
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, CodecError> {
        self.reserve(1)?;
        self.bits.push(bit);
        Ok(self)
    }

    pub fn store_bits(&mut self, bits: &BitString) -> Result<&mut Self, CodecError> {
        self.reserve(bits.len())?;
        self.bits.extend(bits);
        Ok(self)
    }

    pub fn store_uint(&mut self, value: u128, width: usize) -> Result<&mut Self, CodecError> {
        check_width(width)?;
        if width < MAX_INT_BITS && value >> width != 0 {
            return Err(CodecError::Encode(format!(
                "value {value} does not fit in {width} unsigned bits"
            )));
        }
        self.reserve(width)?;
        for shift in (0..width).rev() {
            self.bits.push((value >> shift) & 1 == 1);
        }
        Ok(self)
    }

    pub fn store_int(&mut self, value: i128, width: usize) -> Result<&mut Self, CodecError> {
        check_width(width)?;
        let fits = match width {
            0 => value == 0,
            MAX_INT_BITS => true,
            w => {
                let bound = 1i128 << (w - 1);
                (-bound..bound).contains(&value)
            }
        };
        if !fits {
            return Err(CodecError::Encode(format!(
                "value {value} does not fit in {width} signed bits"
            )));
        }
        self.reserve(width)?;
        let raw = value as u128;
        for shift in (0..width).rev() {
            self.bits.push((raw >> shift) & 1 == 1);
        }
        Ok(self)
    }

    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self, CodecError> {
        if self.refs.len() >= MAX_REFS {
            return Err(CodecError::CellOverflow(format!(
                "cannot store more than {MAX_REFS} references"
            )));
        }
        self.refs.push(cell);
        Ok(self)
    }

    /// Copy the unread bits and references of `slice`.
    pub fn store_slice(&mut self, slice: &CellSlice<'_>) -> Result<&mut Self, CodecError> {
        let mut rest = *slice;
        let bits = rest.load_bits(rest.remaining_bits())?;
        self.store_bits(&bits)?;
        while rest.remaining_refs() > 0 {
            let r = rest.load_ref()?;
            self.store_ref(Arc::clone(r))?;
        }
        Ok(self)
    }

    pub fn build(self) -> Result<Cell, CodecError> {
        Cell::new(self.bits, self.refs)
    }
}

fn check_width(width: usize) -> Result<(), CodecError> {
    if width > MAX_INT_BITS {
        return Err(CodecError::Encode(format!(
            "integers wider than {MAX_INT_BITS} bits are not supported (got {width})"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CellSlice
// ---------------------------------------------------------------------------

/// Read cursor over a cell. Copying a slice forks the cursor.
#[derive(Debug, Clone, Copy)]
pub struct CellSlice<'a> {
    cell: &'a Cell,
    bit_pos: usize,
    ref_pos: usize,
}

impl<'a> CellSlice<'a> {
    pub fn remaining_bits(&self) -> usize {
        self.cell.bits.len() - self.bit_pos
    }

    pub fn remaining_refs(&self) -> usize {
        self.cell.refs.len() - self.ref_pos
    }

    fn require(&self, bits: usize) -> Result<(), CodecError> {
        if bits > self.remaining_bits() {
            return Err(CodecError::CellUnderflow(format!(
                "need {bits} bits, {} left",
                self.remaining_bits()
            )));
        }
        Ok(())
    }

    pub fn load_bit(&mut self) -> Result<bool, CodecError> {
        self.require(1)?;
        let bit = self.cell.bits.get(self.bit_pos);
        self.bit_pos += 1;
        Ok(bit)
    }

    pub fn load_bits(&mut self, count: usize) -> Result<BitString, CodecError> {
        self.require(count)?;
        let mut out = BitString::new();
        for i in 0..count {
            out.push(self.cell.bits.get(self.bit_pos + i));
        }
        self.bit_pos += count;
        Ok(out)
    }

    pub fn load_uint(&mut self, width: usize) -> Result<u128, CodecError> {
        if width > MAX_INT_BITS {
            return Err(CodecError::Decode(format!(
                "integers wider than {MAX_INT_BITS} bits are not supported (got {width})"
            )));
        }
        self.require(width)?;
        let mut value = 0u128;
        for i in 0..width {
            value = (value << 1) | u128::from(self.cell.bits.get(self.bit_pos + i));
        }
        self.bit_pos += width;
        Ok(value)
    }

    pub fn load_int(&mut self, width: usize) -> Result<i128, CodecError> {
        let raw = self.load_uint(width)?;
        if width == 0 {
            return Ok(0);
        }
        let shift = MAX_INT_BITS - width;
        Ok(((raw << shift) as i128) >> shift)
    }

    /// Unsigned peek that leaves the cursor in place; `None` when too short.
    pub fn peek_uint(&self, width: usize) -> Option<u128> {
        let mut fork = *self;
        fork.load_uint(width).ok()
    }

    pub fn starts_with(&self, prefix: &BitString) -> bool {
        if prefix.len() > self.remaining_bits() {
            return false;
        }
        (0..prefix.len()).all(|i| self.cell.bits.get(self.bit_pos + i) == prefix.get(i))
    }

    pub fn skip_bits(&mut self, count: usize) -> Result<(), CodecError> {
        self.require(count)?;
        self.bit_pos += count;
        Ok(())
    }

    pub fn load_ref(&mut self) -> Result<&'a Arc<Cell>, CodecError> {
        let cell: &'a Cell = self.cell;
        let r = cell.refs.get(self.ref_pos).ok_or_else(|| {
            CodecError::CellUnderflow(format!(
                "no reference left (cell has {})",
                cell.refs.len()
            ))
        })?;
        self.ref_pos += 1;
        Ok(r)
    }
}
