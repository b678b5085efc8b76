// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Append-only growable byte buffer backed by the arena.
//!
//! An [`ArenaBuf`] tracks a capacity handle and a length. Appends write in
//! place while capacity remains; growth allocates a fresh arena buffer of
//! the next power of two at least twice the new total, copies the old
//! content over, and repoints. The abandoned storage stays arena-resident
//! until the next rewind, a bounded one-time cost per growth event.
//!
//! A minimal template formatter ([`ArenaBuf::format`]) substitutes sized
//! integers and byte strings; the stub handler uses it to build response
//! header lines.

use crate::core::Result;
use crate::mem::arena::{pow2_size, Arena, RawBuf};

/// Argument for [`ArenaBuf::format`].
#[derive(Debug, Clone, Copy)]
pub enum FmtArg<'a> {
    /// Unsigned integer, rendered in decimal (`%z`).
    Num(u64),
    /// Raw byte string (`%s`).
    Bytes(&'a [u8]),
}

/// Growable byte sequence whose storage lives in an [`Arena`].
#[derive(Debug, Clone, Copy)]
pub struct ArenaBuf {
    raw: RawBuf,
    len: usize,
}

impl ArenaBuf {
    /// An empty buffer with no backing storage.
    pub const EMPTY: ArenaBuf = ArenaBuf {
        raw: RawBuf::EMPTY,
        len: 0,
    };

    /// Wrap an exact-size allocation that is already fully written.
    pub fn from_raw(raw: RawBuf) -> Self {
        Self {
            len: raw.len(),
            raw,
        }
    }

    /// Copy `bytes` into a fresh buffer with room to grow.
    ///
    /// Capacity is `pow2(max(hint, 2 * bytes.len()))`, so small strings get
    /// at least the hint and large ones get doubling headroom.
    pub fn from_bytes(arena: &mut Arena, bytes: &[u8], preallocate_hint: usize) -> Result<Self> {
        let capacity = pow2_size(if bytes.len() <= preallocate_hint {
            preallocate_hint
        } else {
            bytes.len() * 2
        });

        let raw = arena.allocate(capacity)?;
        arena.bytes_mut(raw)[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            raw,
            len: bytes.len(),
        })
    }

    /// Current length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity of the current backing allocation.
    pub fn capacity(&self) -> usize {
        self.raw.len()
    }

    /// Resolve the written portion against the arena.
    pub fn as_slice<'a>(&self, arena: &'a Arena) -> &'a [u8] {
        &arena.bytes(self.raw)[..self.len]
    }

    /// Append bytes, growing the backing allocation if needed.
    pub fn append_bytes(&mut self, arena: &mut Arena, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let new_len = self.len + bytes.len();
        if new_len <= self.capacity() {
            arena.bytes_mut(self.raw)[self.len..new_len].copy_from_slice(bytes);
            self.len = new_len;
            return Ok(());
        }

        let new_raw = arena.allocate(pow2_size(new_len * 2))?;
        arena.copy(self.raw, 0, new_raw, 0, self.len);
        arena.bytes_mut(new_raw)[self.len..new_len].copy_from_slice(bytes);

        self.raw = new_raw;
        self.len = new_len;
        Ok(())
    }

    /// Append the contents of another arena allocation.
    ///
    /// Source and destination share the arena, so the copy is routed through
    /// [`Arena::copy`] instead of borrowing two slices.
    pub fn append_handle(&mut self, arena: &mut Arena, src: RawBuf) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }

        let new_len = self.len + src.len();
        if new_len > self.capacity() {
            let new_raw = arena.allocate(pow2_size(new_len * 2))?;
            arena.copy(self.raw, 0, new_raw, 0, self.len);
            self.raw = new_raw;
        }

        arena.copy(src, 0, self.raw, self.len, src.len());
        self.len = new_len;
        Ok(())
    }

    /// Build a buffer from a byte template with `%z` (integer), `%s`
    /// (byte string), and `%%` (literal percent) placeholders.
    ///
    /// Placeholders with no matching argument, and trailing arguments with
    /// no placeholder, are ignored.
    pub fn format(arena: &mut Arena, template: &[u8], args: &[FmtArg<'_>]) -> Result<Self> {
        let mut out = ArenaBuf::from_bytes(arena, b"", template.len() * 2)?;
        let mut args = args.iter();
        let mut rest = template;

        while let Some(pos) = rest.iter().position(|&b| b == b'%') {
            out.append_bytes(arena, &rest[..pos])?;

            match rest.get(pos + 1) {
                Some(b'z') => {
                    if let Some(FmtArg::Num(value)) = args.next() {
                        let mut digits = [0u8; 20];
                        let text = format_decimal(*value, &mut digits);
                        out.append_bytes(arena, text)?;
                    }
                }
                Some(b's') => {
                    if let Some(FmtArg::Bytes(bytes)) = args.next() {
                        out.append_bytes(arena, bytes)?;
                    }
                }
                Some(b'%') => out.append_bytes(arena, b"%")?,
                _ => {}
            }

            rest = rest.get(pos + 2..).unwrap_or(&[]);
        }

        out.append_bytes(arena, rest)?;
        Ok(out)
    }
}

/// Render `value` in decimal into `digits`, returning the written suffix.
fn format_decimal(mut value: u64, digits: &mut [u8; 20]) -> &[u8] {
    if value == 0 {
        digits[19] = b'0';
        return &digits[19..];
    }

    let mut index = digits.len();
    while value > 0 {
        index -= 1;
        digits[index] = b'0' + (value % 10) as u8;
        value /= 10;
    }

    &digits[index..]
}
