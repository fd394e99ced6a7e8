//! Little-endian cursor codec for the ledger's positional wire format.
//!
//! The format is tagless: fields are written in a fixed order and must be
//! read back in exactly that order. Encoding appends to a growable buffer;
//! decoding reads from a slice through an explicit cursor that advances by
//! the amount consumed.

use std::fmt;

/// Recoverable decode failures.
///
/// Short input is the only expected failure mode: the format has no tags
/// or checksums, so anything else surfaces as garbage values upstream,
/// where the ledger's own invariant checks catch it.
#[derive(Debug)]
pub enum WireError {
    /// Input ran out before a field could be read in full.
    UnexpectedEof {
        offset: usize,
        expected: usize,
        got: usize,
    },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::UnexpectedEof {
                offset,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Unexpected end of input at offset {}: expected {} bytes, {} available",
                    offset, expected, got
                )
            }
        }
    }
}

impl std::error::Error for WireError {}

pub fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Read `N` raw bytes at `*off`, advancing the cursor on success.
pub fn get_bytes<const N: usize>(buf: &[u8], off: &mut usize) -> Result<[u8; N], WireError> {
    let end = off.checked_add(N).ok_or(WireError::UnexpectedEof {
        offset: *off,
        expected: N,
        got: 0,
    })?;
    if end > buf.len() {
        return Err(WireError::UnexpectedEof {
            offset: *off,
            expected: N,
            got: buf.len().saturating_sub(*off),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[*off..end]);
    *off = end;
    Ok(out)
}

pub fn get_u16(buf: &[u8], off: &mut usize) -> Result<u16, WireError> {
    Ok(u16::from_le_bytes(get_bytes::<2>(buf, off)?))
}

pub fn get_u32(buf: &[u8], off: &mut usize) -> Result<u32, WireError> {
    Ok(u32::from_le_bytes(get_bytes::<4>(buf, off)?))
}

pub fn get_u64(buf: &[u8], off: &mut usize) -> Result<u64, WireError> {
    Ok(u64::from_le_bytes(get_bytes::<8>(buf, off)?))
}
