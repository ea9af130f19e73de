//! Little-endian field readers over byte slices.

use crate::error::{FormatError, Result};

/// Split `n` bytes off the front of `data`.
pub(crate) fn take<'a>(data: &'a [u8], n: usize, what: &'static str) -> Result<(&'a [u8], &'a [u8])> {
    data.split_at_checked(n)
        .ok_or_else(|| FormatError::truncated(what, n, data.len()))
}

pub(crate) fn take_array<'a, const N: usize>(
    data: &'a [u8],
    what: &'static str,
) -> Result<([u8; N], &'a [u8])> {
    let (head, rest) = take(data, N, what)?;
    let mut out = [0u8; N];
    out.copy_from_slice(head);
    Ok((out, rest))
}

pub(crate) fn take_u8<'a>(data: &'a [u8], what: &'static str) -> Result<(u8, &'a [u8])> {
    let ([b], rest) = take_array::<1>(data, what)?;
    Ok((b, rest))
}

pub(crate) fn take_u16_le<'a>(data: &'a [u8], what: &'static str) -> Result<(u16, &'a [u8])> {
    let (b, rest) = take_array::<2>(data, what)?;
    Ok((u16::from_le_bytes(b), rest))
}

pub(crate) fn take_u32_le<'a>(data: &'a [u8], what: &'static str) -> Result<(u32, &'a [u8])> {
    let (b, rest) = take_array::<4>(data, what)?;
    Ok((u32::from_le_bytes(b), rest))
}

/// Read a u32 LE at `offset` without consuming, if present.
pub(crate) fn peek_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let bytes = data.get(offset..end)?;
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    Some(u32::from_le_bytes(out))
}
