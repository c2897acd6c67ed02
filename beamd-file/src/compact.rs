//! Compact term encoding.
//!
//! Every operand in the code chunk, and every entry of the line chunk, is a
//! tag-plus-value in this variable-length form:
//!
//! ```text
//! 7 6 5 4 | 3 | 2 1 0
//! -------   -   -----
//! value     0   tag        value < 16, one byte
//! hi 3 | 0  1   tag        value < 2048, high bits here + one more byte
//! len-2| 1  1   tag        len-2 < 7: len big-endian bytes follow
//! 1 1 1| 1  1   tag        nested unsigned (len-9), then len bytes
//! ```
//!
//! Tag `z` (extended) only uses the one-byte form; its value selects an
//! extended operand kind that the tokenizer decodes further.

use crate::error::{Error, Result};

/// The low three bits of the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// `u`: untagged number.
    Unsigned = 0,
    /// `i`: signed integer literal.
    Integer = 1,
    /// `a`: atom table index (0 is nil).
    Atom = 2,
    /// `x`: X register.
    X = 3,
    /// `y`: Y register.
    Y = 4,
    /// `f`: label.
    Label = 5,
    /// `h`: character.
    Char = 6,
    /// `z`: extended operand.
    Extended = 7,
}

impl Tag {
    #[inline]
    pub fn from_bits(b: u8) -> Self {
        match b & 0x07 {
            0 => Tag::Unsigned,
            1 => Tag::Integer,
            2 => Tag::Atom,
            3 => Tag::X,
            4 => Tag::Y,
            5 => Tag::Label,
            6 => Tag::Char,
            _ => Tag::Extended,
        }
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// A decoded tag and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compact {
    pub tag: Tag,
    pub value: i64,
}

/// Decode one compact value from `data` starting at `offset`.
/// Returns (value, bytes_consumed).
///
/// Values are signed for [`Tag::Integer`] and unsigned otherwise; anything
/// that does not fit in an `i64` is reported as [`Error::Overflow`].
pub fn decode(data: &[u8], offset: usize) -> Result<(Compact, usize)> {
    let b = *data.get(offset).ok_or(Error::Truncated(offset))?;
    let tag = Tag::from_bits(b);

    if b & 0x08 == 0 {
        let value = (b >> 4) as i64;
        return Ok((Compact { tag, value }, 1));
    }
    if tag == Tag::Extended {
        return Err(Error::InvalidTag(b, offset));
    }

    if b & 0x10 == 0 {
        let lo = *data.get(offset + 1).ok_or(Error::Truncated(offset))?;
        let value = (((b & 0xe0) as i64) << 3) | lo as i64;
        return Ok((Compact { tag, value }, 2));
    }

    let mut pos = offset + 1;
    let len = match b >> 5 {
        7 => {
            let (nested, consumed) = decode(data, pos)?;
            if nested.tag != Tag::Unsigned || nested.value < 0 {
                return Err(Error::InvalidTag(data[pos], pos));
            }
            pos += consumed;
            usize::try_from(nested.value)
                .ok()
                .and_then(|n| n.checked_add(9))
                .ok_or(Error::Overflow(offset))?
        }
        n => n as usize + 2,
    };

    let end = pos.checked_add(len).ok_or(Error::Truncated(offset))?;
    let bytes = data.get(pos..end).ok_or(Error::Truncated(offset))?;
    let value = from_be_bytes(bytes, tag == Tag::Integer, offset)?;
    Ok((Compact { tag, value }, end - offset))
}

fn from_be_bytes(bytes: &[u8], signed: bool, offset: usize) -> Result<i64> {
    let negative = signed && bytes.first().is_some_and(|b| b & 0x80 != 0);
    let fill = if negative { 0xff } else { 0x00 };

    let mut significant = bytes;
    while significant.len() > 8 && significant[0] == fill {
        significant = &significant[1..];
    }
    if significant.len() > 8 {
        return Err(Error::Overflow(offset));
    }
    if significant.len() == 8 && (significant[0] & 0x80 != 0) != negative {
        return Err(Error::Overflow(offset));
    }

    let mut v: u64 = if negative { u64::MAX } else { 0 };
    for &b in significant {
        v = (v << 8) | b as u64;
    }
    Ok(v as i64)
}

/// Encode `value` with `tag` using the shortest form.
///
/// Negative values are only meaningful for [`Tag::Integer`]. Extended tags
/// only support values below 16.
pub fn encode(tag: Tag, value: i64) -> Vec<u8> {
    let t = tag.bits();
    if (0..16).contains(&value) {
        return vec![((value as u8) << 4) | t];
    }
    if (16..0x800).contains(&value) {
        return vec![(((value >> 3) as u8) & 0xe0) | 0x08 | t, value as u8];
    }

    let bytes = to_be_bytes(value);
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push((((bytes.len() - 2) as u8) << 5) | 0x18 | t);
    out.extend_from_slice(&bytes);
    out
}

/// Minimal big-endian two's complement, never shorter than two bytes.
fn to_be_bytes(value: i64) -> Vec<u8> {
    let all = value.to_be_bytes();
    let mut start = 0;
    while start < all.len() - 2 {
        let (b, next) = (all[start], all[start + 1]);
        let redundant = (b == 0x00 && next & 0x80 == 0) || (b == 0xff && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    all[start..].to_vec()
}
