//! External term format decoder.
//!
//! Literal table entries and debug chunks are serialized terms: a version
//! byte `131` followed by one tagged term, optionally zlib-compressed as a
//! whole (tag `80`).

use std::io::Read;

use beamd_ir::Term;
use flate2::read::ZlibDecoder;

use crate::error::{Error, Result};

const VERSION: u8 = 131;

const NEW_FLOAT: u8 = 70;
const BIT_BINARY: u8 = 77;
const COMPRESSED: u8 = 80;
const SMALL_INTEGER: u8 = 97;
const INTEGER: u8 = 98;
const FLOAT: u8 = 99;
const ATOM: u8 = 100;
const SMALL_TUPLE: u8 = 104;
const LARGE_TUPLE: u8 = 105;
const NIL: u8 = 106;
const STRING: u8 = 107;
const LIST: u8 = 108;
const BINARY: u8 = 109;
const SMALL_BIG: u8 = 110;
const LARGE_BIG: u8 = 111;
const NEW_FUN: u8 = 112;
const EXPORT: u8 = 113;
const SMALL_ATOM: u8 = 115;
const MAP: u8 = 116;
const ATOM_UTF8: u8 = 118;
const SMALL_ATOM_UTF8: u8 = 119;

/// Nesting limit for lists, tuples and maps.
const MAX_DEPTH: usize = 512;

/// Decode one serialized term, version byte included.
pub fn decode_term(data: &[u8]) -> Result<Term> {
    match data {
        [VERSION, COMPRESSED, rest @ ..] => {
            let size = read_u32(rest, 0)? as usize;
            let inflated = inflate(&rest[4..], size)?;
            Reader::new(&inflated).finish()
        }
        [VERSION, ..] => Reader {
            data,
            pos: 1,
            depth: 0,
        }
        .finish(),
        [tag, ..] => Err(Error::InvalidTerm(*tag, 0)),
        [] => Err(Error::Truncated(0)),
    }
}

/// Inflate a zlib stream that must produce exactly `size` bytes.
pub fn inflate(data: &[u8], size: usize) -> Result<Vec<u8>> {
    // The declared size is untrusted; cap the up-front reservation.
    let mut out = Vec::with_capacity(size.min(data.len().saturating_mul(8)));
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompress(e.to_string()))?;
    if out.len() != size {
        return Err(Error::Decompress(format!(
            "expected {size} bytes, got {}",
            out.len()
        )));
    }
    Ok(out)
}

pub(crate) fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    let b = data.get(pos..pos + 4).ok_or(Error::Truncated(pos))?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    fn finish(mut self) -> Result<Term> {
        let term = self.term()?;
        if self.pos != self.data.len() {
            log::debug!("{} bytes after term", self.data.len() - self.pos);
        }
        Ok(term)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::Truncated(self.pos))?;
        let b = self.data.get(self.pos..end).ok_or(Error::Truncated(self.pos))?;
        self.pos = end;
        Ok(b)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<usize> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]) as usize)
    }

    fn u32(&mut self) -> Result<usize> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    /// Reject counts that cannot fit in the remaining input, one byte per
    /// element at least.
    fn count(&self, n: usize) -> Result<usize> {
        if n > self.data.len() - self.pos {
            return Err(Error::Truncated(self.pos));
        }
        Ok(n)
    }

    fn term(&mut self) -> Result<Term> {
        let offset = self.pos;
        let tag = self.u8()?;
        Ok(match tag {
            SMALL_INTEGER => Term::Integer(self.u8()? as i64),
            INTEGER => {
                let b = self.bytes(4)?;
                Term::Integer(i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as i64)
            }
            NEW_FLOAT => {
                let b = self.bytes(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Term::Float(f64::from_be_bytes(raw))
            }
            FLOAT => {
                let text = String::from_utf8_lossy(self.bytes(31)?);
                let text = text.trim_end_matches('\0');
                text.trim()
                    .parse()
                    .map(Term::Float)
                    .map_err(|_| Error::InvalidTerm(tag, offset))?
            }
            ATOM | SMALL_ATOM | ATOM_UTF8 | SMALL_ATOM_UTF8 => Term::Atom(self.atom_body(tag)?),
            SMALL_TUPLE => {
                let n = self.u8()? as usize;
                Term::Tuple(self.terms(n)?)
            }
            LARGE_TUPLE => {
                let n = self.u32()?;
                Term::Tuple(self.terms(n)?)
            }
            NIL => Term::Nil,
            STRING => {
                let n = self.u16()?;
                let chars = self.bytes(n)?;
                if chars.is_empty() {
                    Term::Nil
                } else {
                    Term::List(chars.iter().map(|&c| Term::Integer(c as i64)).collect())
                }
            }
            LIST => {
                let n = self.u32()?;
                let items = self.terms(n)?;
                match self.nested()? {
                    Term::Nil => Term::List(items),
                    tail => Term::ImproperList(items, Box::new(tail)),
                }
            }
            BINARY => {
                let n = self.u32()?;
                Term::Binary(self.bytes(n)?.to_vec())
            }
            BIT_BINARY => {
                let n = self.u32()?;
                // Bits used in the last byte.
                let tail = self.u8()? as u64;
                self.bytes(n)?;
                let total = (n as u64).saturating_sub(1) * 8 + if n == 0 { 0 } else { tail };
                Term::Other(format!("<<_:{total}>>"))
            }
            SMALL_BIG => {
                let n = self.u8()? as usize;
                self.big(n)?
            }
            LARGE_BIG => {
                let n = self.u32()?;
                self.big(n)?
            }
            MAP => {
                let n = self.u32()?;
                self.count(n.saturating_mul(2))?;
                let mut pairs = Vec::with_capacity(n);
                for _ in 0..n {
                    let key = self.nested()?;
                    let value = self.nested()?;
                    pairs.push((key, value));
                }
                Term::Map(pairs)
            }
            EXPORT => {
                let module = self.term()?;
                let function = self.term()?;
                let arity = self.term()?;
                match (module, function, arity) {
                    (Term::Atom(m), Term::Atom(f), Term::Integer(a)) => {
                        Term::Other(format!("fun {m}:{f}/{a}"))
                    }
                    _ => return Err(Error::InvalidTerm(tag, offset)),
                }
            }
            NEW_FUN => {
                // Size includes its own four bytes.
                let size = self.u32()?;
                self.bytes(size.checked_sub(4).ok_or(Error::InvalidTerm(tag, offset))?)?;
                Term::Other("#Fun".to_owned())
            }
            other => return Err(Error::InvalidTerm(other, offset)),
        })
    }

    fn atom_body(&mut self, tag: u8) -> Result<String> {
        let offset = self.pos;
        let n = match tag {
            SMALL_ATOM | SMALL_ATOM_UTF8 => self.u8()? as usize,
            _ => self.u16()?,
        };
        let bytes = self.bytes(n)?;
        match tag {
            ATOM | SMALL_ATOM => Ok(bytes.iter().map(|&b| b as char).collect()),
            _ => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| Error::InvalidUtf8(offset)),
        }
    }

    fn terms(&mut self, n: usize) -> Result<Vec<Term>> {
        let n = self.count(n)?;
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(self.nested()?);
        }
        Ok(items)
    }

    fn nested(&mut self) -> Result<Term> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::TermTooDeep(self.pos));
        }
        self.depth += 1;
        let term = self.term();
        self.depth -= 1;
        term
    }

    /// Little-endian magnitude; fits into `i64` or is rendered in decimal.
    fn big(&mut self, n: usize) -> Result<Term> {
        let sign = self.u8()?;
        let digits = self.bytes(n)?;
        let negative = sign != 0;

        let small = digits
            .iter()
            .rev()
            .try_fold(0i128, |acc, &d| acc.checked_mul(256)?.checked_add(d as i128))
            .map(|m| if negative { -m } else { m })
            .and_then(|v| i64::try_from(v).ok());
        if let Some(v) = small {
            return Ok(Term::Integer(v));
        }

        let mut text = decimal(digits);
        if negative {
            text.insert(0, '-');
        }
        Ok(Term::Other(text))
    }
}

/// Decimal rendering of a little-endian base-256 magnitude.
fn decimal(digits: &[u8]) -> String {
    // Base 10^9 limbs, least significant first.
    let mut limbs: Vec<u32> = vec![0];
    for &d in digits.iter().rev() {
        let mut carry = d as u64;
        for limb in &mut limbs {
            let v = *limb as u64 * 256 + carry;
            *limb = (v % 1_000_000_000) as u32;
            carry = v / 1_000_000_000;
        }
        while carry > 0 {
            limbs.push((carry % 1_000_000_000) as u32);
            carry /= 1_000_000_000;
        }
    }

    let mut out = String::new();
    let mut iter = limbs.iter().rev();
    if let Some(top) = iter.next() {
        out.push_str(&top.to_string());
    }
    for limb in iter {
        out.push_str(&format!("{limb:09}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn decode(body: &[u8]) -> Term {
        let mut data = vec![VERSION];
        data.extend_from_slice(body);
        decode_term(&data).unwrap()
    }

    #[test]
    fn scalars() {
        assert_eq!(decode(&[SMALL_INTEGER, 200]), Term::Integer(200));
        assert_eq!(decode(&[INTEGER, 0xff, 0xff, 0xff, 0xfe]), Term::Integer(-2));
        assert_eq!(decode(&[SMALL_ATOM_UTF8, 2, b'o', b'k']), Term::Atom("ok".into()));
        assert_eq!(decode(&[ATOM, 0, 1, 0xe9]), Term::Atom("\u{e9}".into()));
        assert_eq!(decode(&[NIL]), Term::Nil);

        let mut float = vec![NEW_FLOAT];
        float.extend_from_slice(&1.5f64.to_be_bytes());
        assert_eq!(decode(&float), Term::Float(1.5));
    }

    #[test]
    fn containers() {
        // {ok, "hi", [1 | 2]}
        let body = [
            SMALL_TUPLE, 3,
            SMALL_ATOM_UTF8, 2, b'o', b'k',
            STRING, 0, 2, b'h', b'i',
            LIST, 0, 0, 0, 1, SMALL_INTEGER, 1, SMALL_INTEGER, 2,
        ];
        let term = decode(&body);
        let items = term.as_tuple().unwrap();
        assert_eq!(items[0].as_atom(), Some("ok"));
        assert_eq!(items[1].as_string().as_deref(), Some("hi"));
        assert_eq!(
            items[2],
            Term::ImproperList(vec![Term::Integer(1)], Box::new(Term::Integer(2)))
        );
    }

    #[test]
    fn binaries_and_maps() {
        let body = [
            MAP, 0, 0, 0, 1,
            SMALL_ATOM_UTF8, 1, b'k',
            BINARY, 0, 0, 0, 3, b'a', b'b', b'c',
        ];
        assert_eq!(
            decode(&body),
            Term::Map(vec![(Term::Atom("k".into()), Term::Binary(b"abc".to_vec()))])
        );
    }

    #[test]
    fn big_integers() {
        // 2^64 does not fit in i64.
        let body = [SMALL_BIG, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(decode(&body), Term::Other("18446744073709551616".into()));
        assert_eq!(decode(&[SMALL_BIG, 2, 1, 0x10, 0x27]), Term::Integer(-10000));
    }

    #[test]
    fn export_funs() {
        let body = [
            EXPORT,
            SMALL_ATOM_UTF8, 5, b'l', b'i', b's', b't', b's',
            SMALL_ATOM_UTF8, 3, b'm', b'a', b'p',
            SMALL_INTEGER, 2,
        ];
        assert_eq!(decode(&body), Term::Other("fun lists:map/2".into()));
    }

    #[test]
    fn compressed_terms() {
        let inner = [SMALL_TUPLE, 2, NIL, SMALL_INTEGER, 7];
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&inner).unwrap();
        let packed = enc.finish().unwrap();

        let mut data = vec![VERSION, COMPRESSED];
        data.extend_from_slice(&(inner.len() as u32).to_be_bytes());
        data.extend(packed);
        assert_eq!(
            decode_term(&data).unwrap(),
            Term::Tuple(vec![Term::Nil, Term::Integer(7)])
        );
    }

    #[test]
    fn malformed_input() {
        assert!(matches!(decode_term(&[]), Err(Error::Truncated(0))));
        assert!(matches!(decode_term(&[1, 2]), Err(Error::InvalidTerm(1, 0))));
        assert!(matches!(decode_term(&[VERSION, 0xee]), Err(Error::InvalidTerm(0xee, 1))));
        // Tuple claims more elements than the input holds.
        assert!(decode_term(&[VERSION, LARGE_TUPLE, 0xff, 0xff, 0xff, 0xff]).is_err());
        assert!(decode_term(&[VERSION, BINARY, 0, 0, 0, 9, 1]).is_err());
    }
}
