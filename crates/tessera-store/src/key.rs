//! Order-preserving key encodings
//!
//! Every encoding is self-delimiting and sorts byte-wise in the same order as
//! the value it encodes, so composite keys can be range-scanned by prefix.
//!
//! | Type            | Encoding                                           |
//! |-----------------|----------------------------------------------------|
//! | `u64`           | 8 bytes big-endian                                 |
//! | `i64`           | 8 bytes big-endian, sign bit flipped               |
//! | `String`/bytes  | bytes with `00` escaped as `00 FF`, ends `00 01`   |
//! | `(A, B)`        | `A` then `B`                                       |

use crate::error::{Result, StoreError};

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Types usable as collection keys
pub trait KeyCodec: Sized {
    /// Append the encoded key to `out`
    fn encode_key(&self, out: &mut Vec<u8>);

    /// Decode one key from the front of `input`, advancing it
    fn decode_key(input: &mut &[u8]) -> Result<Self>;

    fn to_key_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_key(&mut out);
        out
    }

    /// Decode a key that must consume all of `bytes`
    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let key = Self::decode_key(&mut input)?;
        if !input.is_empty() {
            return Err(StoreError::InvalidKey(format!(
                "{} trailing bytes after key",
                input.len()
            )));
        }
        Ok(key)
    }
}

/// Take exactly `n` bytes from the front of `input`
pub fn take_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if input.len() < n {
        return Err(StoreError::InvalidKey(format!(
            "expected {} bytes, found {}",
            n,
            input.len()
        )));
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

/// Append an escaped, terminated byte string
pub fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == ESCAPE {
            out.push(ESCAPED_ZERO);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
}

/// Decode a byte string written by [`encode_bytes`]
pub fn decode_bytes(input: &mut &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    loop {
        let b = *input
            .get(i)
            .ok_or_else(|| StoreError::InvalidKey("unterminated byte string".into()))?;
        if b != ESCAPE {
            out.push(b);
            i += 1;
            continue;
        }
        match input.get(i + 1) {
            Some(&ESCAPED_ZERO) => {
                out.push(ESCAPE);
                i += 2;
            }
            Some(&TERMINATOR) => {
                *input = &input[i + 2..];
                return Ok(out);
            }
            _ => return Err(StoreError::InvalidKey("bad escape in byte string".into())),
        }
    }
}

/// Smallest byte string greater than every string starting with `prefix`
///
/// Returns `None` when no such bound exists (prefix of all `0xFF`).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

impl KeyCodec for u64 {
    fn encode_key(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        let bytes = take_bytes(input, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }
}

impl KeyCodec for i64 {
    fn encode_key(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&((*self as u64) ^ (1 << 63)).to_be_bytes());
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        let raw = u64::decode_key(input)?;
        Ok((raw ^ (1 << 63)) as i64)
    }
}

impl KeyCodec for String {
    fn encode_key(&self, out: &mut Vec<u8>) {
        encode_bytes(self.as_bytes(), out);
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        let bytes = decode_bytes(input)?;
        String::from_utf8(bytes).map_err(|e| StoreError::InvalidKey(e.to_string()))
    }
}

impl KeyCodec for Vec<u8> {
    fn encode_key(&self, out: &mut Vec<u8>) {
        encode_bytes(self, out);
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        decode_bytes(input)
    }
}

impl KeyCodec for () {
    fn encode_key(&self, _out: &mut Vec<u8>) {}

    fn decode_key(_input: &mut &[u8]) -> Result<Self> {
        Ok(())
    }
}

impl<A: KeyCodec, B: KeyCodec> KeyCodec for (A, B) {
    fn encode_key(&self, out: &mut Vec<u8>) {
        self.0.encode_key(out);
        self.1.encode_key(out);
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        let a = A::decode_key(input)?;
        let b = B::decode_key(input)?;
        Ok((a, b))
    }
}

impl<A: KeyCodec, B: KeyCodec, C: KeyCodec> KeyCodec for (A, B, C) {
    fn encode_key(&self, out: &mut Vec<u8>) {
        self.0.encode_key(out);
        self.1.encode_key(out);
        self.2.encode_key(out);
    }

    fn decode_key(input: &mut &[u8]) -> Result<Self> {
        let a = A::decode_key(input)?;
        let b = B::decode_key(input)?;
        let c = C::decode_key(input)?;
        Ok((a, b, c))
    }
}
