//! Variable-length integer encoding.
//!
//! Unsigned values use LEB128: 7 data bits per byte, least significant group
//! first, with the high bit set on every byte except the last. Signed values
//! are zig-zag mapped onto unsigned first so small magnitudes of either sign
//! stay short.

/// Maximum encoded length of a 64-bit value.
pub const MAX_VARINT_LEN64: usize = 10;

/// Why a varint could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// Input ended before the final byte.
    Truncated,
    /// Value does not fit in 64 bits.
    Overflow,
    /// Bytes remain after a complete varint.
    TrailingBytes,
}

/// Append `x` as an unsigned varint.
pub fn put_uvarint(buf: &mut Vec<u8>, mut x: u64) {
    while x >= 0x80 {
        buf.push((x as u8) | 0x80);
        x >>= 7;
    }
    buf.push(x as u8);
}

/// Append `x` as a zig-zag signed varint.
pub fn put_varint(buf: &mut Vec<u8>, x: i64) {
    put_uvarint(buf, zigzag_encode(x));
}

/// Read an unsigned varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn uvarint(buf: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut x: u64 = 0;
    let mut shift: u32 = 0;

    for (i, &b) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN64 {
            return Err(VarintError::Overflow);
        }
        if b < 0x80 {
            // The tenth byte may only contribute the single remaining bit.
            if i == MAX_VARINT_LEN64 - 1 && b > 1 {
                return Err(VarintError::Overflow);
            }
            return Ok((x | (u64::from(b) << shift), i + 1));
        }
        x |= u64::from(b & 0x7f) << shift;
        shift += 7;
    }

    Err(VarintError::Truncated)
}

/// Read a zig-zag signed varint from the front of `buf`.
pub fn varint(buf: &[u8]) -> Result<(i64, usize), VarintError> {
    let (ux, n) = uvarint(buf)?;
    Ok((zigzag_decode(ux), n))
}

/// Read an unsigned varint that must span all of `buf`.
pub fn uvarint_exact(buf: &[u8]) -> Result<u64, VarintError> {
    let (x, n) = uvarint(buf)?;
    if n != buf.len() {
        return Err(VarintError::TrailingBytes);
    }
    Ok(x)
}

/// Read a signed varint that must span all of `buf`.
pub fn varint_exact(buf: &[u8]) -> Result<i64, VarintError> {
    uvarint_exact(buf).map(zigzag_decode)
}

fn zigzag_encode(x: i64) -> u64 {
    ((x << 1) ^ (x >> 63)) as u64
}

fn zigzag_decode(ux: u64) -> i64 {
    let x = (ux >> 1) as i64;
    if ux & 1 != 0 {
        !x
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode_u(x: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, x);
        buf
    }

    fn encode_i(x: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        put_varint(&mut buf, x);
        buf
    }

    #[test]
    fn test_uvarint_known_encodings() {
        assert_eq!(encode_u(0), vec![0x00]);
        assert_eq!(encode_u(1), vec![0x01]);
        assert_eq!(encode_u(127), vec![0x7f]);
        assert_eq!(encode_u(128), vec![0x80, 0x01]);
        assert_eq!(encode_u(300), vec![0xac, 0x02]);

        let max = encode_u(u64::MAX);
        assert_eq!(max.len(), MAX_VARINT_LEN64);
        assert_eq!(*max.last().unwrap(), 0x01);
    }

    #[test]
    fn test_varint_zigzag() {
        assert_eq!(encode_i(0), vec![0x00]);
        assert_eq!(encode_i(-1), vec![0x01]);
        assert_eq!(encode_i(1), vec![0x02]);
        assert_eq!(encode_i(-64), vec![0x7f]);
        assert_eq!(encode_i(64), vec![0x80, 0x01]);

        for x in [i64::MIN, -1_000_000, -1, 0, 1, 1_000_000, i64::MAX] {
            assert_eq!(varint_exact(&encode_i(x)), Ok(x));
        }
    }

    #[test]
    fn test_uvarint_reports_consumed_length() {
        let buf = [0xac, 0x02, 0xff];
        assert_eq!(uvarint(&buf), Ok((300, 2)));
        assert_eq!(uvarint_exact(&buf), Err(VarintError::TrailingBytes));
    }

    #[test]
    fn test_uvarint_truncated() {
        assert_eq!(uvarint(&[]), Err(VarintError::Truncated));
        assert_eq!(uvarint(&[0x80]), Err(VarintError::Truncated));
        assert_eq!(uvarint(&[0xff, 0xff]), Err(VarintError::Truncated));
    }

    #[test]
    fn test_uvarint_overflow() {
        let mut tenth_too_big = vec![0xff; 9];
        tenth_too_big.push(0x02);
        assert_eq!(uvarint(&tenth_too_big), Err(VarintError::Overflow));

        let mut eleven = vec![0xff; 10];
        eleven.push(0x01);
        assert_eq!(uvarint(&eleven), Err(VarintError::Overflow));
    }

    proptest! {
        #[test]
        fn prop_uvarint_consumes_whole_encoding(x: u64, tail: Vec<u8>) {
            let mut buf = encode_u(x);
            let len = buf.len();
            buf.extend_from_slice(&tail);
            prop_assert_eq!(uvarint(&buf), Ok((x, len)));
        }
    }
}
