//! SQLite variable-length integer encoding and the two's-complement helper
//! shared by the record decoder and the B-tree cell decoder.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("buffer too short to contain a varint")]
    BufferTooShort,
    #[error("two's-complement width {0} is not one of 1,2,3,4,6,8")]
    BadWidth(usize),
}

/// Decodes a varint starting at the front of `bytes`, via `sqlite_varint`.
///
/// `sqlite_varint::read_varint` assumes its slice already holds a complete
/// varint and indexes past a truncated one rather than reporting it, which
/// is fine for a well-formed database but not for bytes salvaged from a
/// damaged one. So we first locate the continuation-bit run ourselves,
/// purely to bound how much of `bytes` we hand to the crate, and let it do
/// the actual decoding.
pub fn read_varint(bytes: &[u8]) -> Result<(i64, usize), Error> {
    let scan_len = bytes.len().min(9);
    let consumed = (0..scan_len)
        .find(|&i| i == 8 || bytes[i] & 0x80 == 0)
        .map(|i| i + 1)
        .ok_or(Error::BufferTooShort)?;
    let (value, read) = sqlite_varint::read_varint(&bytes[..consumed]);
    debug_assert_eq!(read, consumed);
    Ok((value, read))
}

/// Encodes `value` as a varint. Used by round-trip tests; the recovery
/// pipeline itself is read-only and never needs to write varints back out.
pub fn write_varint(value: i64) -> Vec<u8> {
    let uvalue = value as u64;
    // The lowest 63 bits plus a top "sign/continuation" bit fit in 9 bytes
    // of 7 payload bits each, with the 9th byte carrying a full 8 bits.
    let mut septets = [0u8; 10];
    let mut n = 0;
    let mut v = uvalue;
    loop {
        septets[n] = (v & 0x7F) as u8;
        v >>= 7;
        n += 1;
        if v == 0 || n == 9 {
            break;
        }
    }
    if n == 9 {
        // Ninth byte takes the remaining 8 bits of the original value
        // unconditionally, per the format's final-byte special case.
        septets[8] = (uvalue >> 56) as u8;
    }
    let mut out = Vec::with_capacity(n);
    for i in (0..n).rev() {
        let is_last = i == 0;
        let byte = if is_last || n == 9 {
            septets[i]
        } else {
            septets[i] | 0x80
        };
        out.push(byte);
    }
    out
}

/// Decodes an N-byte big-endian slice (N in {1,2,3,4,6,8}) as a signed
/// two's-complement integer.
pub fn decode_twos_complement(bytes: &[u8]) -> Result<i64, Error> {
    match bytes.len() {
        1 | 2 | 3 | 4 | 6 | 8 => {}
        other => return Err(Error::BadWidth(other)),
    }
    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in bytes {
        value = (value << 8) | b as i64;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte_varint() {
        assert_eq!(read_varint(&[0x05]).unwrap(), (5, 1));
        assert_eq!(read_varint(&[0x7F]).unwrap(), (127, 1));
    }

    #[test]
    fn two_byte_varint() {
        // 0x81 0x00 -> continuation bit set on first byte, value 128
        assert_eq!(read_varint(&[0x81, 0x00]).unwrap(), (128, 2));
    }

    #[test]
    fn ninth_byte_is_unconditional() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let (value, len) = read_varint(&bytes).unwrap();
        assert_eq!(len, 9);
        assert_eq!(value, -1);
    }

    #[test]
    fn buffer_too_short() {
        assert_eq!(read_varint(&[0x81]), Err(Error::BufferTooShort));
    }

    #[test]
    fn roundtrip_varint() {
        for value in [0i64, 1, -1, 127, 128, -128, i64::MAX, i64::MIN, 1 << 40] {
            let encoded = write_varint(value);
            assert!(encoded.len() <= 9);
            let (decoded, len) = read_varint(&encoded).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(len, encoded.len());
        }
    }

    #[test]
    fn twos_complement_widths() {
        assert_eq!(decode_twos_complement(&[0xFF]).unwrap(), -1);
        assert_eq!(decode_twos_complement(&[0x00]).unwrap(), 0);
        assert_eq!(decode_twos_complement(&[0x7F]).unwrap(), 127);
        assert_eq!(decode_twos_complement(&[0xFF, 0xFF]).unwrap(), -1);
        assert_eq!(decode_twos_complement(&[0x01, 0x00]).unwrap(), 256);
    }

    #[test]
    fn twos_complement_bad_width() {
        assert_eq!(decode_twos_complement(&[0, 0, 0, 0, 0]), Err(Error::BadWidth(5)));
    }
}
