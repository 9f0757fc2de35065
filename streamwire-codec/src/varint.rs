use bytes::{Buf, BufMut, BytesMut};
use streamwire_types::CodecError;

/// Encodes `value` as an unsigned LEB128 varint and appends it to `dst`.
pub fn encode_varint(value: u64, dst: &mut BytesMut) {
    let mut value = value;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        dst.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Attempts to decode a varint from the front of `src`.
///
/// Returns `Ok(Some((value, consumed)))` on success, `Ok(None)` if `src` does not yet contain a
/// complete varint, or `Err` if more than 10 bytes (the max for a 64-bit value) have been seen
/// without a terminating byte.
pub fn decode_varint(src: &[u8]) -> Result<Option<(u64, usize)>, CodecError> {
    let mut value: u64 = 0;
    for (i, &byte) in src.iter().enumerate() {
        if i >= 10 {
            return Err(CodecError::InvalidVarint);
        }
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Ok(None)
}

/// Reads a varint off the front of `src`, advancing the cursor past it.
pub(crate) fn get_varint(src: &mut BytesMut) -> Result<Option<u64>, CodecError> {
    match decode_varint(src)? {
        Some((value, consumed)) => {
            src.advance(consumed);
            Ok(Some(value))
        }
        None => Ok(None),
    }
}
