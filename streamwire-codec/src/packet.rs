use bytes::{Buf, BufMut, Bytes, BytesMut};
use streamwire_types::{CodecError, LengthField, PacketSpec};

use crate::varint::{decode_varint, encode_varint};

/// Encodes a single length-prefixed frame: `lengths` concatenated in spec order (each using
/// its descriptor's width/encoding), followed by `payload`.
///
/// `lengths` must have one entry per field in `spec`; the last entry is the payload length.
/// Fails with [`CodecError::LengthOverflow`] if an entry does not fit its descriptor's width.
pub fn encode(spec: &PacketSpec, lengths: &[u64], payload: &[u8]) -> Result<Bytes, CodecError> {
    let mut dst = BytesMut::with_capacity(payload.len() + 16);

    for (field, &value) in spec.fields().iter().zip(lengths.iter()) {
        if value > field.max_value() {
            return Err(CodecError::LengthOverflow { field: field_name(*field), value });
        }
        match field {
            LengthField::U8 => dst.put_u8(value as u8),
            LengthField::U16 => dst.put_u16(value as u16),
            LengthField::U32 => dst.put_u32(value as u32),
            LengthField::U64 => dst.put_u64(value),
            LengthField::Varint => encode_varint(value, &mut dst),
        }
    }

    dst.extend_from_slice(payload);
    Ok(dst.freeze())
}

/// Attempts to decode one frame from the front of `buf`.
///
/// On success, the frame (header + payload) is drained from `buf` and
/// `Ok(Some((header_lengths, payload)))` is returned, leaving `buf` holding the tail. Returns
/// `Ok(None)` if `buf` does not yet hold a complete frame -- `buf` is left untouched so the
/// caller can append more bytes and retry.
///
/// A zero-length spec means "no framing header": the whole buffer is yielded as a single
/// packet whenever it is non-empty.
pub fn decode(
    spec: &PacketSpec,
    buf: &mut BytesMut,
) -> Result<Option<(Vec<u64>, Bytes)>, CodecError> {
    if spec.is_empty() {
        if buf.is_empty() {
            return Ok(None);
        }
        return Ok(Some((Vec::new(), buf.split().freeze())));
    }

    let mut cursor = 0usize;
    let mut header_lengths = Vec::with_capacity(spec.fields().len());

    for field in spec.fields() {
        match field {
            LengthField::U8 => {
                if buf.len() < cursor + 1 {
                    return Ok(None);
                }
                header_lengths.push(buf[cursor] as u64);
                cursor += 1;
            }
            LengthField::U16 => {
                if buf.len() < cursor + 2 {
                    return Ok(None);
                }
                let v = u16::from_be_bytes(buf[cursor..cursor + 2].try_into().unwrap());
                header_lengths.push(v as u64);
                cursor += 2;
            }
            LengthField::U32 => {
                if buf.len() < cursor + 4 {
                    return Ok(None);
                }
                let v = u32::from_be_bytes(buf[cursor..cursor + 4].try_into().unwrap());
                header_lengths.push(v as u64);
                cursor += 4;
            }
            LengthField::U64 => {
                if buf.len() < cursor + 8 {
                    return Ok(None);
                }
                let v = u64::from_be_bytes(buf[cursor..cursor + 8].try_into().unwrap());
                header_lengths.push(v);
                cursor += 8;
            }
            LengthField::Varint => match decode_varint(&buf[cursor..])? {
                Some((v, consumed)) => {
                    header_lengths.push(v);
                    cursor += consumed;
                }
                None => return Ok(None),
            },
        }
    }

    // The last header field is always the payload length.
    let payload_len = *header_lengths.last().expect("spec is non-empty") as usize;
    if buf.len() < cursor + payload_len {
        return Ok(None);
    }

    let mut frame = buf.split_to(cursor + payload_len);
    let payload = frame.split_off(cursor).freeze();
    Ok(Some((header_lengths, payload)))
}

fn field_name(field: LengthField) -> &'static str {
    match field {
        LengthField::U8 => "u8",
        LengthField::U16 => "u16",
        LengthField::U32 => "u32",
        LengthField::U64 => "u64",
        LengthField::Varint => "varint",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(fields: &[LengthField]) -> PacketSpec {
        PacketSpec::new(fields.to_vec())
    }

    #[test]
    fn roundtrips_u8_length_frame() {
        let spec = spec(&[LengthField::U8]);
        let payload = b"hello";
        let encoded = encode(&spec, &[payload.len() as u64], payload).unwrap();

        let mut buf = BytesMut::from(&encoded[..]);
        let (lengths, decoded) = decode(&spec, &mut buf).unwrap().unwrap();
        assert_eq!(lengths, vec![payload.len() as u64]);
        assert_eq!(&decoded[..], payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn roundtrips_varint_length_frame() {
        let spec = spec(&[LengthField::Varint]);
        let payload = vec![7u8; 300];
        let encoded = encode(&spec, &[payload.len() as u64], &payload).unwrap();

        let mut buf = BytesMut::from(&encoded[..]);
        let (lengths, decoded) = decode(&spec, &mut buf).unwrap().unwrap();
        assert_eq!(lengths, vec![payload.len() as u64]);
        assert_eq!(decoded.len(), payload.len());
    }

    #[test]
    fn preceding_fields_are_opaque_metadata() {
        let spec = spec(&[LengthField::U16, LengthField::U8]);
        let payload = b"ab";
        let encoded = encode(&spec, &[42, payload.len() as u64], payload).unwrap();

        let mut buf = BytesMut::from(&encoded[..]);
        let (lengths, decoded) = decode(&spec, &mut buf).unwrap().unwrap();
        assert_eq!(lengths, vec![42, payload.len() as u64]);
        assert_eq!(&decoded[..], payload);
    }

    #[test]
    fn reports_more_on_partial_frame() {
        let spec = spec(&[LengthField::U8]);
        let payload = b"hello";
        let encoded = encode(&spec, &[payload.len() as u64], payload).unwrap();

        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert_eq!(decode(&spec, &mut buf).unwrap(), None);
        assert_eq!(buf.len(), encoded.len() - 1);
    }

    #[test]
    fn empty_spec_yields_whole_buffer() {
        let spec = PacketSpec::none();
        let mut buf = BytesMut::from(&b"whatever is here"[..]);
        let (lengths, decoded) = decode(&spec, &mut buf).unwrap().unwrap();
        assert!(lengths.is_empty());
        assert_eq!(&decoded[..], &b"whatever is here"[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn length_overflow_is_rejected() {
        let spec = spec(&[LengthField::U8]);
        let err = encode(&spec, &[300], b"x").unwrap_err();
        assert!(matches!(err, CodecError::LengthOverflow { .. }));
    }
}
