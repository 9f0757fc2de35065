use bytes::{Bytes, BytesMut};
use streamwire_types::{CodecError, LengthField, PacketSpec};

use crate::packet;
use crate::varint::{encode_varint, get_varint};

/// Largest line (including its trailing `\n`) the line codec will encode or accept.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

fn varint_spec() -> PacketSpec {
    PacketSpec::new(vec![LengthField::Varint])
}

/// Appends `\n` to `data` and wraps the result as a single varint-length packet.
pub fn encode_line(data: &[u8]) -> Result<Bytes, CodecError> {
    if data.len() + 1 > MAX_LINE_LENGTH {
        return Err(CodecError::MaxLine(MAX_LINE_LENGTH));
    }

    let mut line = BytesMut::with_capacity(data.len() + 1);
    line.extend_from_slice(data);
    line.extend_from_slice(b"\n");

    packet::encode(&varint_spec(), &[line.len() as u64], &line)
}

/// Reads one varint-length-prefixed line off the front of `buf`, stripping the trailing `\n`.
///
/// Returns `Ok(None)` if `buf` does not yet hold a complete line.
pub fn decode_line(buf: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
    match packet::decode(&varint_spec(), buf)? {
        None => Ok(None),
        Some((_, frame)) => strip_newline(frame).map(Some),
    }
}

/// Strips the trailing `\n` off a line frame that has already had its outer varint length
/// prefix removed.
///
/// Split out for callers -- the multistream negotiator, chiefly -- that sit on top of a
/// transport whose own `packet_spec` already performs the varint framing, so what reaches
/// `handle_packet` is the already-unwrapped line body rather than a buffer [`decode_line`]
/// could re-frame.
pub fn strip_newline(mut frame: Bytes) -> Result<Bytes, CodecError> {
    if frame.last() != Some(&b'\n') {
        return Err(CodecError::InvalidLine);
    }
    frame.truncate(frame.len() - 1);
    Ok(frame)
}

/// Encodes a list of lines as a varint count followed by that many [`encode_line`] frames, the
/// whole thing wrapped in one outer varint frame.
pub fn encode_lines<T: AsRef<[u8]>>(items: &[T]) -> Result<Bytes, CodecError> {
    let mut body = BytesMut::new();
    encode_varint(items.len() as u64, &mut body);
    for item in items {
        body.extend_from_slice(&encode_line(item.as_ref())?);
    }
    packet::encode(&varint_spec(), &[body.len() as u64], &body)
}

/// Decodes a list of lines previously produced by [`encode_lines`].
pub fn decode_lines(buf: &mut BytesMut) -> Result<Option<Vec<Bytes>>, CodecError> {
    let outer = match packet::decode(&varint_spec(), buf)? {
        None => return Ok(None),
        Some((_, frame)) => frame,
    };

    let mut body = BytesMut::from(&outer[..]);
    decode_lines_body(&mut body).map(Some)
}

/// Decodes the `count` + `count` × [`encode_line`] body of an [`encode_lines`] message, given
/// a buffer that has already had the outer varint frame stripped off.
///
/// Split out from [`decode_lines`] for callers that sit on top of a transport which already
/// performs the outer framing itself (the whole point of `packet_spec`), and so only ever see
/// the already-unwrapped body as a `handle_packet` payload.
pub fn decode_lines_body(body: &mut BytesMut) -> Result<Vec<Bytes>, CodecError> {
    let count = get_varint(body)?.ok_or(CodecError::InvalidLineCount)?;

    let mut lines = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match decode_line(body)? {
            Some(line) => lines.push(line),
            None => return Err(CodecError::InvalidLines),
        }
    }
    if !body.is_empty() {
        return Err(CodecError::InvalidLines);
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn roundtrips_a_single_line() {
        let encoded = encode_line(b"/multistream/1.0.0").unwrap();
        let mut buf = BytesMut::from(&encoded[..]);
        let line = decode_line(&mut buf).unwrap().unwrap();
        assert_eq!(&line[..], b"/multistream/1.0.0");
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_oversize_line() {
        let data = vec![0u8; MAX_LINE_LENGTH];
        assert!(matches!(encode_line(&data), Err(CodecError::MaxLine(_))));
    }

    #[test]
    fn roundtrips_multiple_lines() {
        let items = vec![b"/foo".to_vec(), b"/bar".to_vec()];
        let encoded = encode_lines(&items).unwrap();
        let mut buf = BytesMut::from(&encoded[..]);
        let lines = decode_lines(&mut buf).unwrap().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(&lines[0][..], b"/foo");
        assert_eq!(&lines[1][..], b"/bar");
    }

    #[test]
    fn decode_line_rejects_missing_newline() {
        // Hand-craft a varint frame whose payload doesn't end in '\n'.
        let spec = varint_spec();
        let encoded = packet::encode(&spec, &[3], b"abc").unwrap();
        let mut buf = BytesMut::from(&encoded[..]);
        assert!(matches!(decode_line(&mut buf), Err(CodecError::InvalidLine)));
    }
}
