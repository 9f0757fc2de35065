//! `tokio_util::codec` adapters over the pure [`crate::packet`] and [`crate::line`] functions,
//! for callers that want a `Framed`/`FramedRead`/`FramedWrite` rather than driving the buffer
//! by hand the way the transport actor does.

use bytes::{Bytes, BytesMut};
use streamwire_types::{CodecError, PacketSpec};
use tokio_util::codec::{Decoder, Encoder};

use crate::{line, packet};

/// Encodes/decodes frames under a fixed [`PacketSpec`].
#[derive(Debug, Clone)]
pub struct PacketCodec {
    spec: PacketSpec,
}

impl PacketCodec {
    pub fn new(spec: PacketSpec) -> Self {
        Self { spec }
    }
}

impl Decoder for PacketCodec {
    type Item = (Vec<u64>, Bytes);
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        packet::decode(&self.spec, src)
    }
}

impl Encoder<(Vec<u64>, Bytes)> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: (Vec<u64>, Bytes), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = packet::encode(&self.spec, &item.0, &item.1)?;
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}

/// Encodes/decodes single newline-terminated lines inside a varint frame.
#[derive(Debug, Clone, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        line::decode_line(src)
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&line::encode_line(&item)?);
        Ok(())
    }
}
