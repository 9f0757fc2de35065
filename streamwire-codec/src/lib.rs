//! Packet and line framing for the streamwire stream runtime.
//!
//! `packet`/`line` are pure functions over `BytesMut`; `codec` wraps them as
//! `tokio_util::codec::{Encoder, Decoder}` for callers that want a `Framed` transport instead of
//! driving the buffer directly.

pub mod codec;
pub mod line;
pub mod packet;
mod varint;

pub use codec::{LineCodec, PacketCodec};
pub use varint::{decode_varint, encode_varint};
