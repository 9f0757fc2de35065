/// A single length-field descriptor in a [`PacketSpec`].
///
/// Fixed-width fields are big-endian unsigned. `Varint` is LEB128-style unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthField {
    U8,
    U16,
    U32,
    U64,
    Varint,
}

impl LengthField {
    /// Maximum value this descriptor can carry without overflowing, as a `u64`.
    pub fn max_value(self) -> u64 {
        match self {
            LengthField::U8 => u8::MAX as u64,
            LengthField::U16 => u16::MAX as u64,
            LengthField::U32 => u32::MAX as u64,
            LengthField::U64 => u64::MAX,
            LengthField::Varint => u64::MAX,
        }
    }
}

/// An ordered sequence of length-field descriptors defining a framing header.
///
/// The last field in the sequence is always the payload length; any preceding fields are
/// opaque metadata returned to the caller alongside the payload. An empty spec means "no
/// framing header": the decoder yields the whole buffer as a single packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketSpec(pub Vec<LengthField>);

impl PacketSpec {
    pub fn new(fields: Vec<LengthField>) -> Self {
        Self(fields)
    }

    /// The zero-length spec: no header, entire buffer is one packet.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[LengthField] {
        &self.0
    }
}

impl From<Vec<LengthField>> for PacketSpec {
    fn from(fields: Vec<LengthField>) -> Self {
        Self(fields)
    }
}
