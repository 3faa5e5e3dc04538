/// AV1 RTP aggregation header, the first octet of every payload.
///
/// ```text
///  0 1 2 3 4 5 6 7
/// +-+-+-+-+-+-+-+-+
/// |Z|Y| W |N|-|-|-|
/// +-+-+-+-+-+-+-+-+
/// ```
///
/// - **Z**: the first OBU element continues a fragment from the previous packet.
/// - **Y**: the last OBU element continues in the next packet.
/// - **W**: number of OBU elements (1-3), or 0 when every element carries
///   an explicit leb128 length.
/// - **N**: first packet of a coded video sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregationHeader {
    pub z: bool,
    pub y: bool,
    pub w: u8,
    pub n: bool,
}

/// A header that breaks an AV1 RTP packetization rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderViolation {
    /// N=1 requires Z=0: a coded video sequence cannot start mid-fragment.
    NewSequenceWithContinuation,
}

impl AggregationHeader {
    const Z_BIT: u8 = 0x80;
    const Y_BIT: u8 = 0x40;
    const W_MASK: u8 = 0x30;
    const N_BIT: u8 = 0x08;

    pub fn parse(octet: u8) -> Self {
        Self {
            z: octet & Self::Z_BIT != 0,
            y: octet & Self::Y_BIT != 0,
            w: (octet & Self::W_MASK) >> 4,
            n: octet & Self::N_BIT != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut octet = (self.w << 4) & Self::W_MASK;
        if self.z {
            octet |= Self::Z_BIT;
        }
        if self.y {
            octet |= Self::Y_BIT;
        }
        if self.n {
            octet |= Self::N_BIT;
        }
        octet
    }

    /// Whether this packet starts a new coded video sequence.
    pub fn starts_sequence(&self) -> bool {
        self.n && !self.z
    }

    pub fn violation(&self) -> Option<HeaderViolation> {
        (self.n && self.z).then_some(HeaderViolation::NewSequenceWithContinuation)
    }

    /// Whether element `index` of this packet is preceded by a length field.
    ///
    /// With `W = 0` all are; otherwise only the first `W - 1` are, and the
    /// last element runs to the end of the payload.
    pub fn has_length_field(&self, index: usize) -> bool {
        self.w == 0 || index + 1 < self.w as usize
    }
}
