//! Error types for the AV1 RTP library.

use std::fmt;

/// Errors that can occur while depacketizing or packetizing AV1 over RTP.
///
/// Variants map to specific failure modes:
///
/// - **Packet**: [`InvalidArgument`](Self::InvalidArgument), malformed RTP
///   packet, rejected before any state changes.
/// - **Element**: [`TruncatedElement`](Self::TruncatedElement), an OBU
///   element runs past the end of the payload; the whole packet is rejected.
/// - **Capacity**: [`OutOfMemory`](Self::OutOfMemory),
///   [`TooManyObus`](Self::TooManyObus),
///   [`BufferTooLarge`](Self::BufferTooLarge). The current packet fails but
///   the depacketizer stays usable.
/// - **Bitstream**: [`MalformedObu`](Self::MalformedObu), packetizer input
///   is not a valid OBU stream.
/// - **Transport**: [`Io`](Self::Io), framed capture read/write failures.
#[derive(Debug, thiserror::Error)]
pub enum DepayError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The RTP packet could not be parsed.
    #[error("invalid RTP packet: {kind}")]
    InvalidArgument { kind: ParseErrorKind },

    /// The allocator could not grow the frame buffer or OBU table.
    #[error("out of memory while growing frame storage")]
    OutOfMemory,

    /// The frame already holds the maximum number of OBU records.
    #[error("too many OBUs in one temporal unit (max {max})")]
    TooManyObus { max: usize },

    /// A frame or a single OBU would exceed its size limit.
    #[error("frame too large: {requested} bytes exceeds limit of {max}")]
    BufferTooLarge { requested: usize, max: usize },

    /// An OBU element declares more bytes than the payload holds.
    #[error("truncated OBU element: declared {declared} bytes, {available} available")]
    TruncatedElement { declared: usize, available: usize },

    /// The packetizer input is not a valid low-overhead OBU stream.
    #[error("malformed OBU at byte offset {offset}")]
    MalformedObu { offset: usize },
}

/// Specific kind of RTP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Fewer bytes than the 12-byte fixed header.
    TooShort,
    /// Version field is not 2.
    BadVersion,
    /// CSRC list or header extension runs past the packet end.
    BadHeaderLength,
    /// Padding count is zero or larger than the payload.
    BadPadding,
    /// No payload after the header (AV1 needs at least the aggregation header).
    EmptyPayload,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "packet too short"),
            Self::BadVersion => write!(f, "unsupported RTP version"),
            Self::BadHeaderLength => write!(f, "header length exceeds packet"),
            Self::BadPadding => write!(f, "invalid padding"),
            Self::EmptyPayload => write!(f, "empty payload"),
        }
    }
}

impl From<ParseErrorKind> for DepayError {
    fn from(kind: ParseErrorKind) -> Self {
        Self::InvalidArgument { kind }
    }
}

/// Convenience alias for `Result<T, DepayError>`.
pub type Result<T> = std::result::Result<T, DepayError>;
