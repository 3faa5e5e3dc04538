//! AV1 RTP payload format.
//!
//! Every RTP payload starts with a one-octet [aggregation
//! header](aggregation::AggregationHeader) followed by one or more OBU
//! elements. Elements are either length-prefixed with a
//! [leb128](leb128) value or, for the last element when `W > 0`, run to the
//! end of the payload. OBUs larger than a packet are split into fragments
//! linked by the `Y`/`Z` flags.
//!
//! ```text
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Z|Y| W |N|-|-|-|  OBU element 1 size (leb128)  |               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+               |
//! :                     OBU element 1 data                        :
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! :                          ...                                  :
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Inside RTP the OBU headers normally omit `obu_size`; the
//! [`Av1Depacketizer`] restores an explicit 3-byte size field on every OBU
//! so the output is a valid low-overhead bitstream.

pub mod aggregation;
pub mod buffer;
pub mod depacketizer;
pub mod leb128;
pub mod obu;
pub mod obu_table;
pub mod packetizer;

pub use aggregation::{AggregationHeader, HeaderViolation};
pub use depacketizer::{Av1Depacketizer, DepacketizerConfig};
pub use packetizer::Av1Packetizer;
