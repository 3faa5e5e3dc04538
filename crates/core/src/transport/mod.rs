//! Packet framing for RTP carried over byte streams.
//!
//! The depacketizer itself never touches sockets or files; this module
//! turns byte streams into discrete RTP packets for it:
//!
//! - **RFC 4571** ([`framing`]): 2-byte big-endian length prefix per packet,
//!   as used by RTP-over-TCP and by the CLI's capture files.

pub mod framing;

pub use framing::{FramedReader, write_framed};
