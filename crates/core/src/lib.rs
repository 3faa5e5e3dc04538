pub mod error;
pub mod media;
pub mod registry;
pub mod transport;

pub use error::{DepayError, Result};
pub use media::av1::{Av1Depacketizer, Av1Packetizer, DepacketizerConfig};
pub use media::{Depacketizer, DepacketizerStats, Frame, FrameFlags, InputOutcome, Packetizer};
pub use registry::StreamRegistry;
