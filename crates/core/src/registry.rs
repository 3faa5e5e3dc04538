use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::media::rtp::RtpPacket;
use crate::media::{Depacketizer, DepacketizerStats, InputOutcome};

/// A depacketizer that can be handed across threads.
pub type BoxedDepacketizer = Box<dyn Depacketizer + Send>;

type Factory = dyn Fn(u32) -> BoxedDepacketizer + Send + Sync;

/// One RTP stream (SSRC) and its depacketizer.
///
/// The depacketizer sits behind a mutex so the stream can be shared, but
/// packets are still processed one at a time.
pub struct Stream {
    ssrc: u32,
    depacketizer: Mutex<BoxedDepacketizer>,
}

impl Stream {
    fn new(ssrc: u32, depacketizer: BoxedDepacketizer) -> Self {
        Self {
            ssrc,
            depacketizer: Mutex::new(depacketizer),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn input(&self, packet: &[u8]) -> Result<InputOutcome> {
        self.depacketizer.lock().input(packet)
    }

    pub fn flush(&self) -> usize {
        self.depacketizer.lock().flush()
    }

    pub fn stats(&self) -> DepacketizerStats {
        self.depacketizer.lock().stats()
    }
}

/// Routes RTP packets to one depacketizer per SSRC.
///
/// Depacketizers are created on the first packet of an unknown SSRC through
/// the factory supplied at construction, and destroyed by
/// [`remove`](Self::remove) or when the registry is dropped. Cloning yields
/// another handle to the same set of streams.
#[derive(Clone)]
pub struct StreamRegistry {
    streams: Arc<RwLock<HashMap<u32, Arc<Stream>>>>,
    factory: Arc<Factory>,
}

impl StreamRegistry {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(u32) -> BoxedDepacketizer + Send + Sync + 'static,
    {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            factory: Arc::new(factory),
        }
    }

    /// Feed one raw RTP packet to the depacketizer of its SSRC.
    pub fn input(&self, packet: &[u8]) -> Result<InputOutcome> {
        let ssrc = RtpPacket::parse(packet)?.ssrc;
        self.get_or_create(ssrc).input(packet)
    }

    fn get_or_create(&self, ssrc: u32) -> Arc<Stream> {
        if let Some(stream) = self.streams.read().get(&ssrc) {
            return stream.clone();
        }

        self.streams
            .write()
            .entry(ssrc)
            .or_insert_with(|| {
                tracing::info!(ssrc = format_args!("{:#010X}", ssrc), "stream registered");
                Arc::new(Stream::new(ssrc, (self.factory)(ssrc)))
            })
            .clone()
    }

    pub fn get(&self, ssrc: u32) -> Option<Arc<Stream>> {
        self.streams.read().get(&ssrc).cloned()
    }

    /// Drop a stream and its depacketizer. Any partially assembled frame is
    /// discarded. Returns `false` if the SSRC was unknown.
    pub fn remove(&self, ssrc: u32) -> bool {
        let removed = self.streams.write().remove(&ssrc).is_some();
        if removed {
            tracing::info!(ssrc = format_args!("{:#010X}", ssrc), "stream removed");
        }
        removed
    }

    /// Known SSRCs in ascending order.
    pub fn ssrcs(&self) -> Vec<u32> {
        let mut ssrcs: Vec<u32> = self.streams.read().keys().copied().collect();
        ssrcs.sort_unstable();
        ssrcs
    }

    pub fn stats(&self, ssrc: u32) -> Option<DepacketizerStats> {
        self.get(ssrc).map(|stream| stream.stats())
    }

    /// Flush every stream's pending frame. Returns the number delivered.
    pub fn flush_all(&self) -> usize {
        let streams: Vec<Arc<Stream>> = self.streams.read().values().cloned().collect();
        streams.iter().map(|stream| stream.flush()).sum()
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }
}
