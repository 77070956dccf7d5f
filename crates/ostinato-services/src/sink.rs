//! Bundle delivery over a channel

use crossbeam_channel::{Receiver, Sender, TrySendError};
use ostinato_core::{Bundle, MessageSink};
use tracing::warn;

/// Forwards bundles to a receiver on another thread. A full or closed
/// channel drops the bundle rather than stalling the scheduler.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Bundle>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Bundle>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end, holding at most `capacity` bundles
    pub fn bounded(capacity: usize) -> (Self, Receiver<Bundle>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }
}

impl MessageSink for ChannelSink {
    fn send(&mut self, bundle: Bundle) {
        match self.tx.try_send(bundle) {
            Ok(()) => {}
            Err(TrySendError::Full(bundle)) => {
                warn!(beat = bundle.beat, "bundle channel full, dropping bundle");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
