//! Outgoing control messages and the sink they are handed to

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Parameters for one effect stage attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectGroup {
    pub name: String,
    pub params: Vec<(String, f64)>,
}

/// One synth trigger, timestamped in clock seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub synth: String,
    pub fields: BTreeMap<String, f64>,
    pub effects: Vec<EffectGroup>,
    pub timestamp: f64,
}

impl ControlMessage {
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

/// Messages produced for one queue block, flushed together
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bundle {
    /// Block beat
    pub beat: f64,
    /// Block time in seconds, latency included
    pub time: f64,
    pub messages: Vec<ControlMessage>,
}

impl Bundle {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Transport boundary. Sending must not block.
pub trait MessageSink: Send {
    fn send(&mut self, bundle: Bundle);
}

/// Sink that records every bundle; clones share the same record
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    bundles: Arc<Mutex<Vec<Bundle>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bundles(&self) -> Vec<Bundle> {
        self.bundles.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<ControlMessage> {
        self.bundles().into_iter().flat_map(|b| b.messages).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut bundles) = self.bundles.lock() {
            bundles.clear();
        }
    }
}

impl MessageSink for MessageLog {
    fn send(&mut self, bundle: Bundle) {
        if let Ok(mut bundles) = self.bundles.lock() {
            bundles.push(bundle);
        }
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn send(&mut self, _bundle: Bundle) {}
}
