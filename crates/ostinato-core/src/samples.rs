//! Sample selector lookup

use std::collections::HashMap;

/// Selectors that always mean silence, whatever a bank holds for them
pub fn is_rest_selector(selector: char) -> bool {
    matches!(selector, '-' | ' ')
}

/// Resolves selector characters to loaded sample buffers. Buffer 0 means
/// "no sample"; events carrying it are never sent.
pub trait SampleBank: Send {
    fn bufnum(&self, selector: char, index: i64) -> u32;

    /// Channel count of a loaded buffer, defaulting to mono
    fn channels(&self, buf: u32) -> u16;
}

/// In-memory bank: each selector owns a list of buffers, indexed modulo
/// its length.
#[derive(Debug, Clone, Default)]
pub struct SampleMap {
    selectors: HashMap<char, Vec<u32>>,
    channels: HashMap<u32, u16>,
}

impl SampleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, selector: char, buf: u32, channels: u16) {
        if buf == 0 {
            return;
        }
        self.selectors.entry(selector).or_default().push(buf);
        self.channels.insert(buf, channels);
    }

    pub fn with(mut self, selector: char, buf: u32, channels: u16) -> Self {
        self.insert(selector, buf, channels);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

impl SampleBank for SampleMap {
    fn bufnum(&self, selector: char, index: i64) -> u32 {
        match self.selectors.get(&selector) {
            Some(bufs) if !bufs.is_empty() => bufs[index.rem_euclid(bufs.len() as i64) as usize],
            _ => 0,
        }
    }

    fn channels(&self, buf: u32) -> u16 {
        self.channels.get(&buf).copied().unwrap_or(1)
    }
}
