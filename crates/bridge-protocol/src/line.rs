//! Newline-delimited text accumulation
//!
//! Both input channels carry short text commands. Bytes are collected until
//! CR or LF; only complete, non-empty lines are handed out. A line that grows
//! past the limit is dropped whole at its terminator, never shortened.

use tracing::{trace, warn};

use crate::StreamDecoder;

/// Default longest line kept
pub const DEFAULT_MAX_LINE: usize = 100;

/// Collects bytes into complete lines
#[derive(Debug)]
pub struct LineAccumulator {
    current: Vec<u8>,
    ready: std::collections::VecDeque<String>,
    max_len: usize,
    overflowed: bool,
    discarded: u64,
}

impl Default for LineAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAccumulator {
    /// Create an accumulator with the default line limit
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LINE)
    }

    /// Create an accumulator with a custom line limit
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            current: Vec::with_capacity(max_len),
            ready: std::collections::VecDeque::new(),
            max_len,
            overflowed: false,
            discarded: 0,
        }
    }

    /// Bytes held for the line in progress
    pub fn pending_len(&self) -> usize {
        self.current.len()
    }

    /// Overlong lines dropped so far
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn finish_line(&mut self) {
        if self.overflowed {
            self.overflowed = false;
            self.current.clear();
            self.discarded += 1;
            warn!("Discarding line longer than {} bytes", self.max_len);
            return;
        }
        if self.current.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.current).trim().to_string();
        self.current.clear();
        if !line.is_empty() {
            trace!("Line complete: {:?}", line);
            self.ready.push_back(line);
        }
    }
}

impl StreamDecoder for LineAccumulator {
    type Item = String;

    fn push_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            match byte {
                b'\n' | b'\r' => self.finish_line(),
                _ if self.overflowed => {}
                _ if self.current.len() < self.max_len => self.current.push(byte),
                _ => {
                    self.overflowed = true;
                    self.current.clear();
                }
            }
        }
    }

    fn next_item(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    fn clear(&mut self) {
        self.current.clear();
        self.overflowed = false;
        self.ready.clear();
    }
}
