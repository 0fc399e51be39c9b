//! In-memory wired channel
//!
//! Stands in for the USB serial port. Everything the bridge writes is
//! captured; the host side can read it back as text or decode the packet
//! frames in it, and can type commands for the bridge to read.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bridge_core::{TransportError, WiredChannel};
use bridge_protocol::{DecodedFrame, SerialDeframer, StreamDecoder};

use crate::journal::{SimJournal, SimStep};

#[derive(Debug, Default)]
struct Shared {
    output: Vec<u8>,
    input: VecDeque<u8>,
    writes: usize,
    fail_writes: bool,
}

/// Create the bridge-side channel and the host-side handle
pub fn memory_wired() -> (MemoryWired, WiredHost) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    (
        MemoryWired {
            shared: shared.clone(),
            journal: None,
        },
        WiredHost {
            shared,
            read_pos: 0,
            deframer: SerialDeframer::new(),
        },
    )
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // A panicking test thread must not hide the captured output
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bridge side, implementing [`WiredChannel`]
#[derive(Debug)]
pub struct MemoryWired {
    shared: Arc<Mutex<Shared>>,
    journal: Option<SimJournal>,
}

impl MemoryWired {
    /// Record successful writes in `journal`
    pub fn with_journal(mut self, journal: SimJournal) -> Self {
        self.journal = Some(journal);
        self
    }
}

impl WiredChannel for MemoryWired {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut shared = lock(&self.shared);
        if shared.fail_writes {
            return Err(TransportError::Wired(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "host disconnected",
            )));
        }
        shared.output.extend_from_slice(bytes);
        shared.writes += 1;
        if let Some(journal) = &self.journal {
            journal.record(SimStep::WiredWrite { len: bytes.len() });
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut shared = lock(&self.shared);
        let n = buf.len().min(shared.input.len());
        for (slot, byte) in buf.iter_mut().zip(shared.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Host side of the in-memory channel
#[derive(Debug)]
pub struct WiredHost {
    shared: Arc<Mutex<Shared>>,
    read_pos: usize,
    deframer: SerialDeframer,
}

impl WiredHost {
    /// Queue bytes for the bridge to read
    pub fn send(&self, bytes: &[u8]) {
        lock(&self.shared).input.extend(bytes);
    }

    /// Queue a text line (newline appended)
    pub fn send_line(&self, line: &str) {
        self.send(format!("{}\n", line).as_bytes());
    }

    /// Everything written so far
    pub fn output(&self) -> Vec<u8> {
        lock(&self.shared).output.clone()
    }

    /// Everything written so far, lossily decoded as text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output()).into_owned()
    }

    /// Number of `write_all` calls the bridge made
    pub fn write_count(&self) -> usize {
        lock(&self.shared).writes
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.shared).fail_writes = fail;
    }

    /// Decode packet frames written since the last call
    pub fn take_frames(&mut self) -> Vec<DecodedFrame> {
        let fresh = {
            let shared = lock(&self.shared);
            let fresh = shared.output[self.read_pos..].to_vec();
            self.read_pos = shared.output.len();
            fresh
        };
        self.deframer.push_bytes(&fresh);
        std::iter::from_fn(|| self.deframer.next_item()).collect()
    }

    /// Frames the host-side decoder refused
    pub fn rejected_frames(&self) -> u64 {
        self.deframer.rejected()
    }
}
