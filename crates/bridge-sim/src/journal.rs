//! Ordered record of what the simulated collaborators saw
//!
//! Several collaborators can share one journal, so a test can check the order
//! of steps across the radio and the output channels.

use std::sync::{Arc, Mutex, MutexGuard};

/// One observed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimStep {
    /// The bridge read a frame out of the radio
    FrameRead,
    /// The bridge armed the receiver
    ReceiveArmed,
    /// The bridge wrote to the wired channel
    WiredWrite { len: usize },
    /// The bridge sent a wireless notification
    Notification { len: usize },
}

/// Shared, cloneable step log
#[derive(Debug, Clone, Default)]
pub struct SimJournal {
    steps: Arc<Mutex<Vec<SimStep>>>,
}

impl SimJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SimStep>> {
        self.steps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a step
    pub fn record(&self, step: SimStep) {
        self.lock().push(step);
    }

    /// Steps recorded so far
    pub fn steps(&self) -> Vec<SimStep> {
        self.lock().clone()
    }

    /// Forget every step
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_log() {
        let journal = SimJournal::new();
        let other = journal.clone();
        journal.record(SimStep::FrameRead);
        other.record(SimStep::ReceiveArmed);
        assert_eq!(journal.steps(), vec![SimStep::FrameRead, SimStep::ReceiveArmed]);

        other.clear();
        assert!(journal.steps().is_empty());
    }
}
