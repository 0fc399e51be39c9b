//! Simulated radio receiver
//!
//! Frames are pushed in through a [`RadioFeeder`] (from any thread); the
//! feeder raises the [`FrameSignal`] the way the receive interrupt would.
//!
//! Like the real peripheral the receiver holds at most one frame and only
//! while armed. Taking a frame disarms it; a frame that arrives while the
//! receiver is disarmed or still holding an unread frame is lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bridge_core::{FrameSignal, Radio, RadioError};
use bridge_protocol::{RadioFrame, ReadOutcome, RfConfig};
use tracing::{debug, info, trace};

use crate::journal::{SimJournal, SimStep};

/// One frame as the simulated peripheral will report it
#[derive(Debug, Clone, PartialEq)]
pub struct SimFrame {
    /// Raw bytes
    pub data: Vec<u8>,
    /// Signal strength in dBm
    pub rssi: f32,
    /// Signal-to-noise ratio in dB
    pub snr: f32,
    /// Read status the driver will return
    pub outcome: ReadOutcome,
}

impl SimFrame {
    /// A successfully read frame
    pub fn new(data: Vec<u8>, rssi: f32, snr: f32) -> Self {
        Self {
            data,
            rssi,
            snr,
            outcome: ReadOutcome::Ok,
        }
    }

    /// A read that fails with the given driver code
    pub fn failed(code: i16) -> Self {
        Self {
            data: Vec::new(),
            rssi: 0.0,
            snr: 0.0,
            outcome: ReadOutcome::Failed(code),
        }
    }
}

#[derive(Debug)]
struct Receiver {
    armed: bool,
    slot: Option<SimFrame>,
    attached: bool,
}

#[derive(Debug)]
struct Shared {
    receiver: Mutex<Receiver>,
    delivered: AtomicU64,
    rearms: AtomicU64,
    missed: AtomicU64,
}

impl Shared {
    fn receiver(&self) -> MutexGuard<'_, Receiver> {
        self.receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Create a simulated radio and the handle that feeds it
///
/// The receiver starts disarmed; nothing is received before the first
/// `start_receive`.
pub fn simulated_radio() -> (SimulatedRadio, RadioFeeder) {
    let signal = FrameSignal::new();
    let shared = Arc::new(Shared {
        receiver: Mutex::new(Receiver {
            armed: false,
            slot: None,
            attached: true,
        }),
        delivered: AtomicU64::new(0),
        rearms: AtomicU64::new(0),
        missed: AtomicU64::new(0),
    });
    (
        SimulatedRadio {
            signal: signal.clone(),
            shared: shared.clone(),
            config: None,
            init_failure: None,
            journal: None,
        },
        RadioFeeder { signal, shared },
    )
}

/// Simulated receiver implementing [`Radio`]
#[derive(Debug)]
pub struct SimulatedRadio {
    signal: FrameSignal,
    shared: Arc<Shared>,
    config: Option<RfConfig>,
    init_failure: Option<RadioError>,
    journal: Option<SimJournal>,
}

impl SimulatedRadio {
    /// Make `configure` fail, as a dead peripheral would
    pub fn fail_init(mut self, error: RadioError) -> Self {
        self.init_failure = Some(error);
        self
    }

    /// Record reads and re-arms in `journal`
    pub fn with_journal(mut self, journal: SimJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Parameters applied by the bridge
    pub fn config(&self) -> Option<&RfConfig> {
        self.config.as_ref()
    }

    fn note(&self, step: SimStep) {
        if let Some(journal) = &self.journal {
            journal.record(step);
        }
    }
}

impl Radio for SimulatedRadio {
    fn configure(&mut self, config: &RfConfig) -> Result<(), RadioError> {
        if let Some(error) = self.init_failure.clone() {
            return Err(error);
        }
        info!("Simulated radio configured: {}", config);
        self.config = Some(*config);
        Ok(())
    }

    fn start_receive(&mut self) -> Result<(), RadioError> {
        if self.config.is_none() {
            return Err(RadioError::Receive("radio not configured".to_string()));
        }
        {
            let mut receiver = self.shared.receiver();
            // Arming flushes whatever the peripheral still held
            if receiver.slot.take().is_some() {
                self.shared.missed.fetch_add(1, Ordering::Relaxed);
            }
            receiver.armed = true;
        }
        self.shared.rearms.fetch_add(1, Ordering::Relaxed);
        self.note(SimStep::ReceiveArmed);
        Ok(())
    }

    fn frame_available(&mut self) -> bool {
        self.signal.take();
        self.shared.receiver().slot.is_some()
    }

    fn read_frame(&mut self, frame: &mut RadioFrame) -> ReadOutcome {
        frame.data.clear();
        let Some(sim) = self.shared.receiver().slot.take() else {
            return ReadOutcome::Failed(-1);
        };
        frame.data.extend_from_slice(&sim.data);
        frame.rssi = sim.rssi;
        frame.snr = sim.snr;
        self.shared.delivered.fetch_add(1, Ordering::Relaxed);
        self.note(SimStep::FrameRead);
        sim.outcome
    }
}

impl Drop for SimulatedRadio {
    fn drop(&mut self) {
        self.shared.receiver().attached = false;
    }
}

/// Producer handle: the "air" side of the simulated radio
#[derive(Debug, Clone)]
pub struct RadioFeeder {
    signal: FrameSignal,
    shared: Arc<Shared>,
}

impl RadioFeeder {
    /// Put a frame on the air
    ///
    /// An armed, empty receiver takes the frame, disarms and raises the
    /// arrival signal. Otherwise the frame is lost and counted as missed.
    /// Returns false once the radio has been dropped.
    pub fn deliver(&self, frame: SimFrame) -> bool {
        {
            let mut receiver = self.shared.receiver();
            if !receiver.attached {
                debug!("Simulated radio gone, frame discarded");
                return false;
            }
            if !receiver.armed || receiver.slot.is_some() {
                trace!("Receiver not armed, frame lost");
                self.shared.missed.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            receiver.slot = Some(frame);
            receiver.armed = false;
        }
        self.signal.raise();
        true
    }

    /// Frames the bridge has read so far
    pub fn delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Times the receiver was (re-)armed
    pub fn rearms(&self) -> u64 {
        self.shared.rearms.load(Ordering::Relaxed)
    }

    /// Frames lost because the receiver was not ready for them
    pub fn missed(&self) -> u64 {
        self.shared.missed.load(Ordering::Relaxed)
    }

    /// Whether the receiver would take a frame right now
    pub fn is_armed(&self) -> bool {
        let receiver = self.shared.receiver();
        receiver.armed && receiver.slot.is_none()
    }
}
