//! Wireless session and inbound queue
//!
//! The wireless stack delivers writes and connection changes on its own
//! callback thread. That thread holds a [`WirelessInbox`], which assembles
//! text into lines locally and passes only complete lines (and connection
//! events) across a bounded queue. The control loop drains the matching
//! [`WirelessEvents`] without blocking.

use std::time::Duration;

use bridge_protocol::wireless::{notification_capacity, DEFAULT_MTU, RESPONSE_TAG};
use bridge_protocol::{
    ChunkError, LineAccumulator, StreamDecoder, ValidatedPacket, WirelessChunker, WirelessMessage,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::WirelessLink;
use crate::clock::Clock;

/// Default depth of the inbound queue
pub const DEFAULT_INBOX_CAPACITY: usize = 32;

/// State of the single wireless peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WirelessSession {
    connected: bool,
    mtu: u16,
}

impl Default for WirelessSession {
    fn default() -> Self {
        Self {
            connected: false,
            mtu: DEFAULT_MTU,
        }
    }
}

impl WirelessSession {
    /// Whether a peer is connected
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Negotiated MTU (never below the default)
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// A peer connected; any previous session is superseded
    pub fn connect(&mut self, mtu: u16) {
        self.connected = true;
        self.mtu = mtu.max(DEFAULT_MTU);
    }

    /// The peer went away; back to defaults
    pub fn disconnect(&mut self) {
        *self = Self::default();
    }

    /// The peer negotiated a new MTU
    pub fn set_mtu(&mut self, mtu: u16) {
        self.mtu = mtu.max(DEFAULT_MTU);
    }
}

/// Something that happened on the wireless side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirelessEvent {
    /// A peer connected
    Connected {
        /// MTU known at connection time
        mtu: u16,
    },
    /// The peer disconnected
    Disconnected,
    /// The peer negotiated a new MTU
    MtuChanged(u16),
    /// A complete text line written by the peer
    Line(String),
}

/// Create the producer/consumer pair for wireless input
pub fn wireless_inbox(capacity: usize) -> (WirelessInbox, WirelessEvents) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        WirelessInbox {
            tx,
            lines: LineAccumulator::new(),
            dropped: 0,
        },
        WirelessEvents { rx },
    )
}

/// Producer handle, owned by the wireless stack's callback context
#[derive(Debug)]
pub struct WirelessInbox {
    tx: mpsc::Sender<WirelessEvent>,
    lines: LineAccumulator,
    dropped: u64,
}

impl WirelessInbox {
    /// A peer connected
    pub fn connected(&mut self, mtu: u16) {
        self.lines.clear();
        self.send(WirelessEvent::Connected { mtu });
    }

    /// The peer disconnected; a partial line is discarded
    pub fn disconnected(&mut self) {
        self.lines.clear();
        self.send(WirelessEvent::Disconnected);
    }

    /// The peer negotiated a new MTU
    pub fn mtu_changed(&mut self, mtu: u16) {
        self.send(WirelessEvent::MtuChanged(mtu));
    }

    /// Bytes written by the peer to the write characteristic
    pub fn receive(&mut self, data: &[u8]) {
        self.lines.push_bytes(data);
        while let Some(line) = self.lines.next_item() {
            self.send(WirelessEvent::Line(line));
        }
    }

    /// Events lost because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn send(&mut self, event: WirelessEvent) {
        if let Err(e) = self.tx.try_send(event) {
            self.dropped += 1;
            warn!("Wireless inbox dropped event: {}", e);
        }
    }
}

/// Consumer handle, owned by the control loop
#[derive(Debug)]
pub struct WirelessEvents {
    rx: mpsc::Receiver<WirelessEvent>,
}

impl WirelessEvents {
    /// Next queued event, without blocking
    pub fn try_next(&mut self) -> Option<WirelessEvent> {
        self.rx.try_recv().ok()
    }
}

/// Outbound side of the wireless channel, plus session tracking
pub struct WirelessPort {
    link: Box<dyn WirelessLink>,
    events: WirelessEvents,
    session: WirelessSession,
    chunker: WirelessChunker,
    notification: Vec<u8>,
    chunk_delay: Duration,
}

impl std::fmt::Debug for WirelessPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WirelessPort")
            .field("session", &self.session)
            .field("chunk_delay", &self.chunk_delay)
            .finish()
    }
}

impl WirelessPort {
    /// Combine a notify link with the inbound event queue
    pub fn new(link: Box<dyn WirelessLink>, events: WirelessEvents, chunk_delay: Duration) -> Self {
        Self {
            link,
            events,
            session: WirelessSession::default(),
            chunker: WirelessChunker::new(),
            notification: Vec::with_capacity(notification_capacity(DEFAULT_MTU)),
            chunk_delay,
        }
    }

    /// Current session
    pub fn session(&self) -> &WirelessSession {
        &self.session
    }

    /// Next inbound event; session events are applied before returning
    pub fn poll_event(&mut self) -> Option<WirelessEvent> {
        let event = self.events.try_next()?;
        match &event {
            WirelessEvent::Connected { mtu } => {
                self.session.connect(*mtu);
                info!("Wireless peer connected (MTU {})", self.session.mtu());
            }
            WirelessEvent::Disconnected => {
                self.session.disconnect();
                info!("Wireless peer disconnected");
            }
            WirelessEvent::MtuChanged(mtu) => {
                self.session.set_mtu(*mtu);
                debug!("Wireless MTU now {}", self.session.mtu());
            }
            WirelessEvent::Line(_) => {}
        }
        Some(event)
    }

    /// Forward one accepted packet
    ///
    /// Does nothing without a connected peer. Returns the number of
    /// notifications sent. Oversized packets are refused whole.
    pub fn send_packet(
        &mut self,
        packet: &ValidatedPacket<'_>,
        clock: &dyn Clock,
    ) -> Result<usize, ChunkError> {
        if !self.session.is_connected() {
            return Ok(0);
        }

        match self.chunker.encode(packet, self.session.mtu())? {
            WirelessMessage::Single(message) => {
                notify(self.link.as_mut(), message);
                Ok(1)
            }
            WirelessMessage::Chunked(chunks) => {
                let total = chunks.len();
                for chunk in chunks {
                    if chunk.index > 0 && !self.chunk_delay.is_zero() {
                        clock.sleep(self.chunk_delay);
                    }
                    chunk.encode_into(&mut self.notification);
                    notify(self.link.as_mut(), &self.notification);
                }
                Ok(total)
            }
        }
    }

    /// Send a text line as `RSP:` notifications
    ///
    /// Text longer than one notification is split; every piece carries the
    /// prefix so the peer can tell it from packet data.
    pub fn send_text(&mut self, text: &str) -> usize {
        if !self.session.is_connected() {
            return 0;
        }

        let room = notification_capacity(self.session.mtu()) - RESPONSE_TAG.len();
        let mut sent = 0;
        for piece in text.as_bytes().chunks(room) {
            self.notification.clear();
            self.notification.extend_from_slice(RESPONSE_TAG);
            self.notification.extend_from_slice(piece);
            notify(self.link.as_mut(), &self.notification);
            sent += 1;
        }
        sent
    }
}

fn notify(link: &mut dyn WirelessLink, data: &[u8]) {
    if let Err(e) = link.notify(data) {
        debug!("Wireless notify dropped: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use crate::error::TransportError;

    #[derive(Clone, Default)]
    struct CapturingLink {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl WirelessLink for CapturingLink {
        fn notify(&mut self, data: &[u8]) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(())
        }
    }

    struct NoSleep;

    impl Clock for NoSleep {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) {}
    }

    fn port() -> (WirelessPort, WirelessInbox, CapturingLink) {
        let (inbox, events) = wireless_inbox(8);
        let link = CapturingLink::default();
        let port = WirelessPort::new(Box::new(link.clone()), events, Duration::ZERO);
        (port, inbox, link)
    }

    #[test]
    fn session_resets_on_disconnect() {
        let mut session = WirelessSession::default();
        session.connect(185);
        assert!(session.is_connected());
        assert_eq!(session.mtu(), 185);
        session.disconnect();
        assert_eq!(session, WirelessSession::default());
    }

    #[test]
    fn small_mtu_is_clamped() {
        let mut session = WirelessSession::default();
        session.connect(10);
        assert_eq!(session.mtu(), DEFAULT_MTU);
    }

    #[test]
    fn inbox_passes_only_complete_lines() {
        let (mut inbox, mut events) = wireless_inbox(8);
        inbox.receive(b"CFG:915.0,96.0,");
        assert_eq!(events.try_next(), None);
        inbox.receive(b"50.0,467.0,32\n");
        assert_eq!(
            events.try_next(),
            Some(WirelessEvent::Line("CFG:915.0,96.0,50.0,467.0,32".to_string()))
        );
    }

    #[test]
    fn inbox_drops_when_full() {
        let (mut inbox, mut events) = wireless_inbox(1);
        inbox.receive(b"one\ntwo\n");
        assert_eq!(inbox.dropped(), 1);
        assert_eq!(events.try_next(), Some(WirelessEvent::Line("one".to_string())));
        assert_eq!(events.try_next(), None);
    }

    #[test]
    fn disconnect_discards_partial_line() {
        let (mut inbox, mut events) = wireless_inbox(8);
        inbox.connected(100);
        inbox.receive(b"CFG:91");
        inbox.disconnected();
        inbox.connected(100);
        inbox.receive(b"5\n");
        let collected: Vec<_> = std::iter::from_fn(|| events.try_next()).collect();
        assert_eq!(
            collected,
            vec![
                WirelessEvent::Connected { mtu: 100 },
                WirelessEvent::Disconnected,
                WirelessEvent::Connected { mtu: 100 },
                WirelessEvent::Line("5".to_string()),
            ]
        );
    }

    #[test]
    fn packets_are_dropped_without_peer() {
        let (mut port, _inbox, link) = port();
        let packet = ValidatedPacket {
            payload: &[1, 2, 3],
            rssi: -80.0,
            snr: 5.0,
        };
        assert_eq!(port.send_packet(&packet, &NoSleep), Ok(0));
        assert!(link.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn chunked_packet_sends_every_chunk_in_order() {
        let (mut port, mut inbox, link) = port();
        inbox.connected(DEFAULT_MTU);
        port.poll_event();

        let payload = [0x55u8; 40];
        let packet = ValidatedPacket {
            payload: &payload,
            rssi: -80.0,
            snr: 5.0,
        };
        assert_eq!(port.send_packet(&packet, &NoSleep), Ok(4));

        let sent = link.sent.lock().unwrap();
        for (index, notification) in sent.iter().enumerate() {
            assert_eq!(&notification[..3], b"CHK");
            assert_eq!(notification[3] as usize, index);
            assert_eq!(notification[4], 4);
        }
    }

    #[test]
    fn long_text_is_split_with_prefix_on_every_piece() {
        let (mut port, mut inbox, link) = port();
        inbox.connected(DEFAULT_MTU);
        port.poll_event();

        let text = "[STATS] Total:10 Fwd:9 NoRAPT:1 BadCRC:0 Err:0 Rate:90.0%\n";
        let sent_count = port.send_text(text);
        let sent = link.sent.lock().unwrap();
        assert_eq!(sent.len(), sent_count);
        assert!(sent.iter().all(|n| n.starts_with(b"RSP:") && n.len() <= 20));

        let joined: Vec<u8> = sent.iter().flat_map(|n| n[4..].to_vec()).collect();
        assert_eq!(joined, text.as_bytes());
    }
}
