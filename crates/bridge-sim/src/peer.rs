//! Virtual wireless peer
//!
//! Plays the phone or laptop on the other end of the wireless link: it
//! connects, writes command lines, and reassembles what the bridge notifies.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bridge_core::{wireless_inbox, TransportError, WirelessEvents, WirelessInbox, WirelessLink};
use bridge_protocol::{ChunkAssembler, PacketMessage, PeerNotification, ReassemblyError};
use tracing::debug;

use crate::journal::{SimJournal, SimStep};

type Mailbox = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// Create a peer, the bridge-side link and the bridge's event queue
pub fn virtual_peer(capacity: usize) -> (VirtualPeer, PeerLink, WirelessEvents) {
    let (inbox, events) = wireless_inbox(capacity);
    let mailbox: Mailbox = Arc::default();
    (
        VirtualPeer {
            inbox,
            mailbox: mailbox.clone(),
            assembler: ChunkAssembler::new(),
            packets: Vec::new(),
            text: String::new(),
            errors: Vec::new(),
            notifications: 0,
        },
        PeerLink {
            mailbox,
            journal: None,
        },
        events,
    )
}

/// Bridge-side notify link delivering into the peer's mailbox
#[derive(Debug, Clone)]
pub struct PeerLink {
    mailbox: Mailbox,
    journal: Option<SimJournal>,
}

impl PeerLink {
    /// Record notifications in `journal`
    pub fn with_journal(mut self, journal: SimJournal) -> Self {
        self.journal = Some(journal);
        self
    }
}

impl WirelessLink for PeerLink {
    fn notify(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.mailbox
            .lock()
            .map_err(|_| TransportError::Wireless("peer mailbox poisoned".to_string()))?
            .push_back(data.to_vec());
        if let Some(journal) = &self.journal {
            journal.record(SimStep::Notification { len: data.len() });
        }
        Ok(())
    }
}

/// The simulated peer
#[derive(Debug)]
pub struct VirtualPeer {
    inbox: WirelessInbox,
    mailbox: Mailbox,
    assembler: ChunkAssembler,
    packets: Vec<PacketMessage>,
    text: String,
    errors: Vec<ReassemblyError>,
    notifications: usize,
}

impl VirtualPeer {
    /// Connect with the given MTU
    pub fn connect(&mut self, mtu: u16) {
        self.assembler.reset();
        self.inbox.connected(mtu);
    }

    /// Disconnect
    pub fn disconnect(&mut self) {
        self.inbox.disconnected();
    }

    /// Renegotiate the MTU
    pub fn set_mtu(&mut self, mtu: u16) {
        self.inbox.mtu_changed(mtu);
    }

    /// Write raw bytes to the bridge's write characteristic
    pub fn write(&mut self, data: &[u8]) {
        self.inbox.receive(data);
    }

    /// Write a text line (newline appended)
    pub fn send_line(&mut self, line: &str) {
        self.write(format!("{}\n", line).as_bytes());
    }

    /// Process every notification received so far
    pub fn pump(&mut self) {
        let pending: Vec<Vec<u8>> = match self.mailbox.lock() {
            Ok(mut mailbox) => mailbox.drain(..).collect(),
            Err(_) => return,
        };
        for notification in pending {
            self.notifications += 1;
            match self.assembler.push(&notification) {
                Ok(PeerNotification::Packet(packet)) => self.packets.push(packet),
                Ok(PeerNotification::Text(text)) => self.text.push_str(&text),
                Ok(PeerNotification::Pending) => {}
                Err(e) => {
                    debug!("Peer reassembly error: {}", e);
                    self.errors.push(e);
                }
            }
        }
    }

    /// Complete packets received, oldest first
    pub fn take_packets(&mut self) -> Vec<PacketMessage> {
        self.pump();
        std::mem::take(&mut self.packets)
    }

    /// All `RSP:` text received so far, prefixes removed
    pub fn text(&mut self) -> &str {
        self.pump();
        &self.text
    }

    /// Reassembly errors seen
    pub fn errors(&mut self) -> &[ReassemblyError] {
        self.pump();
        &self.errors
    }

    /// Raw notifications processed
    pub fn notification_count(&mut self) -> usize {
        self.pump();
        self.notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_collects_text_across_notifications() {
        let (mut peer, mut link, _events) = virtual_peer(8);
        link.notify(b"RSP:CFG_OK:915.0,").unwrap();
        link.notify(b"RSP:96.0,50.0,467.0,32\n").unwrap();
        assert_eq!(peer.text(), "CFG_OK:915.0,96.0,50.0,467.0,32\n");
        assert_eq!(peer.notification_count(), 2);
    }

    #[test]
    fn peer_lines_reach_bridge_queue() {
        let (mut peer, _link, mut events) = virtual_peer(8);
        peer.connect(185);
        peer.send_line("CFG:915.0,96.0,50.0,467.0,32");
        assert_eq!(
            events.try_next(),
            Some(bridge_core::WirelessEvent::Connected { mtu: 185 })
        );
        assert_eq!(
            events.try_next(),
            Some(bridge_core::WirelessEvent::Line(
                "CFG:915.0,96.0,50.0,467.0,32".to_string()
            ))
        );
    }

    #[test]
    fn garbage_notification_is_an_error() {
        let (mut peer, mut link, _events) = virtual_peer(8);
        link.notify(b"XYZ").unwrap();
        assert_eq!(peer.errors(), &[ReassemblyError::UnknownTag]);
    }
}
