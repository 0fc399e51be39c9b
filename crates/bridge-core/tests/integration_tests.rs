//! Integration tests for the radio packet bridge
//!
//! These tests drive a complete bridge built from simulated collaborators:
//! - Startup negotiation on both input channels and the default timeout
//! - Frame validation, forwarding and accounting
//! - Wired framing and wireless chunking as seen by the receiving side
//! - Periodic statistics and status panel gating
//! - Radio bring-up failure and builder checks

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use bridge_core::{
    Bridge, BridgeConfig, BridgeError, BridgeEvent, Capabilities, Phase, RadioError,
};
use bridge_protocol::{build_frame, FrameRejection, PacketClass, RfConfig};
use bridge_sim::{
    memory_wired, simulated_radio, virtual_peer, ManualClock, PanelCall, RadioFeeder,
    RecordingPanel, SimFrame, SimJournal, SimStep, SimulatedBattery, VirtualPeer, WiredHost,
};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const DEFAULT_CFG: &str = "CFG:915.0,96.0,50.0,467.0,32";

    /// A bridge plus handles on every simulated collaborator
    pub struct Harness {
        pub bridge: Bridge,
        pub feeder: RadioFeeder,
        pub host: WiredHost,
        pub peer: VirtualPeer,
        pub panel: RecordingPanel,
        pub battery: SimulatedBattery,
        pub clock: ManualClock,
    }

    pub fn config(capabilities: Capabilities) -> BridgeConfig {
        BridgeConfig {
            capabilities,
            record_events: true,
            ..BridgeConfig::default()
        }
    }

    /// Build a bridge with every collaborator attached
    ///
    /// Collaborators for disabled capabilities are dropped by the builder.
    pub fn harness(capabilities: Capabilities) -> Harness {
        let (radio, feeder) = simulated_radio();
        let (wired, host) = memory_wired();
        let (peer, link, events) = virtual_peer(32);
        let panel = RecordingPanel::new();
        let battery = SimulatedBattery::new(3.9);
        let clock = ManualClock::new();

        let bridge = Bridge::builder(radio)
            .config(config(capabilities))
            .clock(clock.clone())
            .wired(wired)
            .wireless(link, events)
            .panel(panel.clone())
            .battery(battery.clone())
            .build()
            .unwrap();

        Harness {
            bridge,
            feeder,
            host,
            peer,
            panel,
            battery,
            clock,
        }
    }

    /// Negotiate over the wired channel with the default command and start
    pub fn running(capabilities: Capabilities) -> Harness {
        let mut h = harness(capabilities);
        h.host.send_line(DEFAULT_CFG);
        h.bridge.negotiate(&AtomicBool::new(false)).unwrap();
        h.bridge.start().unwrap();
        h.bridge.drain_events();
        h.panel.clear();
        h
    }

    /// Frame carrying `payload`, received at fixed signal values
    pub fn frame(payload: &[u8]) -> SimFrame {
        SimFrame::new(build_frame(payload), -87.5, 9.25)
    }

    pub fn count(text: &str, needle: &str) -> usize {
        text.matches(needle).count()
    }
}

use helpers::*;

// ============================================================================
// Negotiation Tests
// ============================================================================

mod negotiation_tests {
    use super::*;

    #[test]
    fn wired_command_is_accepted_and_echoed() {
        let mut h = harness(Capabilities::wired_only());
        h.host.send_line(DEFAULT_CFG);

        let config = h.bridge.negotiate(&AtomicBool::new(false)).unwrap();

        assert_eq!(config, RfConfig::default());
        assert_eq!(h.bridge.phase(), Phase::Configured);
        let text = h.host.text();
        assert!(text.contains("RaptorHab Ground Station Bridge"));
        assert!(text.contains("[WAIT_CFG] Example: CFG:915.0,96.0,50.0,467.0,32\n"));
        assert!(text.contains("CFG_OK:915.0,96.0,50.0,467.0,32\n"));
        assert_eq!(
            h.bridge.drain_events(),
            vec![BridgeEvent::Configured {
                config: RfConfig::default(),
                source: Some(bridge_core::Source::Wired),
            }]
        );
    }

    #[test]
    fn out_of_range_command_is_refused_and_waiting_continues() {
        let mut h = harness(Capabilities::wired_only());
        h.host.send_line("CFG:1000.0,96.0,50.0,467.0,32");
        h.host.send_line("CFG:433.5,9.6,5.0,50.0,16");

        let config = h.bridge.negotiate(&AtomicBool::new(false)).unwrap();

        let text = h.host.text();
        let err_at = text.find("CFG_ERR:").expect("error reported");
        let ok_at = text.find("CFG_OK:433.5,9.6,5.0,50.0,16\n").expect("ack sent");
        assert!(err_at < ok_at);
        assert!(text[err_at..ok_at].contains("out of range"));
        assert_eq!(config.frequency_mhz, 433.5);
        assert_eq!(config.preamble_bits, 16);
    }

    #[test]
    fn malformed_and_unrelated_lines() {
        let mut h = harness(Capabilities::wired_only());
        h.host.send_line("hello there");
        h.host.send_line("CFG:915.0,96.0");
        h.host.send_line(DEFAULT_CFG);

        h.bridge.negotiate(&AtomicBool::new(false)).unwrap();

        let text = h.host.text();
        assert_eq!(count(&text, "CFG_ERR:"), 1);
        assert_eq!(count(&text, "CFG_OK:"), 1);
    }

    #[test]
    fn timeout_applies_defaults() {
        let mut h = harness(Capabilities::wired_only());

        let config = h.bridge.negotiate(&AtomicBool::new(false)).unwrap();

        assert_eq!(config, RfConfig::default());
        assert!(h.clock.elapsed() >= Duration::from_secs(120));
        assert!(h.clock.elapsed() < Duration::from_secs(121));

        let text = h.host.text();
        assert!(text.contains(
            "[WAIT_CFG] Timeout - using default configuration\nCFG_OK:915.0,96.0,50.0,467.0,32\n"
        ));
        // One prompt per second of waiting
        let prompts = count(&text, "[WAIT_CFG]\n");
        assert!((119..=121).contains(&prompts), "{} prompts", prompts);
        assert_eq!(
            h.bridge.drain_events(),
            vec![BridgeEvent::Configured {
                config: RfConfig::default(),
                source: None,
            }]
        );
    }

    #[test]
    fn timeout_notice_reaches_connected_peer() {
        let mut h = harness(Capabilities::full());
        h.peer.connect(185);

        h.bridge.negotiate(&AtomicBool::new(false)).unwrap();

        assert_eq!(
            h.peer.text(),
            "[WAIT_CFG] Timeout - using default configuration\nCFG_OK:915.0,96.0,50.0,467.0,32\n"
        );
    }

    #[test]
    fn overlong_command_is_discarded_whole() {
        let mut h = harness(Capabilities::wired_only());
        // Cut at 100 characters this would read as a valid config with preamble 128
        let overlong = format!("CFG:433.{},9.6,5.0,50.0,1280", "0".repeat(75));
        h.host.send_line(&overlong);
        h.host.send_line(DEFAULT_CFG);

        let config = h.bridge.negotiate(&AtomicBool::new(false)).unwrap();

        assert_eq!(config, RfConfig::default());
        let text = h.host.text();
        assert!(!text.contains("CFG_OK:433.0"));
        assert_eq!(count(&text, "CFG_OK:"), 1);
    }

    #[test]
    fn panel_counts_down_while_waiting() {
        let mut h = harness(Capabilities::wired_only());
        h.bridge.negotiate(&AtomicBool::new(false)).unwrap();

        let calls = h.panel.calls();
        assert_eq!(calls.first(), Some(&PanelCall::Waiting(RfConfig::default())));
        assert!(calls.contains(&PanelCall::Countdown(119)));
        assert!(calls.contains(&PanelCall::Countdown(1)));
    }

    #[test]
    fn wireless_command_is_answered_over_wireless() {
        let mut h = harness(Capabilities::full());
        h.peer.connect(185);
        h.peer.send_line(DEFAULT_CFG);

        h.bridge.negotiate(&AtomicBool::new(false)).unwrap();

        assert_eq!(h.peer.text(), "CFG_OK:915.0,96.0,50.0,467.0,32\n");
        assert!(!h.host.text().contains("CFG_OK:"));
    }

    #[test]
    fn stop_flag_aborts_negotiation() {
        let mut h = harness(Capabilities::wired_only());
        let result = h.bridge.negotiate(&AtomicBool::new(true));
        assert!(matches!(result, Err(BridgeError::Stopped)));
        assert_eq!(h.bridge.phase(), Phase::Negotiating);
    }

    #[test]
    fn command_after_configuration_is_refused() {
        let mut h = running(Capabilities::wired_only());
        h.host.send_line("CFG:433.0,9.6,5.0,50.0,16");

        h.bridge.poll_once().unwrap();

        assert!(h
            .host
            .text()
            .contains("CFG_ERR:configuration already applied\n"));
        assert_eq!(h.bridge.rf_config(), Some(RfConfig::default()));
    }
}

// ============================================================================
// Forwarding Tests
// ============================================================================

mod forwarding_tests {
    use super::*;

    #[test]
    fn start_announces_configuration() {
        let h = running(Capabilities::wired_only());
        let text = h.host.text();
        assert!(text.contains(
            "[CONFIG] Freq:915.0 BR:96 Dev:50 BW:467 Preamble:32\n\
             [READY] Listening for packets...\n\
             [STATS] Starting - will report every 10 seconds\n"
        ));
        assert_eq!(h.bridge.phase(), Phase::Running);
    }

    #[test]
    fn sixteen_byte_frame_is_forwarded() {
        let mut h = running(Capabilities::wired_only());
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
        h.feeder.deliver(frame(&payload));

        let outcome = h.bridge.poll_once().unwrap();

        assert_eq!(outcome, Some(Ok(PacketClass::Small)));
        let frames = h.host.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, payload);
        assert_eq!(frames[0].rssi, -87.5);
        assert_eq!(frames[0].snr, 9.25);
        assert_eq!(h.bridge.stats().forwarded, 1);
        assert_eq!(h.bridge.stats().small, 1);
        assert_eq!(
            h.bridge.drain_events(),
            vec![BridgeEvent::FrameForwarded {
                len: 8,
                class: PacketClass::Small
            }]
        );
    }

    #[test]
    fn corrupted_trailer_is_counted_and_not_forwarded() {
        let mut h = running(Capabilities::wired_only());
        let mut sim = frame(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let last = sim.data.len() - 1;
        sim.data[last] ^= 0xFF;
        h.feeder.deliver(sim);
        let writes_before = h.host.write_count();

        let outcome = h.bridge.poll_once().unwrap();

        assert_eq!(outcome, Some(Err(FrameRejection::BadCheck)));
        assert_eq!(h.host.write_count(), writes_before);
        assert!(h.host.take_frames().is_empty());
        assert_eq!(h.bridge.stats().rejected_bad_check, 1);
        assert_eq!(h.bridge.stats().total, 1);
    }

    #[test]
    fn receiver_is_rearmed_after_every_frame() {
        let mut h = running(Capabilities::wired_only());
        let armed = h.feeder.rearms();

        h.feeder.deliver(frame(&[7; 20]));
        h.bridge.poll_once().unwrap();
        assert!(h.feeder.is_armed());
        h.feeder.deliver(SimFrame::failed(-3));
        h.bridge.poll_once().unwrap();

        assert!(h.feeder.is_armed());
        assert_eq!(h.feeder.rearms(), armed + 2);
        assert_eq!(h.bridge.stats().radio_error, 1);
        assert_eq!(h.feeder.missed(), 0);
    }

    #[test]
    fn receiver_is_rearmed_before_forwarding() {
        let journal = SimJournal::new();
        let (radio, feeder) = simulated_radio();
        let (wired, host) = memory_wired();
        let (mut peer, link, events) = virtual_peer(8);
        let mut bridge = Bridge::builder(radio.with_journal(journal.clone()))
            .config(config(Capabilities {
                battery: false,
                ..Capabilities::full()
            }))
            .clock(ManualClock::new())
            .wired(wired.with_journal(journal.clone()))
            .wireless(link.with_journal(journal.clone()), events)
            .build()
            .unwrap();
        host.send_line(DEFAULT_CFG);
        bridge.negotiate(&AtomicBool::new(false)).unwrap();
        bridge.start().unwrap();
        peer.connect(185);
        bridge.poll_once().unwrap();
        journal.clear();

        for payload in [[1u8; 16], [2; 16], [3; 16]] {
            feeder.deliver(frame(&payload));
            assert_eq!(bridge.poll_once().unwrap(), Some(Ok(PacketClass::Small)));
        }

        let steps = journal.steps();
        assert_eq!(steps.len(), 12, "{:?}", steps);
        for step in steps.chunks(4) {
            assert_eq!(step[0], SimStep::FrameRead);
            assert_eq!(step[1], SimStep::ReceiveArmed);
            assert!(matches!(step[2], SimStep::WiredWrite { .. }));
            assert!(matches!(step[3], SimStep::Notification { .. }));
        }
    }

    #[test]
    fn frames_during_negotiation_are_not_replayed() {
        let mut h = harness(Capabilities::wired_only());
        for _ in 0..50 {
            h.feeder.deliver(frame(&[5; 16]));
        }
        h.host.send_line(DEFAULT_CFG);
        h.bridge.negotiate(&AtomicBool::new(false)).unwrap();
        h.bridge.start().unwrap();

        assert_eq!(h.bridge.poll_once().unwrap(), None);
        assert_eq!(h.bridge.stats().total, 0);
        assert_eq!(h.feeder.missed(), 50);
        assert!(h.host.take_frames().is_empty());
    }

    #[test]
    fn idle_iteration_reports_no_frame() {
        let mut h = running(Capabilities::wired_only());
        assert_eq!(h.bridge.poll_once().unwrap(), None);
        assert_eq!(h.bridge.stats().total, 0);
    }

    #[test]
    fn large_payload_is_chunked_for_the_peer() {
        let mut h = running(Capabilities::full());
        h.peer.connect(23);
        h.bridge.poll_once().unwrap();

        let payload: Vec<u8> = (0..100u8).collect();
        h.feeder.deliver(frame(&payload));
        let before = h.clock.elapsed();

        assert_eq!(h.bridge.poll_once().unwrap(), Some(Ok(PacketClass::Large)));

        let packets = h.peer.take_packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload, payload);
        assert_eq!(packets[0].rssi, -87.5);
        assert!(h.peer.errors().is_empty());

        // 111-byte message in 15-byte slices: 8 chunks, 7 pauses
        assert_eq!(h.peer.notification_count(), 8);
        assert_eq!(h.clock.elapsed() - before, Duration::from_millis(70));

        // The wired side still gets the whole frame
        assert_eq!(h.host.take_frames()[0].payload, payload);
    }

    #[test]
    fn small_payload_fits_one_notification_with_large_mtu() {
        let mut h = running(Capabilities::full());
        h.peer.connect(247);
        h.bridge.poll_once().unwrap();

        h.feeder.deliver(frame(&[0x42; 50]));
        h.bridge.poll_once().unwrap();

        assert_eq!(h.peer.notification_count(), 1);
        assert_eq!(h.peer.take_packets()[0].payload, vec![0x42; 50]);
    }

    #[test]
    fn nothing_is_sent_without_a_peer() {
        let mut h = running(Capabilities::full());
        h.feeder.deliver(frame(&[1; 30]));
        h.bridge.poll_once().unwrap();
        assert_eq!(h.peer.notification_count(), 0);
        assert_eq!(h.host.take_frames().len(), 1);
    }

    #[test]
    fn disconnect_stops_wireless_forwarding() {
        let mut h = running(Capabilities::full());
        h.peer.connect(185);
        h.bridge.poll_once().unwrap();
        h.peer.disconnect();
        h.bridge.poll_once().unwrap();

        h.feeder.deliver(frame(&[1; 30]));
        h.bridge.poll_once().unwrap();

        assert_eq!(h.peer.notification_count(), 0);
        assert!(h.bridge.drain_events().contains(&BridgeEvent::WirelessDisconnected));
    }

    #[test]
    fn failing_wired_writes_do_not_stop_the_loop() {
        let mut h = running(Capabilities::wired_only());
        h.host.set_fail_writes(true);
        h.feeder.deliver(frame(&[1; 30]));

        assert_eq!(h.bridge.poll_once().unwrap(), Some(Ok(PacketClass::Small)));
        assert_eq!(h.bridge.stats().forwarded, 1);
    }
}

// ============================================================================
// Statistics and Display Tests
// ============================================================================

mod reporting_tests {
    use super::*;

    #[test]
    fn stats_line_every_ten_seconds() {
        let mut h = running(Capabilities::wired_only());
        h.feeder.deliver(frame(&[1; 20]));
        h.bridge.poll_once().unwrap();

        h.clock.advance(Duration::from_millis(9_999));
        h.bridge.poll_once().unwrap();
        assert!(!h.host.text().contains("[STATS] Total"));

        h.clock.advance(Duration::from_millis(1));
        h.bridge.poll_once().unwrap();
        assert!(h.host.text().contains(
            "\n[STATS] Total:1 Fwd:1 NoRAPT:0 BadCRC:0 Err:0 Rate:100.0% Small:1 Large:0\n"
        ));

        h.bridge.poll_once().unwrap();
        assert_eq!(count(&h.host.text(), "[STATS] Total"), 1);
    }

    #[test]
    fn stats_line_carries_session_and_battery() {
        let mut h = running(Capabilities::full());
        h.peer.connect(185);
        h.bridge.poll_once().unwrap();
        h.clock.advance(Duration::from_secs(10));
        h.bridge.poll_once().unwrap();

        let expected =
            "[STATS] Total:0 Fwd:0 NoRAPT:0 BadCRC:0 Err:0 Rate:0.0% Small:0 Large:0 BLE:Connected Batt:3.90V(75%)\n";
        assert!(h.host.text().contains(expected));
        assert!(h.peer.text().ends_with(expected));
    }

    #[test]
    fn panel_waits_for_radio_to_go_quiet() {
        let mut h = running(Capabilities::wired_only());
        h.feeder.deliver(frame(&[1; 20]));
        h.bridge.poll_once().unwrap();
        assert!(h.panel.calls().is_empty());

        h.clock.advance(Duration::from_millis(700));
        h.bridge.poll_once().unwrap();
        assert!(h.panel.calls().is_empty());

        h.clock.advance(Duration::from_millis(100));
        h.bridge.poll_once().unwrap();
        let calls = h.panel.calls();
        assert_eq!(calls.first(), Some(&PanelCall::Layout(RfConfig::default())));
        assert!(calls.contains(&PanelCall::Signal {
            rssi: -87.5,
            snr: 9.25
        }));
        assert_eq!(h.panel.count(|c| matches!(c, PanelCall::Stats(_))), 1);
    }

    #[test]
    fn panel_passes_are_rate_limited() {
        let mut h = running(Capabilities::wired_only());
        h.clock.advance(Duration::from_millis(800));
        h.bridge.poll_once().unwrap();
        let after_first = h.panel.calls().len();
        assert!(after_first > 0);

        h.clock.advance(Duration::from_millis(100));
        h.bridge.poll_once().unwrap();
        assert_eq!(h.panel.calls().len(), after_first);
    }

    #[test]
    fn battery_drop_is_redrawn() {
        let mut h = running(Capabilities::full());
        h.clock.advance(Duration::from_millis(800));
        h.bridge.poll_once().unwrap();
        h.panel.clear();

        h.battery.set_voltage(3.3);
        h.clock.advance(Duration::from_millis(1_100));
        h.bridge.poll_once().unwrap();

        let aux: Vec<_> = h
            .panel
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                PanelCall::Aux { battery, .. } => battery,
                _ => None,
            })
            .collect();
        assert_eq!(aux.len(), 1);
        assert_eq!(aux[0].percent, 25);
    }
}

// ============================================================================
// Failure Tests
// ============================================================================

mod failure_tests {
    use super::*;

    #[test]
    fn radio_init_failure_halts_with_reports() {
        let (radio, _feeder) = simulated_radio();
        let radio = radio.fail_init(RadioError::InitFailed { code: -2 });
        let (wired, host) = memory_wired();
        let panel = RecordingPanel::new();
        let mut bridge = Bridge::builder(radio)
            .config(config(Capabilities::wired_only()))
            .clock(ManualClock::new())
            .wired(wired)
            .panel(panel.clone())
            .build()
            .unwrap();
        host.send_line(DEFAULT_CFG);
        bridge.negotiate(&AtomicBool::new(false)).unwrap();

        let err = bridge.start().unwrap_err();
        assert!(err.is_fatal());
        bridge.halt(&err, &AtomicBool::new(true));

        assert_eq!(bridge.phase(), Phase::Halted);
        let text = host.text();
        assert!(text.contains("[ERROR] Radio initialization failed!\n"));
        assert!(text.contains("[ERROR] Radio init failed - please reset\n"));
        assert!(!text.contains("[READY]"));
        assert!(panel
            .calls()
            .contains(&PanelCall::Fatal("RADIO INIT FAILED! Please reset device".to_string())));
        assert!(matches!(
            bridge.poll_once(),
            Err(BridgeError::NotConfigured)
        ));
    }

    #[test]
    fn start_requires_configuration() {
        let mut h = harness(Capabilities::wired_only());
        assert!(matches!(h.bridge.start(), Err(BridgeError::NotConfigured)));
    }

    #[test]
    fn missing_collaborator_is_reported() {
        let (radio, _feeder) = simulated_radio();
        let (wired, _host) = memory_wired();
        let result = Bridge::builder(radio)
            .config(config(Capabilities::full()))
            .wired(wired)
            .build();
        assert!(matches!(
            result,
            Err(BridgeError::MissingCollaborator("wireless"))
        ));
    }

    #[test]
    fn disabled_capability_ignores_collaborator() {
        let h = harness(Capabilities::wired_only());
        assert!(h.bridge.session().is_none());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use bridge_sim::{FrameKind, TrafficConfig, TrafficGenerator};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn counters_match_generated_traffic(seed in any::<u64>(), frames in 1usize..120) {
            let mut h = running(Capabilities::wired_only());
            let mut traffic = TrafficGenerator::new(TrafficConfig {
                seed,
                bad_check_rate: 0.2,
                no_sync_rate: 0.1,
                too_short_rate: 0.1,
                radio_error_rate: 0.1,
                ..TrafficConfig::default()
            });

            let mut valid = 0u64;
            for _ in 0..frames {
                let (frame, kind) = traffic.next_frame();
                if kind == FrameKind::Valid {
                    valid += 1;
                }
                h.feeder.deliver(frame);
                let outcome = h.bridge.poll_once().unwrap().expect("frame handled");
                prop_assert_eq!(outcome.is_ok(), kind == FrameKind::Valid);
            }

            let stats = *h.bridge.stats();
            prop_assert!(stats.is_consistent());
            prop_assert_eq!(stats.total, frames as u64);
            prop_assert_eq!(stats.forwarded, valid);
            prop_assert_eq!(h.host.take_frames().len() as u64, valid);
            prop_assert_eq!(h.host.rejected_frames(), 0);
        }
    }
}
