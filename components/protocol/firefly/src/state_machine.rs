//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

use crate::*;

/// What handling one received frame amounts to
enum RxOutcome {
    /// The beacon won; the epoch deadlines were re-armed
    Adopted,
    /// Frame rejected or dropped; no state change
    Ignored,
    /// Sink: data completed its way up the tree and sits in the inbox
    Delivered,
    /// Pass the message one hop toward the sink
    Relay { dest: NodeId, message: Message },
}

/// Dispatch one frame by port and kind
fn handle_reception(
    context: &mut Context,
    own_id: NodeId,
    is_sink: bool,
    channel_base: Channel,
    time: TimeMs,
    rx: FireflyReception,
    rng: impl RngCore,
) -> RxOutcome {
    match (rx.channel, rx.message) {
        (channel, Message::Beacon { seqn, metric, delay_ms }) if channel == channel_base => {
            if context.consider_beacon(own_id, time, rx.from, seqn, metric, delay_ms, rx.rssi, rng)
            {
                event_log_adopt!(time, own_id, rx.from, context.metric);
                RxOutcome::Adopted
            } else {
                RxOutcome::Ignored
            }
        }
        (channel, Message::Collect { source, hops, payload })
            if channel == channel_base + 1 =>
        {
            if is_sink {
                context.inbox.replace(CollectedData {
                    source,
                    hops: hops.saturating_add(1),
                    payload,
                });
                RxOutcome::Delivered
            } else {
                match context.parent {
                    Some(dest) if context.metric != METRIC_UNTETHERED => RxOutcome::Relay {
                        dest,
                        message: Message::Collect {
                            source,
                            hops: hops.saturating_add(1),
                            payload,
                        },
                    },
                    _ => {
                        warn!("collect message but no route to the sink: dropping");
                        RxOutcome::Ignored
                    }
                }
            }
        }
        (channel, message) => {
            warn!("unexpected message on channel {}: {}", channel, message);
            RxOutcome::Ignored
        }
    }
}

impl Firefly {
    /// Get next state
    ///
    /// Each state's exit functionality is implemented here.
    #[must_use]
    pub(crate) fn next(
        &mut self,
        time: TimeMs,
        reception: Option<FireflyReception>,
        mut rng: impl RngCore,
    ) -> State {
        match (&mut self.state, reception) {
            (State::Reset, None) => {
                event_log_reset!(time, self.id, self.is_sink);
                self.context.reset();
                if self.is_sink {
                    self.context.metric = 0;
                    self.context.delay_ms = 0;
                    self.context.schedule.arm(DeadlineKind::Epoch, time);
                    State::Active { end: time }
                } else {
                    State::Scan {
                        end: time + SCAN_WINDOW_MS,
                    }
                }
            }

            (State::Scan { end }, Some(rx)) => {
                let end = *end;
                match handle_reception(
                    &mut self.context,
                    self.id,
                    self.is_sink,
                    self.channel_base,
                    time,
                    rx,
                    &mut rng,
                ) {
                    RxOutcome::Adopted => State::Active {
                        end: self.context.schedule.next_at(),
                    },
                    // the frame may have arrived after the listen deadline
                    _ => State::Scan {
                        end: end.max(time),
                    },
                }
            }
            // listen was cut short without a usable frame
            (State::Scan { end }, None) if time < *end => State::Scan { end: *end },
            (State::Scan { .. }, None) => {
                debug!("still untethered, scanning on");
                State::Scan {
                    end: time + SCAN_WINDOW_MS,
                }
            }

            (State::Active { end }, Some(rx)) => {
                let end = *end;
                match handle_reception(
                    &mut self.context,
                    self.id,
                    self.is_sink,
                    self.channel_base,
                    time,
                    rx,
                    &mut rng,
                ) {
                    RxOutcome::Adopted => State::Active {
                        end: self.context.schedule.next_at(),
                    },
                    RxOutcome::Relay { dest, message } => State::SendCollect {
                        channel: self.channel_base + 1,
                        dest,
                        message,
                    },
                    // the frame may have arrived after the listen deadline
                    RxOutcome::Delivered | RxOutcome::Ignored => State::Active {
                        end: end.max(time),
                    },
                }
            }
            // listen was cut short without a usable frame
            (State::Active { end }, None) if time < *end => State::Active { end: *end },
            (State::Active { .. }, None) => {
                let deadline = self.context.schedule.pop();
                match deadline.kind {
                    DeadlineKind::Epoch => {
                        self.context.beacon_seqn = self.context.beacon_seqn.wrapping_add(1);
                        self.context
                            .schedule
                            .arm(DeadlineKind::Epoch, time + EPOCH_DURATION_MS);
                        self.context
                            .schedule
                            .arm(DeadlineKind::CollectStart, time + FLOOD_WINDOW_MS);
                        self.context.schedule.arm(
                            DeadlineKind::SleepAt,
                            time + FLOOD_WINDOW_MS + COLLECT_WINDOW_MS,
                        );
                        State::SendBeacon {
                            channel: self.channel_base,
                            seqn: self.context.beacon_seqn,
                            metric: 0,
                            delay_ms: 0,
                        }
                    }
                    DeadlineKind::CollectStart => {
                        info!("collection window open");
                        State::Active {
                            end: self.context.schedule.next_at().max(time),
                        }
                    }
                    DeadlineKind::BeaconTx => State::SendBeacon {
                        channel: self.channel_base,
                        seqn: self.context.beacon_seqn,
                        metric: self.context.metric,
                        delay_ms: self.context.delay_ms.min(u16::MAX as TimeMs) as u16,
                    },
                    DeadlineKind::Slot => {
                        match (self.context.pending.take(), self.context.parent) {
                            (Some(payload), Some(dest)) => State::SendCollect {
                                channel: self.channel_base + 1,
                                dest,
                                message: Message::Collect {
                                    source: self.id,
                                    hops: 0,
                                    payload,
                                },
                            },
                            (Some(_), None) => {
                                warn!("no route at slot time: dropping payload");
                                State::Active {
                                    end: self.context.schedule.next_at().max(time),
                                }
                            }
                            (None, _) => {
                                debug!("slot without a pending payload");
                                State::Active {
                                    end: self.context.schedule.next_at().max(time),
                                }
                            }
                        }
                    }
                    DeadlineKind::SleepAt => {
                        let end = if self.is_sink {
                            self.context.schedule.next_of(DeadlineKind::Epoch)
                        } else {
                            self.context.schedule.next_of(DeadlineKind::WakeAt)
                        }
                        .unwrap();
                        State::SleepUntil { end }
                    }
                    DeadlineKind::WakeAt => {
                        // only reached when the sleep deadline was displaced
                        // past the wake deadline; recover by rescanning
                        self.context.metric = METRIC_UNTETHERED;
                        self.context.parent = None;
                        State::Scan {
                            end: time + SCAN_WINDOW_MS,
                        }
                    }
                }
            }

            (State::SendBeacon { .. }, None) => State::Active {
                end: self.context.schedule.next_at().max(time),
            },

            (State::SendCollect { .. }, None) => State::Active {
                end: self.context.schedule.next_at().max(time),
            },

            (State::SleepUntil { .. }, None) => {
                if self.is_sink {
                    // the epoch deadline is due; the next progress call pops it
                    State::Active { end: time }
                } else {
                    let _ = self.context.schedule.cancel(DeadlineKind::WakeAt);
                    self.context.metric = METRIC_UNTETHERED;
                    self.context.parent = None;
                    debug!("wakeup: route invalidated until the next flood");
                    State::Scan {
                        end: time + SCAN_WINDOW_MS,
                    }
                }
            }

            //
            // invalid state/input combinations
            //
            (State::Reset, Some(_)) => unreachable!(),
            (State::SendBeacon { .. }, Some(_)) => unreachable!(),
            (State::SendCollect { .. }, Some(_)) => unreachable!(),
            (State::SleepUntil { .. }, Some(_)) => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use protocol_api::Protocol;
    use rand::rngs::mock::StepRng;

    const CH: Channel = 100;
    const DATA_CH: Channel = 101;

    /// Deterministic rng; makes the beacon forward jitter zero
    fn rng() -> StepRng {
        StepRng::new(0, 0)
    }

    fn beacon(from: NodeId, seqn: Seqn, metric: Metric, delay_ms: u16, rssi: i16) -> FireflyReception {
        Reception {
            from,
            channel: CH,
            rssi,
            message: Message::Beacon {
                seqn,
                metric,
                delay_ms,
            },
        }
    }

    fn collect(from: NodeId, source: NodeId, hops: Hops, payload: &[u8]) -> FireflyReception {
        Reception {
            from,
            channel: DATA_CH,
            rssi: -60,
            message: Message::Collect {
                source,
                hops,
                payload: Payload::from_slice(payload).unwrap(),
            },
        }
    }

    fn scanning(id: NodeId) -> Firefly {
        let mut node = Firefly::new(id, CH, false);
        let (action, _) = node.progress(0, None, rng());
        assert!(matches!(action, Action::Listen { .. }));
        node
    }

    /// Node that adopted the sink's beacon at `time`
    fn tethered(id: NodeId, time: TimeMs) -> Firefly {
        let mut node = scanning(id);
        let _ = node.progress(time, Some(beacon(0, 1, 0, 0, -60)), rng());
        assert_eq!(node.context.metric, 1);
        assert_eq!(node.context.parent, Some(0));
        node
    }

    #[test]
    fn adoption_decreases_the_metric() {
        let mut node = scanning(2);
        node.context.metric = 3;
        let _ = node.progress(10, Some(beacon(7, 1, 1, 100, -60)), rng());
        assert_eq!(node.context.metric, 2);
        assert_eq!(node.context.parent, Some(7));
        // equal cost is not adopted
        let _ = node.progress(20, Some(beacon(8, 1, 1, 100, -60)), rng());
        assert_eq!(node.context.parent, Some(7));
        // strictly better cost is
        let _ = node.progress(30, Some(beacon(0, 1, 0, 0, -60)), rng());
        assert_eq!(node.context.metric, 1);
        assert_eq!(node.context.parent, Some(0));
    }

    #[test]
    fn wrapped_seqn_within_tolerance_is_fresh() {
        let mut node = scanning(2);
        node.context.beacon_seqn = 65534;
        let _ = node.progress(10, Some(beacon(0, 1, 0, 0, -60)), rng());
        assert_eq!(node.context.metric, 1);
        assert_eq!(node.context.beacon_seqn, 1);
    }

    #[test]
    fn seqn_just_below_the_current_one_is_stale() {
        let mut node = scanning(2);
        node.context.beacon_seqn = 65534;
        let _ = node.progress(10, Some(beacon(0, 65533, 0, 0, -60)), rng());
        assert_eq!(node.context.metric, METRIC_UNTETHERED);
        assert_eq!(node.context.parent, None);
    }

    #[test]
    fn old_seqn_is_stale_without_wraparound() {
        let mut node = scanning(2);
        node.context.beacon_seqn = 100;
        let _ = node.progress(10, Some(beacon(0, 50, 0, 0, -60)), rng());
        assert_eq!(node.context.metric, METRIC_UNTETHERED);
    }

    #[test]
    fn weak_links_are_never_adopted() {
        let mut node = scanning(2);
        let _ = node.progress(10, Some(beacon(0, 1, 0, 0, -95)), rng());
        assert_eq!(node.context.metric, METRIC_UNTETHERED);
        assert_eq!(node.context.parent, None);
        let _ = node.progress(20, Some(beacon(0, 1, 0, 0, -94)), rng());
        assert_eq!(node.context.metric, 1);
    }

    #[test]
    fn pending_buffer_holds_exactly_one_payload() {
        let mut node = tethered(1, 1000);
        assert!(node.submit(Payload::from_slice(&[1, 2]).unwrap()));
        assert!(!node.submit(Payload::from_slice(&[3]).unwrap()));

        // zero jitter puts the beacon forward right at adoption time
        let (action, _) = node.progress(1000, None, rng());
        match action {
            Action::Transmit {
                dest: None,
                message:
                    Message::Beacon {
                        seqn: 1,
                        metric: 1,
                        delay_ms: 80,
                    },
                ..
            } => {}
            action => panic!("expected beacon transmit, got {:?}", action),
        }
        let (action, _) = node.progress(1080, None, rng());
        let slot_at = match action {
            Action::Listen { end } => end,
            action => panic!("expected listen, got {:?}", action),
        };

        // the slot drains the buffer toward the parent
        let (action, _) = node.progress(slot_at, None, rng());
        match action {
            Action::Transmit {
                channel: DATA_CH,
                dest: Some(0),
                message:
                    Message::Collect {
                        source: 1,
                        hops: 0,
                        ref payload,
                    },
            } => assert_eq!(payload.as_slice(), &[1, 2]),
            action => panic!("expected collect transmit, got {:?}", action),
        }
        assert!(!node.has_pending());
        assert!(node.submit(Payload::from_slice(&[4]).unwrap()));
    }

    #[test]
    fn slot_without_a_route_drops_the_payload() {
        let mut node = tethered(1, 1000);
        assert!(node.submit(Payload::from_slice(&[9]).unwrap()));
        node.context.parent = None;

        let (_, _) = node.progress(1000, None, rng()); // beacon forward
        let (action, _) = node.progress(1080, None, rng());
        let slot_at = match action {
            Action::Listen { end } => end,
            action => panic!("expected listen, got {:?}", action),
        };
        let (action, _) = node.progress(slot_at, None, rng());
        assert!(matches!(action, Action::Listen { .. }));
        assert!(!node.has_pending());
        assert!(node.submit(Payload::from_slice(&[10]).unwrap()));
    }

    #[test]
    fn relays_pass_collect_messages_one_hop_up() {
        let mut node = tethered(1, 1000);
        let (action, data) = node.progress(2000, Some(collect(5, 7, 1, &[9])), rng());
        assert!(data.is_none());
        match action {
            Action::Transmit {
                channel: DATA_CH,
                dest: Some(0),
                message:
                    Message::Collect {
                        source: 7,
                        hops: 2,
                        ..
                    },
            } => {}
            action => panic!("expected relayed collect, got {:?}", action),
        }
    }

    #[test]
    fn untethered_nodes_do_not_relay() {
        let mut node = scanning(3);
        let (action, _) = node.progress(10, Some(collect(5, 7, 0, &[1])), rng());
        assert!(matches!(action, Action::Listen { .. }));
    }

    #[test]
    fn node_sleeps_after_its_slot_and_rescans_at_wakeup() {
        let mut node = tethered(1, 1000);
        let (_, _) = node.progress(1000, None, rng()); // beacon forward
        let (_, _) = node.progress(1080, None, rng());
        let (_, _) = node.progress(5920, None, rng()); // empty slot, skipped
        let (action, _) = node.progress(10420, None, rng());
        let wake_at = match action {
            Action::Sleep { end } => end,
            action => panic!("expected sleep, got {:?}", action),
        };
        let (action, _) = node.progress(wake_at, None, rng());
        assert!(matches!(action, Action::Listen { .. }));
        assert_eq!(node.context.metric, METRIC_UNTETHERED);
        assert_eq!(node.context.parent, None);
    }

    #[test]
    fn sink_floods_and_delivers() {
        let mut sink = Firefly::new(0, CH, true);
        let (_, _) = sink.progress(0, None, rng());
        let (action, _) = sink.progress(0, None, rng());
        match action {
            Action::Transmit {
                channel: CH,
                dest: None,
                message:
                    Message::Beacon {
                        seqn: 1,
                        metric: 0,
                        delay_ms: 0,
                    },
            } => {}
            action => panic!("expected first beacon, got {:?}", action),
        }
        assert_eq!(sink.context.metric, 0);

        let (_, _) = sink.progress(80, None, rng());
        // a payload three hops out arrives with two relay increments
        let (action, data) = sink.progress(3000, Some(collect(2, 9, 2, &[7, 7])), rng());
        assert!(matches!(action, Action::Listen { .. }));
        let data: std::vec::Vec<_> = data.unwrap().into_iter().collect();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].source, 9);
        assert_eq!(data[0].hops, 3);
        assert_eq!(data[0].payload.as_slice(), &[7, 7]);

        // beacons never displace the sink's root position
        let (_, _) = sink.progress(3100, Some(beacon(1, 1, 0, 0, -50)), rng());
        assert_eq!(sink.context.metric, 0);
    }

    #[test]
    fn sink_increments_the_flood_seqn_every_epoch() {
        let mut sink = Firefly::new(0, CH, true);
        let (_, _) = sink.progress(0, None, rng());
        let (_, _) = sink.progress(0, None, rng()); // first beacon
        let (_, _) = sink.progress(80, None, rng());
        let (_, _) = sink.progress(5000, None, rng()); // collection window opens
        let (action, _) = sink.progress(9500, None, rng());
        assert!(matches!(action, Action::Sleep { end: 60000 }));
        let (_, _) = sink.progress(60000, None, rng());
        let (action, _) = sink.progress(60000, None, rng());
        match action {
            Action::Transmit {
                message: Message::Beacon { seqn: 2, .. },
                ..
            } => {}
            action => panic!("expected second beacon, got {:?}", action),
        }
    }
}
