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

/// Per-node protocol state
#[derive(Debug)]
pub(crate) struct Context {
    /// Hop-count cost to the sink; `METRIC_UNTETHERED` when no route is known
    pub(crate) metric: Metric,
    /// Next hop toward the sink
    pub(crate) parent: Option<NodeId>,
    /// Highest accepted beacon sequence number
    pub(crate) beacon_seqn: Seqn,
    /// Estimated delay behind the sink's epoch start; embedded into beacons
    /// this node forwards
    pub(crate) delay_ms: TimeMs,
    /// The single-message outbound buffer
    pub(crate) pending: Option<Payload>,
    /// Sink: data that completed its way up the tree, picked up by `progress`
    pub(crate) inbox: Option<CollectedData>,
    pub(crate) schedule: Schedule,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            metric: METRIC_UNTETHERED,
            parent: None,
            beacon_seqn: 0,
            delay_ms: 0,
            pending: None,
            inbox: None,
            schedule: Schedule::default(),
        }
    }
}

impl Context {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Evaluate a beacon against the current route and adopt it when it wins
    ///
    /// A beacon wins when it is fresh (sequence number not older than the last
    /// accepted one, with tolerance for a wrapped counter), strictly improves
    /// the hop cost and arrived over a usable link. Adoption re-arms all epoch
    /// deadlines from the delay carried in the beacon.
    pub(crate) fn consider_beacon(
        &mut self,
        own_id: NodeId,
        time: TimeMs,
        from: NodeId,
        seqn: Seqn,
        metric: Metric,
        delay_ms: u16,
        rssi: i16,
        mut rng: impl RngCore,
    ) -> bool {
        debug!(
            "beacon from {}: seqn {} metric {} delay {} rssi {} (mine: seqn {} metric {})",
            from, seqn, metric, delay_ms, rssi, self.beacon_seqn, self.metric
        );

        let fresh = seqn >= self.beacon_seqn
            || (self.beacon_seqn >= Seqn::MAX - SEQN_OVERFLOW_TH + 1
                && seqn <= self.beacon_seqn.wrapping_add(SEQN_OVERFLOW_TH));
        if !fresh {
            debug!("stale beacon");
            return false;
        }
        if metric.saturating_add(1) >= self.metric {
            debug!("no route improvement");
            return false;
        }
        if rssi <= RSSI_THRESHOLD {
            debug!("link too weak");
            return false;
        }

        self.metric = metric + 1;
        self.parent = Some(from);
        self.beacon_seqn = seqn;

        let tot_delay = delay_ms as TimeMs + HOP_DELAY_MS;
        let jitter = rng.next_u32() as TimeMs % EPOCH_TICK_MS;
        self.delay_ms = jitter + tot_delay;

        // the rest of this epoch, shifted onto the sink's timeline
        self.schedule.arm(
            DeadlineKind::Slot,
            time + (FLOOD_WINDOW_MS + slot_offset(own_id)).saturating_sub(tot_delay),
        );
        self.schedule.arm(
            DeadlineKind::SleepAt,
            time + (FLOOD_WINDOW_MS + COLLECT_WINDOW_MS).saturating_sub(tot_delay),
        );
        self.schedule.arm(
            DeadlineKind::WakeAt,
            time + (EPOCH_DURATION_MS - GUARD_TIME_MS).saturating_sub(tot_delay),
        );
        if self.metric < MAX_HOPS {
            self.schedule.arm(DeadlineKind::BeaconTx, time + jitter);
        }
        true
    }
}
