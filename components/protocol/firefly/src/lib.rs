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

#![cfg_attr(not(test), no_std)]

use heapless::Vec;
use rand_core::RngCore;

use protocol_api::*;

mod message;
mod schedule;
use crate::schedule::*;
mod context;
use crate::context::*;
mod states;
use crate::states::*;
mod event_log;
mod firefly;
mod state_machine;
pub mod wire;

pub use crate::{firefly::Firefly, message::CollectedData, message::Message};

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
use defmt::{debug, error, info, warn};

#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
use log::{debug, error, info, warn};

const MS_PER_S: TimeMs = 1000;

/// Time as milliseconds since start
pub type TimeMs = u64;
/// Link-layer node address; the sink owns address 0
pub type NodeId = u16;
/// Logical channel index; beacons on the base channel, collection on base + 1
pub type Channel = u16;
/// One application payload
pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

type FireflyAction = Action<TimeMs, Message, Channel, NodeId>;
type FireflyReception = Reception<NodeId, Channel, Message>;
type Hops = u8;
type Metric = u16;
type Seqn = u16;

/// Routing cost of a node without a route to the sink
pub const METRIC_UNTETHERED: Metric = u16::MAX;
/// Maximum application payload per collection message
pub const MAX_PAYLOAD_LEN: usize = 64;
/// Deepest node the beacon flood may reach; nodes at this depth do not forward
pub const MAX_HOPS: u16 = 5;
/// Upper bound on deployed nodes, sink included; sizes the collection window
pub const MAX_NODES: u16 = 10;

// the following parameter values are tuned for the LoRa test network

/// Length of one full cycle: beacon flood, collection window, sleep
pub const EPOCH_DURATION_MS: TimeMs = 60 * MS_PER_S;
/// Per-hop budget of the beacon flood; also the range of the forward jitter
const EPOCH_TICK_MS: TimeMs = MS_PER_S;
/// Assumed time on air plus receive processing of one hop.
/// Accumulated into the delay field of forwarded beacons so that receivers can
/// place themselves on the sink's timeline.
const HOP_DELAY_MS: TimeMs = 80;
/// One node's share of the collection window. Must cover a full relay chain to
/// the sink, i.e. `MAX_HOPS * HOP_DELAY_MS`.
const SLOT_TIME_MS: TimeMs = 500;
/// How much earlier than the next flood a node turns its radio back on
const GUARD_TIME_MS: TimeMs = 500;
/// Beacons below this signal strength (dBm) never become a parent link
const RSSI_THRESHOLD: i16 = -95;
/// Sequence numbers this close to the 16 bit maximum also accept a counter
/// that wrapped past zero
const SEQN_OVERFLOW_TH: Seqn = 3;
/// How long an untethered node listens before starting another scan pass
const SCAN_WINDOW_MS: TimeMs = EPOCH_DURATION_MS;

/// Time the beacon flood needs to cross the whole network
const FLOOD_WINDOW_MS: TimeMs = MAX_HOPS as TimeMs * EPOCH_TICK_MS;
/// Combined length of all collection slots
const COLLECT_WINDOW_MS: TimeMs = (MAX_NODES as TimeMs - 1) * SLOT_TIME_MS;

/// Offset of a node's slot inside the collection window
///
/// Node ids map to disjoint slots: the first non-sink id takes the first slot.
pub(crate) fn slot_offset(id: NodeId) -> TimeMs {
    id.saturating_sub(1) as TimeMs * SLOT_TIME_MS
}

/// Wraps defmt::write and returns Ok() to make it behave like core::write!.
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! defmt_write_wrapper {
    ($($arg:expr),*) => {{
        defmt::write!($($arg),*);
        Ok(())
    }};
}
