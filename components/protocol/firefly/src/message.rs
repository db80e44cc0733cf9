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

use core::fmt::Display;
use serde::{Deserialize, Serialize};

use crate::*;

/// Firefly message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Advertises the sender's tree position during the beacon flood
    Beacon {
        /// Flood sequence number of the current epoch
        seqn: Seqn,
        /// Sender's hop-count cost to the sink
        metric: Metric,
        /// Sender's estimated delay behind the sink's epoch start
        delay_ms: u16,
    },
    /// One application payload on its way up the tree
    Collect {
        /// Node that submitted the payload
        source: NodeId,
        /// Hops travelled so far; incremented by every relay
        hops: Hops,
        payload: Payload,
    },
}

/// message as JSON to make it parseable
macro_rules! message_to_json_string {
    ($fmt:expr,$write:tt,$message:expr) => {
        match $message {
            Message::Beacon {
                seqn,
                metric,
                delay_ms,
            } => {
                $write!(
                    $fmt,
                    "{{\"kind\":\"beacon\",\"seqn\":{},\"metric\":{},\"delay_ms\":{}}}",
                    seqn,
                    metric,
                    delay_ms
                )
            }
            Message::Collect {
                source,
                hops,
                payload,
            } => {
                $write!(
                    $fmt,
                    "{{\"kind\":\"collect\",\"source\":{},\"hops\":{},\"len\":{}}}",
                    source,
                    hops,
                    payload.len()
                )
            }
        }
    };
}

impl Display for Message {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        message_to_json_string!(fmt, write, self)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Message {
    fn format(&self, fmt: defmt::Formatter) {
        fn wrapper(msg: &Message, fmt: defmt::Formatter) -> core::fmt::Result {
            message_to_json_string!(fmt, defmt_write_wrapper, msg)
        }
        let _ = wrapper(self, fmt);
    }
}

/// What the sink hands to the application: one payload that completed its way
/// up the tree
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CollectedData {
    pub source: NodeId,
    /// Number of hops the payload travelled to reach the sink
    pub hops: Hops,
    pub payload: Payload,
}

impl protocol_api::ProtocolData<Firefly> for CollectedData {
    fn get_source(&self) -> NodeId {
        self.source
    }

    fn get_hops(&self) -> Hops {
        self.hops
    }

    fn get_payload(&self) -> Payload {
        self.payload.clone()
    }
}

impl Display for CollectedData {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            fmt,
            "{{\"source\":{},\"hops\":{},\"len\":{}}}",
            self.source,
            self.hops,
            self.payload.len()
        )
    }
}
