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

/// Protocol state
///
/// Content of a state is what is required to produce the state's action or
/// information for the following state.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum State {
    #[default]
    Reset,
    /// Untethered: radio on, waiting for a beacon flood to adopt
    Scan { end: TimeMs },
    /// On the tree, or a sink awake: radio on, the schedule drives the epoch
    Active { end: TimeMs },
    /// Broadcast this node's view of the tree
    SendBeacon {
        channel: Channel,
        seqn: Seqn,
        metric: Metric,
        delay_ms: u16,
    },
    /// Unicast one collection message toward the sink
    SendCollect {
        channel: Channel,
        dest: NodeId,
        message: Message,
    },
    /// Radio off until the next epoch approaches
    SleepUntil { end: TimeMs },
}

impl State {
    /// Returns a state's action
    pub(crate) fn get_action(&self) -> FireflyAction {
        match self {
            State::Reset => Action::None,
            State::Scan { end } => Action::Listen { end: *end },
            State::Active { end } => Action::Listen { end: *end },
            State::SendBeacon {
                channel,
                seqn,
                metric,
                delay_ms,
            } => Action::Transmit {
                channel: *channel,
                dest: None,
                message: Message::Beacon {
                    seqn: *seqn,
                    metric: *metric,
                    delay_ms: *delay_ms,
                },
            },
            State::SendCollect {
                channel,
                dest,
                message,
            } => Action::Transmit {
                channel: *channel,
                dest: Some(*dest),
                message: message.clone(),
            },
            State::SleepUntil { end } => Action::Sleep { end: *end },
        }
    }

    fn state_as_string(&self) -> &str {
        match self {
            State::Reset => "Reset",
            State::Scan { .. } => "Scan",
            State::Active { .. } => "Active",
            State::SendBeacon { .. } => "SendBeacon",
            State::SendCollect { .. } => "SendCollect",
            State::SleepUntil { .. } => "SleepUntil",
        }
    }
}

impl core::fmt::Display for State {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(fmt, "{}", self.state_as_string())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for State {
    fn format(&self, fmt: defmt::Formatter) {
        use defmt::write;
        write!(fmt, "{}", self.state_as_string())
    }
}
