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

/// One node of the collection tree
///
/// The runtime owns this value and passes it to every call; there is no
/// process-wide connection state.
#[derive(Debug)]
pub struct Firefly {
    pub(crate) id: NodeId,
    /// Beacons travel on this channel, collection messages on the next one
    pub(crate) channel_base: Channel,
    /// Whether this node is the root of the tree; fixed for the node's lifetime
    pub is_sink: bool,
    pub(crate) state: State,
    pub(crate) context: Context,
}

impl protocol_api::Protocol for Firefly {
    type TimeMs = TimeMs;
    type NodeId = NodeId;
    type Channel = Channel;
    type Message = Message;
    type Payload = Payload;
    type Data = CollectedData;

    fn new(id: Self::NodeId, channel_base: Self::Channel, is_sink: bool) -> Self {
        #[allow(clippy::assertions_on_constants)]
        const {
            assert!(FLOOD_WINDOW_MS + COLLECT_WINDOW_MS + GUARD_TIME_MS < EPOCH_DURATION_MS);
            assert!(MAX_HOPS as TimeMs * HOP_DELAY_MS <= SLOT_TIME_MS);
        }
        Self {
            id,
            channel_base,
            is_sink,
            state: State::default(),
            context: Context::default(),
        }
    }

    fn progress<T: RngCore>(
        &mut self,
        time: Self::TimeMs,
        reception: Option<FireflyReception>,
        rng: T,
    ) -> (
        FireflyAction,
        Option<impl IntoIterator<Item = Self::Data>>,
    ) {
        if let Some(reception) = &reception {
            event_log_msg!(time, self.id, reception.message);
        };

        let next_state = self.next(time, reception, rng);
        event_log_state!(time, self.id, &next_state);
        self.state = next_state;

        let delivered = self.context.inbox.take();
        if let Some(data) = &delivered {
            event_log_deliver!(time, self.id, data);
        }

        let action = self.state.get_action();
        event_log_action!(time, self.id, DisplayableAction(&action, time));
        (action, delivered.map(|data| [data]))
    }

    fn id(&self) -> Self::NodeId {
        self.id
    }

    fn is_sink(&self) -> bool {
        self.is_sink
    }

    fn submit(&mut self, payload: Self::Payload) -> bool {
        if self.context.pending.is_some() {
            return false;
        }
        self.context.pending = Some(payload);
        true
    }

    fn has_pending(&self) -> bool {
        self.context.pending.is_some()
    }
}

struct DisplayableAction<'a>(&'a FireflyAction, TimeMs);

/// action as JSON to make it parseable
macro_rules! action_to_json_string {
    ($fmt:expr,$write:tt,$action:expr,$time:expr) => {
        match $action {
            Action::None => $write!($fmt, "{{\"kind\":\"none\"}}"),
            Action::Sleep { end } => {
                $write!(
                    $fmt,
                    "{{\"kind\":\"sleep\",\"duration\":{}}}",
                    *end as i64 - $time as i64
                )
            }
            Action::Listen { end } => $write!(
                $fmt,
                "{{\"kind\":\"listen\",\"duration\":{}}}",
                *end as i64 - $time as i64
            ),
            Action::Transmit {
                channel,
                dest,
                message: _,
            } => {
                $write!($fmt, "{{\"kind\":\"transmit\",\"channel\":{}", channel)?;
                if let Some(dest) = dest {
                    $write!($fmt, ",\"dest\":{}", dest)?;
                }
                $write!($fmt, "}}")
            }
        }
    };
}

impl core::fmt::Display for DisplayableAction<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        action_to_json_string!(f, write, self.0, self.1)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DisplayableAction<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        fn wrapper(
            action: &FireflyAction,
            time: TimeMs,
            fmt: defmt::Formatter,
        ) -> core::fmt::Result {
            action_to_json_string!(fmt, defmt_write_wrapper, action, time)
        }
        let _ = wrapper(self.0, self.1, fmt);
    }
}
