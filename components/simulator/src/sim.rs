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

use std::{
    fs::File,
    io::{self, Write},
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use rand::RngCore;

use crate::*;

/// Type that adds radio and placement meta data to a protocol node
#[derive(Debug)]
pub struct ProtocolWrapper {
    protocol: ProtocolImpl,
    location: Coordinates,
    listening: bool,
}

impl ProtocolWrapper {
    pub fn new(protocol: ProtocolImpl, location: Coordinates) -> Self {
        Self {
            protocol,
            location,
            listening: false,
        }
    }

    pub fn location(&self) -> &Coordinates {
        &self.location
    }

    /// Whether the node's radio is currently accepting frames
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    #[doc(alias = "firefly::Firefly::id")]
    pub fn id(&self) -> NodeId {
        self.protocol.id()
    }

    #[must_use]
    #[doc(alias = "firefly::Firefly::progress")]
    pub fn progress(
        &mut self,
        time: TimeMs,
        reception: Option<Reception<NodeId, Channel, Message>>,
        mut rng: impl RngCore,
    ) -> (Action<TimeMs, Message, Channel, NodeId>, Option<Vec<Data>>) {
        let (action, uplink_data) = self.protocol.progress(time, reception, &mut rng);

        self.listening = matches!(action, Action::Listen { .. });

        let uplink_data = uplink_data.map(Vec::from_iter);

        if !self.protocol.is_sink() && uplink_data.is_some() {
            panic!("bug: node that is not a sink returned uplink data");
        }

        // keep one payload queued so every collection slot carries data
        if !self.protocol.is_sink() && !self.protocol.has_pending() {
            let payload = Payload::from_slice(&self.protocol.id().to_le_bytes()).unwrap();
            let _ = self.protocol.submit(payload);
        }

        (action, uplink_data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Transmit,
    Receive,
}

/// An encoded frame on its way through the simulated ether
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWrapper {
    pub kind: MessageKind,
    pub channel: Channel,
    /// Node that put the frame on the air
    pub from: NodeId,
    /// Unicast destination; `None` broadcasts
    pub dest: Option<NodeId>,
    pub frame: Vec<u8>,
    /// Signal strength at the receiver; meaningless on transmit events
    pub rssi: i16,
    /// whether the frame collided with another
    pub is_corrupt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub time: TimeMs,
    pub node_id: NodeId,
    pub message: Option<MessageWrapper>,
}

impl Event {
    pub fn new(time: TimeMs, node_id: NodeId, message: Option<MessageWrapper>) -> Self {
        Self {
            time,
            node_id,
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinates {
    pub x: i64,
    pub y: i64,
}

pub fn get_distance(a: &Coordinates, b: &Coordinates) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    ((dx.pow(2) + dy.pow(2)) as f32).sqrt()
}

/// Crude distance-to-signal-strength map for the simulated radio
///
/// Close nodes sit well above the protocol's adoption threshold, links near
/// the visibility limit drop below it.
pub fn rssi_from_distance(distance: f32) -> i16 {
    -40 - distance as i16
}

/// Check if two nodes are in range of each other
pub fn check_visibility_based_on_distance(
    a: &ProtocolWrapper,
    b: &ProtocolWrapper,
    range: u32,
) -> bool {
    get_distance(a.location(), b.location()) < range as f32
}

/// Get nodes that can hear the sender: radio on, in range, and either the
/// unicast destination or anyone for a broadcast
pub fn get_recipients(
    sender: &ProtocolWrapper,
    dest: Option<NodeId>,
    nodes: &[ProtocolWrapper],
    mut check_visibility: impl FnMut(&ProtocolWrapper, &ProtocolWrapper) -> bool,
) -> Vec<NodeId> {
    nodes
        .iter()
        .filter(|node| {
            node.is_listening()
                && check_visibility(sender, node)
                && node.id() != sender.id()
                && dest.map_or(true, |dest| node.id() == dest)
        })
        .map(|node| node.id())
        .collect()
}

/// Put one frame on the air and schedule its receptions
///
/// Frames overlapping on the air corrupt each other at every receiver that
/// can hear both transmitters.
#[allow(clippy::too_many_arguments)]
pub fn forward_message(
    departure_time: TimeMs,
    sender_id: NodeId,
    channel: Channel,
    dest: Option<NodeId>,
    frame: &[u8],
    event_queue: &mut EventQueue,
    nodes: &[ProtocolWrapper],
    mut check_visibility: impl FnMut(&ProtocolWrapper, &ProtocolWrapper) -> bool,
    packet_error_rate_ppt: Option<u32>,
    mut rng: impl RngCore,
) {
    let mut recipients = get_recipients(
        &nodes[sender_id as usize],
        dest,
        nodes,
        &mut check_visibility,
    );

    // check for collisions with receptions already under way
    for event in event_queue.iter_mut() {
        if event.time >= departure_time + 2 * TIME_ON_AIR {
            // events are sorted by time, the remaining ones cannot overlap
            break;
        }

        let wrapper = match event.message.as_mut() {
            Some(wrapper) if wrapper.kind == MessageKind::Receive => wrapper,
            _ => continue,
        };

        if event.time <= departure_time {
            // that reception completes before the new frame departs
            continue;
        }

        if check_visibility(&nodes[sender_id as usize], &nodes[event.node_id as usize]) {
            warn!(
                "message collision at node {:x}: frames from {:x} and {:x}",
                event.node_id, sender_id, wrapper.from
            );
            wrapper.is_corrupt = true;
        }

        let colliding_sender = wrapper.from;
        recipients.retain(|recipient| {
            if check_visibility(
                &nodes[colliding_sender as usize],
                &nodes[*recipient as usize],
            ) {
                warn!(
                    "message collision at node {:x}: frames from {:x} and {:x}",
                    recipient, sender_id, colliding_sender
                );
                false
            } else {
                true
            }
        });
    }

    if recipients.is_empty() {
        return;
    }

    info!(
        "forwarding frame from {:x} to {:x?}",
        sender_id, recipients
    );

    // drop frames based on packet error rate
    if let Some(per) = packet_error_rate_ppt {
        recipients.retain(|_| {
            if rng.next_u32() % 1000 < per {
                warn!("packet error simulation: dropping frame");
                false
            } else {
                true
            }
        });
    }

    // cancel receive time out events of recipients
    event_queue.retain(|e| !recipients.contains(&e.node_id));

    for recipient in recipients {
        let rssi = rssi_from_distance(get_distance(
            nodes[sender_id as usize].location(),
            nodes[recipient as usize].location(),
        ));
        event_queue.push(Event::new(
            departure_time + TIME_ON_AIR,
            recipient,
            Some(MessageWrapper {
                kind: MessageKind::Receive,
                channel,
                from: sender_id,
                dest,
                frame: frame.to_vec(),
                rssi,
                is_corrupt: false,
            }),
        ));
    }
}

pub fn write_metadata_to_file(
    nodes: &[ProtocolWrapper],
    node_range: u32,
    file_path: &str,
) -> io::Result<()> {
    let mut node_loc_file = File::create(file_path)?;
    node_loc_file.write_all(format!("{{\n\"node_range\":{node_range},\n").as_bytes())?;
    node_loc_file.write_all("\"nodes\":\n[\n".as_bytes())?;
    let mut node_iter = nodes.iter();
    let mut next = node_iter.next();
    while let Some(node) = next {
        node_loc_file.write_all(
            format!(
                "{{\"id\":{},\"location\":{{\"x\":{},\"y\":{}}}}}",
                node.id(),
                node.location().x,
                node.location().y
            )
            .as_bytes(),
        )?;
        next = node_iter.next();
        if next.is_some() {
            node_loc_file.write_all(",".as_bytes())?;
        }
        node_loc_file.write_all("\n".as_bytes())?;
    }
    node_loc_file.write_all("]\n}\n".as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rssi_drops_with_distance() {
        assert_eq!(rssi_from_distance(0.0), -40);
        assert!(rssi_from_distance(10.0) > -95);
        assert!(rssi_from_distance(60.0) <= -95);
    }
}
