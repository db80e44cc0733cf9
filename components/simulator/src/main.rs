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

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use rand::{RngCore, SeedableRng};
use std::{env, time::Duration};

use protocol_api::{Action, Protocol, ProtocolData, Reception};

use firefly::{wire, Firefly as ProtocolImpl};

type Channel = <ProtocolImpl as Protocol>::Channel;
type Data = <ProtocolImpl as Protocol>::Data;
type Message = <ProtocolImpl as Protocol>::Message;
type NodeId = <ProtocolImpl as Protocol>::NodeId;
type Payload = <ProtocolImpl as Protocol>::Payload;
type TimeMs = <ProtocolImpl as Protocol>::TimeMs;

mod logger;
mod queue;
mod sim;

use crate::queue::EventQueue;
use crate::sim::*;

/// Minimum distance between nodes. Avoids overlapping nodes.
const MIN_NODE_DISTANCE: u32 = 10;
/// Height and width of area
const AREA_SIZE: u32 = 100;
/// Approximate time a message spends in the air.
/// Matches the per-hop delay the protocol assumes when it accumulates beacon
/// delays (SF8, BW 125KHz, short payloads).
const TIME_ON_AIR: TimeMs = 80;
const STARTUP_DELAY_RANGE_MS: TimeMs = 2 * 60 * 1000;
/// Probability of a transmission error in parts per thousand
const PACKET_ERROR_RATE_PPT: Option<u32> = None;
/// Beacons travel on this logical channel, collection messages on the next one
const CHANNEL_BASE: Channel = 100;

const EVENT_FILE_PATH: &str = "/tmp/collect_events.csv";
const SIMULATION_METADATA_FILE_PATH: &str = "/tmp/collect_sim_meta.json";

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut rng_seed: u64 = 0;
    let mut num_nodes: usize = 10;
    let mut simulation_minutes: usize = 90;
    // Nodes that are farther apart from each other than this value are not in range of each other
    let mut range: u32 = 30;

    for chunk in args[1..].chunks_exact(2) {
        let (arg, val) = (&chunk[0], &chunk[1]);
        match arg.as_str() {
            "--seed" => {
                rng_seed = val.parse().expect("invalid rng seed");
            }
            "--nodes" => {
                num_nodes = val.parse().expect("invalid number of nodes");
            }
            "--range" => {
                range = val.parse().expect("invalid range");
            }
            "--time_min" => {
                simulation_minutes = val.parse().expect("invalid number of simulation minutes");
            }
            _ => panic!("unknown argument: {}", arg),
        }
    }

    let mut rng = get_rng(rng_seed);

    let mut node_coordinates = Vec::with_capacity(num_nodes);
    while node_coordinates.len() != num_nodes {
        let coordinates = Coordinates {
            x: (rng.next_u32() % AREA_SIZE) as i64,
            y: (rng.next_u32() % AREA_SIZE) as i64,
        };
        if !node_coordinates
            .iter()
            .any(|c| get_distance(&coordinates, c) < MIN_NODE_DISTANCE as f32)
        {
            node_coordinates.push(coordinates);
        }
    }

    // create nodes; the first node is the sink of the collection tree
    let mut nodes: Vec<ProtocolWrapper> = Vec::with_capacity(num_nodes);
    for _ in 0..num_nodes {
        // vector index is node id
        let id = nodes.len() as NodeId;
        let protocol: ProtocolImpl = Protocol::new(id, CHANNEL_BASE, id == 0);
        nodes.push(ProtocolWrapper::new(
            protocol,
            node_coordinates.remove(rng.next_u32() as usize % node_coordinates.len()),
        ));
    }

    write_metadata_to_file(&nodes, range, SIMULATION_METADATA_FILE_PATH).unwrap();

    logger::init(log::Level::Trace, Some(EVENT_FILE_PATH)).unwrap();

    let data = run(nodes, simulation_minutes, rng, |a, b| {
        check_visibility_based_on_distance(a, b, range)
    });

    let mut nodes_that_sent_data: Vec<_> = data.iter().map(|nd| nd.get_source()).collect();
    nodes_that_sent_data.sort_unstable();
    nodes_that_sent_data.dedup();
    println!("{:?}", nodes_that_sent_data);
}

fn get_rng(rng_seed: u64) -> impl RngCore {
    println!("RNG seed: {rng_seed:#x}");
    rand_chacha::ChaCha8Rng::seed_from_u64(rng_seed)
}

fn run(
    mut nodes: Vec<ProtocolWrapper>,
    minutes: usize,
    mut rng: impl RngCore,
    mut check_visibility: impl FnMut(&ProtocolWrapper, &ProtocolWrapper) -> bool,
) -> Vec<Data> {
    // Stores timestamps of the next time a node can make progress
    let mut event_queue = EventQueue::new();

    let mut data = Vec::default();

    let mut time: TimeMs = 0;

    // random delay to mimic asynchronous startup
    for node in &nodes {
        let startup_delay = rng.next_u32() as TimeMs % STARTUP_DELAY_RANGE_MS;
        event_queue.push(Event::new(startup_delay, node.id(), None));
    }

    loop {
        assert!(
            event_queue.len() == nodes.len(),
            "bug: invalid number of elements in event queue: {} (!= {})\n{:#?}",
            event_queue.len(),
            nodes.len(),
            event_queue
        );

        let event = event_queue.pop().unwrap();

        assert!(event.time >= time, "bug: time cannot go backwards");

        if event.time > time {
            // advance time
            time = event.time;
            info!(
                "{:=^30}{:=^30}",
                format!(" node {:x} ", event.node_id),
                format!(
                    " {}min {:>7?} ({}ms) ",
                    time / (1000 * 60),
                    Duration::from_millis(time % (1000 * 60)),
                    time
                )
            );
        } else {
            info!("{:-^30}{:-^30}", format!(" node {:x} ", event.node_id), "");
        }

        // put the frame on the air; recipients are nodes in range of the
        // sender whose radio is on
        if let Some(MessageWrapper {
            kind: MessageKind::Transmit,
            channel,
            dest,
            ref frame,
            ..
        }) = event.message
        {
            forward_message(
                time,
                event.node_id,
                channel,
                dest,
                frame,
                &mut event_queue,
                &nodes,
                &mut check_visibility,
                PACKET_ERROR_RATE_PPT,
                &mut rng,
            );
            // sender makes progress after the frame left the antenna
            event_queue.push(Event::new(time + TIME_ON_AIR, event.node_id, None));
            continue;
        }

        let reception = match event.message {
            Some(MessageWrapper {
                kind: MessageKind::Receive,
                channel,
                from,
                dest: _,
                frame,
                rssi,
                is_corrupt,
            }) => {
                if is_corrupt {
                    warn!("corrupt frame at node {:x}", event.node_id);
                    None
                } else {
                    match wire::decode(&frame) {
                        Ok(message) => Some(Reception {
                            from,
                            channel,
                            rssi,
                            message,
                        }),
                        Err(e) => {
                            warn!("undecodable frame at node {:x}: {}", event.node_id, e);
                            None
                        }
                    }
                }
            }
            _ => None,
        };

        let (action, uplink_data) = nodes[event.node_id as usize].progress(time, reception, &mut rng);

        match &action {
            Action::Sleep { end } | Action::Listen { end } => {
                if *end < time {
                    panic!("end of action is in the past ({} < {})", end, time);
                }
            }
            Action::Transmit { .. } | Action::None => {}
        }

        if let Some(uplink_data) = uplink_data {
            data.extend(uplink_data);
        }

        match action {
            Action::Sleep { end } => {
                info!("sleeping for {:?}", Duration::from_millis(end - time));
                event_queue.push(Event::new(end, event.node_id, None));
            }
            Action::Listen { end } => {
                info!("listening for {:?}", Duration::from_millis(end - time));
                event_queue.push(Event::new(end, event.node_id, None));
            }
            Action::Transmit {
                channel,
                dest,
                message,
            } => {
                info!("transmitting frame on channel {}", channel);
                match wire::encode(&message) {
                    Ok(frame) => event_queue.push(Event::new(
                        time,
                        event.node_id,
                        Some(MessageWrapper {
                            kind: MessageKind::Transmit,
                            channel,
                            from: event.node_id,
                            dest,
                            frame: frame.to_vec(),
                            rssi: 0,
                            is_corrupt: false,
                        }),
                    )),
                    Err(e) => {
                        error!("cannot encode outgoing message: {}", e);
                        event_queue.push(Event::new(time, event.node_id, None));
                    }
                }
            }
            Action::None => {
                event_queue.push(Event::new(time, event.node_id, None));
            }
        }

        if minutes <= (time / (1000 * 60)) as usize {
            break;
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use crate::*;
    use std::collections::HashMap;

    #[derive(Debug)]
    struct VisibilityMap(HashMap<(NodeId, NodeId), bool>);

    impl VisibilityMap {
        pub fn get(&self, a: NodeId, b: NodeId) -> bool {
            *self.0.get(&Self::sort((a, b))).unwrap_or(&false)
        }

        fn sort(pair: (NodeId, NodeId)) -> (NodeId, NodeId) {
            (pair.0.min(pair.1), pair.0.max(pair.1))
        }

        pub fn from_array<const N: usize>(array: [(NodeId, NodeId); N]) -> Self {
            let mut map = HashMap::with_capacity(N);
            for e in array {
                map.insert(Self::sort(e), true);
            }
            Self(map)
        }
    }

    /// Node 0 is the sink
    fn create_nodes(number_of_nodes: NodeId) -> Vec<ProtocolWrapper> {
        (0..number_of_nodes)
            .map(|id| {
                let protocol: ProtocolImpl = Protocol::new(id, CHANNEL_BASE, id == 0);
                ProtocolWrapper::new(protocol, Coordinates::default())
            })
            .collect()
    }

    #[test]
    fn pair() {
        // logger::init(log::Level::Trace, Some(EVENT_FILE_PATH)).unwrap();
        let nodes = create_nodes(2);
        let data = run(nodes, 30, get_rng(0), |_, _| true);
        assert!(data.iter().any(|d| d.source == 1 && d.hops == 1));
        assert!(data
            .iter()
            .all(|d| d.payload.as_slice() == 1u16.to_le_bytes().as_slice()));
    }

    #[test]
    fn chain3() {
        // logger::init(log::Level::Trace, Some(EVENT_FILE_PATH)).unwrap();
        let nodes = create_nodes(3);
        let visibility_map = VisibilityMap::from_array([(0, 1), (1, 2)]);
        let data = run(nodes, 45, get_rng(0), |a, b| {
            visibility_map.get(a.id(), b.id())
        });
        assert!(data.iter().any(|d| d.source == 1 && d.hops == 1));
        assert!(data.iter().any(|d| d.source == 2 && d.hops == 2));
    }

    #[test]
    fn chain4() {
        // logger::init(log::Level::Trace, Some(EVENT_FILE_PATH)).unwrap();
        let nodes = create_nodes(4);
        let visibility_map = VisibilityMap::from_array([(0, 1), (1, 2), (2, 3)]);
        let data = run(nodes, 60, get_rng(0), |a, b| {
            visibility_map.get(a.id(), b.id())
        });
        for n in 1..=3 {
            assert!(data.iter().any(|d| d.source == n));
        }
        // a payload three hops out arrives with three hops on the clock
        assert!(data.iter().any(|d| d.source == 3 && d.hops == 3));
    }

    /// One sink with four children, all nodes see each other
    #[test]
    fn star() {
        // logger::init(log::Level::Trace, Some(EVENT_FILE_PATH)).unwrap();
        let num_nodes = 5;
        let nodes = create_nodes(num_nodes);
        let data = run(nodes, 45, get_rng(0), |_, _| true);
        for n in 1..=num_nodes - 1 {
            assert!(data.iter().any(|d| d.source == n && d.hops == 1));
        }
    }

    /// One sink with many children, all nodes see each other
    #[test]
    fn more_children() {
        // logger::init(log::Level::Trace, Some(EVENT_FILE_PATH)).unwrap();
        let num_nodes = 9;
        let nodes = create_nodes(num_nodes);
        let data = run(nodes, 60, get_rng(0), |_, _| true);
        for n in 1..=num_nodes - 1 {
            assert!(data.iter().any(|d| d.source == n));
        }
    }
}
