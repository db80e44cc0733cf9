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

use rand_core::RngCore;

/// What the radio has to do next
///
/// The runtime executes the action and calls `progress` again when it has
/// completed, or earlier when a frame arrives while listening.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action<TIME, MESSAGE, CHANNEL, ADDR> {
    /// Do nothing
    None,
    /// Radio off until `end`
    Sleep { end: TIME },
    /// Radio on, accept frames until `end`
    Listen { end: TIME },
    /// Send one frame; `dest: None` broadcasts
    Transmit {
        channel: CHANNEL,
        dest: Option<ADDR>,
        message: MESSAGE,
    },
}

/// A frame handed to the protocol by the radio driver
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reception<ADDR, CHANNEL, MESSAGE> {
    /// Link-layer sender of the frame
    pub from: ADDR,
    /// Logical channel the frame arrived on
    pub channel: CHANNEL,
    /// Received signal strength of the frame in dBm
    pub rssi: i16,
    pub message: MESSAGE,
}

pub trait ProtocolData<P: Protocol + ?Sized> {
    fn get_source(&self) -> P::NodeId;
    fn get_hops(&self) -> u8;
    fn get_payload(&self) -> P::Payload;
}

pub trait Protocol {
    type TimeMs: Copy + Eq + Ord;
    type NodeId: Copy + Eq;
    type Channel: Copy + Eq;
    type Message: Clone + PartialEq;
    type Payload: Clone;
    type Data: Clone + ProtocolData<Self>;

    /// Create a node with a fixed role
    ///
    /// Beacons travel on `channel_base`, collection traffic on
    /// `channel_base + 1`. The role never changes after construction.
    fn new(id: Self::NodeId, channel_base: Self::Channel, is_sink: bool) -> Self;

    /// Make progress in the state machine
    ///
    /// Returns the action to execute and, on a sink, data that completed its
    /// way up the tree. This function must be called again after the returned
    /// action has been executed, or when a frame arrives while listening.
    #[must_use]
    #[allow(clippy::type_complexity)]
    fn progress<T: RngCore>(
        &mut self,
        time: Self::TimeMs,
        reception: Option<Reception<Self::NodeId, Self::Channel, Self::Message>>,
        rng: T,
    ) -> (
        Action<Self::TimeMs, Self::Message, Self::Channel, Self::NodeId>,
        Option<impl IntoIterator<Item = Self::Data>>,
    );

    /// Get the node's ID
    fn id(&self) -> Self::NodeId;

    fn is_sink(&self) -> bool;

    /// Buffer one payload for the next collection slot
    ///
    /// Returns `false` when the single-message buffer is already occupied;
    /// the previous payload is never overwritten.
    fn submit(&mut self, payload: Self::Payload) -> bool;

    fn has_pending(&self) -> bool;
}
