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

use heapless::sorted_linked_list;

use crate::*;

/// Which epoch operation a deadline triggers
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum DeadlineKind {
    /// Sink: start of the next epoch
    Epoch,
    /// Sink: the collection window opens
    CollectStart,
    /// Re-broadcast this node's beacon
    BeaconTx,
    /// This node's collection slot
    Slot,
    /// End of the active window, radio goes off
    SleepAt,
    /// Radio back on shortly before the next flood
    WakeAt,
}

/// Maximum number of armed deadlines; at most one per kind
const MAX_DEADLINES: usize = 6;

#[derive(Debug, Clone, Eq)]
pub(crate) struct Deadline {
    pub(crate) kind: DeadlineKind,
    pub(crate) at: TimeMs,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.at.cmp(&other.at)
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

/// The armed timers of one node, ordered by expiry
///
/// Arming a kind that is already pending replaces it, which is how re-arming
/// cancels a pending expiry.
#[derive(Debug)]
pub(crate) struct Schedule {
    queue: sorted_linked_list::SortedLinkedList<
        Deadline,
        sorted_linked_list::LinkedIndexU8,
        sorted_linked_list::Min,
        MAX_DEADLINES,
    >,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            queue: sorted_linked_list::SortedLinkedList::new_u8(),
        }
    }
}

impl Schedule {
    /// Arm a deadline, replacing a pending one of the same kind
    pub(crate) fn arm(&mut self, kind: DeadlineKind, at: TimeMs) {
        self.cancel(kind);
        self.queue.push(Deadline { kind, at }).unwrap();
    }

    /// Remove the next deadline from the queue
    pub(crate) fn pop(&mut self) -> Deadline {
        self.queue.pop().unwrap()
    }

    /// Expiry of the next deadline
    ///
    /// The schedule never drains while a node is tethered or a sink is
    /// running, so peeking cannot fail there.
    pub(crate) fn next_at(&self) -> TimeMs {
        self.queue.peek().unwrap().at
    }

    /// Expiry of the next deadline with the given kind
    pub(crate) fn next_of(&self, kind: DeadlineKind) -> Option<TimeMs> {
        self.queue
            .iter()
            .find(|deadline| deadline.kind == kind)
            .map(|deadline| deadline.at)
    }

    /// Drop a pending deadline of the given kind
    pub(crate) fn cancel(&mut self, kind: DeadlineKind) -> Option<Deadline> {
        self.queue
            .find_mut(|deadline| deadline.kind == kind)
            .map(|deadline| deadline.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeadlineKind::*, *};

    #[test]
    fn pops_in_expiry_order() {
        let mut schedule = Schedule::default();
        schedule.arm(SleepAt, 300);
        schedule.arm(BeaconTx, 10);
        schedule.arm(Slot, 200);
        assert_eq!(schedule.next_at(), 10);
        assert_eq!(schedule.pop().kind, BeaconTx);
        assert_eq!(schedule.pop().kind, Slot);
        assert_eq!(schedule.pop().kind, SleepAt);
    }

    #[test]
    fn rearming_replaces_the_pending_deadline() {
        let mut schedule = Schedule::default();
        schedule.arm(Slot, 100);
        schedule.arm(Slot, 250);
        let deadline = schedule.pop();
        assert_eq!((deadline.kind, deadline.at), (Slot, 250));
        assert!(schedule.next_of(Slot).is_none());
    }

    #[test]
    fn cancel_removes_only_the_given_kind() {
        let mut schedule = Schedule::default();
        schedule.arm(SleepAt, 300);
        schedule.arm(WakeAt, 500);
        assert!(schedule.cancel(SleepAt).is_some());
        assert!(schedule.cancel(SleepAt).is_none());
        assert_eq!(schedule.next_of(WakeAt), Some(500));
    }
}
