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

//! Frame codec for the radio boundary
//!
//! Runtimes encode outgoing messages and decode incoming frames here. Frames
//! that do not decode cleanly are to be dropped with a diagnostic; they never
//! reach the state machine.

use heapless::Vec;

use crate::{Message, MAX_PAYLOAD_LEN};

/// Upper bound of an encoded message
pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD_LEN + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireError {
    /// Frame bytes do not decode to a known message
    Malformed,
    /// Frame decodes but carries trailing bytes
    WrongSize,
}

impl core::fmt::Display for WireError {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WireError::Malformed => write!(fmt, "malformed frame"),
            WireError::WrongSize => write!(fmt, "frame of wrong size"),
        }
    }
}

pub fn encode(message: &Message) -> Result<Vec<u8, MAX_FRAME_LEN>, WireError> {
    let mut buffer = [0u8; MAX_FRAME_LEN];
    let used = postcard::to_slice(message, &mut buffer).map_err(|_| WireError::WrongSize)?;
    Vec::from_slice(used).map_err(|_| WireError::WrongSize)
}

pub fn decode(frame: &[u8]) -> Result<Message, WireError> {
    let (message, rest) =
        postcard::take_from_bytes::<Message>(frame).map_err(|_| WireError::Malformed)?;
    if !rest.is_empty() {
        return Err(WireError::WrongSize);
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Payload;

    #[test]
    fn beacon_survives_the_wire() {
        let beacon = Message::Beacon {
            seqn: 7,
            metric: 2,
            delay_ms: 1234,
        };
        let frame = encode(&beacon).unwrap();
        assert_eq!(decode(&frame).unwrap(), beacon);
    }

    #[test]
    fn collect_survives_the_wire() {
        let collect = Message::Collect {
            source: 4,
            hops: 1,
            payload: Payload::from_slice(&[0xde, 0xad]).unwrap(),
        };
        let frame = encode(&collect).unwrap();
        assert_eq!(decode(&frame).unwrap(), collect);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let frame = encode(&Message::Beacon {
            seqn: 1,
            metric: 0,
            delay_ms: 0,
        })
        .unwrap();
        assert_eq!(
            decode(&frame[..frame.len() - 1]),
            Err(WireError::Malformed)
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut frame = encode(&Message::Beacon {
            seqn: 1,
            metric: 0,
            delay_ms: 0,
        })
        .unwrap()
        .to_vec();
        frame.push(0xff);
        assert_eq!(decode(&frame), Err(WireError::WrongSize));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(&[0xff; 16]).is_err());
    }
}
