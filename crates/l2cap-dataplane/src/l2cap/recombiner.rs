//! Inbound recombination of ACL fragments into L2CAP frames
//!
//! One recombiner serves one logical link and holds at most one frame in
//! progress. A new first fragment always wins over a stale partial frame.

use log::{trace, warn};

use super::packet::L2capHeader;
use super::pdu::Pdu;
use crate::hci::{AclDataPacket, ConnectionHandle};

/// Outcome of feeding one fragment to a [`Recombiner`]
///
/// `frames_dropped` reports that some data was discarded during the call. It
/// does not imply that the supplied fragment itself was bad: a stale partial
/// frame may be dropped while the new fragment completes a frame.
#[derive(Debug, Default)]
pub struct RecombinerResult {
    pub pdu: Option<Pdu>,
    pub frames_dropped: bool,
}

#[derive(Debug)]
struct Recombination {
    pdu: Pdu,
    expected_frame_length: usize,
    accumulated_length: usize,
}

/// Reassembles the fragments of one link into complete PDUs
#[derive(Debug)]
pub struct Recombiner {
    handle: ConnectionHandle,
    recombination: Option<Recombination>,
}

impl Recombiner {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            recombination: None,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    /// Whether a partial frame is being accumulated
    pub fn in_progress(&self) -> bool {
        self.recombination.is_some()
    }

    /// Discard any partial frame, e.g. on disconnection
    pub fn clear(&mut self) {
        self.recombination = None;
    }

    /// Consume the next fragment received on the link
    pub fn consume_fragment(&mut self, fragment: AclDataPacket) -> RecombinerResult {
        if fragment.handle() != self.handle {
            warn!(
                "Recombiner for 0x{:04X} received fragment for 0x{:04X}",
                self.handle,
                fragment.handle()
            );
            return RecombinerResult {
                pdu: None,
                frames_dropped: true,
            };
        }

        if fragment.packet_boundary_flag().is_first() {
            self.process_first_fragment(fragment)
        } else {
            self.process_continuing_fragment(fragment)
        }
    }

    fn process_first_fragment(&mut self, fragment: AclDataPacket) -> RecombinerResult {
        let mut result = RecombinerResult::default();

        if self.recombination.take().is_some() {
            warn!("0x{:04X}: new frame started before previous frame completed", self.handle);
            result.frames_dropped = true;
        }

        let Some(header) = L2capHeader::parse(fragment.payload()) else {
            warn!(
                "0x{:04X}: first fragment too short for basic header ({} bytes)",
                self.handle,
                fragment.payload_size()
            );
            result.frames_dropped = true;
            return result;
        };

        let expected_frame_length = header.frame_size();
        let accumulated_length = fragment.payload_size();

        if accumulated_length == expected_frame_length {
            result.pdu = Some(Pdu::new(fragment));
            return result;
        }

        if accumulated_length > expected_frame_length {
            warn!(
                "0x{:04X}: first fragment longer than frame ({} > {})",
                self.handle, accumulated_length, expected_frame_length
            );
            result.frames_dropped = true;
            return result;
        }

        trace!(
            "0x{:04X}: begin recombination, {} of {} bytes",
            self.handle,
            accumulated_length,
            expected_frame_length
        );
        self.recombination = Some(Recombination {
            pdu: Pdu::new(fragment),
            expected_frame_length,
            accumulated_length,
        });

        result
    }

    fn process_continuing_fragment(&mut self, fragment: AclDataPacket) -> RecombinerResult {
        let Some(mut recombination) = self.recombination.take() else {
            warn!("0x{:04X}: continuing fragment without a frame in progress", self.handle);
            return RecombinerResult {
                pdu: None,
                frames_dropped: true,
            };
        };

        recombination.accumulated_length += fragment.payload_size();
        recombination.pdu.append_fragment(fragment);

        if recombination.accumulated_length > recombination.expected_frame_length {
            warn!(
                "0x{:04X}: frame overran declared length ({} > {})",
                self.handle, recombination.accumulated_length, recombination.expected_frame_length
            );
            return RecombinerResult {
                pdu: None,
                frames_dropped: true,
            };
        }

        if recombination.accumulated_length == recombination.expected_frame_length {
            return RecombinerResult {
                pdu: Some(recombination.pdu),
                frames_dropped: false,
            };
        }

        self.recombination = Some(recombination);
        RecombinerResult::default()
    }
}
