//! Outbound framing and fragmentation
//!
//! The fragmenter wraps a payload in a basic L2CAP header (and optional FCS)
//! and cuts the resulting frame into ACL fragments no larger than the
//! controller's maximum ACL payload.

use log::trace;

use super::constants::*;
use super::fcs::{compute_fcs, compute_frame_fcs};
use super::packet::L2capHeader;
use super::pdu::Pdu;
use super::types::{ChannelId, FcsOption};
use crate::hci::{AclDataPacket, BroadcastFlag, ConnectionHandle, PacketBoundaryFlag};

/// Builds fragmented frames for one logical link
#[derive(Debug, Clone)]
pub struct Fragmenter {
    handle: ConnectionHandle,
    max_acl_payload_size: usize,
}

impl Fragmenter {
    /// Create a fragmenter for `handle`
    ///
    /// # Panics
    ///
    /// Panics if `max_acl_payload_size` is zero.
    pub fn new(handle: ConnectionHandle, max_acl_payload_size: usize) -> Self {
        assert!(max_acl_payload_size > 0, "ACL payload size must be non-zero");
        Self {
            handle,
            max_acl_payload_size,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn max_acl_payload_size(&self) -> usize {
        self.max_acl_payload_size
    }

    /// Number of fragments a frame carrying `payload_size` bytes will need
    pub fn fragment_count(&self, payload_size: usize, fcs_option: FcsOption) -> usize {
        let frame_size = L2CAP_BASIC_HEADER_SIZE + payload_size + fcs_option.size();
        frame_size.div_ceil(self.max_acl_payload_size)
    }

    /// Build a basic frame for `channel_id` and split it into ACL fragments
    ///
    /// # Panics
    ///
    /// Panics if the payload (plus FCS) does not fit a basic frame. Callers
    /// enforce the channel MTU long before this point.
    pub fn build_frame(&self, channel_id: ChannelId, payload: &[u8], fcs_option: FcsOption, flushable: bool) -> Pdu {
        let information_length = payload.len() + fcs_option.size();
        assert!(
            information_length <= L2CAP_MAX_BASIC_FRAME_PAYLOAD_SIZE,
            "frame payload of {} bytes exceeds the basic frame maximum",
            information_length
        );

        let header = L2capHeader::new(information_length as u16, channel_id);
        let header_bytes = header.to_bytes();

        let mut frame = Vec::with_capacity(header.frame_size());
        frame.extend_from_slice(&header_bytes);
        frame.extend_from_slice(payload);
        if fcs_option == FcsOption::Present {
            let fcs = compute_fcs(payload, compute_frame_fcs(&header_bytes));
            frame.extend_from_slice(&fcs.to_le_bytes());
        }

        let first_flag = if flushable {
            PacketBoundaryFlag::FirstFlushable
        } else {
            PacketBoundaryFlag::FirstNonFlushable
        };

        let fragments: Vec<AclDataPacket> = frame
            .chunks(self.max_acl_payload_size)
            .enumerate()
            .map(|(index, chunk)| {
                let flag = if index == 0 {
                    first_flag
                } else {
                    PacketBoundaryFlag::ContinuingFragment
                };
                AclDataPacket::new(self.handle, flag, BroadcastFlag::PointToPoint, chunk.to_vec())
            })
            .collect();

        trace!(
            "Built frame for CID 0x{:04X} on 0x{:04X}: {} bytes in {} fragments",
            channel_id,
            self.handle,
            frame.len(),
            fragments.len()
        );

        Pdu::from_fragments(fragments)
    }
}
