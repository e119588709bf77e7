//! L2CAP protocol data units
//!
//! A PDU is one complete L2CAP frame held as the ordered ACL fragments that
//! carried (or will carry) it. Payload bytes are never coalesced until a
//! consumer asks for them.

use super::constants::*;
use super::packet::L2capHeader;
use super::types::ChannelId;
use crate::hci::AclDataPacket;

/// One complete L2CAP frame as a sequence of ACL fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    fragments: Vec<AclDataPacket>,
}

impl Pdu {
    pub(crate) fn new(first: AclDataPacket) -> Self {
        Self { fragments: vec![first] }
    }

    pub(crate) fn from_fragments(fragments: Vec<AclDataPacket>) -> Self {
        Self { fragments }
    }

    pub(crate) fn append_fragment(&mut self, fragment: AclDataPacket) {
        self.fragments.push(fragment);
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn fragments(&self) -> &[AclDataPacket] {
        &self.fragments
    }

    /// Release the fragments, e.g. to forward them unchanged
    pub fn into_fragments(self) -> Vec<AclDataPacket> {
        self.fragments
    }

    /// Sum of the fragment payload sizes
    pub fn total_size(&self) -> usize {
        self.fragments.iter().map(AclDataPacket::payload_size).sum()
    }

    /// The basic header, if enough bytes are present
    pub fn header(&self) -> Option<L2capHeader> {
        let bytes = self.copy_range(0, L2CAP_BASIC_HEADER_SIZE);
        L2capHeader::parse(&bytes)
    }

    /// Value of the header's length field
    pub fn length(&self) -> usize {
        self.header().map(|h| h.length as usize).unwrap_or(0)
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.header().map(|h| h.channel_id)
    }

    /// A PDU is valid when it starts with a first fragment, is followed only
    /// by continuations, and carries exactly the length its header declares.
    pub fn is_valid(&self) -> bool {
        let Some(first) = self.fragments.first() else {
            return false;
        };
        if !first.packet_boundary_flag().is_first() {
            return false;
        }
        if self.fragments[1..]
            .iter()
            .any(|f| f.packet_boundary_flag().is_first())
        {
            return false;
        }
        match self.header() {
            Some(header) => header.frame_size() == self.total_size(),
            None => false,
        }
    }

    /// Copy `len` bytes of the frame starting at `offset`, across fragment
    /// boundaries. The result is truncated at the end of the frame.
    pub fn copy_range(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut result = Vec::with_capacity(len);
        let mut skip = offset;

        for fragment in &self.fragments {
            if result.len() == len {
                break;
            }
            let payload = fragment.payload();
            if skip >= payload.len() {
                skip -= payload.len();
                continue;
            }
            let available = &payload[skip..];
            skip = 0;
            let take = available.len().min(len - result.len());
            result.extend_from_slice(&available[..take]);
        }

        result
    }

    /// The information payload (everything after the basic header, FCS included)
    pub fn payload(&self) -> Vec<u8> {
        self.copy_range(L2CAP_BASIC_HEADER_SIZE, self.length())
    }

    /// The whole frame, header included
    pub fn frame_bytes(&self) -> Vec<u8> {
        self.copy_range(0, self.total_size())
    }
}
