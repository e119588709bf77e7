//! L2CAP header handling
//!
//! This module provides the basic frame header and the signaling command
//! header, both little-endian on the wire.

use super::constants::*;
use super::types::ChannelId;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// L2CAP basic frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2capHeader {
    /// Length of the information payload (plus FCS, if any) in bytes
    pub length: u16,
    /// Channel Identifier
    pub channel_id: ChannelId,
}

impl L2capHeader {
    /// Create a new L2CAP header
    pub fn new(length: u16, channel_id: ChannelId) -> Self {
        Self { length, channel_id }
    }

    /// Parse an L2CAP header from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < L2CAP_BASIC_HEADER_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(data);
        let length = cursor.read_u16::<LittleEndian>().ok()?;
        let channel_id = cursor.read_u16::<LittleEndian>().ok()?;

        Some(Self { length, channel_id })
    }

    /// Serialize the header to bytes
    pub fn to_bytes(&self) -> [u8; L2CAP_BASIC_HEADER_SIZE] {
        let mut result = [0u8; L2CAP_BASIC_HEADER_SIZE];
        result[0..2].copy_from_slice(&self.length.to_le_bytes());
        result[2..4].copy_from_slice(&self.channel_id.to_le_bytes());
        result
    }

    /// Size of the whole frame this header introduces
    pub fn frame_size(&self) -> usize {
        L2CAP_BASIC_HEADER_SIZE + self.length as usize
    }
}

/// L2CAP Command header used in signaling packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2capCommandHeader {
    /// Command code
    pub code: u8,
    /// Command identifier
    pub identifier: u8,
    /// Length of command parameters
    pub length: u16,
}

impl L2capCommandHeader {
    /// Create a new command header
    pub fn new(code: u8, identifier: u8, length: u16) -> Self {
        Self {
            code,
            identifier,
            length,
        }
    }

    /// Parse a command header from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < L2CAP_SIGNALING_HEADER_SIZE {
            return None;
        }

        let code = data[0];
        let identifier = data[1];

        let mut cursor = Cursor::new(&data[2..4]);
        let length = cursor.read_u16::<LittleEndian>().ok()?;

        Some(Self {
            code,
            identifier,
            length,
        })
    }

    /// Serialize the command header to bytes
    pub fn to_bytes(&self) -> [u8; L2CAP_SIGNALING_HEADER_SIZE] {
        let mut result = [0u8; L2CAP_SIGNALING_HEADER_SIZE];

        result[0] = self.code;
        result[1] = self.identifier;
        result[2..4].copy_from_slice(&self.length.to_le_bytes());

        result
    }
}
