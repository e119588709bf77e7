//! HCI packet structures and parsing
//!
//! This module contains structures and methods for handling the HCI packets
//! the data plane touches: ACL data packets in both directions, the few
//! commands it issues on behalf of channels, and the events it consumes.

use crate::error::HciError;
use crate::hci::constants::*;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Cursor;

/// Identifier of one logical link (BR/EDR ACL or LE) on the controller
pub type ConnectionHandle = u16;

/// Packet boundary flag carried in the ACL data packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketBoundaryFlag {
    /// First fragment of a frame that the controller must not flush
    FirstNonFlushable = 0x00,
    /// Continuation of a frame started by a previous fragment
    ContinuingFragment = 0x01,
    /// First fragment of an automatically flushable frame
    FirstFlushable = 0x02,
    /// A complete frame (controller to host on some transports)
    CompletePdu = 0x03,
}

impl PacketBoundaryFlag {
    /// Convert from the raw 2-bit value
    pub fn from_bits(value: u16) -> Self {
        match value & HCI_ACL_FLAG_MASK {
            0x00 => Self::FirstNonFlushable,
            0x01 => Self::ContinuingFragment,
            0x02 => Self::FirstFlushable,
            _ => Self::CompletePdu,
        }
    }

    /// Whether a fragment with this flag starts a new frame
    pub fn is_first(self) -> bool {
        self != Self::ContinuingFragment
    }
}

/// Broadcast flag carried in the ACL data packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BroadcastFlag {
    PointToPoint = 0x00,
    ActivePeripheralBroadcast = 0x01,
    Reserved2 = 0x02,
    Reserved3 = 0x03,
}

impl BroadcastFlag {
    /// Convert from the raw 2-bit value
    pub fn from_bits(value: u16) -> Self {
        match value & HCI_ACL_FLAG_MASK {
            0x00 => Self::PointToPoint,
            0x01 => Self::ActivePeripheralBroadcast,
            0x02 => Self::Reserved2,
            _ => Self::Reserved3,
        }
    }
}

/// One HCI ACL data packet: a fragment of an L2CAP frame
#[derive(Clone, PartialEq, Eq)]
pub struct AclDataPacket {
    handle: ConnectionHandle,
    packet_boundary_flag: PacketBoundaryFlag,
    broadcast_flag: BroadcastFlag,
    payload: Vec<u8>,
}

impl AclDataPacket {
    /// Create a new ACL data packet
    pub fn new(
        handle: ConnectionHandle,
        packet_boundary_flag: PacketBoundaryFlag,
        broadcast_flag: BroadcastFlag,
        payload: Vec<u8>,
    ) -> Self {
        debug_assert!(payload.len() <= u16::MAX as usize);
        Self {
            handle: handle & HCI_ACL_HANDLE_MASK,
            packet_boundary_flag,
            broadcast_flag,
            payload,
        }
    }

    /// Parse an ACL data packet (without the H4 packet type indicator)
    pub fn parse(data: &[u8]) -> Result<Self, HciError> {
        if data.len() < HCI_ACL_HEADER_SIZE {
            return Err(HciError::InvalidPacketFormat);
        }

        let mut cursor = Cursor::new(data);
        let handle_and_flags = cursor.read_u16::<LittleEndian>()?;
        let data_total_length = cursor.read_u16::<LittleEndian>()? as usize;

        if data.len() - HCI_ACL_HEADER_SIZE != data_total_length {
            return Err(HciError::InvalidParamLength(data_total_length));
        }

        Ok(Self {
            handle: handle_and_flags & HCI_ACL_HANDLE_MASK,
            packet_boundary_flag: PacketBoundaryFlag::from_bits(handle_and_flags >> HCI_ACL_PB_SHIFT),
            broadcast_flag: BroadcastFlag::from_bits(handle_and_flags >> HCI_ACL_BC_SHIFT),
            payload: data[HCI_ACL_HEADER_SIZE..].to_vec(),
        })
    }

    /// Serialize the header and payload (without the H4 packet type indicator)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(HCI_ACL_HEADER_SIZE + self.payload.len());
        let handle_and_flags = self.handle
            | ((self.packet_boundary_flag as u16) << HCI_ACL_PB_SHIFT)
            | ((self.broadcast_flag as u16) << HCI_ACL_BC_SHIFT);

        // Writes into a Vec cannot fail
        let _ = result.write_u16::<LittleEndian>(handle_and_flags);
        let _ = result.write_u16::<LittleEndian>(self.payload.len() as u16);
        result.extend_from_slice(&self.payload);
        result
    }

    /// Serialize including the H4 packet type indicator
    pub fn to_packet(&self) -> Vec<u8> {
        let mut packet = vec![HCI_ACL_PKT];
        packet.extend_from_slice(&self.to_bytes());
        packet
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn packet_boundary_flag(&self) -> PacketBoundaryFlag {
        self.packet_boundary_flag
    }

    pub fn broadcast_flag(&self) -> BroadcastFlag {
        self.broadcast_flag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Consume the packet, returning its payload buffer
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl fmt::Debug for AclDataPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclDataPacket")
            .field("handle", &format_args!("0x{:04X}", self.handle))
            .field("packet_boundary_flag", &self.packet_boundary_flag)
            .field("broadcast_flag", &self.broadcast_flag)
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

/// An HCI command issued on behalf of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciCommand {
    ogf: u8,
    ocf: u16,
    parameters: Vec<u8>,
}

impl HciCommand {
    /// Create a raw command from its opcode parts and parameters
    pub fn new(ogf: u8, ocf: u16, parameters: Vec<u8>) -> Self {
        Self { ogf, ocf, parameters }
    }

    /// HCI_Write_Automatic_Flush_Timeout
    pub fn write_automatic_flush_timeout(handle: ConnectionHandle, flush_timeout: u16) -> Self {
        let mut params = Vec::with_capacity(4);
        params.extend_from_slice(&handle.to_le_bytes());
        params.extend_from_slice(&flush_timeout.to_le_bytes());
        Self::new(OGF_HOST_CTL, OCF_WRITE_AUTOMATIC_FLUSH_TIMEOUT, params)
    }

    /// A vendor-specific command (OGF 0x3F)
    pub fn vendor(ocf: u16, parameters: Vec<u8>) -> Self {
        Self::new(OGF_VENDOR, ocf, parameters)
    }

    /// Get the OGF and OCF for this command
    pub fn opcode_parts(&self) -> (u8, u16) {
        (self.ogf, self.ocf)
    }

    /// Get the packed 16-bit opcode
    pub fn opcode(&self) -> u16 {
        ((self.ogf as u16) << 10) | (self.ocf & 0x3ff)
    }

    pub fn parameters(&self) -> &[u8] {
        &self.parameters
    }

    /// Convert the command to a raw HCI packet
    pub fn to_packet(&self) -> Result<Vec<u8>, HciError> {
        if self.parameters.len() > HCI_MAX_PARAM_LEN {
            return Err(HciError::InvalidParamLength(self.parameters.len()));
        }

        let mut packet = vec![HCI_COMMAND_PKT];
        packet.extend_from_slice(&self.opcode().to_le_bytes());
        packet.push(self.parameters.len() as u8);
        packet.extend_from_slice(&self.parameters);
        Ok(packet)
    }
}

/// One `(handle, count)` entry of a Number Of Completed Packets event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedPackets {
    pub handle: ConnectionHandle,
    pub num_completed: u16,
}

/// HCI Event packet
#[derive(Debug, Clone)]
pub struct HciEvent {
    pub event_code: u8,
    pub parameter_total_length: u8,
    pub parameters: Vec<u8>,
}

impl HciEvent {
    /// Parse an HCI event from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }

        let event_code = data[0];
        let parameter_total_length = data[1];

        if data.len() < (parameter_total_length as usize + 2) {
            return None;
        }

        let parameters = data[2..(parameter_total_length as usize + 2)].to_vec();

        Some(HciEvent {
            event_code,
            parameter_total_length,
            parameters,
        })
    }

    /// Build a Number Of Completed Packets event
    ///
    /// # Panics
    ///
    /// If `entries` holds more than [`HCI_MAX_COMPLETED_PACKETS_ENTRIES`] pairs.
    pub fn number_of_completed_packets(entries: &[CompletedPackets]) -> Self {
        assert!(
            entries.len() <= HCI_MAX_COMPLETED_PACKETS_ENTRIES,
            "{} completed packet entries do not fit in one event",
            entries.len()
        );
        let mut parameters = Vec::with_capacity(1 + entries.len() * 4);
        parameters.push(entries.len() as u8);
        for entry in entries {
            parameters.extend_from_slice(&entry.handle.to_le_bytes());
            parameters.extend_from_slice(&entry.num_completed.to_le_bytes());
        }

        Self {
            event_code: EVT_NUM_COMPLETED_PACKETS,
            parameter_total_length: parameters.len() as u8,
            parameters,
        }
    }

    /// Opcode of the command a Command Complete event answers
    pub fn command_complete_opcode(&self) -> Option<u16> {
        if self.event_code != EVT_CMD_COMPLETE || self.parameters.len() < 3 {
            return None;
        }
        Some(u16::from_le_bytes([self.parameters[1], self.parameters[2]]))
    }

    /// Opcode of the command a Command Status event answers
    pub fn command_status_opcode(&self) -> Option<u16> {
        if self.event_code != EVT_CMD_STATUS || self.parameters.len() < 4 {
            return None;
        }
        Some(u16::from_le_bytes([self.parameters[2], self.parameters[3]]))
    }

    /// Check whether this is the Command Complete event for a given command
    pub fn is_command_complete(&self, ogf: u8, ocf: u16) -> bool {
        let opcode = ((ogf as u16) << 10) | (ocf & 0x3ff);
        self.command_complete_opcode() == Some(opcode)
    }

    /// Status byte of a Command Complete or Command Status event
    pub fn get_status(&self) -> u8 {
        match self.event_code {
            EVT_CMD_COMPLETE => self.parameters.get(3).copied().unwrap_or(0xFF),
            EVT_CMD_STATUS => self.parameters.first().copied().unwrap_or(0xFF),
            _ => 0xFF,
        }
    }

    /// Decode the entries of a Number Of Completed Packets event
    pub fn completed_packets(&self) -> Result<Vec<CompletedPackets>, HciError> {
        if self.event_code != EVT_NUM_COMPLETED_PACKETS {
            return Err(HciError::UnexpectedEvent(self.event_code));
        }

        let num_handles = *self.parameters.first().ok_or(HciError::InvalidPacketFormat)? as usize;
        let expected = 1 + num_handles * 4;
        if self.parameters.len() != expected {
            return Err(HciError::InvalidPacketFormat);
        }

        let mut cursor = Cursor::new(&self.parameters[1..]);
        let mut entries = Vec::with_capacity(num_handles);
        for _ in 0..num_handles {
            let handle = cursor.read_u16::<LittleEndian>()? & HCI_ACL_HANDLE_MASK;
            let num_completed = cursor.read_u16::<LittleEndian>()?;
            entries.push(CompletedPackets { handle, num_completed });
        }

        Ok(entries)
    }
}
