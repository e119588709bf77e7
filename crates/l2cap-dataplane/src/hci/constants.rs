//! HCI protocol constants
//!
//! This module contains constants used in the Bluetooth HCI protocol.

// HCI packet types
pub const HCI_COMMAND_PKT: u8 = 0x01;
pub const HCI_ACL_PKT: u8 = 0x02;

// Maximum size of HCI command parameters
pub const HCI_MAX_PARAM_LEN: usize = 255;

// ACL data packet header layout
pub const HCI_ACL_HEADER_SIZE: usize = 4;
pub const HCI_ACL_HANDLE_MASK: u16 = 0x0FFF;
pub const HCI_ACL_PB_SHIFT: u16 = 12;
pub const HCI_ACL_BC_SHIFT: u16 = 14;
pub const HCI_ACL_FLAG_MASK: u16 = 0x03;

// Common OGF (Opcode Group Field) values
pub const OGF_HOST_CTL: u8 = 0x03;
pub const OGF_VENDOR: u8 = 0x3F;

// Host Controller Commands (OGF: 0x03)
pub const OCF_WRITE_AUTOMATIC_FLUSH_TIMEOUT: u16 = 0x0028;

// Automatic flush timeout is expressed in 0.625ms slots, at most 0x07FF
pub const FLUSH_TIMEOUT_MAX_SLOTS: u16 = 0x07FF;
pub const FLUSH_TIMEOUT_INFINITE: u16 = 0x0000;
/// One baseband slot pair, the unit of the flush timeout
pub const FLUSH_TIMEOUT_SLOT_MICROS: u128 = 625;

// HCI Events
pub const EVT_DISCONN_COMPLETE: u8 = 0x05;
pub const EVT_CMD_COMPLETE: u8 = 0x0E;
pub const EVT_CMD_STATUS: u8 = 0x0F;
pub const EVT_NUM_COMPLETED_PACKETS: u8 = 0x13;

/// Handle/count pairs that fit in one Number Of Completed Packets event
pub const HCI_MAX_COMPLETED_PACKETS_ENTRIES: usize = (HCI_MAX_PARAM_LEN - 1) / 4;

// HCI status codes
pub const HCI_SUCCESS: u8 = 0x00;
