//! L2CAP protocol constants
//!
//! This module contains constants used by the L2CAP data path.

// Frame layout
pub const L2CAP_BASIC_HEADER_SIZE: usize = 4;
pub const L2CAP_FCS_SIZE: usize = 2;
pub const L2CAP_SDU_HEADER_SIZE: usize = 2;

/// Largest information payload a basic frame can carry (the header length field is 16 bits)
pub const L2CAP_MAX_BASIC_FRAME_PAYLOAD_SIZE: usize = u16::MAX as usize;

// Fixed channel identifiers
pub const L2CAP_SIGNALING_CID: u16 = 0x0001;
pub const L2CAP_CONNECTIONLESS_CID: u16 = 0x0002;
pub const L2CAP_ATTRIBUTE_PROTOCOL_CID: u16 = 0x0004;
pub const L2CAP_LE_SIGNALING_CID: u16 = 0x0005;
pub const L2CAP_LE_SECURITY_MANAGER_CID: u16 = 0x0006;
pub const L2CAP_BREDR_SECURITY_MANAGER_CID: u16 = 0x0007;

// Dynamic channel identifier ranges
pub const L2CAP_DYNAMIC_CID_MIN: u16 = 0x0040;
pub const L2CAP_DYNAMIC_CID_MAX: u16 = 0xFFFF;
pub const L2CAP_LE_DYNAMIC_CID_MAX: u16 = 0x007F;

// MTU values
pub const L2CAP_DEFAULT_MTU: u16 = 672;
pub const L2CAP_MIN_MTU: u16 = 48;
pub const L2CAP_LE_DEFAULT_MTU: u16 = 23;
pub const L2CAP_LE_CREDIT_BASED_MIN_MTU: u16 = 23;
pub const L2CAP_LE_CREDIT_BASED_MIN_MPS: u16 = 23;
pub const L2CAP_LE_CREDIT_BASED_MAX_MPS: u16 = 65533;

/// Upper bound on the number of outbound SDUs/PDUs/fragments queued per channel
pub const L2CAP_DEFAULT_MAX_TX_QUEUED: usize = 500;

/// Inbound SDUs held for a channel that has not been activated yet
pub const L2CAP_DEFAULT_MAX_RX_BUFFERED: usize = 500;

/// A credit count may never exceed this value
pub const L2CAP_MAX_CREDITS: u32 = 65535;

// Signaling command codes used by the data path
pub const L2CAP_FLOW_CONTROL_CREDIT_IND: u8 = 0x16;
pub const L2CAP_SIGNALING_HEADER_SIZE: usize = 4;
