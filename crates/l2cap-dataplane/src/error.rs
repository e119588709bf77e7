//! Error types for the HCI boundary
//!
//! This module defines the errors raised while encoding, decoding and
//! transmitting HCI packets.

use thiserror::Error;

/// Errors that can occur when working with HCI packets and transports
#[derive(Error, Debug)]
pub enum HciError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Transport rejected packet: {0}")]
    SendError(String),

    #[error("Invalid parameter length: {0}")]
    InvalidParamLength(usize),

    #[error("Invalid HCI packet format")]
    InvalidPacketFormat,

    #[error("Unexpected HCI event code 0x{0:02X}")]
    UnexpectedEvent(u8),

    #[error("Connection 0x{0:04X} is already registered")]
    ConnectionAlreadyRegistered(u16),

    #[error("Unknown connection 0x{0:04X}")]
    UnknownConnection(u16),

    #[error("Controller reports no ACL data buffers")]
    NoDataBuffers,

    #[error("Unsupported operation")]
    Unsupported,
}
