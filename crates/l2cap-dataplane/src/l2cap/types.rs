//! Type definitions for L2CAP operations
//!
//! This module contains core data structures used by the L2CAP data path.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::constants::*;
use crate::hci::constants::{FLUSH_TIMEOUT_INFINITE, FLUSH_TIMEOUT_MAX_SLOTS, FLUSH_TIMEOUT_SLOT_MICROS};
use crate::hci::{ConnectionHandle, LinkType};

/// Error types specific to L2CAP operations
#[derive(Debug, Error)]
pub enum L2capError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Channel not found")]
    ChannelNotFound,

    #[error("Link 0x{0:04X} not found")]
    LinkNotFound(ConnectionHandle),

    #[error("Invalid state for operation")]
    InvalidState,

    #[error("Channel is not active")]
    NotActive,

    #[error("Outbound queue full ({0} queued)")]
    QueueFull(usize),

    #[error("MTU exceeded")]
    MtuExceeded,

    #[error("Operation not supported")]
    NotSupported,

    #[error("Request already in progress")]
    InProgress,

    #[error("Already started")]
    AlreadyStarted,

    #[error("Flow control violation: {0}")]
    FlowControlViolation(String),

    #[error("Controller rejected command with status 0x{0:02X}")]
    CommandFailed(u8),

    #[error("HCI error: {0}")]
    HciError(#[from] crate::error::HciError),
}

/// Result type for L2CAP operations
pub type L2capResult<T> = std::result::Result<T, L2capError>;

/// L2CAP channel identifier
pub type ChannelId = u16;

/// Non-owning reference to a channel, valid while the channel is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub link: ConnectionHandle,
    pub local_cid: ChannelId,
}

impl ChannelHandle {
    pub fn new(link: ConnectionHandle, local_cid: ChannelId) -> Self {
        Self { link, local_cid }
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}:0x{:04X}", self.link, self.local_cid)
    }
}

/// Data transfer mode of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Basic L2CAP mode (no retransmission or flow control)
    Basic,
    /// LE / enhanced credit-based flow control mode
    CreditBasedFlowControl,
}

/// Whether basic frames carry a frame check sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FcsOption {
    #[default]
    NotPresent,
    Present,
}

impl FcsOption {
    pub fn size(self) -> usize {
        match self {
            Self::NotPresent => 0,
            Self::Present => L2CAP_FCS_SIZE,
        }
    }
}

/// L2CAP Channel State
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Constructed, not yet usable by the upper layer
    Inactive,
    /// Activated: data flows in both directions
    Active,
    /// Terminal
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "Inactive"),
            Self::Active => write!(f, "Active"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// One direction of a credit-based flow control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditBasedConfig {
    /// Maximum SDU size
    pub mtu: u16,
    /// Maximum PDU payload size
    pub mps: u16,
    /// Credits granted when the channel was established
    pub initial_credits: u16,
}

impl Default for CreditBasedConfig {
    fn default() -> Self {
        Self {
            mtu: L2CAP_LE_CREDIT_BASED_MIN_MTU,
            mps: L2CAP_LE_CREDIT_BASED_MIN_MPS,
            initial_credits: 0,
        }
    }
}

/// Negotiated parameters of an open channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelParameters {
    pub local_cid: ChannelId,
    pub remote_cid: ChannelId,
    pub mode: ChannelMode,
    /// Largest SDU we accept
    pub rx_mtu: u16,
    /// Largest SDU the peer accepts
    pub tx_mtu: u16,
    /// Basic mode only
    pub fcs: FcsOption,
    /// Send first fragments as automatically flushable
    pub flushable: bool,
    pub max_tx_queued: usize,
    /// SDUs kept before activation; later ones are dropped
    pub max_rx_buffered: usize,
    /// Credit-based mode: what we granted the peer
    pub rx_credits: CreditBasedConfig,
    /// Credit-based mode: what the peer granted us
    pub tx_credits: CreditBasedConfig,
}

impl ChannelParameters {
    /// Parameters for a basic mode channel
    pub fn basic(local_cid: ChannelId, remote_cid: ChannelId, link_type: LinkType) -> Self {
        let mtu = match link_type {
            LinkType::BrEdr => L2CAP_DEFAULT_MTU,
            LinkType::Le => L2CAP_LE_DEFAULT_MTU,
        };
        Self {
            local_cid,
            remote_cid,
            mode: ChannelMode::Basic,
            rx_mtu: mtu,
            tx_mtu: mtu,
            fcs: FcsOption::NotPresent,
            flushable: false,
            max_tx_queued: L2CAP_DEFAULT_MAX_TX_QUEUED,
            max_rx_buffered: L2CAP_DEFAULT_MAX_RX_BUFFERED,
            rx_credits: CreditBasedConfig::default(),
            tx_credits: CreditBasedConfig::default(),
        }
    }

    /// Parameters for a credit-based flow control channel
    pub fn credit_based(
        local_cid: ChannelId,
        remote_cid: ChannelId,
        rx: CreditBasedConfig,
        tx: CreditBasedConfig,
    ) -> Self {
        Self {
            local_cid,
            remote_cid,
            mode: ChannelMode::CreditBasedFlowControl,
            rx_mtu: rx.mtu,
            tx_mtu: tx.mtu,
            fcs: FcsOption::NotPresent,
            flushable: false,
            max_tx_queued: L2CAP_DEFAULT_MAX_TX_QUEUED,
            max_rx_buffered: L2CAP_DEFAULT_MAX_RX_BUFFERED,
            rx_credits: rx,
            tx_credits: tx,
        }
    }

    /// Check the parameters before a channel is built from them
    pub fn validate(&self) -> L2capResult<()> {
        if self.local_cid == 0 || self.remote_cid == 0 {
            return Err(L2capError::InvalidParameter("Null channel identifier".into()));
        }
        if self.max_tx_queued == 0 {
            return Err(L2capError::InvalidParameter("max_tx_queued must be non-zero".into()));
        }
        if self.mode == ChannelMode::CreditBasedFlowControl {
            if self.fcs == FcsOption::Present {
                return Err(L2capError::InvalidParameter(
                    "FCS is not used in credit-based mode".into(),
                ));
            }
            for config in [&self.rx_credits, &self.tx_credits] {
                if config.mps < L2CAP_LE_CREDIT_BASED_MIN_MPS || config.mps > L2CAP_LE_CREDIT_BASED_MAX_MPS {
                    return Err(L2capError::InvalidParameter(format!("Invalid MPS {}", config.mps)));
                }
                if config.mtu < L2CAP_LE_CREDIT_BASED_MIN_MTU {
                    return Err(L2capError::InvalidParameter(format!("Invalid MTU {}", config.mtu)));
                }
            }
        }
        Ok(())
    }
}

/// Automatic flush timeout of a BR/EDR link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushTimeout {
    /// Packets are never flushed
    #[default]
    Infinite,
    After(Duration),
}

impl FlushTimeout {
    /// Convert to the HCI representation (0.625 ms slots, 0 = infinite)
    pub fn to_slots(self) -> L2capResult<u16> {
        let Self::After(duration) = self else {
            return Ok(FLUSH_TIMEOUT_INFINITE);
        };

        let slots = duration.as_micros() / FLUSH_TIMEOUT_SLOT_MICROS;
        if slots == 0 || slots > FLUSH_TIMEOUT_MAX_SLOTS as u128 {
            return Err(L2capError::InvalidParameter(format!(
                "Flush timeout {:?} out of range",
                duration
            )));
        }
        Ok(slots as u16)
    }
}

/// Counters kept per logical link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub fragments_received: u64,
    pub fragments_sent: u64,
    pub frames_dropped: u64,
    pub fcs_failures: u64,
    pub sdus_delivered: u64,
}
