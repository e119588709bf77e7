//! Interfaces to the controller side of the stack
//!
//! The data plane never owns a socket or a driver. It is handed a transport
//! that accepts outbound ACL fragments, a command channel for the few HCI
//! commands it issues, and a vendor encoder for controller-specific commands.

use bitflags::bitflags;

use crate::error::HciError;
use crate::hci::packet::{AclDataPacket, ConnectionHandle, HciCommand};

/// A fragment the transport could not accept, handed back with the cause
#[derive(Debug)]
pub struct RejectedPacket {
    pub packet: AclDataPacket,
    pub error: HciError,
}

impl RejectedPacket {
    pub fn new(packet: AclDataPacket, error: HciError) -> Self {
        Self { packet, error }
    }
}

/// Accepts completed ACL fragments for transmission to the controller
pub trait AclTransport {
    /// Hand one fragment to the controller
    ///
    /// On success ownership moves to the transport. On failure the fragment
    /// comes back untouched so it can be sent again in order.
    fn send_acl_packet(&mut self, packet: AclDataPacket) -> Result<(), RejectedPacket>;
}

/// Sends HCI commands to the controller
///
/// Command Complete events are fed back through
/// [`ChannelManager::handle_event`](crate::l2cap::ChannelManager::handle_event).
pub trait CommandChannel {
    fn send_command(&mut self, command: HciCommand) -> Result<(), HciError>;
}

/// Scheduling priority of a link at the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AclPriority {
    #[default]
    Normal,
    /// The link is the source of an audio stream
    Source,
    /// The link is the sink of an audio stream
    Sink,
}

/// Codec of an offloaded A2DP stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum A2dpCodec {
    Sbc,
    Aac,
    Ldac,
    Aptx,
    AptxHd,
}

/// Parameters of an A2DP offload start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A2dpOffloadConfig {
    pub codec: A2dpCodec,
    pub max_latency: u16,
    pub scms_t_enable: bool,
    pub sampling_frequency: u32,
    pub bits_per_sample: u8,
    pub channel_mode: u8,
    pub encoded_audio_bitrate: u32,
    /// Codec-specific information block
    pub codec_information: Vec<u8>,
}

/// Identifies the L2CAP channel an offloaded stream rides on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffloadChannel {
    pub handle: ConnectionHandle,
    pub local_cid: u16,
    pub remote_cid: u16,
    pub remote_mtu: u16,
}

/// Encodes controller-specific commands
///
/// Controllers differ in how (and whether) they expose ACL priority and
/// audio offload; the encoder returns `None` when the controller cannot
/// express the request.
pub trait VendorCommandEncoder {
    fn encode_acl_priority(&self, handle: ConnectionHandle, priority: AclPriority) -> Option<HciCommand>;

    fn encode_a2dp_offload_start(&self, channel: OffloadChannel, config: &A2dpOffloadConfig)
        -> Option<HciCommand>;

    fn encode_a2dp_offload_stop(&self, channel: OffloadChannel) -> Option<HciCommand>;
}

bitflags! {
    /// Optional controller capabilities the data plane can make use of
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControllerFeatures: u32 {
        const SET_ACL_PRIORITY = 0b0000_0001;
        const A2DP_OFFLOAD = 0b0000_0010;
        const AUTOMATIC_FLUSH_TIMEOUT = 0b0000_0100;
    }
}
