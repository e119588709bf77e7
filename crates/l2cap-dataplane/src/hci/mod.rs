//! Bluetooth HCI (Host Controller Interface) data path
//!
//! This module provides the HCI-facing half of the data plane: the ACL and
//! event codecs, the interfaces consumed from the transport, and the ACL data
//! channel that arbitrates the controller's packet buffers.

pub mod acl_data_channel;
pub mod constants;
pub mod packet;
pub mod transport;


pub use acl_data_channel::{
    AclDataChannel, AclDataChannelConfig, ConnectionInterface, DataBufferInfo, LinkType,
};
pub use packet::{
    AclDataPacket, BroadcastFlag, CompletedPackets, ConnectionHandle, HciCommand, HciEvent,
    PacketBoundaryFlag,
};
pub use transport::{
    A2dpCodec, A2dpOffloadConfig, AclPriority, AclTransport, CommandChannel, ControllerFeatures,
    OffloadChannel, RejectedPacket, VendorCommandEncoder,
};
