//! l2cap-dataplane - the data path of a Bluetooth host stack
//!
//! This library turns HCI ACL fragments into L2CAP PDUs and SDUs and back:
//! fragmentation and recombination, frame check sequences, basic and
//! credit-based flow control, per-channel queuing, and arbitration of the
//! controller's ACL buffers across BR/EDR and LE links. Transports, vendor
//! command encodings and upper-layer protocols plug in through traits.

pub mod error;
pub mod hci;
pub mod l2cap;

// Re-export common types for convenience
pub use error::HciError;
pub use hci::{
    AclDataChannel, AclDataChannelConfig, AclDataPacket, AclTransport, CommandChannel, ConnectionHandle,
    DataBufferInfo, HciCommand, HciEvent, LinkType,
};
pub use l2cap::{
    Channel, ChannelHandle, ChannelManager, ChannelParameters, L2capError, L2capEvent, L2capResult,
};
