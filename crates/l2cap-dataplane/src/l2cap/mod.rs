//! L2CAP (Logical Link Control and Adaptation Protocol) data path
//!
//! This module provides the L2CAP half of the data plane, which is responsible for:
//! - Framing, fragmentation and recombination of L2CAP frames
//! - Frame check sequence generation and verification
//! - Basic mode and credit-based flow control engines
//! - Per-channel queuing and per-link multiplexing

pub mod a2dp_offload;
pub mod channel;
pub mod constants;
pub mod core;
pub mod fcs;
pub mod fragmenter;
pub mod logical_link;
pub mod packet;
pub mod pdu;
pub mod recombiner;
pub mod rx_engine;
pub mod signaling;
pub mod tx_engine;
pub mod types;

// Re-export the public API
pub use self::a2dp_offload::{A2dpOffloadManager, A2dpOffloadStatus};
pub use self::channel::{Channel, RxCallback, RxStatus};
pub use self::core::{ChannelManager, L2capEvent};
pub use self::fcs::{compute_fcs, compute_frame_fcs, FrameCheckSequence};
pub use self::fragmenter::Fragmenter;
pub use self::logical_link::LogicalLink;
pub use self::packet::{L2capCommandHeader, L2capHeader};
pub use self::pdu::Pdu;
pub use self::recombiner::{Recombiner, RecombinerResult};
pub use self::rx_engine::RxEngine;
pub use self::signaling::FlowControlCreditInd;
pub use self::tx_engine::TxEngine;
pub use self::types::*;
