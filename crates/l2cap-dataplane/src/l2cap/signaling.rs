//! L2CAP signaling commands emitted by the data path
//!
//! Channel negotiation lives above this crate. The only command the data
//! path originates itself is the credit indication that returns receive
//! credits to the peer once the upper layer has consumed an SDU.

use super::constants::*;
use super::packet::L2capCommandHeader;
use super::types::{ChannelId, L2capError, L2capResult};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Handle for identifying signaling transactions
pub type SignalId = u8;

/// L2CAP Flow Control Credit Ind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControlCreditInd {
    pub identifier: SignalId,
    /// Our (the sender's) local channel identifier
    pub cid: ChannelId,
    pub credits: u16,
}

impl FlowControlCreditInd {
    const PARAMS_SIZE: u16 = 4;

    pub fn new(identifier: SignalId, cid: ChannelId, credits: u16) -> Self {
        Self {
            identifier,
            cid,
            credits,
        }
    }

    /// Serialize to the signaling channel payload
    pub fn serialize(&self) -> Vec<u8> {
        let header = L2capCommandHeader::new(L2CAP_FLOW_CONTROL_CREDIT_IND, self.identifier, Self::PARAMS_SIZE);

        let mut result = Vec::with_capacity(L2CAP_SIGNALING_HEADER_SIZE + Self::PARAMS_SIZE as usize);
        result.extend_from_slice(&header.to_bytes());
        result.extend_from_slice(&self.cid.to_le_bytes());
        result.extend_from_slice(&self.credits.to_le_bytes());
        result
    }

    /// Parse from a signaling channel payload
    pub fn parse(data: &[u8]) -> L2capResult<Self> {
        let header = L2capCommandHeader::parse(data)
            .ok_or_else(|| L2capError::InvalidParameter("Signaling command too short".into()))?;

        if header.code != L2CAP_FLOW_CONTROL_CREDIT_IND {
            return Err(L2capError::InvalidParameter(format!(
                "Unexpected signaling command 0x{:02X}",
                header.code
            )));
        }
        if header.length != Self::PARAMS_SIZE || data.len() < L2CAP_SIGNALING_HEADER_SIZE + 4 {
            return Err(L2capError::InvalidParameter("Credit indication length mismatch".into()));
        }

        let mut cursor = Cursor::new(&data[L2CAP_SIGNALING_HEADER_SIZE..]);
        let cid = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| L2capError::InvalidParameter("Failed to read CID".into()))?;
        let credits = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| L2capError::InvalidParameter("Failed to read credits".into()))?;

        Ok(Self {
            identifier: header.identifier,
            cid,
            credits,
        })
    }
}
