//! Receive engines: PDU payloads in, SDUs out

use std::collections::VecDeque;

use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};

use super::constants::*;
use super::types::{L2capError, L2capResult};

/// Receive side of a channel, one variant per channel mode
#[derive(Debug)]
pub enum RxEngine {
    Basic(BasicModeRxEngine),
    CreditBased(CreditBasedFlowControlRxEngine),
}

impl RxEngine {
    pub fn basic() -> Self {
        Self::Basic(BasicModeRxEngine)
    }

    pub fn credit_based(mtu: u16, mps: u16, initial_credits: u16) -> Self {
        Self::CreditBased(CreditBasedFlowControlRxEngine::new(mtu, mps, initial_credits))
    }

    /// Feed the information payload of one PDU (basic header and FCS removed)
    ///
    /// Returns a complete SDU once one is available. An error means the peer
    /// broke the flow control contract; the engine has already discarded its
    /// partial state and the link should be disconnected.
    pub fn process_pdu(&mut self, payload: Vec<u8>) -> L2capResult<Option<Vec<u8>>> {
        match self {
            Self::Basic(engine) => Ok(Some(engine.process_pdu(payload))),
            Self::CreditBased(engine) => engine.process_pdu(payload),
        }
    }

    /// Called once the upper layer has consumed a delivered SDU
    ///
    /// Returns the number of credits to hand back to the peer, if any.
    pub fn acknowledge_read(&mut self) -> Option<u16> {
        match self {
            Self::Basic(_) => None,
            Self::CreditBased(engine) => engine.acknowledge_read(),
        }
    }
}

/// Basic mode: every PDU is one SDU
#[derive(Debug, Default)]
pub struct BasicModeRxEngine;

impl BasicModeRxEngine {
    pub fn process_pdu(&self, payload: Vec<u8>) -> Vec<u8> {
        payload
    }
}

/// Credit-based flow control mode
///
/// The first K-frame of an SDU starts with the 2-octet SDU length. Every
/// K-frame consumes one of the credits we granted the peer; the credits spent
/// on an SDU are handed back only after the SDU has been read.
#[derive(Debug)]
pub struct CreditBasedFlowControlRxEngine {
    mtu: u16,
    mps: u16,
    /// Credits the peer may still spend before we return more
    remaining_credits: u32,
    next_sdu: Option<Vec<u8>>,
    expected_sdu_length: usize,
    current_sdu_credits: u16,
    /// Credits per delivered SDU awaiting acknowledge_read
    unacknowledged_credits: VecDeque<u16>,
}

impl CreditBasedFlowControlRxEngine {
    pub fn new(mtu: u16, mps: u16, initial_credits: u16) -> Self {
        Self {
            mtu,
            mps,
            remaining_credits: initial_credits as u32,
            next_sdu: None,
            expected_sdu_length: 0,
            current_sdu_credits: 0,
            unacknowledged_credits: VecDeque::new(),
        }
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn mps(&self) -> u16 {
        self.mps
    }

    pub fn remaining_credits(&self) -> u32 {
        self.remaining_credits
    }

    /// Whether an SDU is partially received
    pub fn sdu_in_progress(&self) -> bool {
        self.next_sdu.is_some()
    }

    /// Number of delivered SDUs whose credits have not been returned
    pub fn pending_credit_returns(&self) -> usize {
        self.unacknowledged_credits.len()
    }

    pub fn process_pdu(&mut self, payload: Vec<u8>) -> L2capResult<Option<Vec<u8>>> {
        if self.remaining_credits == 0 {
            return Err(self.fail("K-frame received while peer has no credits".into()));
        }
        self.remaining_credits -= 1;

        if payload.len() > self.mps as usize {
            return Err(self.fail(format!("K-frame of {} octets exceeds MPS {}", payload.len(), self.mps)));
        }

        match self.next_sdu.take() {
            None => self.process_first_kframe(payload),
            Some(sdu) => self.process_continuation(sdu, &payload),
        }
    }

    fn process_first_kframe(&mut self, payload: Vec<u8>) -> L2capResult<Option<Vec<u8>>> {
        if payload.len() < L2CAP_SDU_HEADER_SIZE {
            return Err(self.fail("First K-frame too short for SDU length".into()));
        }

        let sdu_length = LittleEndian::read_u16(&payload[..L2CAP_SDU_HEADER_SIZE]) as usize;
        if sdu_length > self.mtu as usize {
            return Err(self.fail(format!("SDU length {} exceeds MTU {}", sdu_length, self.mtu)));
        }

        let data = &payload[L2CAP_SDU_HEADER_SIZE..];
        if data.len() > sdu_length {
            return Err(self.fail(format!("SDU overrun ({} > {})", data.len(), sdu_length)));
        }

        let mut sdu = Vec::with_capacity(sdu_length);
        sdu.extend_from_slice(data);
        self.expected_sdu_length = sdu_length;
        self.current_sdu_credits = 1;

        Ok(self.complete_or_continue(sdu))
    }

    fn process_continuation(&mut self, mut sdu: Vec<u8>, payload: &[u8]) -> L2capResult<Option<Vec<u8>>> {
        if sdu.len() + payload.len() > self.expected_sdu_length {
            return Err(self.fail(format!(
                "SDU overrun ({} > {})",
                sdu.len() + payload.len(),
                self.expected_sdu_length
            )));
        }

        sdu.extend_from_slice(payload);
        self.current_sdu_credits += 1;

        Ok(self.complete_or_continue(sdu))
    }

    fn complete_or_continue(&mut self, sdu: Vec<u8>) -> Option<Vec<u8>> {
        if sdu.len() < self.expected_sdu_length {
            trace!("SDU {} of {} octets", sdu.len(), self.expected_sdu_length);
            self.next_sdu = Some(sdu);
            return None;
        }

        self.unacknowledged_credits.push_back(self.current_sdu_credits);
        self.expected_sdu_length = 0;
        self.current_sdu_credits = 0;
        Some(sdu)
    }

    fn fail(&mut self, reason: String) -> L2capError {
        warn!("Credit-based flow control violation: {}", reason);
        self.next_sdu = None;
        self.expected_sdu_length = 0;
        self.current_sdu_credits = 0;
        L2capError::FlowControlViolation(reason)
    }

    pub fn acknowledge_read(&mut self) -> Option<u16> {
        let credits = self.unacknowledged_credits.pop_front()?;
        self.remaining_credits = (self.remaining_credits + credits as u32).min(L2CAP_MAX_CREDITS);
        Some(credits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kframe(sdu_length: Option<u16>, data: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        if let Some(length) = sdu_length {
            frame.extend_from_slice(&length.to_le_bytes());
        }
        frame.extend_from_slice(data);
        frame
    }

    #[test]
    fn basic_mode_passes_payload_through() {
        let mut engine = RxEngine::basic();
        assert_eq!(engine.process_pdu(vec![1, 2, 3]).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(engine.process_pdu(Vec::new()).unwrap(), Some(Vec::new()));
        assert_eq!(engine.acknowledge_read(), None);
    }

    #[test]
    fn single_kframe_sdu() {
        let mut engine = RxEngine::credit_based(100, 50, 5);
        let sdu = engine.process_pdu(kframe(Some(3), &[7, 8, 9])).unwrap();
        assert_eq!(sdu, Some(vec![7, 8, 9]));
        assert_eq!(engine.acknowledge_read(), Some(1));
        assert_eq!(engine.acknowledge_read(), None);
    }

    #[test]
    fn sdu_spanning_three_kframes_returns_three_credits() {
        let mut engine = CreditBasedFlowControlRxEngine::new(100, 50, 3);

        assert_eq!(engine.process_pdu(kframe(Some(10), &[])).unwrap(), None);
        assert_eq!(engine.process_pdu(vec![0, 1, 2, 3]).unwrap(), None);
        let sdu = engine.process_pdu(vec![4, 5, 6, 7, 8, 9]).unwrap().unwrap();

        assert_eq!(sdu, (0..10).collect::<Vec<u8>>());
        assert_eq!(engine.remaining_credits(), 0);
        assert_eq!(engine.pending_credit_returns(), 1);
        assert_eq!(engine.acknowledge_read(), Some(3));
        assert_eq!(engine.remaining_credits(), 3);
    }

    #[test]
    fn zero_length_sdu_is_delivered_empty() {
        let mut engine = CreditBasedFlowControlRxEngine::new(100, 50, 1);
        assert_eq!(engine.process_pdu(kframe(Some(0), &[])).unwrap(), Some(Vec::new()));
        assert_eq!(engine.acknowledge_read(), Some(1));
    }

    #[test]
    fn overrun_is_a_violation_and_resets() {
        let mut engine = CreditBasedFlowControlRxEngine::new(100, 50, 10);
        engine.process_pdu(kframe(Some(4), &[1, 2])).unwrap();
        let result = engine.process_pdu(vec![3, 4, 5]);
        assert!(matches!(result, Err(L2capError::FlowControlViolation(_))));
        assert!(!engine.sdu_in_progress());

        // A fresh SDU is accepted after the reset
        assert_eq!(engine.process_pdu(kframe(Some(1), &[9])).unwrap(), Some(vec![9]));
    }

    #[test]
    fn first_kframe_overrun_is_a_violation() {
        let mut engine = CreditBasedFlowControlRxEngine::new(100, 50, 10);
        let result = engine.process_pdu(kframe(Some(1), &[1, 2]));
        assert!(matches!(result, Err(L2capError::FlowControlViolation(_))));
    }

    #[test]
    fn sdu_larger_than_mtu_is_a_violation() {
        let mut engine = CreditBasedFlowControlRxEngine::new(30, 30, 10);
        let result = engine.process_pdu(kframe(Some(31), &[0]));
        assert!(matches!(result, Err(L2capError::FlowControlViolation(_))));
    }

    #[test]
    fn kframe_larger_than_mps_is_a_violation() {
        let mut engine = CreditBasedFlowControlRxEngine::new(100, 23, 10);
        let result = engine.process_pdu(kframe(Some(50), &[0; 22]));
        assert!(matches!(result, Err(L2capError::FlowControlViolation(_))));
    }

    #[test]
    fn kframe_without_credit_is_a_violation() {
        let mut engine = CreditBasedFlowControlRxEngine::new(100, 50, 1);
        engine.process_pdu(kframe(Some(1), &[1])).unwrap();
        let result = engine.process_pdu(kframe(Some(1), &[2]));
        assert!(matches!(result, Err(L2capError::FlowControlViolation(_))));

        // Returning the credit lets the peer continue
        assert_eq!(engine.acknowledge_read(), Some(1));
        assert_eq!(engine.process_pdu(kframe(Some(1), &[3])).unwrap(), Some(vec![3]));
    }

    #[test]
    fn truncated_sdu_length_is_a_violation() {
        let mut engine = CreditBasedFlowControlRxEngine::new(100, 50, 1);
        let result = engine.process_pdu(vec![0x05]);
        assert!(matches!(result, Err(L2capError::FlowControlViolation(_))));
    }
}
