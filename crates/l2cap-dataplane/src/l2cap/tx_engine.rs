//! Transmit engines: SDUs in, PDU payloads out
//!
//! The engines only decide what goes into each PDU. Framing and
//! fragmentation are left to the [`Fragmenter`](super::fragmenter::Fragmenter).

use std::collections::VecDeque;

use log::{debug, trace};

use super::constants::*;
use super::types::{L2capError, L2capResult};

/// Transmit side of a channel, one variant per channel mode
#[derive(Debug)]
pub enum TxEngine {
    Basic(BasicModeTxEngine),
    CreditBased(CreditBasedFlowControlTxEngine),
}

impl TxEngine {
    pub fn basic() -> Self {
        Self::Basic(BasicModeTxEngine)
    }

    pub fn credit_based(mps: u16, initial_credits: u16) -> Self {
        Self::CreditBased(CreditBasedFlowControlTxEngine::new(mps, initial_credits))
    }

    /// Produce the next PDU payload, taking SDUs from `pending_sdus` as needed
    pub fn next_pdu_payload(&mut self, pending_sdus: &mut VecDeque<Vec<u8>>) -> Option<Vec<u8>> {
        match self {
            Self::Basic(engine) => engine.next_pdu_payload(pending_sdus),
            Self::CreditBased(engine) => engine.next_pdu_payload(pending_sdus),
        }
    }

    /// K-frames already segmented but not yet produced
    pub fn queued_segments(&self) -> usize {
        match self {
            Self::Basic(_) => 0,
            Self::CreditBased(engine) => engine.segments.len(),
        }
    }

    /// Credits returned by the peer
    pub fn add_credits(&mut self, credits: u16) -> L2capResult<()> {
        match self {
            Self::Basic(_) => Err(L2capError::InvalidState),
            Self::CreditBased(engine) => engine.add_credits(credits),
        }
    }
}

/// Basic mode: one SDU per PDU
#[derive(Debug, Default)]
pub struct BasicModeTxEngine;

impl BasicModeTxEngine {
    pub fn next_pdu_payload(&mut self, pending_sdus: &mut VecDeque<Vec<u8>>) -> Option<Vec<u8>> {
        pending_sdus.pop_front()
    }
}

/// Credit-based flow control mode
#[derive(Debug)]
pub struct CreditBasedFlowControlTxEngine {
    mps: u16,
    credits: u32,
    /// Remaining K-frames of the SDU being sent
    segments: VecDeque<Vec<u8>>,
}

impl CreditBasedFlowControlTxEngine {
    pub fn new(mps: u16, initial_credits: u16) -> Self {
        Self {
            mps,
            credits: initial_credits as u32,
            segments: VecDeque::new(),
        }
    }

    pub fn credits(&self) -> u32 {
        self.credits
    }

    pub fn next_pdu_payload(&mut self, pending_sdus: &mut VecDeque<Vec<u8>>) -> Option<Vec<u8>> {
        if self.credits == 0 {
            if !self.segments.is_empty() || !pending_sdus.is_empty() {
                trace!("Out of tx credits");
            }
            return None;
        }

        if self.segments.is_empty() {
            let sdu = pending_sdus.pop_front()?;
            self.segments = self.segment(&sdu);
        }

        let kframe = self.segments.pop_front()?;
        self.credits -= 1;
        Some(kframe)
    }

    /// Split an SDU into K-frame payloads of at most MPS octets
    fn segment(&self, sdu: &[u8]) -> VecDeque<Vec<u8>> {
        let mps = self.mps as usize;
        let first_len = sdu.len().min(mps - L2CAP_SDU_HEADER_SIZE);

        let mut segments = VecDeque::new();
        let mut first = Vec::with_capacity(L2CAP_SDU_HEADER_SIZE + first_len);
        first.extend_from_slice(&(sdu.len() as u16).to_le_bytes());
        first.extend_from_slice(&sdu[..first_len]);
        segments.push_back(first);

        for chunk in sdu[first_len..].chunks(mps) {
            segments.push_back(chunk.to_vec());
        }
        segments
    }

    pub fn add_credits(&mut self, credits: u16) -> L2capResult<()> {
        let total = self.credits + credits as u32;
        if total > L2CAP_MAX_CREDITS {
            return Err(L2capError::FlowControlViolation(format!(
                "Credit overflow ({} + {})",
                self.credits, credits
            )));
        }
        debug!("Received {} tx credits, {} available", credits, total);
        self.credits = total;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_mode_sends_sdus_in_order() {
        let mut engine = TxEngine::basic();
        let mut sdus: VecDeque<Vec<u8>> = [vec![1], vec![2, 3]].into_iter().collect();
        assert_eq!(engine.next_pdu_payload(&mut sdus), Some(vec![1]));
        assert_eq!(engine.next_pdu_payload(&mut sdus), Some(vec![2, 3]));
        assert_eq!(engine.next_pdu_payload(&mut sdus), None);
        assert!(engine.add_credits(1).is_err());
    }

    #[test]
    fn segments_sdu_by_mps() {
        let mut engine = CreditBasedFlowControlTxEngine::new(23, 10);
        let sdu: Vec<u8> = (0..50).collect();
        let mut sdus: VecDeque<Vec<u8>> = [sdu.clone()].into_iter().collect();

        let mut kframes = Vec::new();
        while let Some(kframe) = engine.next_pdu_payload(&mut sdus) {
            assert!(kframe.len() <= 23);
            kframes.push(kframe);
        }

        // 2 + 21, 23, 6
        assert_eq!(kframes.len(), 3);
        assert_eq!(&kframes[0][..2], &[50, 0]);
        let reassembled: Vec<u8> = kframes[0][2..]
            .iter()
            .chain(kframes[1].iter())
            .chain(kframes[2].iter())
            .copied()
            .collect();
        assert_eq!(reassembled, sdu);
        assert_eq!(engine.credits(), 7);
    }

    #[test]
    fn empty_sdu_is_one_kframe() {
        let mut engine = CreditBasedFlowControlTxEngine::new(23, 1);
        let mut sdus: VecDeque<Vec<u8>> = [Vec::new()].into_iter().collect();
        assert_eq!(engine.next_pdu_payload(&mut sdus), Some(vec![0, 0]));
        assert_eq!(engine.next_pdu_payload(&mut sdus), None);
    }

    #[test]
    fn waits_for_credits() {
        let mut engine = TxEngine::credit_based(23, 1);
        let mut sdus: VecDeque<Vec<u8>> = [vec![0; 30]].into_iter().collect();

        assert!(engine.next_pdu_payload(&mut sdus).is_some());
        assert_eq!(engine.next_pdu_payload(&mut sdus), None);
        assert_eq!(engine.queued_segments(), 1);

        engine.add_credits(1).unwrap();
        assert_eq!(engine.next_pdu_payload(&mut sdus).map(|k| k.len()), Some(9));
        assert_eq!(engine.queued_segments(), 0);
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let mut engine = CreditBasedFlowControlTxEngine::new(23, 65000);
        assert!(engine.add_credits(535).is_ok());
        assert!(matches!(
            engine.add_credits(1),
            Err(L2capError::FlowControlViolation(_))
        ));
        assert_eq!(engine.credits(), 65535);
    }
}
