//! L2CAP Channel implementation
//!
//! A channel owns the per-channel half of the data path: the receive and
//! transmit engines, the inbound SDU buffer used before activation, and the
//! three outbound queues (SDUs, framed PDUs, and the fragments of the PDU
//! currently on the wire). The logical link pulls fragments from here one
//! PDU at a time.

use std::collections::VecDeque;
use std::fmt;

use log::{debug, trace, warn};

use super::constants::*;
use super::fcs::{compute_frame_fcs, FrameCheckSequence};
use super::fragmenter::Fragmenter;
use super::pdu::Pdu;
use super::rx_engine::RxEngine;
use super::tx_engine::TxEngine;
use super::types::*;
use crate::hci::{AclDataPacket, AclPriority, ConnectionHandle, LinkType};

/// Receives SDUs once a channel is active
pub type RxCallback = Box<dyn FnMut(Vec<u8>) + Send + 'static>;

/// What happened to an inbound PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxStatus {
    /// An SDU was handed to the rx callback
    Delivered,
    /// An SDU was queued until the channel is activated
    Buffered,
    /// The PDU was consumed, the SDU is not complete yet
    Incomplete,
    /// Dropped, FCS did not match
    FcsMismatch,
    /// Dropped, the inactive channel already holds its limit of SDUs
    Dropped,
    /// Dropped, the channel is closed or its receive side has failed
    Ignored,
}

/// L2CAP Channel structure
pub struct Channel {
    params: ChannelParameters,
    link_type: LinkType,
    state: ChannelState,
    fragmenter: Fragmenter,

    rx_engine: RxEngine,
    tx_engine: TxEngine,
    rx_callback: Option<RxCallback>,
    /// SDUs received before activation
    inbound_sdus: VecDeque<Vec<u8>>,
    /// Set after a flow control violation; inbound data is ignored from then on
    rx_failed: bool,

    pending_sdus: VecDeque<Vec<u8>>,
    pending_pdus: VecDeque<Pdu>,
    /// Remaining fragments of the PDU being transmitted
    pending_fragments: VecDeque<AclDataPacket>,

    acl_priority: AclPriority,
    requested_acl_priority: Option<AclPriority>,
    flush_timeout: FlushTimeout,
    requested_flush_timeout: Option<FlushTimeout>,
}

impl Channel {
    /// Create an inactive channel
    pub fn new(params: ChannelParameters, link_type: LinkType, fragmenter: Fragmenter) -> L2capResult<Self> {
        params.validate()?;

        let (rx_engine, tx_engine) = match params.mode {
            ChannelMode::Basic => (RxEngine::basic(), TxEngine::basic()),
            ChannelMode::CreditBasedFlowControl => (
                RxEngine::credit_based(
                    params.rx_credits.mtu,
                    params.rx_credits.mps,
                    params.rx_credits.initial_credits,
                ),
                TxEngine::credit_based(params.tx_credits.mps, params.tx_credits.initial_credits),
            ),
        };

        Ok(Self {
            params,
            link_type,
            state: ChannelState::Inactive,
            fragmenter,
            rx_engine,
            tx_engine,
            rx_callback: None,
            inbound_sdus: VecDeque::new(),
            rx_failed: false,
            pending_sdus: VecDeque::new(),
            pending_pdus: VecDeque::new(),
            pending_fragments: VecDeque::new(),
            acl_priority: AclPriority::Normal,
            requested_acl_priority: None,
            flush_timeout: FlushTimeout::Infinite,
            requested_flush_timeout: None,
        })
    }

    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle::new(self.fragmenter.handle(), self.params.local_cid)
    }

    pub fn link_handle(&self) -> ConnectionHandle {
        self.fragmenter.handle()
    }

    pub fn local_cid(&self) -> ChannelId {
        self.params.local_cid
    }

    pub fn remote_cid(&self) -> ChannelId {
        self.params.remote_cid
    }

    pub fn mode(&self) -> ChannelMode {
        self.params.mode
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ChannelState::Active
    }

    pub fn rx_mtu(&self) -> u16 {
        self.params.rx_mtu
    }

    pub fn tx_mtu(&self) -> u16 {
        self.params.tx_mtu
    }

    pub fn max_tx_queued(&self) -> usize {
        self.params.max_tx_queued
    }

    pub fn rx_failed(&self) -> bool {
        self.rx_failed
    }

    pub fn parameters(&self) -> &ChannelParameters {
        &self.params
    }

    /// Install the rx callback and deliver everything received so far
    ///
    /// A channel activates exactly once.
    pub fn activate(&mut self, mut callback: RxCallback) -> L2capResult<()> {
        if self.state != ChannelState::Inactive {
            warn!("Channel {} cannot be activated in state {}", self.handle(), self.state);
            return Err(L2capError::InvalidState);
        }

        debug!(
            "Activating channel {} ({} buffered SDUs)",
            self.handle(),
            self.inbound_sdus.len()
        );
        for sdu in self.inbound_sdus.drain(..) {
            callback(sdu);
        }
        self.rx_callback = Some(callback);
        self.state = ChannelState::Active;
        Ok(())
    }

    /// Close the channel. Calling this on a closed channel does nothing.
    pub fn deactivate(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }

        debug!("Deactivating channel {}", self.handle());
        self.state = ChannelState::Closed;
        self.rx_callback = None;
        self.inbound_sdus.clear();
        self.pending_sdus.clear();
        self.pending_pdus.clear();
        self.pending_fragments.clear();
        self.requested_acl_priority = None;
        self.requested_flush_timeout = None;
    }

    /// Outbound units waiting in this channel
    pub fn queue_depth(&self) -> usize {
        self.pending_sdus.len()
            + self.tx_engine.queued_segments()
            + self.pending_pdus.len()
            + self.pending_fragments.len()
    }

    /// Queue an SDU for transmission
    pub fn send(&mut self, sdu: Vec<u8>) -> L2capResult<()> {
        if self.state != ChannelState::Active {
            return Err(L2capError::NotActive);
        }
        if sdu.len() > self.params.tx_mtu as usize {
            warn!(
                "Channel {}: SDU of {} octets exceeds MTU {}",
                self.handle(),
                sdu.len(),
                self.params.tx_mtu
            );
            return Err(L2capError::MtuExceeded);
        }

        let depth = self.queue_depth();
        if depth >= self.params.max_tx_queued {
            warn!("Channel {}: outbound queue full ({})", self.handle(), depth);
            return Err(L2capError::QueueFull(depth));
        }

        trace!("Channel {}: queueing SDU {}", self.handle(), hex::encode(&sdu));
        self.pending_sdus.push_back(sdu);
        self.process_pending_sdus();
        Ok(())
    }

    /// Credits granted by the peer for a credit-based channel
    pub fn add_tx_credits(&mut self, credits: u16) -> L2capResult<()> {
        self.tx_engine.add_credits(credits)?;
        self.process_pending_sdus();
        Ok(())
    }

    fn process_pending_sdus(&mut self) {
        while let Some(payload) = self.tx_engine.next_pdu_payload(&mut self.pending_sdus) {
            let pdu = self.fragmenter.build_frame(
                self.params.remote_cid,
                &payload,
                self.params.fcs,
                self.params.flushable,
            );
            self.pending_pdus.push_back(pdu);
        }
    }

    pub fn has_outbound_fragment(&self) -> bool {
        !self.pending_fragments.is_empty() || !self.pending_pdus.is_empty()
    }

    /// True while the fragments of a started PDU remain to be sent
    pub fn is_mid_pdu(&self) -> bool {
        !self.pending_fragments.is_empty()
    }

    /// Next fragment to transmit. Fragments of one PDU come out back to back.
    pub fn next_outbound_fragment(&mut self) -> Option<AclDataPacket> {
        if self.pending_fragments.is_empty() {
            let pdu = self.pending_pdus.pop_front()?;
            self.pending_fragments.extend(pdu.into_fragments());
        }
        self.pending_fragments.pop_front()
    }

    /// Put a fragment the transport refused back at the head of the queue
    pub fn return_fragment(&mut self, fragment: AclDataPacket) {
        if self.state == ChannelState::Closed {
            trace!("Channel {} closed, dropping returned fragment", self.handle());
            return;
        }
        self.pending_fragments.push_front(fragment);
    }

    /// Process a complete inbound PDU addressed to this channel
    ///
    /// An error is a flow control violation; the link should be torn down.
    /// It is reported once, after which the channel ignores inbound PDUs.
    pub fn handle_rx_pdu(&mut self, pdu: &Pdu) -> L2capResult<RxStatus> {
        if self.state == ChannelState::Closed {
            trace!("Channel {} closed, ignoring PDU", self.handle());
            return Ok(RxStatus::Ignored);
        }
        if self.rx_failed {
            warn!("Channel {}: receive side failed, ignoring PDU", self.handle());
            return Ok(RxStatus::Ignored);
        }

        let payload = match self.params.fcs {
            FcsOption::NotPresent => pdu.payload(),
            FcsOption::Present => match Self::strip_fcs(pdu) {
                Some(payload) => payload,
                None => {
                    warn!("Channel {}: FCS mismatch, dropping frame", self.handle());
                    return Ok(RxStatus::FcsMismatch);
                }
            },
        };

        let sdu = match self.rx_engine.process_pdu(payload) {
            Ok(Some(sdu)) => sdu,
            Ok(None) => return Ok(RxStatus::Incomplete),
            Err(e) => {
                self.rx_failed = true;
                return Err(e);
            }
        };

        if let Some(callback) = self.rx_callback.as_mut() {
            callback(sdu);
            return Ok(RxStatus::Delivered);
        }

        if self.inbound_sdus.len() >= self.params.max_rx_buffered {
            warn!(
                "Channel {}: {} SDUs already buffered, dropping SDU",
                self.handle(),
                self.inbound_sdus.len()
            );
            return Ok(RxStatus::Dropped);
        }
        self.inbound_sdus.push_back(sdu);
        Ok(RxStatus::Buffered)
    }

    // Verify the trailing FCS over header and payload; return the payload without it
    fn strip_fcs(pdu: &Pdu) -> Option<Vec<u8>> {
        let frame = pdu.frame_bytes();
        if frame.len() < L2CAP_BASIC_HEADER_SIZE + L2CAP_FCS_SIZE {
            return None;
        }

        let fcs_offset = frame.len() - L2CAP_FCS_SIZE;
        let received = FrameCheckSequence::from_le_bytes([frame[fcs_offset], frame[fcs_offset + 1]]);
        let computed = compute_frame_fcs(&frame[..fcs_offset]);
        if received != computed {
            return None;
        }

        Some(frame[L2CAP_BASIC_HEADER_SIZE..fcs_offset].to_vec())
    }

    /// The upper layer consumed one delivered SDU; returns credits owed to the peer
    pub fn acknowledge_read(&mut self) -> Option<u16> {
        self.rx_engine.acknowledge_read()
    }

    pub fn acl_priority(&self) -> AclPriority {
        self.acl_priority
    }

    /// Record a priority request. Returns false when no command is needed.
    pub fn begin_acl_priority_request(&mut self, priority: AclPriority) -> L2capResult<bool> {
        if self.state == ChannelState::Closed {
            return Err(L2capError::NotActive);
        }
        if self.requested_acl_priority.is_some() {
            return Err(L2capError::InProgress);
        }
        if self.acl_priority == priority {
            return Ok(false);
        }
        self.requested_acl_priority = Some(priority);
        Ok(true)
    }

    pub fn complete_acl_priority_request(&mut self, success: bool) {
        if let Some(priority) = self.requested_acl_priority.take() {
            if success {
                self.acl_priority = priority;
            }
        }
    }

    pub fn flush_timeout(&self) -> FlushTimeout {
        self.flush_timeout
    }

    /// Record a flush timeout request and return the value to send to the controller
    pub fn begin_flush_timeout_request(&mut self, flush_timeout: FlushTimeout) -> L2capResult<u16> {
        if self.state == ChannelState::Closed {
            return Err(L2capError::NotActive);
        }
        if self.link_type != LinkType::BrEdr {
            return Err(L2capError::NotSupported);
        }
        if self.requested_flush_timeout.is_some() {
            return Err(L2capError::InProgress);
        }
        let slots = flush_timeout.to_slots()?;
        self.requested_flush_timeout = Some(flush_timeout);
        Ok(slots)
    }

    pub fn complete_flush_timeout_request(&mut self, success: bool) {
        if let Some(flush_timeout) = self.requested_flush_timeout.take() {
            if success {
                self.flush_timeout = flush_timeout;
            }
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("handle", &self.handle())
            .field("remote_cid", &self.params.remote_cid)
            .field("mode", &self.params.mode)
            .field("state", &self.state)
            .field("queue_depth", &self.queue_depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hci::{BroadcastFlag, PacketBoundaryFlag};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const HANDLE: ConnectionHandle = 0x0001;

    fn basic_channel() -> Channel {
        let params = ChannelParameters::basic(0x0040, 0x0041, LinkType::BrEdr);
        Channel::new(params, LinkType::BrEdr, Fragmenter::new(HANDLE, 1024)).unwrap()
    }

    fn collector() -> (Arc<Mutex<Vec<Vec<u8>>>>, RxCallback) {
        let received = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
        let sink = received.clone();
        (received, Box::new(move |sdu: Vec<u8>| sink.lock().unwrap().push(sdu)))
    }

    fn inbound_pdu(cid: ChannelId, payload: &[u8]) -> Pdu {
        let mut frame = (payload.len() as u16).to_le_bytes().to_vec();
        frame.extend_from_slice(&cid.to_le_bytes());
        frame.extend_from_slice(payload);
        Pdu::new(AclDataPacket::new(
            HANDLE,
            PacketBoundaryFlag::FirstFlushable,
            BroadcastFlag::PointToPoint,
            frame,
        ))
    }

    #[test]
    fn send_requires_active_channel() {
        let mut channel = basic_channel();
        assert!(matches!(channel.send(vec![1]), Err(L2capError::NotActive)));

        let (_, callback) = collector();
        channel.activate(callback).unwrap();
        channel.send(vec![1]).unwrap();
        assert!(channel.has_outbound_fragment());

        channel.deactivate();
        assert!(matches!(channel.send(vec![1]), Err(L2capError::NotActive)));
        assert!(!channel.has_outbound_fragment());
    }

    #[test]
    fn activation_flushes_buffered_sdus() {
        let mut channel = basic_channel();
        assert_eq!(channel.handle_rx_pdu(&inbound_pdu(0x0040, &[1])).unwrap(), RxStatus::Buffered);
        assert_eq!(channel.handle_rx_pdu(&inbound_pdu(0x0040, &[2])).unwrap(), RxStatus::Buffered);

        let (received, callback) = collector();
        channel.activate(callback).unwrap();
        assert_eq!(*received.lock().unwrap(), vec![vec![1], vec![2]]);

        assert_eq!(channel.handle_rx_pdu(&inbound_pdu(0x0040, &[3])).unwrap(), RxStatus::Delivered);
        assert_eq!(received.lock().unwrap().len(), 3);
    }

    #[test]
    fn activates_only_once() {
        let mut channel = basic_channel();
        let (_, callback) = collector();
        channel.activate(callback).unwrap();
        let (_, callback) = collector();
        assert!(matches!(channel.activate(callback), Err(L2capError::InvalidState)));

        channel.deactivate();
        channel.deactivate();
        assert_eq!(channel.state(), ChannelState::Closed);
        let (_, callback) = collector();
        assert!(channel.activate(callback).is_err());
    }

    #[test]
    fn closed_channel_ignores_inbound() {
        let mut channel = basic_channel();
        channel.deactivate();
        assert_eq!(channel.handle_rx_pdu(&inbound_pdu(0x0040, &[1])).unwrap(), RxStatus::Ignored);
    }

    #[test]
    fn mtu_and_queue_limits() {
        let mut params = ChannelParameters::basic(0x0040, 0x0041, LinkType::BrEdr);
        params.tx_mtu = 4;
        params.max_tx_queued = 2;
        let mut channel = Channel::new(params, LinkType::BrEdr, Fragmenter::new(HANDLE, 1024)).unwrap();
        let (_, callback) = collector();
        channel.activate(callback).unwrap();

        assert!(matches!(channel.send(vec![0; 5]), Err(L2capError::MtuExceeded)));
        channel.send(vec![0; 4]).unwrap();
        channel.send(vec![0; 4]).unwrap();
        assert!(matches!(channel.send(vec![0; 4]), Err(L2capError::QueueFull(2))));

        // Draining one PDU makes room again
        assert!(channel.next_outbound_fragment().is_some());
        assert!(channel.send(vec![0; 4]).is_ok());
    }

    #[test]
    fn fragments_of_a_pdu_are_contiguous() {
        let params = ChannelParameters::basic(0x0040, 0x0041, LinkType::BrEdr);
        let mut channel = Channel::new(params, LinkType::BrEdr, Fragmenter::new(HANDLE, 8)).unwrap();
        let (_, callback) = collector();
        channel.activate(callback).unwrap();
        channel.send(vec![0xAA; 10]).unwrap();
        channel.send(vec![0xBB; 2]).unwrap();

        let first = channel.next_outbound_fragment().unwrap();
        assert!(first.packet_boundary_flag().is_first());
        assert!(channel.is_mid_pdu());
        let second = channel.next_outbound_fragment().unwrap();
        assert_eq!(second.packet_boundary_flag(), PacketBoundaryFlag::ContinuingFragment);
        assert!(!channel.is_mid_pdu());

        let third = channel.next_outbound_fragment().unwrap();
        assert!(third.packet_boundary_flag().is_first());
        assert_eq!(&third.payload()[2..4], &0x0041u16.to_le_bytes());
        assert!(channel.next_outbound_fragment().is_none());
    }

    #[test]
    fn fcs_is_verified_and_stripped() {
        let mut params = ChannelParameters::basic(0x0040, 0x0040, LinkType::BrEdr);
        params.fcs = FcsOption::Present;
        let mut sender = Channel::new(params, LinkType::BrEdr, Fragmenter::new(HANDLE, 1024)).unwrap();
        let mut receiver = Channel::new(params, LinkType::BrEdr, Fragmenter::new(HANDLE, 1024)).unwrap();
        let (_, callback) = collector();
        sender.activate(callback).unwrap();
        let (received, callback) = collector();
        receiver.activate(callback).unwrap();

        sender.send(vec![1, 2, 3]).unwrap();
        let fragment = sender.next_outbound_fragment().unwrap();
        let pdu = Pdu::new(fragment.clone());
        assert_eq!(receiver.handle_rx_pdu(&pdu).unwrap(), RxStatus::Delivered);
        assert_eq!(*received.lock().unwrap(), vec![vec![1, 2, 3]]);

        let mut corrupted = fragment.payload().to_vec();
        corrupted[5] ^= 0xFF;
        let corrupted = Pdu::new(AclDataPacket::new(
            HANDLE,
            PacketBoundaryFlag::FirstFlushable,
            BroadcastFlag::PointToPoint,
            corrupted,
        ));
        assert_eq!(receiver.handle_rx_pdu(&corrupted).unwrap(), RxStatus::FcsMismatch);
    }

    #[test]
    fn credit_based_channel_waits_for_credits() {
        let rx = CreditBasedConfig {
            mtu: 100,
            mps: 23,
            initial_credits: 10,
        };
        let tx = CreditBasedConfig {
            mtu: 100,
            mps: 23,
            initial_credits: 1,
        };
        let params = ChannelParameters::credit_based(0x0040, 0x0041, rx, tx);
        let mut channel = Channel::new(params, LinkType::Le, Fragmenter::new(HANDLE, 27)).unwrap();
        let (_, callback) = collector();
        channel.activate(callback).unwrap();

        channel.send(vec![0; 30]).unwrap();
        assert!(channel.next_outbound_fragment().is_some());
        assert!(channel.next_outbound_fragment().is_none());
        assert_eq!(channel.queue_depth(), 1);

        channel.add_tx_credits(1).unwrap();
        assert!(channel.next_outbound_fragment().is_some());
        assert_eq!(channel.queue_depth(), 0);
    }

    #[test]
    fn inbound_buffer_is_bounded_before_activation() {
        let mut params = ChannelParameters::basic(0x0040, 0x0041, LinkType::BrEdr);
        params.max_rx_buffered = 2;
        let mut channel = Channel::new(params, LinkType::BrEdr, Fragmenter::new(HANDLE, 1024)).unwrap();

        assert_eq!(channel.handle_rx_pdu(&inbound_pdu(0x0040, &[1])).unwrap(), RxStatus::Buffered);
        assert_eq!(channel.handle_rx_pdu(&inbound_pdu(0x0040, &[2])).unwrap(), RxStatus::Buffered);
        assert_eq!(channel.handle_rx_pdu(&inbound_pdu(0x0040, &[3])).unwrap(), RxStatus::Dropped);

        let (received, callback) = collector();
        channel.activate(callback).unwrap();
        assert_eq!(*received.lock().unwrap(), vec![vec![1], vec![2]]);
    }

    #[test]
    fn flow_control_violation_is_reported_once() {
        let config = CreditBasedConfig {
            mtu: 100,
            mps: 50,
            initial_credits: 1,
        };
        let params = ChannelParameters::credit_based(0x0040, 0x0041, config, config);
        let mut channel = Channel::new(params, LinkType::Le, Fragmenter::new(HANDLE, 27)).unwrap();
        let (received, callback) = collector();
        channel.activate(callback).unwrap();

        assert_eq!(channel.handle_rx_pdu(&inbound_pdu(0x0040, &[1, 0, 7])).unwrap(), RxStatus::Delivered);
        assert!(matches!(
            channel.handle_rx_pdu(&inbound_pdu(0x0040, &[1, 0, 8])),
            Err(L2capError::FlowControlViolation(_))
        ));
        assert!(channel.rx_failed());

        // Even once credits are back, nothing more is accepted
        assert_eq!(channel.acknowledge_read(), Some(1));
        assert_eq!(channel.handle_rx_pdu(&inbound_pdu(0x0040, &[1, 0, 9])).unwrap(), RxStatus::Ignored);
        assert_eq!(*received.lock().unwrap(), vec![vec![7]]);
    }

    #[test]
    fn returned_fragment_goes_out_first() {
        let params = ChannelParameters::basic(0x0040, 0x0041, LinkType::BrEdr);
        let mut channel = Channel::new(params, LinkType::BrEdr, Fragmenter::new(HANDLE, 8)).unwrap();
        let (_, callback) = collector();
        channel.activate(callback).unwrap();
        channel.send(vec![0xAA; 10]).unwrap();

        let first = channel.next_outbound_fragment().unwrap();
        channel.return_fragment(first.clone());
        assert!(channel.is_mid_pdu());
        assert_eq!(channel.next_outbound_fragment(), Some(first));
        let second = channel.next_outbound_fragment().unwrap();
        assert_eq!(second.packet_boundary_flag(), PacketBoundaryFlag::ContinuingFragment);

        channel.deactivate();
        channel.return_fragment(second);
        assert!(!channel.has_outbound_fragment());
    }

    #[test]
    fn flush_timeout_requests() {
        let mut channel = basic_channel();
        let slots = channel
            .begin_flush_timeout_request(FlushTimeout::After(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(slots, 16);
        assert!(matches!(
            channel.begin_flush_timeout_request(FlushTimeout::Infinite),
            Err(L2capError::InProgress)
        ));
        channel.complete_flush_timeout_request(true);
        assert_eq!(channel.flush_timeout(), FlushTimeout::After(Duration::from_millis(10)));

        assert!(matches!(
            channel.begin_flush_timeout_request(FlushTimeout::After(Duration::from_secs(2))),
            Err(L2capError::InvalidParameter(_))
        ));
    }

    #[test]
    fn acl_priority_requests() {
        let mut channel = basic_channel();
        assert!(!channel.begin_acl_priority_request(AclPriority::Normal).unwrap());
        assert!(channel.begin_acl_priority_request(AclPriority::Sink).unwrap());
        assert!(matches!(
            channel.begin_acl_priority_request(AclPriority::Source),
            Err(L2capError::InProgress)
        ));
        channel.complete_acl_priority_request(false);
        assert_eq!(channel.acl_priority(), AclPriority::Normal);
        assert!(channel.begin_acl_priority_request(AclPriority::Sink).unwrap());
        channel.complete_acl_priority_request(true);
        assert_eq!(channel.acl_priority(), AclPriority::Sink);
    }
}
