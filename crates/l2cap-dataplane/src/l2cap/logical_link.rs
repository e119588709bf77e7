//! One ACL-U or LE-U logical link
//!
//! The link multiplexes its channels onto the connection handle. Inbound
//! fragments are recombined and routed by channel id; outbound fragments are
//! pulled by the ACL data channel one at a time, with a channel's PDU always
//! sent to completion before another channel gets a turn.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

use log::{debug, trace, warn};

use super::a2dp_offload::A2dpOffloadManager;
use super::channel::{Channel, RxStatus};
use super::constants::*;
use super::fragmenter::Fragmenter;
use super::pdu::Pdu;
use super::recombiner::Recombiner;
use super::signaling::{FlowControlCreditInd, SignalId};
use super::types::*;
use crate::hci::{AclDataPacket, ConnectionHandle, ConnectionInterface, LinkType};

/// Where the last outbound fragment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FragmentSource {
    Signaling,
    Channel(ChannelId),
}

pub struct LogicalLink {
    handle: ConnectionHandle,
    link_type: LinkType,
    recombiner: Recombiner,
    fragmenter: Fragmenter,
    channels: BTreeMap<ChannelId, Channel>,
    /// Channel whose PDU is partially sent
    locked_cid: Option<ChannelId>,
    last_served_cid: Option<ChannelId>,
    last_source: Option<FragmentSource>,
    /// Fragments of signaling frames originated by the data path
    signaling_fragments: VecDeque<AclDataPacket>,
    next_signal_id: SignalId,
    offload: A2dpOffloadManager,
    stats: LinkStats,
}

impl LogicalLink {
    pub fn new(handle: ConnectionHandle, link_type: LinkType, max_acl_payload_size: usize) -> Self {
        Self {
            handle,
            link_type,
            recombiner: Recombiner::new(handle),
            fragmenter: Fragmenter::new(handle, max_acl_payload_size),
            channels: BTreeMap::new(),
            locked_cid: None,
            last_served_cid: None,
            last_source: None,
            signaling_fragments: VecDeque::new(),
            next_signal_id: 1,
            offload: A2dpOffloadManager::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn offload(&self) -> &A2dpOffloadManager {
        &self.offload
    }

    pub fn offload_mut(&mut self) -> &mut A2dpOffloadManager {
        &mut self.offload
    }

    /// The fixed signaling channel of this link type
    pub fn signaling_cid(&self) -> ChannelId {
        match self.link_type {
            LinkType::BrEdr => L2CAP_SIGNALING_CID,
            LinkType::Le => L2CAP_LE_SIGNALING_CID,
        }
    }

    pub fn open_channel(&mut self, params: ChannelParameters) -> L2capResult<ChannelHandle> {
        if self.channels.contains_key(&params.local_cid) {
            return Err(L2capError::InvalidParameter(format!(
                "CID 0x{:04X} already in use on 0x{:04X}",
                params.local_cid, self.handle
            )));
        }

        let channel = Channel::new(params, self.link_type, self.fragmenter.clone())?;
        let handle = channel.handle();
        debug!("Opened channel {} ({:?})", handle, params.mode);
        self.channels.insert(params.local_cid, channel);
        Ok(handle)
    }

    pub fn channel(&self, local_cid: ChannelId) -> Option<&Channel> {
        self.channels.get(&local_cid)
    }

    pub fn channel_mut(&mut self, local_cid: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&local_cid)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deactivate and drop a channel
    pub fn remove_channel(&mut self, local_cid: ChannelId) -> Option<Channel> {
        let mut channel = self.channels.remove(&local_cid)?;
        channel.deactivate();
        if self.locked_cid == Some(local_cid) {
            warn!(
                "Channel {} removed with a partially sent PDU",
                channel.handle()
            );
            self.locked_cid = None;
        }
        self.offload.channel_closed(local_cid);
        Some(channel)
    }

    /// Close every channel, e.g. when the link goes down
    pub fn close_all(&mut self) -> Vec<ChannelHandle> {
        let cids: Vec<ChannelId> = self.channels.keys().copied().collect();
        let closed = cids
            .into_iter()
            .filter_map(|cid| self.remove_channel(cid))
            .map(|channel| channel.handle())
            .collect();
        self.recombiner.clear();
        self.signaling_fragments.clear();
        closed
    }

    /// Process one inbound fragment
    ///
    /// An error is a flow control violation by the peer; the caller should
    /// request disconnection of the link.
    pub fn handle_fragment(&mut self, fragment: AclDataPacket) -> L2capResult<()> {
        self.stats.fragments_received += 1;
        trace!("Received {:?}", fragment);

        let result = self.recombiner.consume_fragment(fragment);
        if result.frames_dropped {
            self.stats.frames_dropped += 1;
        }
        match result.pdu {
            Some(pdu) => self.route_pdu(pdu),
            None => Ok(()),
        }
    }

    fn route_pdu(&mut self, pdu: Pdu) -> L2capResult<()> {
        let Some(cid) = pdu.channel_id() else {
            self.stats.frames_dropped += 1;
            return Ok(());
        };

        if cid == self.signaling_cid() && !self.channels.contains_key(&cid) {
            return self.handle_signaling_pdu(&pdu);
        }

        let Some(channel) = self.channels.get_mut(&cid) else {
            warn!("0x{:04X}: dropping PDU for unknown CID 0x{:04X}", self.handle, cid);
            self.stats.frames_dropped += 1;
            return Ok(());
        };

        let mut released_credits = None;
        match channel.handle_rx_pdu(&pdu)? {
            RxStatus::Delivered | RxStatus::Buffered => self.stats.sdus_delivered += 1,
            RxStatus::FcsMismatch => {
                self.stats.fcs_failures += 1;
                self.stats.frames_dropped += 1;
            }
            // Nobody will read a dropped SDU, so its credits go back now
            RxStatus::Dropped => {
                self.stats.frames_dropped += 1;
                released_credits = channel.acknowledge_read();
            }
            RxStatus::Ignored => self.stats.frames_dropped += 1,
            RxStatus::Incomplete => {}
        }
        if let Some(credits) = released_credits {
            self.send_credits(cid, credits);
        }
        Ok(())
    }

    // Credit indications are the only signaling command the data path consumes
    fn handle_signaling_pdu(&mut self, pdu: &Pdu) -> L2capResult<()> {
        let payload = pdu.payload();
        if payload.first() != Some(&L2CAP_FLOW_CONTROL_CREDIT_IND) {
            trace!("0x{:04X}: ignoring signaling command {}", self.handle, hex::encode(&payload));
            return Ok(());
        }

        let indication = match FlowControlCreditInd::parse(&payload) {
            Ok(indication) => indication,
            Err(e) => {
                warn!("0x{:04X}: malformed credit indication: {}", self.handle, e);
                self.stats.frames_dropped += 1;
                return Ok(());
            }
        };

        // The indication names the peer's CID, i.e. our remote CID
        let Some(channel) = self
            .channels
            .values_mut()
            .find(|channel| channel.remote_cid() == indication.cid)
        else {
            warn!(
                "0x{:04X}: credits for unknown remote CID 0x{:04X}",
                self.handle, indication.cid
            );
            return Ok(());
        };
        if channel.mode() != ChannelMode::CreditBasedFlowControl {
            warn!("0x{:04X}: credits for basic mode channel {}", self.handle, channel.handle());
            return Ok(());
        }

        channel.add_tx_credits(indication.credits)
    }

    /// Queue a credit indication returning `credits` to the peer
    pub fn send_credits(&mut self, local_cid: ChannelId, credits: u16) {
        let identifier = self.next_signal_id;
        self.next_signal_id = self.next_signal_id.checked_add(1).unwrap_or(1);

        let indication = FlowControlCreditInd::new(identifier, local_cid, credits);
        debug!(
            "0x{:04X}: returning {} credits on CID 0x{:04X}",
            self.handle, credits, local_cid
        );
        let pdu = self.fragmenter.build_frame(
            self.signaling_cid(),
            &indication.serialize(),
            FcsOption::NotPresent,
            false,
        );
        self.signaling_fragments.extend(pdu.into_fragments());
    }

    fn next_channel_with_data(&self) -> Option<ChannelId> {
        let after = match self.last_served_cid {
            Some(cid) => Bound::Excluded(cid),
            None => Bound::Unbounded,
        };
        self.channels
            .range((after, Bound::Unbounded))
            .chain(self.channels.range(..))
            .find(|(_, channel)| channel.has_outbound_fragment())
            .map(|(cid, _)| *cid)
    }
}

impl ConnectionInterface for LogicalLink {
    fn has_available_packet(&self) -> bool {
        !self.signaling_fragments.is_empty()
            || self.channels.values().any(Channel::has_outbound_fragment)
    }

    fn next_outbound_packet(&mut self) -> Option<AclDataPacket> {
        let cid = match self.locked_cid {
            Some(cid) => cid,
            None => {
                if let Some(fragment) = self.signaling_fragments.pop_front() {
                    self.stats.fragments_sent += 1;
                    self.last_source = Some(FragmentSource::Signaling);
                    return Some(fragment);
                }
                self.next_channel_with_data()?
            }
        };

        let channel = self.channels.get_mut(&cid)?;
        let fragment = channel.next_outbound_fragment()?;
        self.locked_cid = channel.is_mid_pdu().then_some(cid);
        self.last_served_cid = Some(cid);
        self.last_source = Some(FragmentSource::Channel(cid));
        self.stats.fragments_sent += 1;
        Some(fragment)
    }

    fn return_packet(&mut self, packet: AclDataPacket) {
        let Some(source) = self.last_source.take() else {
            warn!("0x{:04X}: no fragment outstanding, dropping {:?}", self.handle, packet);
            return;
        };
        self.stats.fragments_sent = self.stats.fragments_sent.saturating_sub(1);

        match source {
            FragmentSource::Signaling => self.signaling_fragments.push_front(packet),
            FragmentSource::Channel(cid) => match self.channels.get_mut(&cid) {
                Some(channel) => {
                    channel.return_fragment(packet);
                    if channel.is_mid_pdu() {
                        self.locked_cid = Some(cid);
                    }
                }
                None => trace!("0x{:04X}: CID 0x{:04X} gone, dropping returned fragment", self.handle, cid),
            },
        }
    }
}
