//! L2CAP Core Manager implementation
//!
//! This module provides the channel manager that composes the data plane:
//! - Link registration with the ACL data channel
//! - Channel lifecycle and data routing
//! - Credit return and inbound credit handling
//! - Controller requests (ACL priority, flush timeout, A2DP offload)
//!
//! Completions are not delivered through stored callbacks. They are queued
//! as [`L2capEvent`]s and drained with [`ChannelManager::poll_event`].

use std::collections::{HashMap, VecDeque};

use log::{debug, info, trace, warn};

use super::channel::{Channel, RxCallback};
use super::logical_link::LogicalLink;
use super::types::*;
use crate::error::HciError;
use crate::hci::constants::*;
use crate::hci::{
    A2dpOffloadConfig, AclDataChannel, AclDataChannelConfig, AclDataPacket, AclPriority, AclTransport,
    CommandChannel, ConnectionHandle, ControllerFeatures, HciCommand, HciEvent, LinkType, OffloadChannel,
};

/// Notifications for the layers above the data plane
#[derive(Debug)]
pub enum L2capEvent {
    /// The channel was closed because its link went away
    ChannelClosed(ChannelHandle),
    /// A protocol violation requires the link to be disconnected
    LinkErrorRequested { link: ConnectionHandle },
    AclPriorityResult {
        channel: ChannelHandle,
        priority: AclPriority,
        result: L2capResult<()>,
    },
    FlushTimeoutResult {
        channel: ChannelHandle,
        flush_timeout: FlushTimeout,
        result: L2capResult<()>,
    },
    A2dpOffloadResult {
        channel: ChannelHandle,
        /// True for a start request, false for a stop request
        start: bool,
        result: L2capResult<()>,
    },
}

#[derive(Debug, Clone, Copy)]
enum PendingCommandKind {
    AclPriority(AclPriority),
    FlushTimeout(FlushTimeout),
    A2dpOffloadStart,
    A2dpOffloadStop,
}

/// A command sent to the controller whose completion has not arrived yet
#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    opcode: u16,
    channel: ChannelHandle,
    kind: PendingCommandKind,
}

fn command_error(error: HciError) -> L2capError {
    match error {
        HciError::Unsupported => L2capError::NotSupported,
        HciError::UnknownConnection(handle) => L2capError::LinkNotFound(handle),
        other => L2capError::HciError(other),
    }
}

/// Owner of the ACL data channel, the logical links and their channels
pub struct ChannelManager {
    acl: AclDataChannel,
    links: HashMap<ConnectionHandle, LogicalLink>,
    pending_commands: VecDeque<PendingCommand>,
    events: VecDeque<L2capEvent>,
}

impl ChannelManager {
    /// Create a new channel manager over the given controller interfaces
    pub fn new(
        config: AclDataChannelConfig,
        transport: Box<dyn AclTransport>,
        commands: Box<dyn CommandChannel>,
    ) -> L2capResult<Self> {
        let acl = AclDataChannel::new(config, transport, commands)?;
        Ok(Self {
            acl,
            links: HashMap::new(),
            pending_commands: VecDeque::new(),
            events: VecDeque::new(),
        })
    }

    pub fn acl_data_channel(&self) -> &AclDataChannel {
        &self.acl
    }

    pub fn acl_data_channel_mut(&mut self) -> &mut AclDataChannel {
        &mut self.acl
    }

    /// Next pending notification, if any
    pub fn poll_event(&mut self) -> Option<L2capEvent> {
        self.events.pop_front()
    }

    pub fn link_stats(&self, handle: ConnectionHandle) -> Option<LinkStats> {
        self.links.get(&handle).map(LogicalLink::stats)
    }

    pub fn link(&self, handle: ConnectionHandle) -> Option<&LogicalLink> {
        self.links.get(&handle)
    }

    /// Start carrying data for a newly connected link
    pub fn register_link(&mut self, handle: ConnectionHandle, link_type: LinkType) -> L2capResult<()> {
        self.acl.register_connection(handle, link_type)?;

        let max_payload = self.acl.max_payload_size(link_type);
        info!(
            "Link 0x{:04X} ({:?}) registered, {} octet fragments",
            handle, link_type, max_payload
        );
        self.links
            .insert(handle, LogicalLink::new(handle, link_type, max_payload));
        Ok(())
    }

    /// Tear down a link and close its channels. Idempotent.
    ///
    /// Buffer slots held by the link stay reserved until the controller
    /// completes them or [`clear_controller_packet_count`](Self::clear_controller_packet_count)
    /// is called.
    pub fn unregister_link(&mut self, handle: ConnectionHandle) {
        self.acl.unregister_connection(handle);

        let Some(mut link) = self.links.remove(&handle) else {
            return;
        };

        info!("Link 0x{:04X} unregistered", handle);
        for channel in link.close_all() {
            self.events.push_back(L2capEvent::ChannelClosed(channel));
        }
    }

    /// Release the buffer slots of a link that is gone controller side
    ///
    /// Returns the number of fragments this unblocked.
    pub fn clear_controller_packet_count(&mut self, handle: ConnectionHandle) -> usize {
        self.acl.clear_controller_packet_count_and_send(handle, &mut self.links)
    }

    /// Create an inactive channel on a registered link
    pub fn open_channel(&mut self, link: ConnectionHandle, params: ChannelParameters) -> L2capResult<ChannelHandle> {
        self.links
            .get_mut(&link)
            .ok_or(L2capError::LinkNotFound(link))?
            .open_channel(params)
    }

    pub fn channel(&self, handle: ChannelHandle) -> Option<&Channel> {
        self.links.get(&handle.link)?.channel(handle.local_cid)
    }

    pub fn channel_mut(&mut self, handle: ChannelHandle) -> Option<&mut Channel> {
        self.links.get_mut(&handle.link)?.channel_mut(handle.local_cid)
    }

    fn existing_channel(&mut self, handle: ChannelHandle) -> L2capResult<&mut Channel> {
        self.channel_mut(handle).ok_or(L2capError::ChannelNotFound)
    }

    /// Install the rx callback; SDUs received so far are delivered before this returns
    pub fn activate(&mut self, handle: ChannelHandle, callback: RxCallback) -> L2capResult<()> {
        self.existing_channel(handle)?.activate(callback)
    }

    /// Close and release a channel. Calling this again has no effect.
    pub fn deactivate(&mut self, handle: ChannelHandle) {
        let Some(link) = self.links.get_mut(&handle.link) else {
            trace!("Deactivate {}: link already gone", handle);
            return;
        };
        if link.remove_channel(handle.local_cid).is_none() {
            trace!("Deactivate {}: channel already gone", handle);
        }
    }

    /// Queue an SDU and schedule whatever the controller can take now
    pub fn send(&mut self, handle: ChannelHandle, sdu: Vec<u8>) -> L2capResult<()> {
        self.existing_channel(handle)?.send(sdu)?;
        self.try_send();
        Ok(())
    }

    /// Report that the upper layer consumed an SDU from `handle`
    ///
    /// For credit-based channels this returns the SDU's credits to the peer.
    pub fn acknowledge_read(&mut self, handle: ChannelHandle) -> L2capResult<()> {
        let link = self
            .links
            .get_mut(&handle.link)
            .ok_or(L2capError::ChannelNotFound)?;
        let channel = link
            .channel_mut(handle.local_cid)
            .ok_or(L2capError::ChannelNotFound)?;

        if let Some(credits) = channel.acknowledge_read() {
            link.send_credits(handle.local_cid, credits);
            self.try_send();
        }
        Ok(())
    }

    /// Credits the peer granted outside of an inbound credit indication
    pub fn add_tx_credits(&mut self, handle: ChannelHandle, credits: u16) -> L2capResult<()> {
        let result = self.existing_channel(handle)?.add_tx_credits(credits);
        if let Err(L2capError::FlowControlViolation(_)) = &result {
            self.events
                .push_back(L2capEvent::LinkErrorRequested { link: handle.link });
        }
        result?;
        self.try_send();
        Ok(())
    }

    /// Ask for the link under `handle` to be disconnected
    ///
    /// The channel itself stays open until the link is unregistered.
    pub fn signal_link_error(&mut self, handle: ChannelHandle) -> L2capResult<()> {
        let channel = self.existing_channel(handle)?;
        if channel.state() == ChannelState::Closed {
            return Err(L2capError::NotActive);
        }
        warn!("Link error signaled by channel {}", handle);
        self.events
            .push_back(L2capEvent::LinkErrorRequested { link: handle.link });
        Ok(())
    }

    /// Run the ACL scheduler; returns the number of fragments sent
    pub fn try_send(&mut self) -> usize {
        self.acl.try_send_next_packets(&mut self.links)
    }

    /// Feed one inbound ACL fragment
    pub fn handle_acl_data(&mut self, packet: AclDataPacket) -> L2capResult<()> {
        let handle = packet.handle();
        let Some(link) = self.links.get_mut(&handle) else {
            warn!("ACL data for unknown link 0x{:04X}", handle);
            return Err(L2capError::LinkNotFound(handle));
        };

        if let Err(e) = link.handle_fragment(packet) {
            warn!("Link 0x{:04X}: {}", handle, e);
            self.events.push_back(L2capEvent::LinkErrorRequested { link: handle });
        }

        // Inbound credits may have unblocked queued SDUs
        self.try_send();
        Ok(())
    }

    /// Feed one raw inbound ACL packet (without the H4 packet type)
    pub fn handle_acl_bytes(&mut self, data: &[u8]) -> L2capResult<()> {
        let packet = AclDataPacket::parse(data)?;
        self.handle_acl_data(packet)
    }

    /// Feed an HCI event. Events the data plane does not use are ignored.
    pub fn handle_event(&mut self, event: &HciEvent) -> L2capResult<()> {
        match event.event_code {
            EVT_NUM_COMPLETED_PACKETS => {
                if let Err(e) = self.acl.on_number_of_completed_packets(event, &mut self.links) {
                    warn!("Ignoring malformed Number Of Completed Packets event: {}", e);
                }
            }
            EVT_CMD_COMPLETE => {
                if let Some(opcode) = event.command_complete_opcode() {
                    self.complete_command(opcode, event.get_status());
                }
            }
            EVT_CMD_STATUS => {
                // A successful status is followed by a Command Complete
                let status = event.get_status();
                if let Some(opcode) = event.command_status_opcode() {
                    if status != HCI_SUCCESS {
                        self.complete_command(opcode, status);
                    }
                }
            }
            EVT_DISCONN_COMPLETE => {
                if event.parameters.len() >= 3 && event.parameters[0] == HCI_SUCCESS {
                    let handle =
                        u16::from_le_bytes([event.parameters[1], event.parameters[2]]) & HCI_ACL_HANDLE_MASK;
                    self.unregister_link(handle);
                }
            }
            other => trace!("Ignoring HCI event 0x{:02X}", other),
        }
        Ok(())
    }

    fn complete_command(&mut self, opcode: u16, status: u8) {
        let Some(index) = self
            .pending_commands
            .iter()
            .position(|pending| pending.opcode == opcode)
        else {
            trace!("No pending command for opcode 0x{:04X}", opcode);
            return;
        };
        let Some(pending) = self.pending_commands.remove(index) else {
            return;
        };

        let success = status == HCI_SUCCESS;
        let result = if success {
            Ok(())
        } else {
            warn!(
                "Command 0x{:04X} for {} failed with status 0x{:02X}",
                opcode, pending.channel, status
            );
            Err(L2capError::CommandFailed(status))
        };

        let channel = pending.channel;
        let event = match pending.kind {
            PendingCommandKind::AclPriority(priority) => {
                if let Some(ch) = self.channel_mut(channel) {
                    ch.complete_acl_priority_request(success);
                }
                L2capEvent::AclPriorityResult {
                    channel,
                    priority,
                    result,
                }
            }
            PendingCommandKind::FlushTimeout(flush_timeout) => {
                if let Some(ch) = self.channel_mut(channel) {
                    ch.complete_flush_timeout_request(success);
                }
                L2capEvent::FlushTimeoutResult {
                    channel,
                    flush_timeout,
                    result,
                }
            }
            PendingCommandKind::A2dpOffloadStart => {
                if let Some(link) = self.links.get_mut(&channel.link) {
                    link.offload_mut().on_start_complete(success);
                }
                L2capEvent::A2dpOffloadResult {
                    channel,
                    start: true,
                    result,
                }
            }
            PendingCommandKind::A2dpOffloadStop => {
                if let Some(link) = self.links.get_mut(&channel.link) {
                    link.offload_mut().on_stop_complete(success);
                }
                L2capEvent::A2dpOffloadResult {
                    channel,
                    start: false,
                    result,
                }
            }
        };

        if self.channel(channel).is_none() {
            debug!("Dropping completion for closed channel {}", channel);
            return;
        }
        self.events.push_back(event);
    }

    fn track_command(&mut self, opcode: u16, channel: ChannelHandle, kind: PendingCommandKind) {
        debug!("Command 0x{:04X} pending for {} ({:?})", opcode, channel, kind);
        self.pending_commands.push_back(PendingCommand {
            opcode,
            channel,
            kind,
        });
    }

    /// Change the controller scheduling priority of the channel's link
    ///
    /// The outcome arrives as [`L2capEvent::AclPriorityResult`].
    pub fn request_acl_priority(&mut self, handle: ChannelHandle, priority: AclPriority) -> L2capResult<()> {
        if !self.existing_channel(handle)?.begin_acl_priority_request(priority)? {
            self.events.push_back(L2capEvent::AclPriorityResult {
                channel: handle,
                priority,
                result: Ok(()),
            });
            return Ok(());
        }

        match self.acl.request_acl_priority(priority, handle.link) {
            Ok(opcode) => {
                self.track_command(opcode, handle, PendingCommandKind::AclPriority(priority));
                Ok(())
            }
            Err(e) => {
                if let Some(channel) = self.channel_mut(handle) {
                    channel.complete_acl_priority_request(false);
                }
                Err(command_error(e))
            }
        }
    }

    /// Set the automatic flush timeout of the channel's BR/EDR link
    ///
    /// The outcome arrives as [`L2capEvent::FlushTimeoutResult`].
    pub fn set_bredr_automatic_flush_timeout(
        &mut self,
        handle: ChannelHandle,
        flush_timeout: FlushTimeout,
    ) -> L2capResult<()> {
        let supported = self
            .acl
            .features()
            .contains(ControllerFeatures::AUTOMATIC_FLUSH_TIMEOUT);
        let channel = self.existing_channel(handle)?;
        if !supported {
            return Err(L2capError::NotSupported);
        }

        let slots = channel.begin_flush_timeout_request(flush_timeout)?;
        let command = HciCommand::write_automatic_flush_timeout(handle.link, slots);
        match self.acl.send_command(command) {
            Ok(opcode) => {
                self.track_command(opcode, handle, PendingCommandKind::FlushTimeout(flush_timeout));
                Ok(())
            }
            Err(e) => {
                if let Some(channel) = self.channel_mut(handle) {
                    channel.complete_flush_timeout_request(false);
                }
                Err(command_error(e))
            }
        }
    }

    fn offload_channel(&mut self, handle: ChannelHandle) -> L2capResult<OffloadChannel> {
        let channel = self.existing_channel(handle)?;
        if !channel.is_active() {
            return Err(L2capError::NotActive);
        }
        Ok(OffloadChannel {
            handle: handle.link,
            local_cid: channel.local_cid(),
            remote_cid: channel.remote_cid(),
            remote_mtu: channel.tx_mtu(),
        })
    }

    /// Offload the channel's media stream to the controller
    ///
    /// Fails right away if an offload on the link is started or pending. The
    /// outcome arrives as [`L2capEvent::A2dpOffloadResult`].
    pub fn start_a2dp_offload(&mut self, handle: ChannelHandle, config: &A2dpOffloadConfig) -> L2capResult<()> {
        let offload_channel = self.offload_channel(handle)?;
        if !self.acl.features().contains(ControllerFeatures::A2DP_OFFLOAD) {
            return Err(L2capError::NotSupported);
        }

        let link = self
            .links
            .get_mut(&handle.link)
            .ok_or(L2capError::LinkNotFound(handle.link))?;
        link.offload_mut().begin_start(handle.local_cid)?;

        let command = self
            .acl
            .vendor_encoder()
            .and_then(|vendor| vendor.encode_a2dp_offload_start(offload_channel, config));
        let result = match command {
            Some(command) => self.acl.send_command(command).map_err(command_error),
            None => Err(L2capError::NotSupported),
        };

        match result {
            Ok(opcode) => {
                self.track_command(opcode, handle, PendingCommandKind::A2dpOffloadStart);
                Ok(())
            }
            Err(e) => {
                if let Some(link) = self.links.get_mut(&handle.link) {
                    link.offload_mut().abort();
                }
                Err(e)
            }
        }
    }

    /// Stop offloading the channel's media stream
    ///
    /// Stopping a channel that is not offloaded succeeds immediately.
    pub fn stop_a2dp_offload(&mut self, handle: ChannelHandle) -> L2capResult<()> {
        let offload_channel = self.offload_channel(handle)?;
        let link = self
            .links
            .get_mut(&handle.link)
            .ok_or(L2capError::LinkNotFound(handle.link))?;

        if !link.offload_mut().begin_stop(handle.local_cid)? {
            self.events.push_back(L2capEvent::A2dpOffloadResult {
                channel: handle,
                start: false,
                result: Ok(()),
            });
            return Ok(());
        }

        let command = self
            .acl
            .vendor_encoder()
            .and_then(|vendor| vendor.encode_a2dp_offload_stop(offload_channel));
        let result = match command {
            Some(command) => self.acl.send_command(command).map_err(command_error),
            None => Err(L2capError::NotSupported),
        };

        match result {
            Ok(opcode) => {
                self.track_command(opcode, handle, PendingCommandKind::A2dpOffloadStop);
                Ok(())
            }
            Err(e) => {
                if let Some(link) = self.links.get_mut(&handle.link) {
                    link.offload_mut().abort();
                }
                Err(e)
            }
        }
    }
}
