//! ACL data channel: the arbiter of the controller's packet buffers
//!
//! The controller advertises a fixed number of ACL buffer slots for BR/EDR
//! and (optionally) a separate pool for LE. Every fragment handed to the
//! transport occupies one slot until a Number Of Completed Packets event
//! returns it. This module tracks those slots per connection handle and
//! drains registered connections round-robin while slots are free.

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::error::HciError;
use crate::hci::constants::EVT_NUM_COMPLETED_PACKETS;
use crate::hci::packet::{AclDataPacket, ConnectionHandle, HciCommand, HciEvent};
use crate::hci::transport::{
    AclPriority, AclTransport, CommandChannel, ControllerFeatures, RejectedPacket, VendorCommandEncoder,
};

/// Type of the logical link a connection handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    /// Classic Bluetooth connection (ACL-U)
    BrEdr,
    /// Bluetooth Low Energy connection (LE-U)
    Le,
}

/// Buffer parameters the controller reported for one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataBufferInfo {
    /// Maximum ACL payload size of one fragment
    pub max_data_length: usize,
    /// Number of fragments the controller can hold at once
    pub max_num_packets: usize,
}

impl DataBufferInfo {
    pub fn new(max_data_length: usize, max_num_packets: usize) -> Self {
        Self {
            max_data_length,
            max_num_packets,
        }
    }

    /// A pool with zero length or zero slots is not usable
    pub fn is_available(&self) -> bool {
        self.max_data_length > 0 && self.max_num_packets > 0
    }
}

/// Controller buffer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AclDataChannelConfig {
    /// From HCI_Read_Buffer_Size
    pub bredr: DataBufferInfo,
    /// From HCI_LE_Read_Buffer_Size; leave empty if the controller shares the BR/EDR pool
    pub le: DataBufferInfo,
}

/// A source of outbound fragments for one connection
pub trait ConnectionInterface {
    fn has_available_packet(&self) -> bool;

    /// Take the next fragment to transmit. Fragments of one L2CAP frame must
    /// be returned back to back.
    fn next_outbound_packet(&mut self) -> Option<AclDataPacket>;

    /// Put back a fragment the transport refused. It must be the next one
    /// returned by [`next_outbound_packet`](Self::next_outbound_packet).
    fn return_packet(&mut self, packet: AclDataPacket);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pool {
    BrEdr,
    Le,
}

#[derive(Debug)]
struct PoolState {
    info: DataBufferInfo,
    outstanding: usize,
}

impl PoolState {
    fn free_slots(&self) -> usize {
        self.info.max_num_packets.saturating_sub(self.outstanding)
    }
}

/// Packets handed to the controller and not yet reported as completed
#[derive(Debug, Clone, Copy)]
struct PendingCount {
    pool: Pool,
    count: usize,
}

/// Arbiter of the controller's ACL buffer slots
pub struct AclDataChannel {
    transport: Box<dyn AclTransport>,
    commands: Box<dyn CommandChannel>,
    vendor: Option<Box<dyn VendorCommandEncoder>>,
    features: ControllerFeatures,

    bredr_pool: PoolState,
    le_pool: PoolState,

    /// Registered connections in round-robin order
    registered: Vec<(ConnectionHandle, LinkType)>,
    /// Index into `registered` of the next connection to service
    next_index: usize,

    /// Outstanding counts, kept after unregistration until cleared
    pending: HashMap<ConnectionHandle, PendingCount>,
}

impl AclDataChannel {
    /// Create a new ACL data channel over the given transport
    pub fn new(
        config: AclDataChannelConfig,
        transport: Box<dyn AclTransport>,
        commands: Box<dyn CommandChannel>,
    ) -> Result<Self, HciError> {
        if !config.bredr.is_available() && !config.le.is_available() {
            return Err(HciError::NoDataBuffers);
        }

        debug!(
            "ACL data channel: BR/EDR {} x {} octets, LE {} x {} octets",
            config.bredr.max_num_packets,
            config.bredr.max_data_length,
            config.le.max_num_packets,
            config.le.max_data_length
        );

        Ok(Self {
            transport,
            commands,
            vendor: None,
            features: ControllerFeatures::empty(),
            bredr_pool: PoolState {
                info: config.bredr,
                outstanding: 0,
            },
            le_pool: PoolState {
                info: config.le,
                outstanding: 0,
            },
            registered: Vec::new(),
            next_index: 0,
            pending: HashMap::new(),
        })
    }

    /// Attach the vendor command encoder and the capabilities it unlocks
    pub fn set_vendor_support(&mut self, features: ControllerFeatures, encoder: Box<dyn VendorCommandEncoder>) {
        self.features = features;
        self.vendor = Some(encoder);
    }

    /// Set the capabilities that need no vendor encoder
    pub fn set_features(&mut self, features: ControllerFeatures) {
        self.features = features;
    }

    pub fn features(&self) -> ControllerFeatures {
        self.features
    }

    pub fn vendor_encoder(&self) -> Option<&dyn VendorCommandEncoder> {
        self.vendor.as_deref()
    }

    // A pool the controller did not configure borrows the other one.
    fn pool_for(&self, link_type: LinkType) -> Pool {
        match link_type {
            LinkType::BrEdr if self.bredr_pool.info.is_available() => Pool::BrEdr,
            LinkType::BrEdr => Pool::Le,
            LinkType::Le if self.le_pool.info.is_available() => Pool::Le,
            LinkType::Le => Pool::BrEdr,
        }
    }

    fn pool(&self, pool: Pool) -> &PoolState {
        match pool {
            Pool::BrEdr => &self.bredr_pool,
            Pool::Le => &self.le_pool,
        }
    }

    fn pool_mut(&mut self, pool: Pool) -> &mut PoolState {
        match pool {
            Pool::BrEdr => &mut self.bredr_pool,
            Pool::Le => &mut self.le_pool,
        }
    }

    /// Buffer parameters that apply to links of the given type
    pub fn buffer_info(&self, link_type: LinkType) -> DataBufferInfo {
        self.pool(self.pool_for(link_type)).info
    }

    /// Largest ACL payload of one fragment on links of the given type
    pub fn max_payload_size(&self, link_type: LinkType) -> usize {
        self.buffer_info(link_type).max_data_length
    }

    /// Fragments in flight in the pool serving links of the given type
    pub fn pool_outstanding(&self, link_type: LinkType) -> usize {
        self.pool(self.pool_for(link_type)).outstanding
    }

    /// Fragments in flight for one connection handle
    pub fn outstanding_packets(&self, handle: ConnectionHandle) -> usize {
        self.pending.get(&handle).map(|p| p.count).unwrap_or(0)
    }

    pub fn is_registered(&self, handle: ConnectionHandle) -> bool {
        self.link_type(handle).is_some()
    }

    pub fn link_type(&self, handle: ConnectionHandle) -> Option<LinkType> {
        self.registered
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, link_type)| *link_type)
    }

    /// Begin tracking buffer usage for a connection
    pub fn register_connection(&mut self, handle: ConnectionHandle, link_type: LinkType) -> Result<(), HciError> {
        if self.is_registered(handle) {
            return Err(HciError::ConnectionAlreadyRegistered(handle));
        }

        debug!("Registering connection 0x{:04X} ({:?})", handle, link_type);
        self.registered.push((handle, link_type));

        let pool = self.pool_for(link_type);
        if self.pending.get(&handle).is_some_and(|pending| pending.pool != pool) {
            warn!("Dropping stale packet count of 0x{:04X} from another pool", handle);
            self.clear_controller_packet_count(handle);
        }
        self.pending.entry(handle).or_insert(PendingCount { pool, count: 0 });
        Ok(())
    }

    /// Stop servicing a connection
    ///
    /// Buffer slots already occupied by the connection stay occupied until the
    /// controller reports them completed or the count is cleared. The handle
    /// is forgotten entirely once its count drops to zero.
    pub fn unregister_connection(&mut self, handle: ConnectionHandle) {
        let Some(index) = self.registered.iter().position(|(h, _)| *h == handle) else {
            trace!("Connection 0x{:04X} is not registered", handle);
            return;
        };

        debug!("Unregistering connection 0x{:04X}", handle);
        self.registered.remove(index);
        if index < self.next_index {
            self.next_index -= 1;
        }
        if self.next_index >= self.registered.len() {
            self.next_index = 0;
        }
        if self.pending.get(&handle).is_some_and(|pending| pending.count == 0) {
            self.pending.remove(&handle);
        }
    }

    /// Forget the controller's outstanding packets for a handle
    ///
    /// Use once the link is known to be torn down controller side. Freed slots
    /// become available to other connections on the next scheduling pass.
    pub fn clear_controller_packet_count(&mut self, handle: ConnectionHandle) {
        if let Some(pending) = self.pending.remove(&handle) {
            debug!(
                "Clearing {} outstanding packets for connection 0x{:04X}",
                pending.count, handle
            );
            let pool = self.pool_mut(pending.pool);
            pool.outstanding = pool.outstanding.saturating_sub(pending.count);
        }
    }

    /// Same as [`clear_controller_packet_count`](Self::clear_controller_packet_count),
    /// followed by a scheduling pass.
    pub fn clear_controller_packet_count_and_send<C: ConnectionInterface>(
        &mut self,
        handle: ConnectionHandle,
        connections: &mut HashMap<ConnectionHandle, C>,
    ) -> usize {
        self.clear_controller_packet_count(handle);
        self.try_send_next_packets(connections)
    }

    /// Apply a Number Of Completed Packets event to the buffer accounting
    pub fn handle_completed_packets_event(&mut self, event: &HciEvent) -> Result<(), HciError> {
        if event.event_code != EVT_NUM_COMPLETED_PACKETS {
            return Err(HciError::UnexpectedEvent(event.event_code));
        }

        for entry in event.completed_packets()? {
            let Some(pending) = self.pending.get_mut(&entry.handle) else {
                warn!(
                    "Completed packets ({}) for unknown connection 0x{:04X}",
                    entry.num_completed, entry.handle
                );
                continue;
            };

            let completed = entry.num_completed as usize;
            if completed > pending.count {
                warn!(
                    "Controller completed {} packets for 0x{:04X} but only {} were pending",
                    completed, entry.handle, pending.count
                );
            }
            let released = completed.min(pending.count);
            pending.count -= released;
            let (pool, remaining) = (pending.pool, pending.count);
            if remaining == 0 && !self.is_registered(entry.handle) {
                self.pending.remove(&entry.handle);
            }

            let pool = self.pool_mut(pool);
            pool.outstanding = pool.outstanding.saturating_sub(released);
            trace!(
                "Connection 0x{:04X}: {} packets completed, {} slots in use",
                entry.handle,
                released,
                pool.outstanding
            );
        }

        Ok(())
    }

    /// Handle a Number Of Completed Packets event and refill freed slots
    pub fn on_number_of_completed_packets<C: ConnectionInterface>(
        &mut self,
        event: &HciEvent,
        connections: &mut HashMap<ConnectionHandle, C>,
    ) -> Result<usize, HciError> {
        self.handle_completed_packets_event(event)?;
        Ok(self.try_send_next_packets(connections))
    }

    /// Send fragments from registered connections while buffer slots are free
    ///
    /// Connections are visited round-robin, one fragment per visit. Returns
    /// the number of fragments handed to the transport. A connection whose
    /// fragment the transport refuses gets it back and sits out the rest of
    /// the pass.
    pub fn try_send_next_packets<C: ConnectionInterface>(
        &mut self,
        connections: &mut HashMap<ConnectionHandle, C>,
    ) -> usize {
        let mut sent = 0;
        let mut stalled: Vec<ConnectionHandle> = Vec::new();

        loop {
            let mut progressed = false;
            let count = self.registered.len();

            for _ in 0..count {
                let (handle, link_type) = self.registered[self.next_index];
                self.next_index = (self.next_index + 1) % count;

                let pool = self.pool_for(link_type);
                if self.pool(pool).free_slots() == 0 || stalled.contains(&handle) {
                    continue;
                }

                let Some(connection) = connections.get_mut(&handle) else {
                    continue;
                };
                if !connection.has_available_packet() {
                    continue;
                }
                let Some(packet) = connection.next_outbound_packet() else {
                    continue;
                };

                debug_assert!(packet.payload_size() <= self.pool(pool).info.max_data_length);
                trace!("Sending {:?}", packet);

                if let Err(RejectedPacket { packet, error }) = self.transport.send_acl_packet(packet) {
                    warn!("Transport failed to accept packet for 0x{:04X}: {}", handle, error);
                    connection.return_packet(packet);
                    stalled.push(handle);
                    continue;
                }

                self.pool_mut(pool).outstanding += 1;
                self.pending
                    .entry(handle)
                    .or_insert(PendingCount { pool, count: 0 })
                    .count += 1;
                sent += 1;
                progressed = true;
            }

            if !progressed {
                break;
            }
        }

        sent
    }

    /// Send an HCI command to the controller
    pub fn send_command(&mut self, command: HciCommand) -> Result<u16, HciError> {
        let opcode = command.opcode();
        self.commands.send_command(command)?;
        Ok(opcode)
    }

    /// Ask the controller to change a link's scheduling priority
    ///
    /// Returns the opcode of the vendor command whose completion carries the
    /// controller's verdict.
    pub fn request_acl_priority(&mut self, priority: AclPriority, handle: ConnectionHandle) -> Result<u16, HciError> {
        if !self.features.contains(ControllerFeatures::SET_ACL_PRIORITY) {
            return Err(HciError::Unsupported);
        }
        if !self.is_registered(handle) {
            return Err(HciError::UnknownConnection(handle));
        }

        let command = self
            .vendor
            .as_ref()
            .and_then(|vendor| vendor.encode_acl_priority(handle, priority))
            .ok_or(HciError::Unsupported)?;

        debug!("Requesting {:?} priority for 0x{:04X}", priority, handle);
        self.send_command(command)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::hci::packet::{BroadcastFlag, CompletedPackets, PacketBoundaryFlag};

    struct NullTransport;

    impl AclTransport for NullTransport {
        fn send_acl_packet(&mut self, _packet: AclDataPacket) -> Result<(), RejectedPacket> {
            Ok(())
        }
    }

    struct NullCommands;

    impl CommandChannel for NullCommands {
        fn send_command(&mut self, _command: HciCommand) -> Result<(), HciError> {
            Ok(())
        }
    }

    impl ConnectionInterface for VecDeque<AclDataPacket> {
        fn has_available_packet(&self) -> bool {
            !self.is_empty()
        }

        fn next_outbound_packet(&mut self) -> Option<AclDataPacket> {
            self.pop_front()
        }

        fn return_packet(&mut self, packet: AclDataPacket) {
            self.push_front(packet);
        }
    }

    fn channel() -> AclDataChannel {
        let config = AclDataChannelConfig {
            bredr: DataBufferInfo::new(1024, 8),
            le: DataBufferInfo::default(),
        };
        AclDataChannel::new(config, Box::new(NullTransport), Box::new(NullCommands)).unwrap()
    }

    fn queue(handle: ConnectionHandle) -> VecDeque<AclDataPacket> {
        let packet = AclDataPacket::new(
            handle,
            PacketBoundaryFlag::FirstNonFlushable,
            BroadcastFlag::PointToPoint,
            vec![0],
        );
        VecDeque::from([packet])
    }

    fn completed(handle: ConnectionHandle) -> HciEvent {
        HciEvent::number_of_completed_packets(&[CompletedPackets {
            handle,
            num_completed: 1,
        }])
    }

    #[test]
    fn idle_connection_is_forgotten_on_unregister() {
        let mut acl = channel();
        acl.register_connection(0x0001, LinkType::BrEdr).unwrap();
        assert!(acl.pending.contains_key(&0x0001));

        acl.unregister_connection(0x0001);
        assert!(acl.pending.is_empty());
    }

    #[test]
    fn drained_connection_is_forgotten_after_unregister() {
        let mut acl = channel();
        acl.register_connection(0x0001, LinkType::BrEdr).unwrap();
        acl.register_connection(0x0002, LinkType::BrEdr).unwrap();

        let mut connections = HashMap::new();
        connections.insert(0x0001, queue(0x0001));
        connections.insert(0x0002, queue(0x0002));
        assert_eq!(acl.try_send_next_packets(&mut connections), 2);

        acl.unregister_connection(0x0001);
        assert_eq!(acl.outstanding_packets(0x0001), 1);

        acl.handle_completed_packets_event(&completed(0x0001)).unwrap();
        acl.handle_completed_packets_event(&completed(0x0002)).unwrap();
        assert!(!acl.pending.contains_key(&0x0001));
        // Still registered, so the entry stays
        assert_eq!(acl.pending.get(&0x0002).map(|p| p.count), Some(0));
        assert_eq!(acl.bredr_pool.outstanding, 0);
    }
}
