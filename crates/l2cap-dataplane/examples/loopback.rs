/// Two data planes wired back to back, exchanging SDUs over an LE
/// credit-based channel. Credits run out mid-stream and come back as the
/// receiver reads.
use l2cap_dataplane::hci::*;
use l2cap_dataplane::l2cap::*;
use l2cap_dataplane::HciError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const LINK: ConnectionHandle = 0x0040;

type Wire = Arc<Mutex<VecDeque<AclDataPacket>>>;

struct WireTransport(Wire);

impl AclTransport for WireTransport {
    fn send_acl_packet(&mut self, packet: AclDataPacket) -> Result<(), RejectedPacket> {
        match self.0.lock() {
            Ok(mut wire) => {
                wire.push_back(packet);
                Ok(())
            }
            Err(_) => Err(RejectedPacket::new(packet, HciError::SendError("wire poisoned".into()))),
        }
    }
}

struct NoCommands;

impl CommandChannel for NoCommands {
    fn send_command(&mut self, _command: HciCommand) -> Result<(), HciError> {
        Err(HciError::Unsupported)
    }
}

fn host(wire: &Wire) -> L2capResult<ChannelManager> {
    let config = AclDataChannelConfig {
        bredr: DataBufferInfo::default(),
        le: DataBufferInfo::new(27, 4),
    };
    let mut manager = ChannelManager::new(config, Box::new(WireTransport(wire.clone())), Box::new(NoCommands))?;
    manager.register_link(LINK, LinkType::Le)?;
    Ok(manager)
}

/// Move everything on `wire` into `receiver`, then tell `sender` the
/// controller is done with those packets. Returns the number moved.
fn deliver(wire: &Wire, sender: &mut ChannelManager, receiver: &mut ChannelManager) -> L2capResult<usize> {
    let packets: Vec<AclDataPacket> = match wire.lock() {
        Ok(mut wire) => wire.drain(..).collect(),
        Err(_) => return Ok(0),
    };
    let count = packets.len();
    for packet in packets {
        receiver.handle_acl_data(packet)?;
    }
    if count > 0 {
        let event = HciEvent::number_of_completed_packets(&[CompletedPackets {
            handle: LINK,
            num_completed: count as u16,
        }]);
        sender.handle_event(&event)?;
    }
    Ok(count)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("L2CAP credit-based loopback");
    println!("---------------------------");

    let a_to_b: Wire = Arc::default();
    let b_to_a: Wire = Arc::default();
    let mut a = host(&a_to_b)?;
    let mut b = host(&b_to_a)?;

    let config = |credits| CreditBasedConfig {
        mtu: 512,
        mps: 64,
        initial_credits: credits,
    };
    let sender = a.open_channel(LINK, ChannelParameters::credit_based(0x0040, 0x0041, config(4), config(4)))?;
    let receiver = b.open_channel(LINK, ChannelParameters::credit_based(0x0041, 0x0040, config(4), config(4)))?;

    let received = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
    let sink = received.clone();
    b.activate(
        receiver,
        Box::new(move |sdu: Vec<u8>| {
            if let Ok(mut received) = sink.lock() {
                received.push(sdu);
            }
        }),
    )?;
    a.activate(sender, Box::new(|_sdu: Vec<u8>| {}))?;

    for i in 0..3u8 {
        a.send(sender, vec![b'a' + i; 200])?;
    }

    let mut acknowledged = 0;
    loop {
        let moved = deliver(&a_to_b, &mut a, &mut b)? + deliver(&b_to_a, &mut b, &mut a)?;

        let total = received.lock().map(|received| received.len()).unwrap_or(acknowledged);
        while acknowledged < total {
            b.acknowledge_read(receiver)?;
            acknowledged += 1;
        }

        if moved == 0 && total == acknowledged && a.try_send() == 0 {
            break;
        }
    }

    if let Ok(received) = received.lock() {
        for sdu in received.iter() {
            println!("Received {} octets of '{}'", sdu.len(), sdu[0] as char);
        }
    }
    if let Some(stats) = b.link_stats(LINK) {
        println!(
            "Receiver saw {} fragments, delivered {} SDUs",
            stats.fragments_received, stats.sdus_delivered
        );
    }

    Ok(())
}
