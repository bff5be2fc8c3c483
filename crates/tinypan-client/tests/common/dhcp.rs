//! DHCP packet fixtures and a miniature DHCP client stack.
//!
//! The fixtures build and pick apart BOOTP/DHCP messages wrapped in
//! IPv4/UDP so the integration suite can act as the NAP-side DHCP
//! server. [`MiniDhcpStack`] is a [`NetStack`] that performs a real
//! Discover/Offer/Request/Ack exchange through the client's bridge.

use std::cell::RefCell;
use std::rc::Rc;

use tinypan_client::{HeapPbuf, IpInfo, LinkPort, NetStack, PanError};
use tinypan_core::bnep::{EthernetFrame, ETHERTYPE_IPV4};
use tinypan_core::EtherAddr;

use super::eth_frame;

pub const DHCP_OP_REQUEST: u8 = 1;
pub const DHCP_OP_REPLY: u8 = 2;
pub const DHCP_HTYPE_ETHERNET: u8 = 1;

pub const DHCP_DISCOVER: u8 = 1;
pub const DHCP_OFFER: u8 = 2;
pub const DHCP_REQUEST: u8 = 3;
pub const DHCP_ACK: u8 = 5;

pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_DNS: u8 = 6;
pub const OPT_REQUESTED_IP: u8 = 50;
pub const OPT_LEASE_TIME: u8 = 51;
pub const OPT_MESSAGE_TYPE: u8 = 53;
pub const OPT_SERVER_ID: u8 = 54;
pub const OPT_END: u8 = 255;

const DHCP_MAGIC: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const UDP_HEADER_LEN: usize = 8;
const IP_HEADER_LEN: usize = 20;

/// RFC 1071 ones-complement checksum.
fn checksum(bytes: &[u8]) -> u16 {
    let mut sum = 0u32;
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(u16::from_be_bytes([*last, 0]));
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Wraps a UDP payload in IPv4 + UDP headers. The UDP checksum is left
/// zero (legal for IPv4).
pub fn wrap_ipv4_udp(
    src_ip: u32,
    dst_ip: u32,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = UDP_HEADER_LEN + payload.len();
    let total_len = IP_HEADER_LEN + udp_len;
    let mut packet = Vec::with_capacity(total_len);

    packet.push(0x45); // version 4, ihl 5
    packet.push(0x00);
    packet.extend_from_slice(&(total_len as u16).to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // id, flags/frag
    packet.push(64); // ttl
    packet.push(17); // udp
    packet.extend_from_slice(&[0x00, 0x00]); // checksum placeholder
    packet.extend_from_slice(&src_ip.to_be_bytes());
    packet.extend_from_slice(&dst_ip.to_be_bytes());
    let ip_checksum = checksum(&packet[..IP_HEADER_LEN]);
    packet[10..12].copy_from_slice(&ip_checksum.to_be_bytes());

    packet.extend_from_slice(&src_port.to_be_bytes());
    packet.extend_from_slice(&dst_port.to_be_bytes());
    packet.extend_from_slice(&(udp_len as u16).to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00]); // udp checksum: none
    packet.extend_from_slice(payload);
    packet
}

/// A parsed IPv4/UDP datagram, borrowed from the input.
pub struct UdpView<'a> {
    pub src_ip: u32,
    pub dst_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: &'a [u8],
}

/// Splits an IPv4/UDP packet; `None` for anything else.
pub fn parse_ipv4_udp(packet: &[u8]) -> Option<UdpView<'_>> {
    if packet.len() < IP_HEADER_LEN + UDP_HEADER_LEN || packet[0] != 0x45 || packet[9] != 17 {
        return None;
    }
    let src_ip = u32::from_be_bytes(packet[12..16].try_into().unwrap());
    let dst_ip = u32::from_be_bytes(packet[16..20].try_into().unwrap());
    let udp = &packet[IP_HEADER_LEN..];
    let src_port = u16::from_be_bytes(udp[0..2].try_into().unwrap());
    let dst_port = u16::from_be_bytes(udp[2..4].try_into().unwrap());
    let udp_len = u16::from_be_bytes(udp[4..6].try_into().unwrap()) as usize;
    if udp_len < UDP_HEADER_LEN || udp.len() < udp_len {
        return None;
    }
    Some(UdpView {
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        payload: &udp[UDP_HEADER_LEN..udp_len],
    })
}

/// Builds a BOOTP/DHCP message. `options` are appended after the
/// message-type option; the end option is added automatically.
pub fn build_dhcp(
    op: u8,
    xid: u32,
    yiaddr: u32,
    siaddr: u32,
    chaddr: &EtherAddr,
    msg_type: u8,
    options: &[(u8, &[u8])],
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(300);
    msg.push(op);
    msg.push(DHCP_HTYPE_ETHERNET);
    msg.push(6);
    msg.push(0);
    msg.extend_from_slice(&xid.to_be_bytes());
    msg.extend_from_slice(&[0u8; 4]); // secs, flags
    msg.extend_from_slice(&[0u8; 4]); // ciaddr
    msg.extend_from_slice(&yiaddr.to_be_bytes());
    msg.extend_from_slice(&siaddr.to_be_bytes());
    msg.extend_from_slice(&[0u8; 4]); // giaddr
    msg.extend_from_slice(chaddr.as_bytes());
    msg.extend_from_slice(&[0u8; 10]); // chaddr padding
    msg.extend_from_slice(&[0u8; 64]); // sname
    msg.extend_from_slice(&[0u8; 128]); // file
    msg.extend_from_slice(&DHCP_MAGIC);
    msg.extend_from_slice(&[OPT_MESSAGE_TYPE, 1, msg_type]);
    for (option, data) in options {
        msg.push(*option);
        msg.push(data.len() as u8);
        msg.extend_from_slice(data);
    }
    msg.push(OPT_END);
    msg
}

/// A parsed DHCP message (fixed fields plus the few options the suite
/// cares about).
#[derive(Debug, Default, Clone, Copy)]
pub struct DhcpView {
    pub op: u8,
    pub xid: u32,
    pub yiaddr: u32,
    pub chaddr: EtherAddr,
    pub msg_type: Option<u8>,
    pub subnet_mask: Option<u32>,
    pub router: Option<u32>,
    pub dns: Option<u32>,
    pub server_id: Option<u32>,
    pub requested_ip: Option<u32>,
}

pub fn parse_dhcp(payload: &[u8]) -> Option<DhcpView> {
    if payload.len() < 240 || payload[236..240] != DHCP_MAGIC {
        return None;
    }
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&payload[28..34]);
    let mut view = DhcpView {
        op: payload[0],
        xid: u32::from_be_bytes(payload[4..8].try_into().unwrap()),
        yiaddr: u32::from_be_bytes(payload[16..20].try_into().unwrap()),
        chaddr: EtherAddr::new(mac),
        ..DhcpView::default()
    };

    let mut at = 240;
    while at < payload.len() {
        let option = payload[at];
        if option == OPT_END {
            break;
        }
        if option == 0 {
            at += 1;
            continue;
        }
        if at + 2 > payload.len() {
            return None;
        }
        let len = payload[at + 1] as usize;
        let data = payload.get(at + 2..at + 2 + len)?;
        let as_u32 = |d: &[u8]| d.try_into().ok().map(u32::from_be_bytes);
        match option {
            OPT_MESSAGE_TYPE => view.msg_type = data.first().copied(),
            OPT_SUBNET_MASK => view.subnet_mask = as_u32(data),
            OPT_ROUTER => view.router = as_u32(data),
            OPT_DNS => view.dns = as_u32(data),
            OPT_SERVER_ID => view.server_id = as_u32(data),
            OPT_REQUESTED_IP => view.requested_ip = as_u32(data),
            _ => {}
        }
        at += 2 + len;
    }
    Some(view)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpPhase {
    Idle,
    Selecting,
    Requesting,
    Bound,
}

#[derive(Debug)]
struct MiniDhcpState {
    mac: EtherAddr,
    xid: u32,
    link_up: bool,
    running: bool,
    phase: DhcpPhase,
    server_id: u32,
    offered_ip: u32,
    lease: Option<IpInfo>,
    outbound: Option<Vec<u8>>,
}

/// Just enough of a DHCP client to drive the full DORA exchange over
/// the bridge.
#[derive(Clone)]
pub struct MiniDhcpStack {
    state: Rc<RefCell<MiniDhcpState>>,
}

impl MiniDhcpStack {
    pub fn new(mac: EtherAddr, xid: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(MiniDhcpState {
                mac,
                xid,
                link_up: false,
                running: false,
                phase: DhcpPhase::Idle,
                server_id: 0,
                offered_ip: 0,
                lease: None,
                outbound: None,
            })),
        }
    }

    pub fn phase(&self) -> DhcpPhase {
        self.state.borrow().phase
    }

    fn queue_client_message(&self, msg_type: u8, options: &[(u8, &[u8])]) {
        let mut s = self.state.borrow_mut();
        let dhcp = build_dhcp(DHCP_OP_REQUEST, s.xid, 0, 0, &s.mac, msg_type, options);
        let packet = wrap_ipv4_udp(0x0000_0000, 0xFFFF_FFFF, 68, 67, &dhcp);
        let frame = eth_frame(&EtherAddr::BROADCAST, &s.mac, ETHERTYPE_IPV4, &packet);
        s.outbound = Some(frame);
    }
}

impl NetStack for MiniDhcpStack {
    fn link_up(&mut self) {
        self.state.borrow_mut().link_up = true;
    }

    fn link_down(&mut self) {
        self.state.borrow_mut().link_up = false;
    }

    fn dhcp_start(&mut self) -> Result<(), PanError> {
        {
            let mut s = self.state.borrow_mut();
            s.running = true;
            s.phase = DhcpPhase::Selecting;
            s.lease = None;
        }
        self.queue_client_message(DHCP_DISCOVER, &[]);
        Ok(())
    }

    fn dhcp_stop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.running = false;
        s.phase = DhcpPhase::Idle;
        s.lease = None;
        s.outbound = None;
    }

    fn ethernet_input(&mut self, frame: &EthernetFrame<'_>) {
        if frame.ethertype != ETHERTYPE_IPV4 {
            return;
        }
        let Some(udp) = parse_ipv4_udp(frame.payload) else {
            return;
        };
        if udp.dst_port != 68 {
            return;
        }
        let Some(dhcp) = parse_dhcp(udp.payload) else {
            return;
        };

        let (expected_xid, phase) = {
            let s = self.state.borrow();
            (s.xid, s.phase)
        };
        if dhcp.op != DHCP_OP_REPLY || dhcp.xid != expected_xid {
            return;
        }

        match (phase, dhcp.msg_type) {
            (DhcpPhase::Selecting, Some(DHCP_OFFER)) => {
                let server_id = dhcp.server_id.unwrap_or(udp.src_ip);
                {
                    let mut s = self.state.borrow_mut();
                    s.offered_ip = dhcp.yiaddr;
                    s.server_id = server_id;
                    s.phase = DhcpPhase::Requesting;
                }
                self.queue_client_message(
                    DHCP_REQUEST,
                    &[
                        (OPT_REQUESTED_IP, &dhcp.yiaddr.to_be_bytes()),
                        (OPT_SERVER_ID, &server_id.to_be_bytes()),
                    ],
                );
            }
            (DhcpPhase::Requesting, Some(DHCP_ACK)) => {
                let mut s = self.state.borrow_mut();
                s.phase = DhcpPhase::Bound;
                s.lease = Some(IpInfo {
                    ip: dhcp.yiaddr,
                    netmask: dhcp.subnet_mask.unwrap_or(0),
                    gateway: dhcp.router.unwrap_or(0),
                    dns: dhcp.dns.unwrap_or(0),
                });
            }
            _ => {}
        }
    }

    fn ip_info(&self) -> Option<IpInfo> {
        self.state.borrow().lease
    }

    fn poll(&mut self, _now_ms: u32, port: &mut dyn LinkPort) {
        let frame = self.state.borrow_mut().outbound.take();
        if let Some(frame) = frame {
            let mut pbuf = HeapPbuf::from_frame(&frame);
            if port.link_output(&mut pbuf).is_err() {
                // Carrier not ready yet; try again next cycle.
                self.state.borrow_mut().outbound = Some(frame);
            }
        }
    }
}
