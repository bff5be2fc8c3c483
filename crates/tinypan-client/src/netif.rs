//! Seams between the client and the IP stack.
//!
//! The IP stack is an external collaborator: it consumes Ethernet-shaped
//! frames (or raw SLIP bytes) and produces outbound packet buffers. The
//! traits here describe exactly that surface, so any stack with a
//! chained-buffer abstraction and a DHCP client can be bound without the
//! client knowing its internals.

use tinypan_core::bnep::EthernetFrame;

use crate::error::PanError;

/// IPv4 addressing published by the IP stack once DHCP completes.
/// All four values are stored in the stack's chosen byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IpInfo {
    pub ip: u32,
    pub netmask: u32,
    pub gateway: u32,
    pub dns: u32,
}

/// The IP stack's packet-buffer abstraction: a possibly-chained byte
/// sequence with adjustable headroom at the front for link-layer
/// encapsulation.
///
/// `header_shrink` and `header_grow` move the logical start of the
/// buffer forward and backward; a grow can only reclaim space a shrink
/// (or a headroom reservation) left behind. Both return `false` and
/// leave the buffer untouched when the adjustment does not fit.
pub trait PacketBuf {
    /// Total payload length across all segments.
    fn total_len(&self) -> usize;

    /// The whole buffer as one slice, if it is a single segment.
    fn as_contiguous(&self) -> Option<&[u8]>;

    /// Mutable single-segment view, if contiguous.
    fn as_contiguous_mut(&mut self) -> Option<&mut [u8]>;

    /// Hides `n` bytes at the front.
    fn header_shrink(&mut self, n: usize) -> bool;

    /// Re-exposes `n` bytes of headroom in front of the current start.
    fn header_grow(&mut self, n: usize) -> bool;

    /// Flattens the buffer into `out`, returning the number of bytes
    /// copied (zero when `out` is too small).
    fn copy_to(&self, out: &mut [u8]) -> usize;
}

/// Contiguous [`PacketBuf`] with explicit headroom, for host builds and
/// tests.
#[derive(Debug, Clone)]
pub struct HeapPbuf {
    buf: Vec<u8>,
    start: usize,
}

impl HeapPbuf {
    /// A buffer holding `payload` with `headroom` reclaimable bytes in
    /// front of it.
    pub fn with_headroom(headroom: usize, payload: &[u8]) -> Self {
        let mut buf = vec![0u8; headroom + payload.len()];
        buf[headroom..].copy_from_slice(payload);
        Self {
            buf,
            start: headroom,
        }
    }

    /// A full outbound Ethernet frame carrying the default
    /// link-encapsulation headroom.
    pub fn from_frame(frame: &[u8]) -> Self {
        Self::with_headroom(crate::config::ENCAP_HEADROOM, frame)
    }
}

impl PacketBuf for HeapPbuf {
    fn total_len(&self) -> usize {
        self.buf.len() - self.start
    }

    fn as_contiguous(&self) -> Option<&[u8]> {
        Some(&self.buf[self.start..])
    }

    fn as_contiguous_mut(&mut self) -> Option<&mut [u8]> {
        Some(&mut self.buf[self.start..])
    }

    fn header_shrink(&mut self, n: usize) -> bool {
        if n <= self.total_len() {
            self.start += n;
            true
        } else {
            false
        }
    }

    fn header_grow(&mut self, n: usize) -> bool {
        if n <= self.start {
            self.start -= n;
            true
        } else {
            false
        }
    }

    fn copy_to(&self, out: &mut [u8]) -> usize {
        let data = &self.buf[self.start..];
        if out.len() < data.len() {
            return 0;
        }
        out[..data.len()].copy_from_slice(data);
        data.len()
    }
}

/// What the client offers the IP stack while the stack runs: outbound
/// submission and, in SLIP mode, the serial-read drain.
pub trait LinkPort {
    /// Submits one outbound Ethernet frame (Ethernet binding). The
    /// buffer must start with the 14-byte Ethernet header and carry at
    /// least [`ENCAP_HEADROOM`](crate::config::ENCAP_HEADROOM) bytes of
    /// headroom; it is returned to the caller unchanged.
    fn link_output(&mut self, pbuf: &mut dyn PacketBuf) -> Result<(), PanError>;

    /// Submits a fully SLIP-escaped byte run (SLIP binding); the bytes
    /// go to the radio exactly as given.
    fn serial_output(&mut self, bytes: &[u8]) -> Result<(), PanError>;

    /// Drains received SLIP bytes into `out`, returning how many were
    /// copied (SLIP binding).
    fn serial_read(&mut self, out: &mut [u8]) -> usize;
}

/// The IP-stack collaborator.
///
/// All methods run on the polling thread. The stack reports addressing
/// by being polled: the client reads [`ip_info`](Self::ip_info) every
/// cycle and edge-detects acquisition and loss.
pub trait NetStack {
    /// The link-layer carrier came up (BNEP handshake completed or the
    /// SLIP pipe is ready).
    fn link_up(&mut self);

    /// The link-layer carrier went down.
    fn link_down(&mut self);

    /// Starts (or restarts) the DHCP client.
    fn dhcp_start(&mut self) -> Result<(), PanError>;

    /// Stops the DHCP client and forgets the lease.
    fn dhcp_stop(&mut self);

    /// Delivers one received Ethernet frame (Ethernet binding).
    fn ethernet_input(&mut self, frame: &EthernetFrame<'_>);

    /// Received SLIP bytes are waiting in the serial ring (SLIP
    /// binding); drain them through
    /// [`LinkPort::serial_read`] on the next [`poll`](Self::poll).
    fn slip_rx_ready(&mut self) {}

    /// Current addressing, if an address has been acquired.
    fn ip_info(&self) -> Option<IpInfo>;

    /// Milliseconds until the stack's own timers (DHCP retries, ARP,
    /// TCP) next need service.
    fn next_timeout_ms(&self, _now_ms: u32) -> u32 {
        u32::MAX
    }

    /// Runs the stack's timers and transmit work. Outbound traffic is
    /// emitted through `port` during this call.
    fn poll(&mut self, now_ms: u32, port: &mut dyn LinkPort);
}
