//! Transmit bridge between the IP stack and the radio.
//!
//! Outbound Ethernet frames take one of two routes. The fast path
//! rewrites the frame in place inside the stack's own packet buffer:
//! the 14-byte Ethernet header is swapped for a 3- or 15-byte BNEP
//! header using the buffer's headroom, the contiguous result goes
//! straight to the radio, and both header operations are reverted
//! before returning so the stack never sees the mutation. The slow path
//! clones into a queue slot and performs the same swap there. SLIP mode
//! bypasses encapsulation entirely and moves escaped byte runs as-is.
//!
//! On a can-send-now wakeup the deferred BNEP control frame always goes
//! first; data frames follow in FIFO order.

use log::{debug, warn};
use tinypan_core::bnep::{
    header_len_for, write_ethernet_header, ETHER_ADDR_LEN, GENERAL_HEADER_LEN,
};
use tinypan_core::EtherAddr;
use tinypan_hal::{RadioHal, SendStatus};

use crate::channel::BnepChannel;
use crate::config::{LinkMode, ENCAP_HEADROOM, MAX_FRAME_SIZE};
use crate::error::PanError;
use crate::netif::{LinkPort, PacketBuf};
use crate::slip::RxByteRing;
use crate::txqueue::{TxQueue, TX_SLOT_SIZE};

/// Length of the Ethernet header stripped from outbound frames.
const ETH_HEADER_LEN: usize = 14;

/// Compile-time escape hatch for NAPs whose compressed-frame parsers
/// are broken: every data frame goes out with the full 15-byte header.
const FORCE_UNCOMPRESSED: bool = cfg!(feature = "force-uncompressed-tx");

/// Borrowed view over the facade's transmit-side fields, built per call.
pub(crate) struct LinkBridge<'a, R: RadioHal> {
    pub radio: &'a mut R,
    pub channel: &'a mut BnepChannel,
    pub queue: &'a mut TxQueue,
    pub rx_ring: &'a mut RxByteRing,
    pub mode: LinkMode,
}

impl<R: RadioHal> LinkBridge<'_, R> {
    fn tx_header_len(&self, dst: &EtherAddr, src: &EtherAddr) -> usize {
        if FORCE_UNCOMPRESSED {
            GENERAL_HEADER_LEN
        } else {
            header_len_for(dst, src, self.channel.local_addr(), self.channel.remote_addr())
        }
    }

    /// In-place encapsulation inside the stack's buffer. Falls back to
    /// the slow path when the buffer turns out unusable.
    fn fast_path(&mut self, pbuf: &mut dyn PacketBuf) -> Result<(), PanError> {
        let (dst, src, ethertype) = match pbuf.as_contiguous() {
            Some(head) => parse_eth_header(head),
            None => return self.slow_path(pbuf),
        };
        let header_len = self.tx_header_len(&dst, &src);

        if !pbuf.header_shrink(ETH_HEADER_LEN) {
            return Err(PanError::BadArgument);
        }
        if !pbuf.header_grow(header_len) {
            // Not enough encapsulation headroom; restore and clone.
            pbuf.header_grow(ETH_HEADER_LEN);
            return self.slow_path(pbuf);
        }

        let outcome = match pbuf.as_contiguous_mut() {
            Some(view) => {
                match write_ethernet_header(view, header_len, &dst, &src, ethertype) {
                    Ok(()) => {
                        let sent = self.radio.l2cap_send(view);
                        if let Ok(SendStatus::Busy) = sent {
                            // Lost the race after encapsulating; keep the
                            // finished frame and send it on the wakeup.
                            debug!("radio went busy mid-send, queueing encapsulated frame");
                            if !self.queue.push(view) {
                                warn!("tx queue full during busy race, frame dropped");
                            }
                            self.radio.l2cap_request_can_send_now();
                        }
                        sent.map(|_| ()).map_err(PanError::from)
                    }
                    Err(e) => Err(PanError::from(e)),
                }
            }
            None => Err(PanError::BadArgument),
        };

        // Hand the buffer back exactly as the stack gave it to us.
        pbuf.header_shrink(header_len);
        pbuf.header_grow(ETH_HEADER_LEN);
        outcome
    }

    /// Clone-and-queue: flatten the frame into a slot behind the same
    /// headroom reservation, swap headers there, enqueue.
    fn slow_path(&mut self, pbuf: &mut dyn PacketBuf) -> Result<(), PanError> {
        let total = pbuf.total_len();
        let header_len;
        match self.queue.reserve() {
            None => {
                warn!("tx queue full, dropping outbound frame");
                return Err(PanError::QueueFull);
            }
            Some(slot) => {
                let storage = slot.storage_mut();
                if pbuf.copy_to(&mut storage[ENCAP_HEADROOM..ENCAP_HEADROOM + total]) != total {
                    return Err(PanError::BadArgument);
                }
                let (dst, src, ethertype) = parse_eth_header(&storage[ENCAP_HEADROOM..]);
                header_len = if FORCE_UNCOMPRESSED {
                    GENERAL_HEADER_LEN
                } else {
                    header_len_for(
                        &dst,
                        &src,
                        self.channel.local_addr(),
                        self.channel.remote_addr(),
                    )
                };
                let start = ENCAP_HEADROOM + ETH_HEADER_LEN - header_len;
                write_ethernet_header(&mut storage[start..], header_len, &dst, &src, ethertype)?;
                slot.set_span(start, header_len + (total - ETH_HEADER_LEN));
            }
        }
        self.queue.commit();

        // A busy radio already has a wakeup armed by whoever saw it
        // busy; an idle one (chained buffer, for instance) does not, so
        // move the frame along now.
        if self.radio.l2cap_can_send() {
            self.drain();
        } else {
            self.radio.l2cap_request_can_send_now();
        }
        Ok(())
    }

    /// Flushes deferred traffic: control frame first, then the data
    /// ring until the radio pushes back.
    pub fn drain(&mut self) {
        if !self.channel.drain_pending(self.radio) {
            // Control still blocked; it keeps its priority over data.
            return;
        }
        loop {
            let outcome = match self.queue.front() {
                Some(slot) => self.radio.l2cap_send(slot.data()),
                None => break,
            };
            match outcome {
                Ok(SendStatus::Sent) => self.queue.pop(),
                Ok(SendStatus::Busy) => {
                    self.radio.l2cap_request_can_send_now();
                    break;
                }
                Err(e) => {
                    warn!("dropping queued frame after send failure: {e}");
                    self.queue.pop();
                }
            }
        }
    }

}

impl<R: RadioHal> LinkPort for LinkBridge<'_, R> {
    fn link_output(&mut self, pbuf: &mut dyn PacketBuf) -> Result<(), PanError> {
        debug_assert_eq!(self.mode, LinkMode::Ethernet);
        if !self.channel.is_connected() {
            debug!("link output before BNEP setup, refusing");
            return Err(PanError::NotConnected);
        }
        let total = pbuf.total_len();
        if total < ETH_HEADER_LEN {
            warn!("runt frame from the IP stack ({total} bytes)");
            return Err(PanError::BadArgument);
        }
        if total > ETH_HEADER_LEN + MAX_FRAME_SIZE {
            warn!("outbound frame of {total} bytes exceeds the MTU");
            return Err(PanError::BadArgument);
        }

        let fast_eligible = self.radio.l2cap_can_send()
            && self.queue.is_empty()
            && pbuf.as_contiguous().is_some();
        if fast_eligible {
            self.fast_path(pbuf)
        } else {
            self.slow_path(pbuf)
        }
    }

    fn serial_output(&mut self, bytes: &[u8]) -> Result<(), PanError> {
        debug_assert_eq!(self.mode, LinkMode::Slip);
        if bytes.is_empty() || bytes.len() > TX_SLOT_SIZE {
            return Err(PanError::BadArgument);
        }
        if self.radio.l2cap_can_send() && self.queue.is_empty() {
            match self.radio.l2cap_send(bytes) {
                Ok(SendStatus::Sent) => return Ok(()),
                Ok(SendStatus::Busy) => self.radio.l2cap_request_can_send_now(),
                Err(e) => return Err(e.into()),
            }
        }
        if self.queue.push(bytes) {
            Ok(())
        } else {
            warn!("tx queue full, dropping SLIP run");
            Err(PanError::QueueFull)
        }
    }

    fn serial_read(&mut self, out: &mut [u8]) -> usize {
        self.rx_ring.read(out)
    }
}

/// Splits dst, src, and ethertype out of an Ethernet header. The caller
/// guarantees at least 14 bytes.
fn parse_eth_header(head: &[u8]) -> (EtherAddr, EtherAddr, u16) {
    let mut dst = [0u8; ETHER_ADDR_LEN];
    let mut src = [0u8; ETHER_ADDR_LEN];
    dst.copy_from_slice(&head[0..6]);
    src.copy_from_slice(&head[6..12]);
    let ethertype = u16::from_be_bytes([head[12], head[13]]);
    (EtherAddr::new(dst), EtherAddr::new(src), ethertype)
}
