//! Shared test collaborators: a scripted IP stack, a chained packet
//! buffer, an event recorder, and the pump that stands in for the
//! platform's polling loop.

#![allow(dead_code)]

pub mod dhcp;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tinypan_client::{HeapPbuf, IpInfo, LinkPort, NetStack, PacketBuf, PanError, PanEvent, TinyPan};
use tinypan_core::bnep::EthernetFrame;
use tinypan_core::EtherAddr;
use tinypan_hal::mock::MockRadio;

/// An inbound frame captured by the stack, with owned storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub dst: EtherAddr,
    pub src: EtherAddr,
    pub ethertype: u16,
    pub payload: Vec<u8>,
}

/// Work the scripted stack performs on its next poll.
pub enum TxCommand {
    /// Emit a full Ethernet frame through `link_output`, with the
    /// standard encapsulation headroom.
    Frame(Vec<u8>),
    /// Same frame but presented as a chained (non-contiguous) buffer.
    Chained(Vec<Vec<u8>>),
    /// Emit pre-escaped SLIP bytes through `serial_output`.
    Serial(Vec<u8>),
}

#[derive(Default)]
pub struct StackState {
    pub link_up: bool,
    pub dhcp_running: bool,
    pub dhcp_starts: u32,
    pub ip: Option<IpInfo>,
    pub rx_frames: Vec<RxFrame>,
    pub plan: VecDeque<TxCommand>,
    /// `(link_output result, pbuf bytes after the call)` per emitted frame.
    pub tx_results: Vec<(Result<(), PanError>, Vec<u8>)>,
    pub serial_results: Vec<Result<(), PanError>>,
    pub slip_notifications: u32,
    pub serial_drained: Vec<u8>,
}

/// Scripted [`NetStack`]; the test keeps one handle, the client the
/// other.
#[derive(Clone, Default)]
pub struct TestStack {
    state: Rc<RefCell<StackState>>,
}

impl TestStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_frame(&self, frame: &[u8]) {
        self.state
            .borrow_mut()
            .plan
            .push_back(TxCommand::Frame(frame.to_vec()));
    }

    pub fn queue_chained(&self, segments: &[&[u8]]) {
        self.state.borrow_mut().plan.push_back(TxCommand::Chained(
            segments.iter().map(|s| s.to_vec()).collect(),
        ));
    }

    pub fn queue_serial(&self, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .plan
            .push_back(TxCommand::Serial(bytes.to_vec()));
    }

    /// Simulates the DHCP client finishing.
    pub fn publish_ip(&self, info: IpInfo) {
        self.state.borrow_mut().ip = Some(info);
    }

    /// Simulates a lease loss.
    pub fn withdraw_ip(&self) {
        self.state.borrow_mut().ip = None;
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut StackState) -> T) -> T {
        f(&mut self.state.borrow_mut())
    }
}

impl NetStack for TestStack {
    fn link_up(&mut self) {
        self.state.borrow_mut().link_up = true;
    }

    fn link_down(&mut self) {
        self.state.borrow_mut().link_up = false;
    }

    fn dhcp_start(&mut self) -> Result<(), PanError> {
        let mut s = self.state.borrow_mut();
        s.dhcp_running = true;
        s.dhcp_starts += 1;
        Ok(())
    }

    fn dhcp_stop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.dhcp_running = false;
        s.ip = None;
    }

    fn ethernet_input(&mut self, frame: &EthernetFrame<'_>) {
        self.state.borrow_mut().rx_frames.push(RxFrame {
            dst: frame.dst,
            src: frame.src,
            ethertype: frame.ethertype,
            payload: frame.payload.to_vec(),
        });
    }

    fn slip_rx_ready(&mut self) {
        self.state.borrow_mut().slip_notifications += 1;
    }

    fn ip_info(&self) -> Option<IpInfo> {
        self.state.borrow().ip
    }

    fn poll(&mut self, _now_ms: u32, port: &mut dyn LinkPort) {
        loop {
            let command = self.state.borrow_mut().plan.pop_front();
            let Some(command) = command else { break };
            match command {
                TxCommand::Frame(frame) => {
                    let mut pbuf = HeapPbuf::from_frame(&frame);
                    let result = port.link_output(&mut pbuf);
                    let after = pbuf.as_contiguous().unwrap().to_vec();
                    self.state.borrow_mut().tx_results.push((result, after));
                }
                TxCommand::Chained(segments) => {
                    let mut pbuf = ChainedPbuf::new(segments);
                    let result = port.link_output(&mut pbuf);
                    let mut flat = vec![0u8; pbuf.total_len()];
                    pbuf.copy_to(&mut flat);
                    self.state.borrow_mut().tx_results.push((result, flat));
                }
                TxCommand::Serial(bytes) => {
                    let result = port.serial_output(&bytes);
                    self.state.borrow_mut().serial_results.push(result);
                }
            }
        }

        // Drain any received SLIP bytes the client signalled.
        let pending = self.state.borrow().slip_notifications > 0;
        if pending {
            let mut buf = [0u8; 256];
            loop {
                let n = port.serial_read(&mut buf);
                if n == 0 {
                    break;
                }
                self.state.borrow_mut().serial_drained.extend_from_slice(&buf[..n]);
            }
        }
    }
}

/// Non-contiguous packet buffer, for exercising the clone-and-queue
/// transmit path.
pub struct ChainedPbuf {
    segments: Vec<Vec<u8>>,
}

impl ChainedPbuf {
    pub fn new(segments: Vec<Vec<u8>>) -> Self {
        assert!(segments.len() > 1, "use HeapPbuf for one segment");
        Self { segments }
    }
}

impl PacketBuf for ChainedPbuf {
    fn total_len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    fn as_contiguous(&self) -> Option<&[u8]> {
        None
    }

    fn as_contiguous_mut(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn header_shrink(&mut self, _n: usize) -> bool {
        false
    }

    fn header_grow(&mut self, _n: usize) -> bool {
        false
    }

    fn copy_to(&self, out: &mut [u8]) -> usize {
        let total = self.total_len();
        if out.len() < total {
            return 0;
        }
        let mut at = 0;
        for segment in &self.segments {
            out[at..at + segment.len()].copy_from_slice(segment);
            at += segment.len();
        }
        total
    }
}

/// Captures every event the client emits.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<PanEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install<S: NetStack>(&self, pan: &mut TinyPan<MockRadio, S>) {
        let events = Rc::clone(&self.events);
        pan.set_event_callback(move |event| events.borrow_mut().push(event));
    }

    pub fn take(&self) -> Vec<PanEvent> {
        std::mem::take(&mut self.events.borrow_mut())
    }

    pub fn all(&self) -> Vec<PanEvent> {
        self.events.borrow().clone()
    }
}

/// One driver-loop turn: forward everything the radio collected, then
/// run a process cycle.
pub fn pump<S: NetStack>(pan: &mut TinyPan<MockRadio, S>, radio: &MockRadio) {
    while let Some((event, status)) = radio.pop_event() {
        pan.handle_radio_event(event, status);
    }
    while let Some(frame) = radio.pop_rx() {
        pan.handle_l2cap_data(&frame);
    }
    pan.process();
}

/// Builds a raw Ethernet frame: dst, src, ethertype, payload.
pub fn eth_frame(dst: &EtherAddr, src: &EtherAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(dst.as_bytes());
    frame.extend_from_slice(src.as_bytes());
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
