//! Scripted in-memory radio for driving the client without hardware.
//!
//! [`MockRadio`] is a cloneable handle over shared state: the test keeps
//! one clone to script the link (complete or fail connects, inject
//! frames, advance the clock, toggle flow control) while the client owns
//! another. Events and inbound frames queue up until the test pumps them
//! into the client, which mirrors how a real port mailboxes stack
//! callbacks back into the polling thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tinypan_core::bnep::BNEP_MIN_MTU;
use tinypan_core::BdAddr;

use crate::{HalError, L2capEvent, RadioHal, SendStatus};

#[derive(Debug)]
struct Shared {
    now_ms: u32,
    local_addr: BdAddr,
    connected: bool,
    connect_target: Option<BdAddr>,
    can_send: bool,
    busy_sends: u32,
    send_now_wanted: bool,
    sent: Vec<Vec<u8>>,
    events: VecDeque<(L2capEvent, i32)>,
    rx: VecDeque<Vec<u8>>,
}

/// Cloneable scripted radio; see the module docs.
#[derive(Debug, Clone)]
pub struct MockRadio {
    shared: Rc<RefCell<Shared>>,
}

impl MockRadio {
    pub fn new(local_addr: BdAddr) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                now_ms: 0,
                local_addr,
                connected: false,
                connect_target: None,
                can_send: true,
                busy_sends: 0,
                send_now_wanted: false,
                sent: Vec::new(),
                events: VecDeque::new(),
                rx: VecDeque::new(),
            })),
        }
    }

    // Clock control.

    pub fn set_now(&self, now_ms: u32) {
        self.shared.borrow_mut().now_ms = now_ms;
    }

    pub fn advance(&self, delta_ms: u32) {
        let mut s = self.shared.borrow_mut();
        s.now_ms = s.now_ms.wrapping_add(delta_ms);
    }

    // Link scripting.

    /// The address of the last connect request, if one is outstanding.
    pub fn connect_target(&self) -> Option<BdAddr> {
        self.shared.borrow().connect_target
    }

    /// Completes the outstanding connect request successfully.
    pub fn complete_connect(&self) {
        let mut s = self.shared.borrow_mut();
        s.connect_target = None;
        s.connected = true;
        s.events.push_back((L2capEvent::Connected, 0));
    }

    /// Fails the outstanding connect request with the given status.
    pub fn fail_connect(&self, status: i32) {
        let mut s = self.shared.borrow_mut();
        s.connect_target = None;
        s.events.push_back((L2capEvent::ConnectFailed, status));
    }

    /// Drops an established link.
    pub fn drop_link(&self) {
        let mut s = self.shared.borrow_mut();
        s.connected = false;
        s.events.push_back((L2capEvent::Disconnected, 0));
    }

    /// Queues an inbound L2CAP payload from the peer.
    pub fn push_rx(&self, frame: &[u8]) {
        self.shared.borrow_mut().rx.push_back(frame.to_vec());
    }

    // Flow control.

    pub fn set_can_send(&self, can_send: bool) {
        self.shared.borrow_mut().can_send = can_send;
    }

    /// Makes the next `count` sends report `Busy` even though
    /// `l2cap_can_send` says otherwise, reproducing the race where
    /// buffers vanish between the check and the send. A triggered busy
    /// closes the send window until it is granted again.
    pub fn make_sends_busy(&self, count: u32) {
        self.shared.borrow_mut().busy_sends = count;
    }

    /// Whether the client has asked for a can-send-now event since the
    /// last grant.
    pub fn send_now_requested(&self) -> bool {
        self.shared.borrow().send_now_wanted
    }

    /// Re-opens the send window and, if the client asked for it, queues
    /// the can-send-now event. Returns whether an event was queued.
    pub fn grant_can_send_now(&self) -> bool {
        let mut s = self.shared.borrow_mut();
        s.can_send = true;
        if s.send_now_wanted {
            s.send_now_wanted = false;
            s.events.push_back((L2capEvent::CanSendNow, 0));
            true
        } else {
            false
        }
    }

    // Inspection.

    pub fn is_connected(&self) -> bool {
        self.shared.borrow().connected
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.shared.borrow().sent.clone()
    }

    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.shared.borrow().sent.last().cloned()
    }

    pub fn sent_count(&self) -> usize {
        self.shared.borrow().sent.len()
    }

    pub fn clear_sent(&self) {
        self.shared.borrow_mut().sent.clear();
    }

    // Pump: the test drains these into the client.

    pub fn pop_event(&self) -> Option<(L2capEvent, i32)> {
        self.shared.borrow_mut().events.pop_front()
    }

    pub fn pop_rx(&self) -> Option<Vec<u8>> {
        self.shared.borrow_mut().rx.pop_front()
    }
}

impl RadioHal for MockRadio {
    fn init(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    fn deinit(&mut self) {
        let mut s = self.shared.borrow_mut();
        s.connected = false;
        s.connect_target = None;
    }

    fn local_address(&self) -> BdAddr {
        self.shared.borrow().local_addr
    }

    fn now_ms(&self) -> u32 {
        self.shared.borrow().now_ms
    }

    fn l2cap_connect(
        &mut self,
        remote: BdAddr,
        _psm: u16,
        local_mtu: u16,
    ) -> Result<(), HalError> {
        debug_assert!(local_mtu >= BNEP_MIN_MTU);
        self.shared.borrow_mut().connect_target = Some(remote);
        Ok(())
    }

    fn l2cap_disconnect(&mut self) {
        let mut s = self.shared.borrow_mut();
        s.connected = false;
        s.connect_target = None;
    }

    fn l2cap_send(&mut self, frame: &[u8]) -> Result<SendStatus, HalError> {
        debug_assert!(!frame.is_empty() && frame.len() <= BNEP_MIN_MTU as usize);
        let mut s = self.shared.borrow_mut();
        if !s.connected {
            return Err(HalError::NotConnected);
        }
        if s.busy_sends > 0 {
            s.busy_sends -= 1;
            s.can_send = false;
            return Ok(SendStatus::Busy);
        }
        if !s.can_send {
            return Ok(SendStatus::Busy);
        }
        s.sent.push(frame.to_vec());
        Ok(SendStatus::Sent)
    }

    fn l2cap_can_send(&self) -> bool {
        let s = self.shared.borrow();
        s.connected && s.can_send
    }

    fn l2cap_request_can_send_now(&mut self) {
        self.shared.borrow_mut().send_now_wanted = true;
    }
}
