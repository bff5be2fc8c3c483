//! Per-session BNEP channel state machine.
//!
//! The channel owns the handshake (this side is strictly PANU, so it
//! only ever initiates), answers the peer's control traffic, and gates
//! inbound data frames on the `Connected` state. One reserved slot
//! holds a control frame the radio refused with `Busy`; it outranks the
//! data queue on every drain.

use log::{debug, error, info, warn};
use tinypan_core::bnep::{
    build_command_not_understood, build_filter_response, parse_control, parse_ethernet_frame,
    parse_header, BnepControlType, BnepPacketType, EthernetFrame, FilterResponseCode,
    SetupRequest, SetupResponse, SetupResponseCode,
};
use tinypan_core::EtherAddr;
use tinypan_hal::{RadioHal, SendStatus};

/// BNEP channel state. `WaitForConnectionRequest` belongs to the server
/// role and is never entered by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    #[allow(dead_code)]
    WaitForConnectionRequest,
    WaitForConnectionResponse,
    Connected,
}

/// Largest control frame the retry slot must hold.
const PENDING_CONTROL_SIZE: usize = 16;

/// The single deferred control frame. BNEP setup is serialized and
/// filter replies are issued one at a time, so one slot is enough.
struct PendingControl {
    buf: [u8; PENDING_CONTROL_SIZE],
    len: u8,
}

impl PendingControl {
    const fn new() -> Self {
        Self {
            buf: [0; PENDING_CONTROL_SIZE],
            len: 0,
        }
    }

    fn is_armed(&self) -> bool {
        self.len > 0
    }

    fn arm(&mut self, frame: &[u8]) {
        if frame.len() <= PENDING_CONTROL_SIZE {
            self.buf[..frame.len()].copy_from_slice(frame);
            self.len = frame.len() as u8;
        }
    }

    fn data(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// What an inbound L2CAP payload amounted to, for the layers above.
pub(crate) enum ChannelInbound<'a> {
    /// The peer answered our setup request.
    SetupResponse(SetupResponseCode),
    /// A data frame arrived on an open channel.
    Frame(EthernetFrame<'a>),
}

pub(crate) struct BnepChannel {
    state: ChannelState,
    local_addr: EtherAddr,
    remote_addr: EtherAddr,
    pending: PendingControl,
}

impl BnepChannel {
    pub const fn new() -> Self {
        Self {
            state: ChannelState::Closed,
            local_addr: EtherAddr::new([0; 6]),
            remote_addr: EtherAddr::new([0; 6]),
            pending: PendingControl::new(),
        }
    }

    pub fn configure(&mut self, local: EtherAddr, remote: EtherAddr) {
        self.local_addr = local;
        self.remote_addr = remote;
        debug!("bnep channel endpoints: local {local}, remote {remote}");
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    pub fn local_addr(&self) -> &EtherAddr {
        &self.local_addr
    }

    pub fn remote_addr(&self) -> &EtherAddr {
        &self.remote_addr
    }

    /// Drops back to `Closed` and forgets any deferred control frame.
    pub fn reset(&mut self) {
        self.set_state(ChannelState::Closed);
        self.pending.clear();
    }

    /// L2CAP came up: open the BNEP session by asking the NAP to accept
    /// us.
    pub fn on_l2cap_connected<R: RadioHal>(&mut self, radio: &mut R) {
        self.set_state(ChannelState::WaitForConnectionResponse);
        self.send_setup_request(radio);
    }

    pub fn on_l2cap_disconnected(&mut self) {
        self.reset();
    }

    pub fn send_setup_request<R: RadioHal>(&mut self, radio: &mut R) {
        let mut buf = [0u8; SetupRequest::WIRE_LEN];
        match SetupRequest::panu_to_nap().encode(&mut buf) {
            Ok(len) => {
                debug!("sending BNEP setup request (PANU -> NAP)");
                self.send_control(radio, &buf[..len]);
            }
            Err(e) => error!("failed to build setup request: {e}"),
        }
    }

    /// Attempts a control-frame send, parking the frame in the retry
    /// slot when the radio is out of buffers.
    fn send_control<R: RadioHal>(&mut self, radio: &mut R, frame: &[u8]) {
        match radio.l2cap_send(frame) {
            Ok(SendStatus::Sent) => {}
            Ok(SendStatus::Busy) => {
                debug!("radio busy, deferring BNEP control frame");
                self.pending.arm(frame);
                radio.l2cap_request_can_send_now();
            }
            Err(e) => error!("BNEP control send failed: {e}"),
        }
    }

    /// Flushes the deferred control frame, if any. Returns `false` while
    /// it still cannot be sent; the data queue must not be drained in
    /// that case.
    pub fn drain_pending<R: RadioHal>(&mut self, radio: &mut R) -> bool {
        if !self.pending.is_armed() {
            return true;
        }
        match radio.l2cap_send(self.pending.data()) {
            Ok(SendStatus::Sent) => {
                self.pending.clear();
                true
            }
            Ok(SendStatus::Busy) => {
                radio.l2cap_request_can_send_now();
                false
            }
            Err(e) => {
                error!("dropping deferred BNEP control frame: {e}");
                self.pending.clear();
                true
            }
        }
    }

    /// Dispatches one inbound L2CAP payload.
    pub fn handle_incoming<'a, R: RadioHal>(
        &mut self,
        radio: &mut R,
        data: &'a [u8],
    ) -> Option<ChannelInbound<'a>> {
        let header = match parse_header(data) {
            Ok(h) => h,
            Err(e) => {
                warn!("unparseable BNEP frame: {e}");
                return None;
            }
        };

        if header.pkt_type == BnepPacketType::Control {
            return self.handle_control(radio, data);
        }

        if self.state != ChannelState::Connected {
            warn!("data frame before BNEP setup completed, dropping");
            return None;
        }
        match parse_ethernet_frame(data, &self.local_addr, &self.remote_addr) {
            Ok(frame) => Some(ChannelInbound::Frame(frame)),
            Err(e) => {
                warn!("bad BNEP data frame: {e}");
                None
            }
        }
    }

    fn handle_control<'a, R: RadioHal>(
        &mut self,
        radio: &mut R,
        data: &'a [u8],
    ) -> Option<ChannelInbound<'a>> {
        let (tag, _body) = match parse_control(data) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("truncated BNEP control frame: {e}");
                return None;
            }
        };

        match BnepControlType::from_u8(tag) {
            Some(BnepControlType::SetupRequest) => {
                // PANU only; refuse the role reversal.
                debug!("peer sent a setup request, refusing");
                let reply = SetupResponse {
                    code: SetupResponseCode::NotAllowed,
                };
                let mut buf = [0u8; SetupResponse::WIRE_LEN];
                if let Ok(len) = reply.encode(&mut buf) {
                    self.send_control(radio, &buf[..len]);
                }
                None
            }
            Some(BnepControlType::SetupResponse) => {
                if self.state != ChannelState::WaitForConnectionResponse {
                    warn!("unexpected setup response in state {:?}", self.state);
                    return None;
                }
                match SetupResponse::decode(data) {
                    Ok(resp) => {
                        info!("BNEP setup response: {:#06x}", resp.code.to_u16());
                        if resp.code == SetupResponseCode::Success {
                            self.set_state(ChannelState::Connected);
                        }
                        Some(ChannelInbound::SetupResponse(resp.code))
                    }
                    Err(e) => {
                        warn!("bad setup response: {e}");
                        None
                    }
                }
            }
            Some(
                set_type @ (BnepControlType::FilterNetTypeSet
                | BnepControlType::FilterMultiAddrSet),
            ) => {
                // Declining is compliant; the NAP then keeps filtering
                // on its own side.
                debug!("peer requested a filter set, answering unsupported");
                let response_type = if set_type == BnepControlType::FilterNetTypeSet {
                    BnepControlType::FilterNetTypeResponse
                } else {
                    BnepControlType::FilterMultiAddrResponse
                };
                let mut buf = [0u8; 4];
                if let Ok(len) =
                    build_filter_response(&mut buf, response_type, FilterResponseCode::Unsupported)
                {
                    self.send_control(radio, &buf[..len]);
                }
                None
            }
            Some(BnepControlType::CommandNotUnderstood) => {
                warn!("peer did not understand our last control frame");
                None
            }
            _ => {
                warn!("unknown BNEP control type {tag:#04x}");
                let mut buf = [0u8; 3];
                if let Ok(len) = build_command_not_understood(&mut buf, tag) {
                    // Best effort; a busy radio just drops the echo.
                    let _ = radio.l2cap_send(&buf[..len]);
                }
                None
            }
        }
    }

    fn set_state(&mut self, new: ChannelState) {
        if self.state != new {
            debug!("bnep channel: {:?} -> {:?}", self.state, new);
            self.state = new;
        }
    }
}
