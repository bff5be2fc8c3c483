//! Public facade: one owning core that holds the radio, the BNEP
//! channel, the supervisor, the transmit queue, and the IP-stack
//! binding as sibling fields, and routes tagged messages between them.
//!
//! The driver of the system is a polling loop:
//!
//! ```text
//! loop {
//!     // forward anything the radio port collected
//!     pan.handle_radio_event(event, status);
//!     pan.handle_l2cap_data(&payload);
//!     pan.process();
//!     sleep_ms(pan.next_timeout_ms());
//! }
//! ```
//!
//! Everything runs on that one thread; ports that receive radio traffic
//! elsewhere must mailbox it into the loop. Application events fan out
//! only after state has fully advanced, with `StateChanged` always
//! first within a cycle.

use log::{debug, error, info, warn};
use tinypan_core::bnep::{SetupResponseCode, BNEP_PSM};
use tinypan_core::EtherAddr;
use tinypan_hal::{L2capEvent, RadioHal};

use crate::bridge::LinkBridge;
use crate::channel::{BnepChannel, ChannelInbound};
use crate::config::{Config, LinkMode, HANDSHAKE_SLEEP_CLAMP_MS, L2CAP_MTU};
use crate::error::PanError;
use crate::netif::{IpInfo, NetStack};
use crate::slip::RxByteRing;
use crate::supervisor::{Directive, Directives, LinkState, Supervisor};
use crate::txqueue::TxQueue;

/// Events delivered to the application callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanEvent {
    /// The supervisor state changed; carries the new state.
    StateChanged(LinkState),
    /// The transport (BNEP session or SLIP pipe) is established.
    Connected,
    /// The connection was lost or stopped.
    Disconnected,
    /// DHCP produced an address; `ip_info` is now populated.
    IpAcquired,
    /// The address went away; DHCP is being restarted.
    IpLost,
    /// The supervisor gave up permanently.
    Error,
}

type EventSink = Box<dyn FnMut(PanEvent)>;

/// The PAN client. Owns every moving part; see the module docs for the
/// drive loop.
pub struct TinyPan<R: RadioHal, S: NetStack> {
    radio: R,
    stack: S,
    config: Config,
    supervisor: Supervisor,
    channel: BnepChannel,
    queue: TxQueue,
    rx_ring: RxByteRing,
    ip_info: Option<IpInfo>,
    last_reported: LinkState,
    staged: heapless::Vec<PanEvent, 8>,
    sink: Option<EventSink>,
}

impl<R: RadioHal, S: NetStack> TinyPan<R, S> {
    /// Initializes the radio and binds the IP stack. The local MAC is
    /// derived from the radio's device address; the NAP's device
    /// address doubles as its MAC on the BNEP channel.
    pub fn new(mut radio: R, stack: S, config: Config) -> Result<Self, PanError> {
        if config.remote_addr.is_zero() {
            return Err(PanError::InvalidConfig);
        }
        radio.init()?;

        let local = EtherAddr::from_bd_addr(radio.local_address());
        let remote = EtherAddr::new(config.remote_addr.0);
        let mut channel = BnepChannel::new();
        channel.configure(local, remote);
        info!("tinypan up, local MAC {local}, NAP {}", config.remote_addr);

        Ok(Self {
            radio,
            stack,
            supervisor: Supervisor::new(config),
            config,
            channel,
            queue: TxQueue::new(),
            rx_ring: RxByteRing::new(),
            ip_info: None,
            last_reported: LinkState::Idle,
            staged: heapless::Vec::new(),
            sink: None,
        })
    }

    /// Registers the application event callback, replacing any previous
    /// one.
    pub fn set_event_callback<F: FnMut(PanEvent) + 'static>(&mut self, callback: F) {
        self.sink = Some(Box::new(callback));
    }

    /// Begins connecting to the configured NAP.
    pub fn start(&mut self) -> Result<(), PanError> {
        let now = self.radio.now_ms();
        self.supervisor.start(now)?;
        info!("connecting to {}", self.config.remote_addr);
        if let Err(e) = self
            .radio
            .l2cap_connect(self.config.remote_addr, BNEP_PSM, L2CAP_MTU)
        {
            error!("L2CAP connect request failed: {e}");
            self.supervisor.connect_call_failed_fatally(now);
            self.flush_events();
            return Err(e.into());
        }
        self.flush_events();
        Ok(())
    }

    /// Disconnects and returns to `Idle`. Emits one `Disconnected`
    /// event when the client was running.
    pub fn stop(&mut self) {
        let previous = self.supervisor.state();
        let now = self.radio.now_ms();
        if self.supervisor.stop(now) {
            self.radio.l2cap_disconnect();
            self.channel.reset();
        }
        self.stack.dhcp_stop();
        self.stack.link_down();
        self.queue.clear();
        self.rx_ring.clear();
        self.ip_info = None;
        self.staged.clear();
        self.flush_events();
        if previous != LinkState::Idle {
            self.emit(PanEvent::Disconnected);
        }
    }

    /// One pump cycle: supervisor timeouts, IP-stack timers and
    /// transmit work, address tracking, event fan-out. Call
    /// periodically, at the latest after [`next_timeout_ms`] elapses.
    ///
    /// [`next_timeout_ms`]: Self::next_timeout_ms
    pub fn process(&mut self) {
        let now = self.radio.now_ms();
        let directives = self.supervisor.process(now);
        self.run(now, directives);

        let Self {
            radio,
            stack,
            channel,
            queue,
            rx_ring,
            config,
            ..
        } = self;
        stack.poll(
            now,
            &mut LinkBridge {
                radio,
                channel,
                queue,
                rx_ring,
                mode: config.mode,
            },
        );

        self.sync_ip(now);
        self.flush_events();
    }

    /// Forwards one radio event from the port into the machine.
    pub fn handle_radio_event(&mut self, event: L2capEvent, status: i32) {
        let now = self.radio.now_ms();
        if event == L2capEvent::Disconnected {
            self.channel.on_l2cap_disconnected();
        }
        let directives = self.supervisor.on_l2cap_event(event, status, now);
        // In SLIP mode reaching the pipe is the whole handshake.
        if self.config.mode == LinkMode::Slip
            && event == L2capEvent::Connected
            && directives.contains(&Directive::LinkUp)
        {
            self.stage(PanEvent::Connected);
        }
        self.run(now, directives);
    }

    /// Forwards one inbound L2CAP payload from the port.
    pub fn handle_l2cap_data(&mut self, data: &[u8]) {
        let now = self.radio.now_ms();
        match self.config.mode {
            LinkMode::Ethernet => {
                match self.channel.handle_incoming(&mut self.radio, data) {
                    Some(ChannelInbound::SetupResponse(code)) => {
                        let directives = self.supervisor.on_setup_response(code, now);
                        if code == SetupResponseCode::Success {
                            self.stage(PanEvent::Connected);
                        }
                        self.run(now, directives);
                    }
                    Some(ChannelInbound::Frame(frame)) => {
                        debug!(
                            "rx frame: ethertype {:#06x}, {} bytes",
                            frame.ethertype,
                            frame.payload.len()
                        );
                        self.stack.ethernet_input(&frame);
                    }
                    None => {}
                }
            }
            LinkMode::Slip => {
                let stored = self.rx_ring.push(data);
                if stored < data.len() {
                    warn!("slip rx ring full, dropped {} bytes", data.len() - stored);
                }
                self.stack.slip_rx_ready();
            }
        }
    }

    /// Milliseconds the driver may sleep before the next
    /// [`process`](Self::process) call, combining the supervisor's and
    /// the IP stack's timers. Active handshake states are clamped so a
    /// missed transition fires promptly.
    pub fn next_timeout_ms(&self) -> u32 {
        let now = self.radio.now_ms();
        let mut sleep = self
            .stack
            .next_timeout_ms(now)
            .min(self.supervisor.next_timeout_ms(now));
        if !matches!(
            self.supervisor.state(),
            LinkState::Idle | LinkState::Online | LinkState::Error
        ) {
            sleep = sleep.min(HANDSHAKE_SLEEP_CLAMP_MS);
        }
        sleep
    }

    pub fn state(&self) -> LinkState {
        self.supervisor.state()
    }

    /// Online means the supervisor reached `Online` and an address is
    /// still published.
    pub fn is_online(&self) -> bool {
        self.supervisor.state() == LinkState::Online && self.ip_info.is_some()
    }

    /// The cached addressing, while one is held.
    pub fn ip_info(&self) -> Option<IpInfo> {
        self.ip_info
    }

    /// Stops the client and releases the radio.
    pub fn deinit(mut self) {
        self.stop();
        self.radio.deinit();
    }

    fn run(&mut self, now: u32, directives: Directives) {
        for directive in directives {
            match directive {
                Directive::ConnectL2cap => {
                    info!("connecting to {}", self.config.remote_addr);
                    if let Err(e) =
                        self.radio
                            .l2cap_connect(self.config.remote_addr, BNEP_PSM, L2CAP_MTU)
                    {
                        error!("L2CAP connect request failed: {e}");
                        self.supervisor.connect_call_failed_retry(now);
                    }
                }
                Directive::Disconnect => {
                    self.radio.l2cap_disconnect();
                    self.channel.reset();
                }
                Directive::OpenChannel => {
                    self.channel.on_l2cap_connected(&mut self.radio);
                }
                Directive::SendSetupRequest => {
                    self.channel.send_setup_request(&mut self.radio);
                }
                Directive::LinkUp => self.stack.link_up(),
                Directive::StartDhcp => {
                    if let Err(e) = self.stack.dhcp_start() {
                        error!("DHCP start failed: {e}");
                        let follow_up = self.supervisor.on_dhcp_start_failed(now);
                        self.run(now, follow_up);
                    }
                }
                Directive::RestartDhcp => {
                    if let Err(e) = self.stack.dhcp_start() {
                        warn!("DHCP restart failed: {e}");
                    }
                }
                Directive::DrainTx => {
                    let Self {
                        radio,
                        channel,
                        queue,
                        rx_ring,
                        config,
                        ..
                    } = self;
                    LinkBridge {
                        radio,
                        channel,
                        queue,
                        rx_ring,
                        mode: config.mode,
                    }
                    .drain();
                }
            }
        }
    }

    /// Edge-detects the IP stack's published addressing.
    fn sync_ip(&mut self, now: u32) {
        let current = self.stack.ip_info();
        match (self.ip_info.is_some(), current) {
            (false, Some(info)) => {
                self.ip_info = Some(info);
                self.supervisor.on_ip_acquired(now);
                self.stage(PanEvent::IpAcquired);
            }
            (true, None) => {
                self.ip_info = None;
                let directives = self.supervisor.on_ip_lost(now);
                self.run(now, directives);
                self.stage(PanEvent::IpLost);
            }
            (true, Some(info)) => self.ip_info = Some(info),
            (false, None) => {}
        }
    }

    fn stage(&mut self, event: PanEvent) {
        if self.staged.push(event).is_err() {
            warn!("event backlog overflow, dropping {event:?}");
        }
    }

    /// Fans out everything this cycle produced: the state edge first,
    /// then the staged events in order.
    fn flush_events(&mut self) {
        let state = self.supervisor.state();
        if state != self.last_reported {
            self.last_reported = state;
            self.emit(PanEvent::StateChanged(state));
            if state == LinkState::Error {
                self.emit(PanEvent::Error);
            }
        }
        let staged = core::mem::take(&mut self.staged);
        for event in staged {
            self.emit(event);
        }
    }

    fn emit(&mut self, event: PanEvent) {
        if let Some(sink) = self.sink.as_mut() {
            sink(event);
        }
    }
}
