//! Top-level connection supervisor.
//!
//! The supervisor is a pure state machine: every entry point takes the
//! current tick and returns the side effects to perform as
//! [`Directive`]s, which the facade executes against the radio, the
//! channel, and the IP stack. Keeping the machine free of I/O makes the
//! full transition matrix testable against a scripted clock.

use heapless::Vec;
use log::{error, info, warn};
use tinypan_core::tick::{has_elapsed, remaining};
use tinypan_hal::L2capEvent;

use crate::config::{
    Config, LinkMode, BNEP_SETUP_RETRIES, BNEP_SETUP_TIMEOUT_MS, DHCP_TIMEOUT_MS,
    L2CAP_CONNECT_TIMEOUT_MS,
};
use crate::error::PanError;
use tinypan_core::bnep::SetupResponseCode;

/// Connection lifecycle state. `Scanning` and `Stalled` are reserved
/// names (device discovery and link-health recovery) that the current
/// machine never enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting,
    BnepSetup,
    Dhcp,
    Online,
    Stalled,
    Reconnecting,
    Error,
}

impl LinkState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Scanning => "SCANNING",
            Self::Connecting => "CONNECTING",
            Self::BnepSetup => "BNEP_SETUP",
            Self::Dhcp => "DHCP",
            Self::Online => "ONLINE",
            Self::Stalled => "STALLED",
            Self::Reconnecting => "RECONNECTING",
            Self::Error => "ERROR",
        }
    }
}

impl core::fmt::Display for LinkState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side effect requested by the supervisor, executed by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Directive {
    /// Initiate the L2CAP connection to the configured NAP.
    ConnectL2cap,
    /// Tear down the L2CAP channel and reset the BNEP session.
    Disconnect,
    /// L2CAP is up: open the BNEP session (handshake included).
    OpenChannel,
    /// Re-send the BNEP setup request on the open channel.
    SendSetupRequest,
    /// Tell the IP stack its carrier is up.
    LinkUp,
    /// Start the DHCP client.
    StartDhcp,
    /// Restart the DHCP client after an address loss.
    RestartDhcp,
    /// The radio can send again: flush the deferred control frame and
    /// the data queue.
    DrainTx,
}

pub(crate) type Directives = Vec<Directive, 4>;

fn push(out: &mut Directives, directive: Directive) {
    // Capacity is sized for the largest transition; a drop here would
    // be a bug in the matrix below.
    let overflow = out.push(directive).is_err();
    debug_assert!(!overflow);
}

pub(crate) struct Supervisor {
    state: LinkState,
    config: Config,
    /// Tick at which `state` was entered; anchors state timeouts.
    entered_at: u32,
    /// Tick of the last reconnect scheduling; anchors the backoff delay.
    last_action_at: u32,
    /// Current backoff delay; zero until the first failure.
    reconnect_delay_ms: u32,
    reconnect_attempts: u8,
    setup_retries: u8,
    dhcp_slow_logged: bool,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self {
            state: LinkState::Idle,
            config,
            entered_at: 0,
            last_action_at: 0,
            reconnect_delay_ms: 0,
            reconnect_attempts: 0,
            setup_retries: 0,
            dhcp_slow_logged: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Begins the connection sequence. Legal from `Idle` and from the
    /// terminal `Error` state; everywhere else the machine is already
    /// running.
    pub fn start(&mut self, now: u32) -> Result<(), PanError> {
        if !matches!(self.state, LinkState::Idle | LinkState::Error) {
            warn!("start ignored in state {}", self.state);
            return Err(PanError::AlreadyStarted);
        }
        self.reconnect_delay_ms = 0;
        self.reconnect_attempts = 0;
        self.setup_retries = 0;
        self.set_state(LinkState::Connecting, now);
        Ok(())
    }

    /// Forces the machine back to `Idle`. Returns whether it was
    /// running (and the link therefore needs tearing down).
    pub fn stop(&mut self, now: u32) -> bool {
        let was_active = self.state != LinkState::Idle;
        self.set_state(LinkState::Idle, now);
        self.reconnect_delay_ms = 0;
        self.reconnect_attempts = 0;
        was_active
    }

    /// The connect call itself failed during `start`; there is nothing
    /// to back off from yet.
    pub fn connect_call_failed_fatally(&mut self, now: u32) {
        self.set_state(LinkState::Error, now);
    }

    /// The connect call itself failed during a reconnect attempt; back
    /// off and try again.
    pub fn connect_call_failed_retry(&mut self, now: u32) {
        self.to_reconnecting(now);
    }

    /// Drives timeouts. Called once per pump cycle.
    pub fn process(&mut self, now: u32) -> Directives {
        let mut out = Directives::new();
        match self.state {
            LinkState::Connecting => {
                if has_elapsed(now, self.entered_at, L2CAP_CONNECT_TIMEOUT_MS) {
                    warn!("L2CAP connect timed out");
                    push(&mut out, Directive::Disconnect);
                    self.to_reconnecting(now);
                }
            }
            LinkState::BnepSetup => {
                if has_elapsed(now, self.entered_at, BNEP_SETUP_TIMEOUT_MS) {
                    self.setup_retries += 1;
                    if self.setup_retries < BNEP_SETUP_RETRIES {
                        info!(
                            "BNEP setup timed out, retrying (attempt {})",
                            self.setup_retries + 1
                        );
                        self.entered_at = now;
                        push(&mut out, Directive::SendSetupRequest);
                    } else {
                        error!("BNEP setup failed after {BNEP_SETUP_RETRIES} attempts");
                        push(&mut out, Directive::Disconnect);
                        self.to_reconnecting(now);
                    }
                }
            }
            LinkState::Dhcp => {
                if !self.dhcp_slow_logged
                    && has_elapsed(now, self.entered_at, DHCP_TIMEOUT_MS)
                {
                    // Observational only; the IP stack keeps retrying.
                    warn!("no DHCP lease after {DHCP_TIMEOUT_MS} ms");
                    self.dhcp_slow_logged = true;
                }
            }
            LinkState::Reconnecting => {
                if has_elapsed(now, self.last_action_at, self.reconnect_delay_ms) {
                    let cap = self.config.max_reconnect_attempts;
                    if cap > 0 && self.reconnect_attempts >= cap {
                        error!("giving up after {cap} reconnect attempts");
                        self.set_state(LinkState::Error, now);
                    } else {
                        self.reconnect_attempts += 1;
                        info!("reconnecting (attempt {})", self.reconnect_attempts);
                        self.setup_retries = 0;
                        self.set_state(LinkState::Connecting, now);
                        push(&mut out, Directive::ConnectL2cap);
                    }
                }
            }
            LinkState::Idle
            | LinkState::Scanning
            | LinkState::Online
            | LinkState::Stalled
            | LinkState::Error => {}
        }
        out
    }

    pub fn on_l2cap_event(&mut self, event: L2capEvent, status: i32, now: u32) -> Directives {
        let mut out = Directives::new();
        match event {
            L2capEvent::Connected => {
                info!("L2CAP connected");
                if self.state == LinkState::Connecting {
                    match self.config.mode {
                        LinkMode::Ethernet => {
                            self.setup_retries = 0;
                            self.set_state(LinkState::BnepSetup, now);
                            push(&mut out, Directive::OpenChannel);
                        }
                        LinkMode::Slip => {
                            // The byte pipe needs no handshake; reaching
                            // it is the successful connection.
                            self.reconnect_delay_ms = 0;
                            self.reconnect_attempts = 0;
                            self.set_state(LinkState::Dhcp, now);
                            push(&mut out, Directive::LinkUp);
                            push(&mut out, Directive::StartDhcp);
                        }
                    }
                }
            }
            L2capEvent::Disconnected => {
                info!("L2CAP disconnected");
                if matches!(
                    self.state,
                    LinkState::Connecting
                        | LinkState::BnepSetup
                        | LinkState::Dhcp
                        | LinkState::Online
                ) {
                    self.to_reconnecting(now);
                }
            }
            L2capEvent::ConnectFailed => {
                if self.state == LinkState::Connecting {
                    error!("L2CAP connect failed: {status}");
                    self.to_reconnecting(now);
                }
            }
            L2capEvent::CanSendNow => {
                push(&mut out, Directive::DrainTx);
            }
        }
        out
    }

    pub fn on_setup_response(&mut self, code: SetupResponseCode, now: u32) -> Directives {
        let mut out = Directives::new();
        if code == SetupResponseCode::Success {
            info!("BNEP setup accepted");
            // A completed handshake is the only point the backoff
            // resets; transient progress does not count.
            self.reconnect_delay_ms = 0;
            self.reconnect_attempts = 0;
            self.set_state(LinkState::Dhcp, now);
            push(&mut out, Directive::LinkUp);
            push(&mut out, Directive::StartDhcp);
        } else {
            error!("BNEP setup rejected: {:#06x}", code.to_u16());
            push(&mut out, Directive::Disconnect);
            self.to_reconnecting(now);
        }
        out
    }

    /// The IP stack could not even start DHCP on a fresh link.
    pub fn on_dhcp_start_failed(&mut self, now: u32) -> Directives {
        let mut out = Directives::new();
        push(&mut out, Directive::Disconnect);
        self.to_reconnecting(now);
        out
    }

    pub fn on_ip_acquired(&mut self, now: u32) {
        if self.state == LinkState::Dhcp {
            info!("IP address acquired, link is online");
            self.reconnect_delay_ms = 0;
            self.reconnect_attempts = 0;
            self.set_state(LinkState::Online, now);
        }
    }

    pub fn on_ip_lost(&mut self, now: u32) -> Directives {
        let mut out = Directives::new();
        if self.state == LinkState::Online {
            warn!("IP address lost, restarting DHCP");
            self.set_state(LinkState::Dhcp, now);
            push(&mut out, Directive::RestartDhcp);
        }
        out
    }

    /// Milliseconds until this machine next needs a `process` call, or
    /// `u32::MAX` when nothing is pending.
    pub fn next_timeout_ms(&self, now: u32) -> u32 {
        match self.state {
            LinkState::Connecting => remaining(now, self.entered_at, L2CAP_CONNECT_TIMEOUT_MS),
            LinkState::BnepSetup => remaining(now, self.entered_at, BNEP_SETUP_TIMEOUT_MS),
            LinkState::Dhcp => remaining(now, self.entered_at, DHCP_TIMEOUT_MS),
            LinkState::Reconnecting => {
                remaining(now, self.last_action_at, self.reconnect_delay_ms)
            }
            LinkState::Idle
            | LinkState::Scanning
            | LinkState::Online
            | LinkState::Stalled
            | LinkState::Error => u32::MAX,
        }
    }

    fn to_reconnecting(&mut self, now: u32) {
        self.set_state(LinkState::Reconnecting, now);
        self.schedule_reconnect(now);
    }

    /// Exponential backoff: first failure waits the configured
    /// interval, each further failure doubles it up to the ceiling.
    fn schedule_reconnect(&mut self, now: u32) {
        if self.reconnect_delay_ms == 0 {
            self.reconnect_delay_ms = u32::from(self.config.reconnect_interval_ms);
        } else {
            self.reconnect_delay_ms =
                (self.reconnect_delay_ms * 2).min(u32::from(self.config.reconnect_max_ms));
        }
        info!(
            "reconnect in {} ms (attempt {} next)",
            self.reconnect_delay_ms,
            self.reconnect_attempts + 1
        );
        self.last_action_at = now;
    }

    fn set_state(&mut self, new: LinkState, now: u32) {
        if self.state != new {
            info!("link: {} -> {}", self.state, new);
            self.state = new;
            self.entered_at = now;
            if new == LinkState::Dhcp {
                self.dhcp_slow_logged = false;
            }
        }
    }
}
