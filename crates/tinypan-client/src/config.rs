//! Client configuration and compile-time tuning limits.

use tinypan_core::BdAddr;

/// Timeout waiting for the L2CAP channel to establish.
pub const L2CAP_CONNECT_TIMEOUT_MS: u32 = 10_000;

/// Timeout waiting for a BNEP setup response before re-sending.
pub const BNEP_SETUP_TIMEOUT_MS: u32 = 5_000;

/// Setup attempts before the handshake is abandoned.
pub const BNEP_SETUP_RETRIES: u8 = 3;

/// How long DHCP may run before the delay is logged. The supervisor
/// never aborts DHCP; the IP stack keeps retrying on its own.
pub const DHCP_TIMEOUT_MS: u32 = 30_000;

/// L2CAP MTU negotiated for the BNEP channel (the protocol minimum).
pub const L2CAP_MTU: u16 = tinypan_core::bnep::BNEP_MIN_MTU;

/// Largest Ethernet payload carried in either direction.
pub const MAX_FRAME_SIZE: usize = 1500;

/// Outbound ring capacity in slots; one slot is sacrificed to tell a
/// full ring from an empty one.
pub const TX_QUEUE_LEN: usize = 16;

/// SLIP-mode receive ring size in bytes.
pub const RX_BUFFER_SIZE: usize = 1700;

/// Link-encapsulation headroom outbound packet buffers must reserve,
/// sized for the largest BNEP data header.
pub const ENCAP_HEADROOM: usize = 15;

/// Sleep clamp applied while a handshake is in flight, bounding how
/// late a missed state transition can fire.
pub const HANDSHAKE_SLEEP_CLAMP_MS: u32 = 50;

/// How the client binds to the IP stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// BNEP over L2CAP; the IP stack sees an Ethernet interface.
    #[default]
    Ethernet,
    /// Raw SLIP byte pipe (BLE deployments with a companion app); the
    /// IP stack sees a serial interface.
    Slip,
}

/// Runtime configuration, copied by the client at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Bluetooth address of the NAP (the phone).
    pub remote_addr: BdAddr,
    /// Transport binding.
    pub mode: LinkMode,
    /// Initial reconnection delay.
    pub reconnect_interval_ms: u16,
    /// Reconnection delay ceiling for the exponential backoff.
    pub reconnect_max_ms: u16,
    /// Link monitoring interval. Reserved; the supervisor does not act
    /// on it yet.
    pub heartbeat_interval_ms: u16,
    /// Heartbeat retries before declaring the link dead. Reserved.
    pub heartbeat_retries: u8,
    /// Reconnect attempts before giving up permanently; 0 means
    /// unlimited.
    pub max_reconnect_attempts: u8,
}

impl Config {
    /// Defaults with the given NAP address.
    pub fn new(remote_addr: BdAddr) -> Self {
        Self {
            remote_addr,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_addr: BdAddr::default(),
            mode: LinkMode::Ethernet,
            reconnect_interval_ms: 1_000,
            reconnect_max_ms: 30_000,
            heartbeat_interval_ms: 15_000,
            heartbeat_retries: 3,
            max_reconnect_attempts: 0,
        }
    }
}
