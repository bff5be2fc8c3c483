//! TinyPAN: a Bluetooth PAN (PANU) client for embedded-class systems.
//!
//! The client attaches a device to a phone's Bluetooth tethering by
//! speaking BNEP over an L2CAP channel on PSM `0x000F`, then bridges
//! the link to a generic IP stack and supervises the whole lifecycle:
//! connect, BNEP handshake, DHCP, reconnection with exponential
//! backoff. A second binding moves RFC 1055 SLIP bytes instead of
//! Ethernet frames for BLE deployments that tunnel through a companion
//! app.
//!
//! The system is strictly single-threaded and cooperative. The
//! application owns the loop: it forwards radio events and inbound
//! payloads into [`TinyPan`], calls [`TinyPan::process`], and may sleep
//! for [`TinyPan::next_timeout_ms`] between cycles. See [`TinyPan`] for
//! the loop skeleton, and the `tinypan-hal` crate for the radio
//! contract.
//!
//! # Feature flags
//!
//! - **`force-uncompressed-tx`** — never emit compressed BNEP headers,
//!   for peers that cannot parse them.

/// BNEP channel state machine (handshake, control replies, retry slot).
mod channel;
/// Runtime configuration and tuning limits.
pub mod config;
/// Client error type.
mod error;
/// IP-stack seams: packet buffers, the link port, the stack contract.
pub mod netif;
/// Facade and application events.
mod pan;
/// SLIP constants, escaping, and the receive byte ring.
pub mod slip;
/// Connection supervisor state machine.
mod supervisor;

mod bridge;
mod txqueue;

pub use config::{Config, LinkMode};
pub use error::PanError;
pub use netif::{HeapPbuf, IpInfo, LinkPort, NetStack, PacketBuf};
pub use pan::{PanEvent, TinyPan};
pub use supervisor::LinkState;
