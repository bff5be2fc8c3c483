//! Radio-side contract for the TinyPAN PAN client.
//!
//! [`RadioHal`] is the only surface in the crate family that touches a
//! real Bluetooth stack. A port implements it over BlueZ sockets,
//! Bluedroid, Zephyr, or whatever the platform provides, and forwards
//! the stack's connection events and inbound L2CAP payloads into the
//! client on the polling thread. [`MockRadio`](mock::MockRadio) (behind
//! the `mock` feature) is the scripted in-memory implementation the test
//! suites drive.
//!
//! Everything here is synchronous: the client is a single-threaded
//! cooperative pump, and ports that receive radio traffic on an
//! interrupt or a separate task must mailbox it back into that thread.

#![cfg_attr(not(feature = "std"), no_std)]

use core::fmt;

use tinypan_core::BdAddr;

#[cfg(feature = "mock")]
pub mod mock;

/// Connection-level events a port reports into the client
/// (via `TinyPan::handle_radio_event`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2capEvent {
    /// The L2CAP channel opened successfully.
    Connected,
    /// The L2CAP channel closed.
    Disconnected,
    /// The connection attempt failed.
    ConnectFailed,
    /// A previously requested send window is available again.
    CanSendNow,
}

/// Outcome of a send attempt that did not hard-fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The frame was accepted by the radio.
    Sent,
    /// The radio is temporarily out of buffers; request a
    /// [`CanSendNow`](L2capEvent::CanSendNow) event and retry.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The underlying Bluetooth stack reported a failure.
    Radio,
    /// No L2CAP channel is open.
    NotConnected,
    /// The port does not implement this optional capability.
    Unsupported,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Radio => f.write_str("radio failure"),
            Self::NotConnected => f.write_str("no L2CAP channel"),
            Self::Unsupported => f.write_str("capability not supported"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// Hardware abstraction over the platform's Bluetooth stack.
///
/// All methods are non-blocking. Connection establishment is
/// asynchronous at the protocol level: [`l2cap_connect`] only initiates,
/// and the outcome arrives later as a [`Connected`] or [`ConnectFailed`]
/// event.
///
/// [`l2cap_connect`]: RadioHal::l2cap_connect
/// [`Connected`]: L2capEvent::Connected
/// [`ConnectFailed`]: L2capEvent::ConnectFailed
pub trait RadioHal {
    /// Brings up the Bluetooth stack. Called once by the client.
    fn init(&mut self) -> Result<(), HalError>;

    /// Releases the Bluetooth stack.
    fn deinit(&mut self);

    /// The controller's own device address.
    fn local_address(&self) -> BdAddr;

    /// Monotonic millisecond tick. Wrap-around is fine; the client's
    /// timeout arithmetic tolerates it.
    fn now_ms(&self) -> u32;

    /// Initiates an L2CAP connection to `remote` on `psm`, negotiating
    /// at least `local_mtu` (BNEP needs 1691).
    fn l2cap_connect(&mut self, remote: BdAddr, psm: u16, local_mtu: u16)
        -> Result<(), HalError>;

    /// Tears down the L2CAP channel, if any.
    fn l2cap_disconnect(&mut self);

    /// Sends one contiguous frame over the channel.
    fn l2cap_send(&mut self, frame: &[u8]) -> Result<SendStatus, HalError>;

    /// Whether a send would currently be accepted.
    fn l2cap_can_send(&self) -> bool;

    /// Asks the stack to emit [`L2capEvent::CanSendNow`] once buffers
    /// free up. Safe to call repeatedly.
    fn l2cap_request_can_send_now(&mut self);

    /// Loads a value from non-volatile storage (bonding keys and the
    /// like). Optional; the client itself never calls it.
    fn nv_load(&mut self, _key: &str, _out: &mut [u8]) -> Result<usize, HalError> {
        Err(HalError::Unsupported)
    }

    /// Stores a value in non-volatile storage. Optional.
    fn nv_save(&mut self, _key: &str, _data: &[u8]) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }
}
