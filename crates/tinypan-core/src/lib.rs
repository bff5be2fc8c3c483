//! BNEP wire encoding and wrap-safe timing in pure Rust.
//!
//! `tinypan-core` provides zero-copy, `no_std`-compatible encoding and
//! decoding of BNEP (Bluetooth Network Encapsulation Protocol) control
//! and data frames, plus the monotonic-tick arithmetic every timeout
//! decision in the TinyPAN crate family is built on. It performs no
//! allocation and no I/O; the channel and supervisor layers live in
//! `tinypan-client`.
//!
//! # Feature flags
//!
//! - **`std`** (default) — enables `std::error::Error` implementations.
//! - **`defmt`** — derives `defmt::Format` on wire types for embedded
//!   logging.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

/// Bluetooth device and Ethernet MAC addresses.
pub mod addr;
/// BNEP frame types, control messages, and codecs.
pub mod bnep;
/// Error types for encoding and decoding operations.
pub mod error;
/// Wrap-safe arithmetic on a 32-bit millisecond tick.
pub mod tick;

pub use addr::{BdAddr, EtherAddr};
pub use error::{DecodeError, EncodeError};
