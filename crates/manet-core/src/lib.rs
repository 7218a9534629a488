//! # MANET Core
//!
//! Core types and collaborator traits shared by the routing engine and the
//! simulation harness.
//!
//! A routing protocol instance never talks to the outside world directly.
//! Everything it needs from its surroundings (the clock, the link layer,
//! the timer service) comes in through the traits in [`traits`], so the same
//! engine runs under the discrete-event simulator and under unit tests.
//!
//! ## Key Traits
//!
//! - [`Clock`]: Simulated time source
//! - [`LinkLayer`]: Hands frames to a next hop, optionally after a delay
//! - [`TimerService`]: Single-shot timers identified by a [`TimerToken`]
//! - [`NodeContext`]: Everything above, bundled for a single node
//!
//! ## Key Types
//!
//! - [`NodeAddress`]: 4-byte network address
//! - [`Datagram`]: Network-layer packet (header fields plus owned payload)
//! - [`DropReason`]: Why a packet left the system without being delivered

pub mod address;
pub mod datagram;
pub mod error;
pub mod event;
pub mod traits;

// Re-export main types
pub use address::*;
pub use datagram::*;
pub use error::*;
pub use event::*;
pub use traits::*;
