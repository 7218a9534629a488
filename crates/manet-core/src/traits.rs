//! Collaborator traits
//!
//! A routing instance is driven synchronously by an external scheduler and
//! reaches back out only through these traits. Handlers run to completion,
//! so none of them are async and none need `Send`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::NodeAddress;
use crate::datagram::Datagram;

/// Simulated time, measured from the start of the run
pub type SimTime = Duration;

/// Time abstraction for testability
pub trait Clock {
    /// Current simulated time
    fn now(&self) -> SimTime;
}

/// Outbound side of the link layer
pub trait LinkLayer {
    /// Hand a datagram to the link layer for `next_hop` after `delay`.
    ///
    /// `next_hop` may be [`NodeAddress::BROADCAST`]. Ownership of the
    /// datagram moves to the link layer; unicast outcomes come back as
    /// [`LinkStatus`](crate::event::LinkStatus) reports.
    fn transmit(&mut self, datagram: Datagram, next_hop: NodeAddress, delay: Duration);
}

/// Handle for a scheduled single-shot timer
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("timer#{_0}")]
pub struct TimerToken(pub u64);

/// Single-shot timer scheduling
pub trait TimerService {
    /// Arrange for `token` to be handed back to the instance after `delay`
    fn schedule(&mut self, token: TimerToken, delay: Duration);

    /// The instance no longer cares about `token`.
    ///
    /// Instances ignore tokens they have cancelled, so implementations may
    /// keep delivering them.
    fn cancel(&mut self, _token: TimerToken) {}
}

/// Everything a routing instance needs from its node
pub trait NodeContext: Clock + LinkLayer + TimerService {}

impl<T: Clock + LinkLayer + TimerService> NodeContext for T {}
