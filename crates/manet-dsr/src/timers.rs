//! Protocol timers
//!
//! The engine hands opaque [`TimerToken`]s to the node's timer service and
//! keeps the meaning of each token here. Cancelling a timer forgets its
//! token, so a cancelled timer that fires anyway is recognised as stale and
//! ignored.

use std::collections::HashMap;
use std::time::Duration;

use manet_core::{DatagramKey, NodeAddress, TimerService, TimerToken};
use tracing::trace;

/// What a protocol timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsrTimer {
    /// Decide whether discovery for `destination` needs a retry
    CheckReplied { destination: NodeAddress },
    /// A buffered packet has waited too long for a route
    PacketTimeout { key: DatagramKey },
    /// Evict expired route cache entries
    RouteCacheSweep,
}

/// Armed timers of one engine instance
#[derive(Debug, Default)]
pub struct TimerRegistry {
    next_token: u64,
    armed: HashMap<TimerToken, DsrTimer>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `timer` after `delay` and return its token
    pub fn arm(
        &mut self,
        service: &mut impl TimerService,
        timer: DsrTimer,
        delay: Duration,
    ) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.armed.insert(token, timer);
        service.schedule(token, delay);
        trace!(%token, ?timer, ?delay, "Armed timer");
        token
    }

    /// Forget a timer; it will be ignored if it still fires
    pub fn cancel(&mut self, service: &mut impl TimerService, token: TimerToken) {
        if self.armed.remove(&token).is_some() {
            service.cancel(token);
        }
    }

    /// Resolve a fired token. Stale or unknown tokens yield `None`.
    pub fn fire(&mut self, token: TimerToken) -> Option<DsrTimer> {
        self.armed.remove(&token)
    }

    pub fn is_armed(&self, token: TimerToken) -> bool {
        self.armed.contains_key(&token)
    }

    /// Number of armed timers
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Scheduled {
        scheduled: Vec<(TimerToken, Duration)>,
        cancelled: Vec<TimerToken>,
    }

    impl TimerService for Scheduled {
        fn schedule(&mut self, token: TimerToken, delay: Duration) {
            self.scheduled.push((token, delay));
        }

        fn cancel(&mut self, token: TimerToken) {
            self.cancelled.push(token);
        }
    }

    #[test]
    fn test_arm_and_fire() {
        let mut service = Scheduled::default();
        let mut timers = TimerRegistry::new();

        let a = timers.arm(&mut service, DsrTimer::RouteCacheSweep, Duration::from_secs(300));
        let b = timers.arm(
            &mut service,
            DsrTimer::CheckReplied {
                destination: NodeAddress::from_octets(10, 0, 0, 9),
            },
            Duration::from_millis(30),
        );
        assert_ne!(a, b);
        assert_eq!(service.scheduled.len(), 2);

        assert_eq!(timers.fire(a), Some(DsrTimer::RouteCacheSweep));
        assert_eq!(timers.fire(a), None);
        assert!(timers.is_armed(b));
    }

    #[test]
    fn test_cancelled_timer_is_stale() {
        let mut service = Scheduled::default();
        let mut timers = TimerRegistry::new();

        let token = timers.arm(&mut service, DsrTimer::RouteCacheSweep, Duration::from_secs(1));
        timers.cancel(&mut service, token);
        timers.cancel(&mut service, token);

        assert_eq!(service.cancelled, vec![token]);
        assert_eq!(timers.fire(token), None);
        assert!(timers.is_empty());
    }
}
