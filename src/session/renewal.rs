//! Single-flight guard for credential renewal.
//!
//! At most one renewal call is in flight for the whole process. The first
//! caller to acquire the guard becomes the leader and performs the call;
//! everyone who arrives while it is in flight is queued as a waiter and
//! resumed, in arrival order, the instant the leader settles. The queue is
//! drained exactly once per renewal, never partially.
//!
//! The runtime is multi-threaded, so the check-then-set on `in_flight`
//! happens under a mutex; the lock is never held across an await.

use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::RenewalError;
use crate::models::CredentialPair;

pub(crate) type RenewalOutcome = Result<CredentialPair, RenewalError>;

/// Role handed to a caller entering the renewal path.
pub(crate) enum RenewalTicket<'a> {
    /// This caller performs the renewal and must settle the lease.
    Leader(LeaderLease<'a>),
    /// A renewal is already in flight; await the shared outcome.
    Waiter(oneshot::Receiver<RenewalOutcome>),
}

#[derive(Default)]
struct PendingRenewal {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RenewalOutcome>>,
}

#[derive(Default)]
pub(crate) struct RenewalGuard {
    pending: Mutex<PendingRenewal>,
}

impl RenewalGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically either claim leadership or join the waiter queue.
    pub fn acquire(&self) -> RenewalTicket<'_> {
        let mut pending = self.pending.lock().expect("renewal guard lock poisoned");
        if pending.in_flight {
            let (tx, rx) = oneshot::channel();
            pending.waiters.push(tx);
            RenewalTicket::Waiter(rx)
        } else {
            pending.in_flight = true;
            RenewalTicket::Leader(LeaderLease {
                guard: self,
                settled: false,
            })
        }
    }

    /// Drain every waiter in FIFO order with the settled outcome and clear
    /// the in-flight flag.
    fn settle(&self, outcome: &RenewalOutcome) {
        let waiters = {
            let mut pending = self.pending.lock().expect("renewal guard lock poisoned");
            pending.in_flight = false;
            std::mem::take(&mut pending.waiters)
        };
        for waiter in waiters {
            // A waiter that gave up waiting just drops its receiver.
            let _ = waiter.send(outcome.clone());
        }
    }

    #[cfg(test)]
    pub fn is_in_flight(&self) -> bool {
        self.pending.lock().expect("renewal guard lock poisoned").in_flight
    }
}

/// Leadership of one renewal. Settling resumes every waiter; if the leader
/// is cancelled before settling (its task aborted mid-renewal), the drop
/// handler rejects the waiters instead of leaving them suspended forever.
pub(crate) struct LeaderLease<'a> {
    guard: &'a RenewalGuard,
    settled: bool,
}

impl LeaderLease<'_> {
    pub fn settle(mut self, outcome: &RenewalOutcome) {
        self.guard.settle(outcome);
        self.settled = true;
    }
}

impl Drop for LeaderLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.guard.settle(&Err(RenewalError::Interrupted));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> CredentialPair {
        CredentialPair::issue("acc".into(), "ref".into(), 3600)
    }

    #[tokio::test]
    async fn test_first_caller_leads() {
        let guard = RenewalGuard::new();
        match guard.acquire() {
            RenewalTicket::Leader(lease) => {
                assert!(guard.is_in_flight());
                lease.settle(&Ok(pair()));
            }
            RenewalTicket::Waiter(_) => panic!("first caller must lead"),
        }
        assert!(!guard.is_in_flight());
    }

    #[tokio::test]
    async fn test_waiters_resumed_in_fifo_order() {
        let guard = RenewalGuard::new();
        let lease = match guard.acquire() {
            RenewalTicket::Leader(lease) => lease,
            RenewalTicket::Waiter(_) => panic!("first caller must lead"),
        };

        let mut receivers = Vec::new();
        for _ in 0..3 {
            match guard.acquire() {
                RenewalTicket::Waiter(rx) => receivers.push(rx),
                RenewalTicket::Leader(_) => panic!("guard is in flight, must queue"),
            }
        }

        lease.settle(&Ok(pair()));

        for rx in receivers {
            let outcome = rx.await.expect("waiter resumed");
            assert!(outcome.is_ok());
        }
        assert!(!guard.is_in_flight());
    }

    #[tokio::test]
    async fn test_failure_rejects_every_waiter() {
        let guard = RenewalGuard::new();
        let lease = match guard.acquire() {
            RenewalTicket::Leader(lease) => lease,
            RenewalTicket::Waiter(_) => panic!("first caller must lead"),
        };
        let rx = match guard.acquire() {
            RenewalTicket::Waiter(rx) => rx,
            RenewalTicket::Leader(_) => panic!("guard is in flight, must queue"),
        };

        lease.settle(&Err(RenewalError::Rejected("revoked".into())));

        let outcome = rx.await.expect("waiter resumed");
        assert_eq!(outcome, Err(RenewalError::Rejected("revoked".into())));
    }

    #[tokio::test]
    async fn test_dropped_lease_rejects_waiters() {
        let guard = RenewalGuard::new();
        let lease = match guard.acquire() {
            RenewalTicket::Leader(lease) => lease,
            RenewalTicket::Waiter(_) => panic!("first caller must lead"),
        };
        let rx = match guard.acquire() {
            RenewalTicket::Waiter(rx) => rx,
            RenewalTicket::Leader(_) => panic!("guard is in flight, must queue"),
        };

        drop(lease);

        let outcome = rx.await.expect("waiter resumed");
        assert_eq!(outcome, Err(RenewalError::Interrupted));
        // Guard is reusable after an interrupted renewal.
        assert!(matches!(guard.acquire(), RenewalTicket::Leader(_)));
    }
}
