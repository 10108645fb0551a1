//! Confirmation waiter: blocks until a submitted operation is durable.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::WaitTimeout;
use crate::ledger::{LedgerClient, PendingHandle};

/// Default confirmation depth at which a creation counts as durable.
pub const DEFAULT_REQUIRED_DEPTH: u64 = 1;
/// Default interval between depth polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default upper bound on a single confirmation wait.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(180);

/// Poll/timeout policy for a confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    /// Depth at which an operation counts as durable.
    pub required_depth: u64,
    /// Interval between depth polls.
    pub poll_interval: Duration,
    /// Hard bound on the total wait. The only timeout boundary in the
    /// system.
    pub max_wait: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            required_depth: DEFAULT_REQUIRED_DEPTH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl ConfirmPolicy {
    /// Same policy with a different required depth.
    pub fn with_depth(self, required_depth: u64) -> Self {
        Self {
            required_depth,
            ..self
        }
    }
}

/// Receipt returned once an operation reached the required depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfirmedReceipt {
    /// Depth observed on the poll that satisfied the policy.
    pub depth: u64,
    /// Time spent waiting.
    pub waited: Duration,
}

/// Poll the ledger until `tx` reaches `policy.required_depth`.
///
/// Returns as soon as a poll satisfies the policy and never polls again
/// after that. Once `max_wait` has elapsed the wait fails with
/// [`WaitTimeout`] without polling again. Depth query errors are treated
/// as "not yet" and retried until the deadline.
pub async fn wait_for_depth<C: LedgerClient>(
    ledger: &C,
    tx: &PendingHandle,
    policy: &ConfirmPolicy,
) -> Result<ConfirmedReceipt, WaitTimeout> {
    let started = Instant::now();

    loop {
        let waited = started.elapsed();
        if waited >= policy.max_wait {
            return Err(WaitTimeout {
                handle: tx.clone(),
                required: policy.required_depth,
                waited,
            });
        }

        match ledger.confirmation_depth(tx).await {
            Ok(depth) if depth >= policy.required_depth => {
                let waited = started.elapsed();
                tracing::debug!(%tx, depth, ?waited, "Operation confirmed");
                return Ok(ConfirmedReceipt { depth, waited });
            }
            Ok(depth) => {
                tracing::trace!(%tx, depth, required = policy.required_depth, "Not yet durable");
            }
            Err(e) => {
                tracing::trace!(%tx, error = %e, "Depth query failed, retrying...");
            }
        }

        tokio::time::sleep(policy.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use alloy_core::primitives::Address;
    use anyhow::Result;
    use serde_json::Value;

    use super::*;
    use crate::ledger::PendingCreate;

    /// Ledger stub that replays a fixed sequence of depth readings; the
    /// last reading repeats once the script is exhausted.
    struct DepthScript {
        depths: Mutex<VecDeque<u64>>,
        polls: Mutex<u64>,
    }

    impl DepthScript {
        fn new(depths: &[u64]) -> Self {
            Self {
                depths: Mutex::new(depths.iter().copied().collect()),
                polls: Mutex::new(0),
            }
        }

        fn polls(&self) -> u64 {
            *self.polls.lock().unwrap()
        }
    }

    impl LedgerClient for DepthScript {
        async fn submit_create(&self, _contract: &str, _args: &[Value]) -> Result<PendingCreate> {
            unimplemented!("not used by waiter tests")
        }

        async fn submit_call(&self, _target: Address, _method: &str, _args: &[Value]) -> Result<PendingHandle> {
            unimplemented!("not used by waiter tests")
        }

        async fn confirmation_depth(&self, _tx: &PendingHandle) -> Result<u64> {
            *self.polls.lock().unwrap() += 1;
            let mut depths = self.depths.lock().unwrap();
            if depths.len() > 1 {
                Ok(depths.pop_front().unwrap())
            } else {
                Ok(depths.front().copied().unwrap_or(0))
            }
        }
    }

    fn policy(required_depth: u64, poll_secs: u64, max_secs: u64) -> ConfirmPolicy {
        ConfirmPolicy {
            required_depth,
            poll_interval: Duration::from_secs(poll_secs),
            max_wait: Duration::from_secs(max_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_on_required_depth_and_stops_polling() {
        let ledger = DepthScript::new(&[0, 1, 3]);
        let tx = PendingHandle::from("0xabc");

        let receipt = wait_for_depth(&ledger, &tx, &policy(3, 1, 60)).await.unwrap();

        assert_eq!(receipt.depth, 3);
        assert_eq!(ledger.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deeper_than_required_is_still_success() {
        let ledger = DepthScript::new(&[7]);
        let tx = PendingHandle::from("0xabc");

        let receipt = wait_for_depth(&ledger, &tx, &policy(3, 1, 60)).await.unwrap();

        assert_eq!(receipt.depth, 7);
        assert_eq!(ledger.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_on_a_fresh_poll_just_before_the_deadline() {
        // Polls land at t=0s, 10s, 20s against a 25s bound; the reading at
        // 20s satisfies the policy.
        let ledger = DepthScript::new(&[4, 4, 5]);
        let tx = PendingHandle::from("0xabc");

        let receipt = wait_for_depth(&ledger, &tx, &policy(5, 10, 25)).await.unwrap();

        assert_eq!(receipt.depth, 5);
        assert!(receipt.waited < Duration::from_secs(25));
        assert_eq!(ledger.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_once_max_wait_elapses() {
        // Depth would satisfy the policy on the poll after the deadline;
        // the deadline check wins and that poll never happens.
        let ledger = DepthScript::new(&[4, 4, 4, 5]);
        let tx = PendingHandle::from("0xabc");

        let err = wait_for_depth(&ledger, &tx, &policy(5, 10, 25)).await.unwrap_err();

        assert_eq!(err.required, 5);
        assert!(err.waited >= Duration::from_secs(25));
        assert_eq!(ledger.polls(), 3);
    }
}
