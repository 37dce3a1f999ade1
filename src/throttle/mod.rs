//! Sliding-window + burst admission control.
//!
//! [`ThrottleController`] keeps one window per endpoint policy pattern.
//! Each window holds the admission timestamps still inside
//! `policy.window`; records older than that are pruned on every decision
//! and never counted.
//!
//! # Decision
//!
//! A request is admitted iff, after pruning:
//! - fewer than `max_requests_per_window` records remain, and
//! - fewer than `burst_limit` records fall inside the last `burst_window`, and
//! - the pattern is not cooling down from an earlier burst violation.
//!
//! Otherwise the caller is told how long to wait. Window exhaustion waits
//! until the oldest record leaves the window. A burst violation waits until
//! the burst sub-window rolls, plus `cooldown`, and puts the whole pattern
//! in cooldown for that long. When both limits are hit, the larger wait
//! applies.
//!
//! # Queueing
//!
//! [`ThrottleController::acquire()`] suspends the caller until it is
//! admitted. Waiters of one pattern form a queue ordered by priority
//! (high first) and then arrival order; only the head of the queue may take
//! free capacity. Waiting uses `tokio::time::sleep` and a `Notify`, never a
//! busy loop, and no lock is held while suspended.
//!
//! State is per process. Distributed runners must divide limits between
//! processes themselves.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::types::{EndpointPolicy, Priority};
use crate::{HeimdallError, Result};

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// `max_requests_per_window` reached.
    Window,
    /// `burst_limit` reached inside `burst_window`.
    Burst,
    /// Penalty period after a burst violation.
    Cooldown,
    /// Capacity is free but queued waiters go first.
    Queued,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied {
        retry_after: Duration,
        reason: DenyReason,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Successful [`ThrottleController::acquire()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    /// Time spent suspended before admission.
    pub waited: Duration,
    /// Whether the caller was denied at least once.
    pub throttled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Ticket {
    rank: Reverse<Priority>,
    seq: u64,
}

#[derive(Debug, Default)]
struct WindowState {
    records: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
    queue: BTreeSet<Ticket>,
    next_seq: u64,
}

impl WindowState {
    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.records.front() {
            if now.duration_since(oldest) >= window {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    /// Check capacity without recording anything (cooldown state aside).
    fn evaluate(
        &mut self,
        policy: &EndpointPolicy,
        now: Instant,
    ) -> std::result::Result<(), (Duration, DenyReason)> {
        self.prune(policy.window, now);

        if let Some(until) = self.cooldown_until {
            if now < until {
                return Err((until - now, DenyReason::Cooldown));
            }
            self.cooldown_until = None;
        }

        // A zero limit admits nothing useful; treat it as one.
        let max_requests = (policy.max_requests_per_window as usize).max(1);
        let window_wait = if self.records.len() >= max_requests {
            self.records
                .front()
                .map(|&oldest| (oldest + policy.window).saturating_duration_since(now))
        } else {
            None
        };

        let burst_limit = (policy.burst_limit as usize).max(1);
        let in_burst = self
            .records
            .iter()
            .rev()
            .take_while(|&&t| now.duration_since(t) < policy.burst_window)
            .count();
        let burst_wait = if in_burst >= burst_limit {
            let oldest_in_burst = self.records[self.records.len() - burst_limit];
            Some(
                (oldest_in_burst + policy.burst_window).saturating_duration_since(now)
                    + policy.cooldown,
            )
        } else {
            None
        };

        match (window_wait, burst_wait) {
            (None, None) => Ok(()),
            (window_wait, Some(burst_wait)) => {
                let wait = burst_wait.max(window_wait.unwrap_or_default());
                if !policy.cooldown.is_zero() {
                    self.cooldown_until = Some(now + wait);
                }
                Err((wait, DenyReason::Burst))
            }
            (Some(window_wait), None) => Err((window_wait, DenyReason::Window)),
        }
    }

    fn is_head(&self, ticket: &Ticket) -> bool {
        self.queue.first() == Some(ticket)
    }
}

#[derive(Debug, Default)]
struct EndpointWindow {
    state: Mutex<WindowState>,
    notify: Notify,
}

impl EndpointWindow {
    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Removes an abandoned ticket from the queue and wakes the others.
struct QueueTicket {
    window: Arc<EndpointWindow>,
    ticket: Ticket,
    admitted: bool,
}

impl QueueTicket {
    fn enqueue(window: Arc<EndpointWindow>, priority: Priority) -> Self {
        let ticket = {
            let mut state = window.lock();
            let ticket = Ticket {
                rank: Reverse(priority),
                seq: state.next_seq,
            };
            state.next_seq += 1;
            state.queue.insert(ticket);
            ticket
        };
        Self {
            window,
            ticket,
            admitted: false,
        }
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        self.window.lock().queue.remove(&self.ticket);
        self.window.notify.notify_waiters();
    }
}

/// Per-pattern sliding-window throttle.
pub struct ThrottleController {
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, Arc<EndpointWindow>>>,
}

impl ThrottleController {
    /// Create a controller reading time from `clock`.
    ///
    /// [`acquire()`](Self::acquire) sleeps on tokio's timer, so the clock
    /// must advance with tokio time (e.g. [`SystemClock`](crate::SystemClock)).
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Single non-blocking admission check.
    ///
    /// Records the admission on success. While callers are queued in
    /// [`acquire()`](Self::acquire) for the same pattern, free capacity
    /// belongs to them and this returns [`DenyReason::Queued`].
    pub fn admit(&self, policy: &EndpointPolicy) -> Admission {
        let window = self.window(&policy.pattern);
        let mut state = window.lock();
        let now = self.clock.now();
        match state.evaluate(policy, now) {
            Err((retry_after, reason)) => Admission::Denied {
                retry_after,
                reason,
            },
            Ok(()) if !state.queue.is_empty() => Admission::Denied {
                retry_after: Duration::ZERO,
                reason: DenyReason::Queued,
            },
            Ok(()) => {
                state.records.push_back(now);
                Admission::Allowed
            }
        }
    }

    /// Suspend until admitted under `policy`.
    ///
    /// Waiters are served by `priority`, then arrival order. Fails with
    /// [`HeimdallError::AdmissionTimeout`] once `max_wait` has elapsed
    /// without admission. Dropping the returned future leaves the queue
    /// cleanly. An invalid `policy` fails with
    /// [`HeimdallError::Configuration`] before queueing.
    pub async fn acquire(
        &self,
        policy: &EndpointPolicy,
        priority: Priority,
        max_wait: Option<Duration>,
    ) -> Result<Admitted> {
        policy.validate()?;
        let window = self.window(&policy.pattern);
        let start = self.clock.now();
        let deadline = max_wait.map(|d| start + d);
        let mut ticket = QueueTicket::enqueue(Arc::clone(&window), priority);
        let mut throttled = false;

        loop {
            // Registered before the check so a wake-up between check and
            // sleep is not lost.
            let notified = window.notify.notified();

            let wait = {
                let mut state = window.lock();
                let now = self.clock.now();
                match state.evaluate(policy, now) {
                    Ok(()) if state.is_head(&ticket.ticket) => {
                        state.records.push_back(now);
                        state.queue.remove(&ticket.ticket);
                        ticket.admitted = true;
                        drop(state);
                        window.notify.notify_waiters();
                        return Ok(Admitted {
                            waited: now.saturating_duration_since(start),
                            throttled,
                        });
                    }
                    // Someone ahead will take this slot; re-check when notified.
                    Ok(()) => policy.burst_window,
                    Err((retry_after, reason)) => {
                        debug!(
                            pattern = %policy.pattern,
                            priority = %priority,
                            ?reason,
                            retry_after_ms = retry_after.as_millis() as u64,
                            "admission denied"
                        );
                        retry_after
                    }
                }
            };
            throttled = true;

            let mut sleep_for = wait;
            if let Some(deadline) = deadline {
                let now = self.clock.now();
                if now >= deadline {
                    let waited = now.saturating_duration_since(start);
                    warn!(
                        pattern = %policy.pattern,
                        waited_ms = waited.as_millis() as u64,
                        "admission timed out"
                    );
                    return Err(HeimdallError::AdmissionTimeout {
                        endpoint: policy.pattern.clone(),
                        waited,
                    });
                }
                sleep_for = sleep_for.min(deadline - now);
            }

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// Records currently inside the window for `policy`.
    pub fn occupancy(&self, policy: &EndpointPolicy) -> usize {
        let window = self.window(&policy.pattern);
        let mut state = window.lock();
        state.prune(policy.window, self.clock.now());
        state.records.len()
    }

    /// Callers queued in [`acquire()`](Self::acquire) for `pattern`.
    pub fn queued(&self, pattern: &str) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(pattern)
            .map(|w| w.lock().queue.len())
            .unwrap_or(0)
    }

    /// Forget all window history.
    pub fn reset(&self) {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn window(&self, pattern: &str) -> Arc<EndpointWindow> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(windows.entry(pattern.to_owned()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max: u32, window_ms: u64) -> EndpointPolicy {
        EndpointPolicy::new("/t", max, Duration::from_millis(window_ms))
    }

    #[test]
    fn prune_drops_records_at_window_boundary() {
        let now = Instant::now();
        let mut state = WindowState::default();
        state.records.push_back(now);
        state.prune(Duration::from_secs(1), now + Duration::from_secs(1));
        assert!(state.records.is_empty());
    }

    #[test]
    fn window_denial_waits_for_oldest_record() {
        let now = Instant::now();
        let mut state = WindowState::default();
        state.records.push_back(now);
        state.records.push_back(now + Duration::from_millis(100));

        let verdict = state.evaluate(&policy(2, 1000), now + Duration::from_millis(200));
        assert_eq!(
            verdict,
            Err((Duration::from_millis(800), DenyReason::Window))
        );
    }

    #[test]
    fn combined_violation_takes_the_larger_wait() {
        let now = Instant::now();
        let mut state = WindowState::default();
        state.records.push_back(now);
        state.records.push_back(now);
        let policy = policy(2, 1000)
            .burst(2, Duration::from_millis(500))
            .cooldown(Duration::from_millis(2000));

        let (wait, reason) = state.evaluate(&policy, now).unwrap_err();
        assert_eq!(reason, DenyReason::Burst);
        assert_eq!(wait, Duration::from_millis(2500));
        assert_eq!(state.cooldown_until, Some(now + Duration::from_millis(2500)));
    }

    #[test]
    fn ticket_order_is_priority_then_arrival() {
        let low_first = Ticket {
            rank: Reverse(Priority::Low),
            seq: 0,
        };
        let high_later = Ticket {
            rank: Reverse(Priority::High),
            seq: 1,
        };
        let high_latest = Ticket {
            rank: Reverse(Priority::High),
            seq: 2,
        };
        assert!(high_later < low_first);
        assert!(high_later < high_latest);
    }
}
