//! Transaction Dispatcher
//!
//! Owns the lifecycle of every submitted action: queueing, rate limiting,
//! per-class concurrency, retries with backoff, timeouts and backpressure.
//!
//! The dispatcher performs no I/O. [`TransactionDispatcher::poll`] hands out
//! [`Launch`]es for the caller to execute against the signer, and results are
//! fed back with [`TransactionDispatcher::on_result`]. Every transition is
//! reported as a [`DispatchEvent`].
//!
//! ## Class rules
//!
//! - Move: one in flight, FIFO, oldest queued entries coalesced under pressure
//! - Combat (Shoot/Kill): up to `combat_concurrency` in flight, never dropped
//! - Lifecycle (Register/EndGame): one in flight, launched first

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::chain::action::{ActionClass, ActionPayload, GameAction};
use crate::chain::limiter::TokenBucket;
use crate::chain::signer::{SessionHandle, Signature, SignerError};

// =============================================================================
// Configuration
// =============================================================================

/// Dispatcher tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// First retry delay; doubles each retry
    pub backoff_base_ms: u64,
    /// Combat submissions allowed in flight at once
    pub combat_concurrency: usize,
    /// Non-terminal entries before queued Moves are coalesced
    pub max_queue_depth: usize,
    /// Sustained launches per second
    pub rate_limit_per_sec: f64,
    /// Launch burst size
    pub rate_limit_burst: u32,
    /// Deadline from first launch to confirmation
    pub submit_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 250,
            combat_concurrency: 3,
            max_queue_depth: 50,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 10,
            submit_timeout_ms: 15_000,
        }
    }
}

impl DispatchConfig {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    /// Submission deadline.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    fn class_limit(&self, class: ActionClass) -> usize {
        if class.is_ordering_sensitive() {
            1
        } else {
            self.combat_concurrency.max(1)
        }
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Dispatcher-assigned transaction id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Externally visible status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Queued, in flight, or waiting to retry
    Pending,
    /// Confirmed with a signature
    Confirmed,
    /// Gave up
    Failed,
}

impl TxStatus {
    /// Confirmed or Failed.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

/// Why a transaction failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    /// Signer reported a permanent error, or retries ran out
    #[error("{0}")]
    Signer(SignerError),

    /// No confirmation within the submission deadline
    #[error("timed out")]
    Timeout,

    /// The session bound at acceptance was gone at launch
    #[error("session inactive at launch")]
    SessionInactive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Queued,
    InFlight { attempt: u32 },
    Backoff { until: Instant },
}

/// One submitted action and its progress.
#[derive(Clone, Debug)]
pub struct PendingTransaction {
    /// Transaction id
    pub id: TxId,
    /// The action
    pub action: GameAction,
    /// When the dispatcher accepted it
    pub submitted_at: Instant,
    /// Current status
    pub status: TxStatus,
    /// Signature, once confirmed
    pub signature: Option<Signature>,
    /// Retries performed so far
    pub retry_count: u32,
    /// Failure cause, once failed
    pub failure: Option<FailureReason>,
    /// When it reached a terminal status
    pub resolved_at: Option<Instant>,
    first_launch_at: Option<Instant>,
    phase: Phase,
    session: SessionHandle,
}

impl PendingTransaction {
    /// Dispatch class.
    pub fn class(&self) -> ActionClass {
        self.action.class()
    }

    /// Currently awaiting a signer result?
    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase, Phase::InFlight { .. })
    }

    /// Time from acceptance to resolution.
    pub fn latency(&self) -> Option<Duration> {
        self.resolved_at.map(|t| t.saturating_duration_since(self.submitted_at))
    }

    fn occupies_slot(&self) -> bool {
        matches!(self.phase, Phase::InFlight { .. } | Phase::Backoff { .. })
    }

    fn resolve(&mut self, status: TxStatus, now: Instant) {
        debug_assert!(!self.status.is_terminal(), "{} resolved twice", self.id);
        debug_assert!(status.is_terminal());
        self.status = status;
        self.resolved_at = Some(now);
    }
}

/// Work for the caller: submit `payload` through `session`, then report back
/// with [`TransactionDispatcher::on_result`] quoting `id` and `attempt`.
#[derive(Debug, Clone)]
pub struct Launch {
    /// Transaction id
    pub id: TxId,
    /// Attempt number, starting at 1
    pub attempt: u32,
    /// Session bound at acceptance
    pub session: SessionHandle,
    /// Payload to sign
    pub payload: ActionPayload,
}

/// Signer result for a launch.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Transaction id
    pub id: TxId,
    /// Attempt the result belongs to
    pub attempt: u32,
    /// Outcome
    pub result: Result<Signature, SignerError>,
}

/// Dispatcher transitions.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// Entered the queue
    Accepted {
        /// Transaction id
        id: TxId,
        /// The action
        action: GameAction,
    },
    /// Handed to the signer
    Launched {
        /// Transaction id
        id: TxId,
        /// Attempt number
        attempt: u32,
    },
    /// Transient failure, will relaunch after a delay
    Retrying {
        /// Transaction id
        id: TxId,
        /// Retries so far, including this one
        retry_count: u32,
        /// What went wrong
        error: SignerError,
        /// Delay before relaunch
        delay: Duration,
    },
    /// Confirmed (terminal)
    Confirmed(PendingTransaction),
    /// Failed (terminal)
    Failed(PendingTransaction),
    /// Dropped from the queue in favour of a newer Move
    Coalesced {
        /// Dropped transaction
        id: TxId,
        /// The Move that superseded it
        superseded_by: TxId,
    },
    /// Removed by [`TransactionDispatcher::cancel_moves`]
    Cancelled {
        /// Transaction id
        id: TxId,
    },
}

/// Synchronous submission errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No session installed.
    #[error("no session")]
    NoSession,

    /// Session present but inactive.
    #[error("session inactive")]
    SessionInactive,

    /// Dispatcher closed by engine teardown.
    #[error("instance destroyed")]
    Destroyed,
}

enum LaunchOutcome {
    Launched,
    Dropped,
    Throttled,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Queues, launches and tracks action submissions.
#[derive(Debug)]
pub struct TransactionDispatcher {
    config: DispatchConfig,
    program_id: String,
    /// Non-terminal entries only
    entries: BTreeMap<TxId, PendingTransaction>,
    /// Queued (never launched) entries per class, FIFO
    queues: [VecDeque<TxId>; 3],
    limiter: TokenBucket,
    next_id: u64,
    events: Vec<DispatchEvent>,
    closed: bool,
}

impl TransactionDispatcher {
    /// Create a dispatcher submitting to `program_id`.
    pub fn new(config: DispatchConfig, program_id: impl Into<String>) -> Self {
        let limiter = TokenBucket::new(config.rate_limit_per_sec, config.rate_limit_burst);
        Self {
            config,
            program_id: program_id.into(),
            entries: BTreeMap::new(),
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            limiter,
            next_id: 1,
            events: Vec::new(),
            closed: false,
        }
    }

    /// Configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Accept an action, binding it to `session`.
    pub fn submit(
        &mut self,
        action: GameAction,
        session: Option<&SessionHandle>,
        now: Instant,
    ) -> Result<TxId, DispatchError> {
        if self.closed {
            return Err(DispatchError::Destroyed);
        }
        let session = session.ok_or(DispatchError::NoSession)?;
        if !session.is_active() {
            return Err(DispatchError::SessionInactive);
        }

        let id = TxId(self.next_id);
        self.next_id += 1;
        let class = action.class();

        self.entries.insert(
            id,
            PendingTransaction {
                id,
                action: action.clone(),
                submitted_at: now,
                status: TxStatus::Pending,
                signature: None,
                retry_count: 0,
                failure: None,
                resolved_at: None,
                first_launch_at: None,
                phase: Phase::Queued,
                session: session.clone(),
            },
        );
        self.queues[class.index()].push_back(id);
        self.events.push(DispatchEvent::Accepted { id, action });

        self.enforce_depth();
        Ok(id)
    }

    /// Coalesce the oldest queued Moves while over the depth limit.
    ///
    /// The newest queued Move carries the latest position and is never
    /// dropped; older ones are superseded by it.
    fn enforce_depth(&mut self) {
        while self.entries.len() > self.config.max_queue_depth {
            let moves = &mut self.queues[ActionClass::Move.index()];
            let (victim, latest) = match (moves.front(), moves.back()) {
                (Some(&oldest), Some(&latest)) if oldest != latest => (oldest, latest),
                _ => {
                    warn!(
                        "Queue depth {} over limit {} with nothing to coalesce",
                        self.entries.len(),
                        self.config.max_queue_depth
                    );
                    return;
                }
            };
            moves.pop_front();
            self.entries.remove(&victim);
            debug!("Coalesced {} into {}", victim, latest);
            self.events.push(DispatchEvent::Coalesced { id: victim, superseded_by: latest });
        }
    }

    /// Launch whatever is allowed to go now.
    ///
    /// Due retries go before queued entries of the same class; classes are
    /// served in [`ActionClass::PRIORITY`] order. Stops at the first launch
    /// the rate limiter refuses.
    pub fn poll(&mut self, now: Instant) -> Vec<Launch> {
        let mut launches = Vec::new();
        if self.closed {
            return launches;
        }

        for class in ActionClass::PRIORITY {
            let due: Vec<TxId> = self
                .entries
                .values()
                .filter(|tx| tx.class() == class)
                .filter(|tx| matches!(tx.phase, Phase::Backoff { until } if until <= now))
                .map(|tx| tx.id)
                .collect();
            for id in due {
                if let LaunchOutcome::Throttled = self.try_launch(id, now, &mut launches) {
                    return launches;
                }
            }

            let limit = self.config.class_limit(class);
            while self.occupied(class) < limit {
                let Some(id) = self.queues[class.index()].pop_front() else {
                    break;
                };
                if let LaunchOutcome::Throttled = self.try_launch(id, now, &mut launches) {
                    self.queues[class.index()].push_front(id);
                    return launches;
                }
            }
        }

        launches
    }

    fn try_launch(&mut self, id: TxId, now: Instant, launches: &mut Vec<Launch>) -> LaunchOutcome {
        let active = match self.entries.get(&id) {
            Some(tx) => tx.session.is_active(),
            None => return LaunchOutcome::Dropped,
        };
        if !active {
            self.fail(id, FailureReason::SessionInactive, now);
            return LaunchOutcome::Dropped;
        }
        if !self.limiter.try_acquire(now) {
            debug!("Rate limited, next token in {:?}", self.limiter.time_until_available(now));
            return LaunchOutcome::Throttled;
        }

        let Some(tx) = self.entries.get_mut(&id) else {
            return LaunchOutcome::Dropped;
        };
        let attempt = tx.retry_count + 1;
        tx.phase = Phase::InFlight { attempt };
        tx.first_launch_at.get_or_insert(now);

        launches.push(Launch {
            id,
            attempt,
            session: tx.session.clone(),
            payload: ActionPayload::new(&self.program_id, &tx.action),
        });
        debug!("Launching {} ({}) attempt {}", id, tx.action.kind.name(), attempt);
        self.events.push(DispatchEvent::Launched { id, attempt });
        LaunchOutcome::Launched
    }

    /// Apply a signer result. Returns false if it was stale or unknown.
    pub fn on_result(
        &mut self,
        id: TxId,
        attempt: u32,
        result: Result<Signature, SignerError>,
        now: Instant,
    ) -> bool {
        let Some(tx) = self.entries.get_mut(&id) else {
            debug!("Ignoring result for settled {}", id);
            return false;
        };
        if tx.phase != (Phase::InFlight { attempt }) {
            debug!("Ignoring stale result for {} attempt {}", id, attempt);
            return false;
        }

        match result {
            Ok(signature) => {
                if let Some(mut tx) = self.entries.remove(&id) {
                    tx.signature = Some(signature);
                    tx.resolve(TxStatus::Confirmed, now);
                    self.events.push(DispatchEvent::Confirmed(tx));
                }
            }
            Err(error) if error.is_transient() && tx.retry_count < self.config.max_retries => {
                tx.retry_count += 1;
                let delay = self.config.backoff(tx.retry_count);
                tx.phase = Phase::Backoff { until: now + delay };
                debug!("Retrying {} in {:?} after {}", id, delay, error);
                self.events.push(DispatchEvent::Retrying {
                    id,
                    retry_count: tx.retry_count,
                    error,
                    delay,
                });
            }
            Err(error) => {
                self.fail(id, FailureReason::Signer(error), now);
            }
        }
        true
    }

    /// Fail launched entries past the submission deadline.
    pub fn check_timeouts(&mut self, now: Instant) {
        let timeout = self.config.submit_timeout();
        let expired: Vec<TxId> = self
            .entries
            .values()
            .filter(|tx| {
                tx.first_launch_at
                    .is_some_and(|t| now.saturating_duration_since(t) >= timeout)
            })
            .map(|tx| tx.id)
            .collect();

        for id in expired {
            warn!("{} timed out", id);
            self.fail(id, FailureReason::Timeout, now);
        }
    }

    fn fail(&mut self, id: TxId, reason: FailureReason, now: Instant) {
        let Some(mut tx) = self.entries.remove(&id) else {
            return;
        };
        self.queues[tx.class().index()].retain(|q| *q != id);
        debug!("{} ({}) failed: {}", id, tx.action.kind.name(), reason);
        tx.failure = Some(reason);
        tx.resolve(TxStatus::Failed, now);
        self.events.push(DispatchEvent::Failed(tx));
    }

    /// Drop Moves that are queued or waiting to retry. In-flight Moves are
    /// left to resolve. Returns how many were removed.
    pub fn cancel_moves(&mut self) -> usize {
        let mut cancelled: Vec<TxId> = self.queues[ActionClass::Move.index()].drain(..).collect();
        cancelled.extend(
            self.entries
                .values()
                .filter(|tx| tx.class() == ActionClass::Move)
                .filter(|tx| matches!(tx.phase, Phase::Backoff { .. }))
                .map(|tx| tx.id),
        );

        for &id in &cancelled {
            self.entries.remove(&id);
            self.events.push(DispatchEvent::Cancelled { id });
        }
        cancelled.len()
    }

    /// Refuse further submissions and launches.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Closed?
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Take the transitions recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<DispatchEvent> {
        std::mem::take(&mut self.events)
    }

    /// Non-terminal entries.
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Non-terminal entries of one class.
    pub fn pending_in_class(&self, class: ActionClass) -> usize {
        self.entries.values().filter(|tx| tx.class() == class).count()
    }

    /// Entries of one class awaiting a signer result.
    pub fn in_flight(&self, class: ActionClass) -> usize {
        self.entries
            .values()
            .filter(|tx| tx.class() == class && tx.is_in_flight())
            .count()
    }

    /// Non-terminal entries in id order.
    pub fn pending(&self) -> impl Iterator<Item = &PendingTransaction> {
        self.entries.values()
    }

    /// Look up a non-terminal entry.
    pub fn get(&self, id: TxId) -> Option<&PendingTransaction> {
        self.entries.get(&id)
    }

    fn occupied(&self, class: ActionClass) -> usize {
        self.entries
            .values()
            .filter(|tx| tx.class() == class && tx.occupies_slot())
            .count()
    }
}
