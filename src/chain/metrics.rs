//! Metrics Aggregator
//!
//! Rolling performance statistics derived from dispatcher transitions.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Serialize, Deserialize};

use crate::chain::action::ActionKind;
use crate::chain::dispatcher::DispatchEvent;

/// Metrics tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Outcomes (and confirm latencies) kept for the rolling averages
    pub window: usize,
    /// Window for the confirmations-per-second figure
    pub tps_window_ms: u64,
    /// Terminal transactions kept in the live feed
    pub feed_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window: 20,
            tps_window_ms: 1000,
            feed_capacity: 50,
        }
    }
}

/// Snapshot pushed to the host after every dispatcher transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Move actions accepted
    pub moves_sent: u64,
    /// Shoot actions accepted
    pub shots_sent: u64,
    /// Mean accept-to-confirm latency over the window
    pub avg_confirm_ms: f64,
    /// Confirmed share of recent terminal outcomes, 0..=100
    pub success_rate_pct: f64,
    /// Non-terminal transactions
    pub pending_tx_count: usize,
    /// Confirmations in the trailing window, per second
    pub chain_speed_tps: f64,
}

impl Default for PerformanceStats {
    fn default() -> Self {
        Self {
            moves_sent: 0,
            shots_sent: 0,
            avg_confirm_ms: 0.0,
            success_rate_pct: 100.0,
            pending_tx_count: 0,
            chain_speed_tps: 0.0,
        }
    }
}

/// Folds dispatcher events into [`PerformanceStats`].
#[derive(Debug)]
pub struct MetricsAggregator {
    config: MetricsConfig,
    moves_sent: u64,
    shots_sent: u64,
    confirm_ms: VecDeque<f64>,
    outcomes: VecDeque<bool>,
    confirmed_at: VecDeque<Instant>,
    pending: usize,
    total_confirmed: u64,
    total_failed: u64,
}

impl MetricsAggregator {
    /// Empty aggregator.
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            moves_sent: 0,
            shots_sent: 0,
            confirm_ms: VecDeque::new(),
            outcomes: VecDeque::new(),
            confirmed_at: VecDeque::new(),
            pending: 0,
            total_confirmed: 0,
            total_failed: 0,
        }
    }

    /// Apply one transition. `pending` is the dispatcher's non-terminal count
    /// after the transition.
    pub fn record(&mut self, event: &DispatchEvent, pending: usize, now: Instant) {
        self.pending = pending;
        let window = self.config.window.max(1);

        match event {
            DispatchEvent::Accepted { action, .. } => match action.kind {
                ActionKind::Move { .. } => self.moves_sent += 1,
                ActionKind::Shoot { .. } => self.shots_sent += 1,
                ActionKind::Kill { .. } | ActionKind::Register { .. } | ActionKind::EndGame { .. } => {}
            },
            DispatchEvent::Confirmed(tx) => {
                let ms = tx.latency().unwrap_or_default().as_secs_f64() * 1000.0;
                push_bounded(&mut self.confirm_ms, ms, window);
                push_bounded(&mut self.outcomes, true, window);
                self.confirmed_at.push_back(now);
                self.total_confirmed += 1;
            }
            DispatchEvent::Failed(_) => {
                push_bounded(&mut self.outcomes, false, window);
                self.total_failed += 1;
            }
            DispatchEvent::Launched { .. }
            | DispatchEvent::Retrying { .. }
            | DispatchEvent::Coalesced { .. }
            | DispatchEvent::Cancelled { .. } => {}
        }

        let cutoff = self.tps_window();
        while let Some(&t) = self.confirmed_at.front() {
            if now.saturating_duration_since(t) >= cutoff {
                self.confirmed_at.pop_front();
            } else {
                break;
            }
        }
    }

    fn tps_window(&self) -> Duration {
        Duration::from_millis(self.config.tps_window_ms.max(1))
    }

    /// Current statistics.
    pub fn snapshot(&self, now: Instant) -> PerformanceStats {
        let avg_confirm_ms = if self.confirm_ms.is_empty() {
            0.0
        } else {
            self.confirm_ms.iter().sum::<f64>() / self.confirm_ms.len() as f64
        };

        let success_rate_pct = if self.outcomes.is_empty() {
            100.0
        } else {
            let ok = self.outcomes.iter().filter(|o| **o).count();
            (ok as f64 * 100.0 / self.outcomes.len() as f64).clamp(0.0, 100.0)
        };

        let window = self.tps_window();
        let recent = self
            .confirmed_at
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < window)
            .count();

        PerformanceStats {
            moves_sent: self.moves_sent,
            shots_sent: self.shots_sent,
            avg_confirm_ms,
            success_rate_pct,
            pending_tx_count: self.pending,
            chain_speed_tps: recent as f64 / window.as_secs_f64(),
        }
    }

    /// Lifetime confirmed count.
    pub fn total_confirmed(&self) -> u64 {
        self.total_confirmed
    }

    /// Lifetime failed count.
    pub fn total_failed(&self) -> u64 {
        self.total_failed
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    if queue.len() == cap {
        queue.pop_front();
    }
    queue.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use proptest::prelude::*;

    use crate::chain::action::{ActionPayload, Direction, GameAction};
    use crate::chain::dispatcher::{DispatchConfig, TransactionDispatcher};
    use crate::chain::signer::{SessionHandle, SessionSigner, Signature, SignerError};

    struct NullSigner;

    impl SessionSigner for NullSigner {
        fn submit(&self, _payload: ActionPayload) -> BoxFuture<'static, Result<Signature, SignerError>> {
            futures_util::future::pending().boxed()
        }

        fn is_active(&self) -> bool {
            true
        }
    }

    fn session() -> SessionHandle {
        SessionHandle::new(Arc::new(NullSigner))
    }

    fn shoot(seq: u64) -> GameAction {
        GameAction { sequence: seq, created_at_ms: 0, kind: ActionKind::Shoot { origin_x: 0.0, origin_y: 0.0 } }
    }

    fn mv(seq: u64) -> GameAction {
        GameAction {
            sequence: seq,
            created_at_ms: 0,
            kind: ActionKind::Move { direction: Direction::Left, x: 0.0, y: 0.0 },
        }
    }

    fn pump(d: &mut TransactionDispatcher, m: &mut MetricsAggregator, now: Instant) {
        for event in d.drain_events() {
            m.record(&event, d.pending_count(), now);
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let m = MetricsAggregator::new(MetricsConfig::default());
        assert_eq!(m.snapshot(Instant::now()), PerformanceStats::default());
        assert_eq!(PerformanceStats::default().success_rate_pct, 100.0);
    }

    #[test]
    fn test_counts_and_latency() {
        let t0 = Instant::now();
        let s = session();
        let mut d = TransactionDispatcher::new(DispatchConfig::default(), "prog");
        let mut m = MetricsAggregator::new(MetricsConfig::default());

        let a = d.submit(shoot(1), Some(&s), t0).unwrap();
        let b = d.submit(shoot(2), Some(&s), t0).unwrap();
        d.submit(mv(3), Some(&s), t0).unwrap();
        d.poll(t0);
        pump(&mut d, &mut m, t0);

        let stats = m.snapshot(t0);
        assert_eq!(stats.shots_sent, 2);
        assert_eq!(stats.moves_sent, 1);
        assert_eq!(stats.pending_tx_count, 3);

        let t1 = t0 + Duration::from_millis(300);
        d.on_result(a, 1, Ok("sig-a".into()), t1);
        d.on_result(b, 1, Err(SignerError::Rejected("no".into())), t1);
        pump(&mut d, &mut m, t1);

        let stats = m.snapshot(t1);
        assert_eq!(stats.pending_tx_count, 1);
        assert!((stats.avg_confirm_ms - 300.0).abs() < 1.0);
        assert_eq!(stats.success_rate_pct, 50.0);
        assert_eq!(stats.chain_speed_tps, 1.0);

        // Confirmation falls out of the one-second window
        assert_eq!(m.snapshot(t1 + Duration::from_secs(1)).chain_speed_tps, 0.0);
        assert_eq!(m.total_confirmed(), 1);
        assert_eq!(m.total_failed(), 1);
    }

    #[test]
    fn test_success_rate_uses_recent_window() {
        let t0 = Instant::now();
        let s = session();
        let config = DispatchConfig {
            combat_concurrency: 100,
            rate_limit_per_sec: 1000.0,
            rate_limit_burst: 1000,
            ..DispatchConfig::default()
        };
        let mut d = TransactionDispatcher::new(config, "prog");
        let mut m = MetricsAggregator::new(MetricsConfig { window: 4, ..MetricsConfig::default() });

        let ids: Vec<_> = (1..=8).map(|i| d.submit(shoot(i), Some(&s), t0).unwrap()).collect();
        d.poll(t0);
        for id in &ids[..4] {
            d.on_result(*id, 1, Err(SignerError::Rejected("x".into())), t0);
        }
        for id in &ids[4..] {
            d.on_result(*id, 1, Ok("ok".into()), t0);
        }
        pump(&mut d, &mut m, t0);

        assert_eq!(m.snapshot(t0).success_rate_pct, 100.0);
    }

    proptest! {
        #[test]
        fn prop_stats_stay_in_range(outcomes in proptest::collection::vec((any::<bool>(), 0u64..5000), 0..120)) {
            let t0 = Instant::now();
            let s = session();
            let config = DispatchConfig {
                combat_concurrency: 1000,
                max_queue_depth: 1000,
                rate_limit_per_sec: 1_000_000.0,
                rate_limit_burst: 1000,
                ..DispatchConfig::default()
            };
            let mut d = TransactionDispatcher::new(config, "prog");
            let mut m = MetricsAggregator::new(MetricsConfig::default());

            let mut now = t0;
            for (i, (ok, delay)) in outcomes.into_iter().enumerate() {
                let id = d.submit(shoot(i as u64 + 1), Some(&s), now).unwrap();
                d.poll(now);
                pump(&mut d, &mut m, now);
                prop_assert_eq!(m.snapshot(now).pending_tx_count, d.pending_count());

                now += Duration::from_millis(delay);
                let result = if ok { Ok("sig".to_string()) } else { Err(SignerError::Rejected("r".into())) };
                d.on_result(id, 1, result, now);
                pump(&mut d, &mut m, now);

                let stats = m.snapshot(now);
                prop_assert!((0.0..=100.0).contains(&stats.success_rate_pct));
                prop_assert!(stats.avg_confirm_ms >= 0.0);
                prop_assert!(stats.chain_speed_tps >= 0.0);
                prop_assert_eq!(stats.pending_tx_count, d.pending_count());
            }
        }
    }
}
