//! Host callbacks.

use crate::chain::metrics::PerformanceStats;
use crate::engine::facade::EngineError;

/// Receives engine notifications. Every method defaults to a no-op.
pub trait EngineListener {
    /// Score changed.
    fn on_score_update(&mut self, _score: u32) {}

    /// Whole seconds of game time changed.
    fn on_game_time_update(&mut self, _seconds: u32) {}

    /// New performance snapshot.
    fn on_performance_update(&mut self, _stats: &PerformanceStats) {}

    /// The engine hit an unrecoverable error and is shutting down.
    fn on_fatal_error(&mut self, _error: &EngineError) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl EngineListener for NoopListener {}

/// Handle returned by subscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered set of listeners.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Box<dyn EngineListener>)>,
}

impl Listeners {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener.
    pub fn subscribe(&mut self, listener: Box<dyn EngineListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(lid, _)| *lid != id);
        self.entries.len() != before
    }

    /// Drop every listener.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number registered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// None registered?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn score(&mut self, score: u32) {
        for (_, l) in &mut self.entries {
            l.on_score_update(score);
        }
    }

    pub(crate) fn game_time(&mut self, seconds: u32) {
        for (_, l) in &mut self.entries {
            l.on_game_time_update(seconds);
        }
    }

    pub(crate) fn performance(&mut self, stats: &PerformanceStats) {
        for (_, l) in &mut self.entries {
            l.on_performance_update(stats);
        }
    }

    pub(crate) fn fatal(&mut self, error: &EngineError) {
        for (_, l) in &mut self.entries {
            l.on_fatal_error(error);
        }
    }
}
