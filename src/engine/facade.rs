//! Engine Facade
//!
//! The host-facing surface. Owns the simulation, the submission pipeline and
//! the listeners, and advances all of them from [`Engine::frame`].
//!
//! ## Frame order
//!
//! 1. Apply signer completions received since the last frame
//! 2. Expire timed-out transactions
//! 3. Run the ticks the clock hands out (input, physics, encoding)
//! 4. Flush the Move coalescing window
//! 5. Launch whatever the dispatcher allows
//! 6. Draw
//!
//! Signer calls run as tasks on the tokio runtime captured at construction.
//! Their results come back over a channel and are only applied inside
//! `frame`, so all engine state is mutated from one place.

use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::chain::action::{ActionKind, GameAction};
use crate::chain::dispatcher::{
    Completion, DispatchError, DispatchEvent, Launch, PendingTransaction, TransactionDispatcher, TxId, TxStatus,
};
use crate::chain::encoder::{ActionEncoder, EncodeError};
use crate::chain::feed::TransactionFeed;
use crate::chain::metrics::{MetricsAggregator, PerformanceStats};
use crate::chain::signer::SessionHandle;
use crate::core::hash::StateHash;
use crate::engine::clock::{ClockError, ClockState, SimulationClock};
use crate::engine::config::{ConfigError, EngineConfig};
use crate::engine::listener::{EngineListener, ListenerId, Listeners};
use crate::game::input::{InputRecording, InputSampler, Key};
use crate::game::render::{Canvas, Renderer};
use crate::game::state::{SimulationError, SimulationState};
use crate::game::tick::tick;

// =============================================================================
// Errors
// =============================================================================

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Used after destroy.
    #[error("instance destroyed")]
    Destroyed,

    /// Simulation invariant violated.
    #[error("simulation error: {0}")]
    Simulation(#[from] SimulationError),

    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Constructed outside a tokio runtime.
    #[error("no tokio runtime: {0}")]
    NoRuntime(String),
}

impl From<ClockError> for EngineError {
    fn from(e: ClockError) -> Self {
        match e {
            ClockError::Destroyed => EngineError::Destroyed,
        }
    }
}

/// Why a registration could not be submitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// Used after destroy.
    #[error("instance destroyed")]
    Destroyed,

    /// `set_player_name` was never called.
    #[error("player name not set")]
    NoName,

    /// Rejected locally.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Rejected by the dispatcher.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Outcome of a submitted registration.
#[derive(Debug)]
pub struct PendingRegistration {
    tx_id: TxId,
    rx: oneshot::Receiver<bool>,
}

impl PendingRegistration {
    /// Transaction carrying the registration.
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Resolves to true once confirmed, false if it failed or the engine
    /// was destroyed first.
    pub async fn wait(self) -> bool {
        self.rx.await.unwrap_or(false)
    }

    /// Non-blocking check.
    pub fn try_result(&mut self) -> Option<bool> {
        match self.rx.try_recv() {
            Ok(confirmed) => Some(confirmed),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(false),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Chain-mirrored shooter engine.
pub struct Engine {
    config: EngineConfig,
    clock: SimulationClock,
    state: SimulationState,
    sampler: InputSampler,
    recording: InputRecording,
    renderer: Renderer,
    canvas: Option<Box<dyn Canvas>>,
    session: Option<SessionHandle>,
    encoder: ActionEncoder,
    dispatcher: TransactionDispatcher,
    metrics: MetricsAggregator,
    feed: TransactionFeed,
    listeners: Listeners,
    runtime: Handle,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: Option<mpsc::UnboundedReceiver<Completion>>,
    player_name: Option<String>,
    registration: Option<(TxId, oneshot::Sender<bool>)>,
    stats: PerformanceStats,
    last_score: u32,
    last_seconds: u32,
}

impl Engine {
    /// Build an engine. Must be called from within a tokio runtime.
    pub fn new(
        config: EngineConfig,
        canvas: Box<dyn Canvas>,
        session: Option<SessionHandle>,
        listener: Box<dyn EngineListener>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| EngineError::NoRuntime(e.to_string()))?;
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let mut listeners = Listeners::new();
        listeners.subscribe(listener);

        info!(
            "Engine created (program {}, seed {:#x}, session {})",
            config.program_id,
            config.sim.seed,
            if session.is_some() { "present" } else { "none" }
        );

        Ok(Self {
            clock: SimulationClock::new(config.clock.clone()),
            state: SimulationState::new(&config.sim),
            sampler: InputSampler::new(),
            recording: InputRecording::new(),
            renderer: Renderer::new(),
            canvas: Some(canvas),
            session,
            encoder: ActionEncoder::new(config.encoder.clone(), Instant::now(), config.clock.tick_rate),
            dispatcher: TransactionDispatcher::new(config.dispatch.clone(), config.program_id.clone()),
            metrics: MetricsAggregator::new(config.metrics.clone()),
            feed: TransactionFeed::new(config.metrics.feed_capacity),
            listeners,
            runtime,
            completion_tx,
            completion_rx: Some(completion_rx),
            player_name: None,
            registration: None,
            stats: PerformanceStats::default(),
            last_score: 0,
            last_seconds: 0,
            config,
        })
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start or resume the simulation.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.clock.start()?;
        info!("Engine running at tick {}", self.state.tick);
        Ok(())
    }

    /// Freeze the simulation. Transactions keep flowing.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.clock.pause()?;
        self.sampler.release_all();
        info!("Engine paused at tick {}", self.state.tick);
        Ok(())
    }

    /// Tear down. In-flight signer calls are not aborted but their results
    /// are discarded. No listener is called afterwards. Idempotent.
    pub fn destroy(&mut self) {
        if self.clock.is_destroyed() {
            return;
        }
        self.clock.destroy();

        let cancelled = self.dispatcher.cancel_moves();
        self.dispatcher.close();
        self.dispatcher.drain_events();

        self.sampler.detach();
        self.canvas = None;
        self.completion_rx = None;
        self.registration = None;
        self.listeners.clear();

        info!(
            "Engine destroyed at tick {} ({} queued moves cancelled, {} still pending)",
            self.state.tick,
            cancelled,
            self.dispatcher.pending_count()
        );
    }

    /// Install, replace or clear the session.
    ///
    /// Transactions already accepted keep the session they were bound to.
    pub fn update_session(&mut self, session: Option<SessionHandle>) {
        if self.clock.is_destroyed() {
            return;
        }
        let changed = match (&self.session, &session) {
            (Some(old), Some(new)) => !old.same_session(new),
            (None, None) => false,
            _ => true,
        };
        if changed {
            if session.is_some() {
                self.encoder.reset_session();
                info!("Session installed");
            } else {
                self.encoder.drop_pending_move();
                info!("Session cleared");
            }
        }
        self.session = session;
    }

    /// Set the name used by [`Engine::register_player`].
    pub fn set_player_name(&mut self, name: &str) -> Result<(), EncodeError> {
        let name = self.encoder.validate_name(name)?;
        self.player_name = Some(name);
        Ok(())
    }

    /// Submit the Register action for the current player name.
    pub fn register_player(&mut self, now: Instant) -> Result<PendingRegistration, RegistrationError> {
        if self.clock.is_destroyed() {
            return Err(RegistrationError::Destroyed);
        }
        let name = self.player_name.clone().ok_or(RegistrationError::NoName)?;
        let action = self.encoder.register(&name, self.session_active(), now)?;

        let tx_id = match self.dispatcher.submit(action, self.session.as_ref(), now) {
            Ok(id) => id,
            Err(e) => {
                self.encoder.release_registration();
                return Err(e.into());
            }
        };

        let (tx, rx) = oneshot::channel();
        self.registration = Some((tx_id, tx));
        info!("Registering player {:?} as {}", name, tx_id);

        self.pump_dispatcher(now);
        Ok(PendingRegistration { tx_id, rx })
    }

    // -------------------------------------------------------------------------
    // Frame loop
    // -------------------------------------------------------------------------

    /// Host animation-frame hook.
    pub fn frame(&mut self, now: Instant) -> Result<(), EngineError> {
        if self.clock.is_destroyed() {
            return Err(EngineError::Destroyed);
        }

        self.apply_completions(now);
        self.dispatcher.check_timeouts(now);
        self.process_dispatch_events(now);

        let ticks = self.clock.advance(now);
        for _ in 0..ticks {
            if let Err(e) = self.step(now) {
                return Err(self.fatal(e.into()));
            }
        }

        if let Some(action) = self.encoder.flush_moves(now) {
            self.submit(action, now);
        }
        self.pump_dispatcher(now);
        self.stats = self.metrics.snapshot(now);

        self.render();
        Ok(())
    }

    fn step(&mut self, now: Instant) -> Result<(), SimulationError> {
        let input = self.sampler.sample();
        let before = self.state.tick;
        let result = tick(&mut self.state, input, &self.config.sim)?;
        if self.state.tick != before {
            self.recording.record(self.state.tick, input);
        }

        let active = self.session_active();
        for event in &result.events {
            if let Some(action) = self.encoder.encode(event, active, now) {
                self.submit(action, now);
            }
        }

        if self.state.score != self.last_score {
            self.last_score = self.state.score;
            self.listeners.score(self.state.score);
        }
        let seconds = self.state.elapsed_seconds(self.clock.tick_rate());
        if seconds != self.last_seconds {
            self.last_seconds = seconds;
            self.listeners.game_time(seconds);
        }
        if result.game_over && self.state.tick == before + 1 {
            info!("Game over at tick {} with score {}", self.state.tick, self.state.score);
        }
        Ok(())
    }

    fn fatal(&mut self, err: EngineError) -> EngineError {
        error!("Fatal engine error: {}", err);
        self.listeners.fatal(&err);
        self.destroy();
        err
    }

    fn submit(&mut self, action: GameAction, now: Instant) {
        let name = action.kind.name();
        match self.dispatcher.submit(action, self.session.as_ref(), now) {
            Ok(id) => debug!("Queued {} as {}", name, id),
            Err(e) => debug!("Dropped {}: {}", name, e),
        }
    }

    fn apply_completions(&mut self, now: Instant) {
        let Some(rx) = self.completion_rx.as_mut() else {
            return;
        };
        while let Ok(completion) = rx.try_recv() {
            self.dispatcher
                .on_result(completion.id, completion.attempt, completion.result, now);
        }
    }

    /// Report transitions, launch what is allowed, report again.
    fn pump_dispatcher(&mut self, now: Instant) {
        self.process_dispatch_events(now);
        for launch in self.dispatcher.poll(now) {
            self.spawn_launch(launch);
        }
        self.process_dispatch_events(now);
    }

    fn spawn_launch(&self, launch: Launch) {
        let Launch { id, attempt, session, payload } = launch;
        let sender = self.completion_tx.clone();
        let call = session.submit(payload);
        self.runtime.spawn(async move {
            let result = call.await;
            // Receiver is gone after destroy
            let _ = sender.send(Completion { id, attempt, result });
        });
    }

    fn process_dispatch_events(&mut self, now: Instant) {
        for event in self.dispatcher.drain_events() {
            match &event {
                DispatchEvent::Confirmed(tx) => {
                    debug!("{} ({}) confirmed", tx.id, tx.action.kind.name());
                    self.archive(tx);
                }
                DispatchEvent::Failed(tx) => {
                    warn!(
                        "{} ({}) failed after {} retries: {}",
                        tx.id,
                        tx.action.kind.name(),
                        tx.retry_count,
                        tx.failure.as_ref().map(|f| f.to_string()).unwrap_or_default()
                    );
                    self.archive(tx);
                }
                DispatchEvent::Coalesced { id, superseded_by } => {
                    debug!("{} coalesced into {}", id, superseded_by);
                }
                _ => {}
            }

            self.metrics.record(&event, self.dispatcher.pending_count(), now);
            self.stats = self.metrics.snapshot(now);
            self.listeners.performance(&self.stats);
        }
    }

    fn archive(&mut self, tx: &PendingTransaction) {
        self.feed.push(tx);

        if !matches!(tx.action.kind, ActionKind::Register { .. }) {
            return;
        }
        let confirmed = tx.status == TxStatus::Confirmed;
        if !confirmed {
            self.encoder.release_registration();
        }
        let awaited = matches!(&self.registration, Some((id, _)) if *id == tx.id);
        if awaited {
            if let Some((_, waiter)) = self.registration.take() {
                let _ = waiter.send(confirmed);
            }
        }
    }

    fn render(&mut self) {
        let paused = self.clock.is_paused();
        if !(paused || self.clock.is_running()) {
            return;
        }
        if let Some(canvas) = self.canvas.as_mut() {
            self.renderer
                .draw(canvas.as_mut(), &self.state, self.clock.tick_rate(), paused);
        }
    }

    fn session_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active())
    }

    // -------------------------------------------------------------------------
    // Input
    // -------------------------------------------------------------------------

    /// Key pressed.
    pub fn key_down(&mut self, key: Key) {
        self.sampler.key_down(key);
    }

    /// Key released.
    pub fn key_up(&mut self, key: Key) {
        self.sampler.key_up(key);
    }

    /// DOM `KeyboardEvent.code` variant of key_down/key_up. Returns false for
    /// keys the game does not use.
    pub fn key_event(&mut self, code: &str, pressed: bool) -> bool {
        match Key::from_code(code) {
            Some(key) if pressed => {
                self.key_down(key);
                true
            }
            Some(key) => {
                self.key_up(key);
                true
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Listeners & queries
    // -------------------------------------------------------------------------

    /// Add a listener.
    pub fn subscribe(&mut self, listener: Box<dyn EngineListener>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// Remove a listener.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Latest performance snapshot.
    pub fn stats(&self) -> PerformanceStats {
        self.stats.clone()
    }

    /// Recent terminal transactions.
    pub fn transaction_feed(&self) -> &TransactionFeed {
        &self.feed
    }

    /// Non-terminal transactions.
    pub fn pending_transactions(&self) -> impl Iterator<Item = &PendingTransaction> {
        self.dispatcher.pending()
    }

    /// Simulation state.
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Hash of the simulation state.
    pub fn state_hash(&self) -> StateHash {
        self.state.compute_hash()
    }

    /// Inputs applied so far, for replay.
    pub fn recording(&self) -> &InputRecording {
        &self.recording
    }

    /// Clock state.
    pub fn clock_state(&self) -> ClockState {
        self.clock.state()
    }

    /// Destroyed?
    pub fn is_destroyed(&self) -> bool {
        self.clock.is_destroyed()
    }

    /// Current session, if any.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Gameplay events dropped because no session was active.
    pub fn suppressed_events(&self) -> u64 {
        self.encoder.suppressed_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;

    use crate::chain::action::{ActionClass, ActionPayload, Direction};
    use crate::chain::signer::{SessionSigner, Signature, SignerError};
    use crate::game::render::{Color, CommandCanvas, DrawCommand};
    use crate::game::tick::replay;

    type Reply = oneshot::Sender<Result<Signature, SignerError>>;

    /// Signer whose calls stay pending until the test answers them.
    struct MockSigner {
        active: AtomicBool,
        calls: Mutex<Vec<(ActionPayload, Reply)>>,
    }

    impl MockSigner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                active: AtomicBool::new(true),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn take_calls(&self) -> Vec<(ActionPayload, Reply)> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl SessionSigner for MockSigner {
        fn submit(&self, payload: ActionPayload) -> BoxFuture<'static, Result<Signature, SignerError>> {
            let (tx, rx) = oneshot::channel();
            self.calls.lock().unwrap().push((payload, tx));
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(SignerError::Network("reply dropped".into())))
            }
            .boxed()
        }

        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct Log {
        scores: Vec<u32>,
        seconds: Vec<u32>,
        stats: Vec<PerformanceStats>,
        fatal: Vec<String>,
    }

    struct Recorder(Arc<Mutex<Log>>);

    impl EngineListener for Recorder {
        fn on_score_update(&mut self, score: u32) {
            self.0.lock().unwrap().scores.push(score);
        }

        fn on_game_time_update(&mut self, seconds: u32) {
            self.0.lock().unwrap().seconds.push(seconds);
        }

        fn on_performance_update(&mut self, stats: &PerformanceStats) {
            self.0.lock().unwrap().stats.push(stats.clone());
        }

        fn on_fatal_error(&mut self, error: &EngineError) {
            self.0.lock().unwrap().fatal.push(error.to_string());
        }
    }

    #[derive(Clone, Default)]
    struct SharedCanvas(Arc<Mutex<CommandCanvas>>);

    impl Canvas for SharedCanvas {
        fn clear(&mut self, color: Color) {
            self.0.lock().unwrap().clear(color);
        }

        fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Color) {
            self.0.lock().unwrap().fill_circle(x, y, radius, color);
        }

        fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color) {
            self.0.lock().unwrap().fill_rect(x, y, width, height, color);
        }

        fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
            self.0.lock().unwrap().fill_text(text, x, y, color);
        }
    }

    struct Harness {
        engine: Engine,
        log: Arc<Mutex<Log>>,
        canvas: SharedCanvas,
        now: Instant,
        dt: Duration,
    }

    impl Harness {
        fn new(signer: Option<&Arc<MockSigner>>) -> Self {
            Self::with_config(EngineConfig::default(), signer)
        }

        fn with_config(config: EngineConfig, signer: Option<&Arc<MockSigner>>) -> Self {
            let log = Arc::new(Mutex::new(Log::default()));
            let canvas = SharedCanvas::default();
            let session = signer.map(|s| SessionHandle::new(s.clone()));
            let engine = Engine::new(
                config,
                Box::new(canvas.clone()),
                session,
                Box::new(Recorder(log.clone())),
            )
            .unwrap();
            let dt = Duration::from_nanos(1_000_000_000 / 60);
            Self { engine, log, canvas, now: Instant::now(), dt }
        }

        /// Start and take the baseline frame.
        fn start(&mut self) {
            self.engine.start().unwrap();
            self.engine.frame(self.now).unwrap();
        }

        /// Advance one tick per frame.
        fn run_ticks(&mut self, ticks: u32) {
            for _ in 0..ticks {
                self.now += self.dt;
                self.engine.frame(self.now).unwrap();
            }
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn class_of(payload: &ActionPayload) -> ActionClass {
        payload.action.class()
    }

    #[tokio::test]
    async fn test_lifecycle_and_destroyed_errors() {
        let mut h = Harness::new(None);
        assert_eq!(h.engine.clock_state(), ClockState::Stopped);

        h.start();
        h.engine.pause().unwrap();
        assert_eq!(h.engine.clock_state(), ClockState::Paused);
        h.engine.start().unwrap();

        h.engine.destroy();
        h.engine.destroy();
        assert!(h.engine.is_destroyed());

        let err = h.engine.start().unwrap_err();
        assert!(matches!(err, EngineError::Destroyed));
        assert_eq!(err.to_string(), "instance destroyed");
        assert!(matches!(h.engine.frame(h.now), Err(EngineError::Destroyed)));
        assert!(matches!(
            h.engine.register_player(h.now),
            Err(RegistrationError::Destroyed)
        ));
    }

    #[tokio::test]
    async fn test_new_requires_valid_config() {
        let config = EngineConfig { program_id: String::new(), ..EngineConfig::default() };
        let result = Engine::new(config, Box::new(CommandCanvas::new()), None, Box::new(crate::NoopListener));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_time_callback_fires_on_change_only() {
        let mut h = Harness::new(None);
        h.start();
        h.run_ticks(60);

        assert_eq!(h.engine.state().tick, 60);
        assert_eq!(h.log.lock().unwrap().seconds, vec![1]);
        assert_eq!(h.engine.recording().end_tick(), 60);
    }

    #[tokio::test]
    async fn test_shot_is_submitted_and_confirmed() {
        let signer = MockSigner::new();
        let mut h = Harness::new(Some(&signer));
        h.start();

        h.engine.key_down(Key::Space);
        h.run_ticks(1);
        h.engine.key_up(Key::Space);

        let calls = signer.take_calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0].0.action, ActionKind::Shoot { .. }));
        assert_eq!(h.engine.stats().shots_sent, 1);
        assert_eq!(h.engine.stats().pending_tx_count, 1);

        for (_, reply) in calls {
            reply.send(Ok("sig-shot".into())).unwrap();
        }
        settle().await;
        h.run_ticks(1);

        let stats = h.engine.stats();
        assert_eq!(stats.pending_tx_count, 0);
        assert_eq!(stats.success_rate_pct, 100.0);
        assert_eq!(stats.chain_speed_tps, 1.0);

        let feed: Vec<_> = h.engine.transaction_feed().entries().cloned().collect();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].signature.as_deref(), Some("sig-shot"));
    }

    #[tokio::test]
    async fn test_destroy_with_inflight_submission_silences_callbacks() {
        let signer = MockSigner::new();
        let mut h = Harness::new(Some(&signer));
        h.start();

        h.engine.key_down(Key::Space);
        h.run_ticks(1);
        assert_eq!(signer.call_count(), 1);

        h.engine.destroy();
        let updates_before = h.log.lock().unwrap().stats.len();
        let frames_before = h.canvas.0.lock().unwrap().frames();

        for (_, reply) in signer.take_calls() {
            let _ = reply.send(Ok("late".into()));
        }
        settle().await;

        assert!(h.engine.frame(h.now + h.dt).is_err());
        assert_eq!(h.log.lock().unwrap().stats.len(), updates_before);
        assert_eq!(h.canvas.0.lock().unwrap().frames(), frames_before);
        assert!(h.engine.transaction_feed().is_empty());
        assert!(matches!(h.engine.start(), Err(EngineError::Destroyed)));
    }

    #[tokio::test]
    async fn test_session_cleared_while_shot_pending() {
        let signer = MockSigner::new();
        let mut h = Harness::new(Some(&signer));
        h.start();

        h.engine.key_down(Key::Space);
        h.run_ticks(1);
        h.engine.key_up(Key::Space);
        let calls = signer.take_calls();
        assert_eq!(calls.len(), 1);

        h.engine.update_session(None);
        for (_, reply) in calls {
            reply.send(Ok("sig-1".into())).unwrap();
        }
        settle().await;
        h.run_ticks(1);

        let stats = h.engine.stats();
        assert_eq!(stats.pending_tx_count, 0);
        assert_eq!(stats.success_rate_pct, 100.0);
        assert_eq!(h.engine.transaction_feed().len(), 1);

        // Firing without a session reaches nobody
        h.engine.key_down(Key::Space);
        h.run_ticks(30);
        h.engine.key_up(Key::Space);
        settle().await;
        assert_eq!(signer.call_count(), 0);
        assert_eq!(h.engine.stats().shots_sent, 1);
        assert!(h.engine.suppressed_events() > 0);

        // A fresh session picks up new shots
        let fresh = MockSigner::new();
        h.engine.update_session(Some(SessionHandle::new(fresh.clone())));
        h.engine.key_down(Key::Space);
        h.run_ticks(13);
        assert!(fresh.call_count() >= 1);
        assert_eq!(signer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_moves_are_serial_and_ordered() {
        let signer = MockSigner::new();
        let mut h = Harness::new(Some(&signer));
        h.start();

        h.engine.key_down(Key::ArrowRight);
        h.run_ticks(60);

        let first = signer.take_calls();
        assert_eq!(first.len(), 1);
        assert_eq!(class_of(&first[0].0), ActionClass::Move);
        assert!(h.engine.pending_transactions().count() > 1);

        let mut last_seq = first[0].0.sequence;
        let mut outstanding = first;
        for _ in 0..3 {
            for (_, reply) in outstanding.drain(..) {
                reply.send(Ok("sig".into())).unwrap();
            }
            settle().await;
            h.run_ticks(1);

            outstanding = signer.take_calls();
            assert_eq!(outstanding.len(), 1, "exactly one move in flight");
            assert!(outstanding[0].0.sequence > last_seq);
            last_seq = outstanding[0].0.sequence;
        }
    }

    #[tokio::test]
    async fn test_held_fire_reaches_signer_in_full() {
        let signer = MockSigner::new();
        let mut config = EngineConfig::default();
        config.sim.spawn.first_spawn_tick = u64::MAX;
        let mut h = Harness::with_config(config, Some(&signer));
        h.start();

        h.engine.key_down(Key::Space);
        for _ in 0..600 {
            h.run_ticks(1);
            for (_, reply) in signer.take_calls() {
                reply.send(Ok("sig".into())).unwrap();
            }
            settle().await;
        }

        let fired = h.engine.state().shots_fired;
        assert_eq!(fired, 50);
        assert_eq!(h.engine.stats().shots_sent, u64::from(fired));
    }

    #[tokio::test]
    async fn test_move_burst_in_one_window_submits_once() {
        let signer = MockSigner::new();
        let mut h = Harness::new(Some(&signer));
        h.start();

        // Three position reports inside the 200ms window
        h.engine.key_down(Key::ArrowRight);
        h.run_ticks(3);
        h.engine.key_up(Key::ArrowRight);
        assert_eq!(signer.call_count(), 0);

        h.run_ticks(20);
        let calls = signer.take_calls();
        assert_eq!(calls.len(), 1);
        let x = h.engine.state().player().unwrap().position.x;
        match calls[0].0.action {
            ActionKind::Move { direction, x: sent_x, .. } => {
                assert_eq!(direction, Direction::Right);
                assert_eq!(sent_x, x);
            }
            ref other => panic!("expected a Move, got {:?}", other),
        }
        assert_eq!(h.engine.stats().moves_sent, 1);
    }

    #[tokio::test]
    async fn test_register_player_resolves() {
        let signer = MockSigner::new();
        let mut h = Harness::new(Some(&signer));

        assert!(matches!(h.engine.register_player(h.now), Err(RegistrationError::NoName)));
        assert!(h.engine.set_player_name("x!").is_err());
        h.engine.set_player_name("  pilot ").unwrap();

        let pending = h.engine.register_player(h.now).unwrap();
        assert_eq!(
            h.engine.register_player(h.now).unwrap_err(),
            RegistrationError::Encode(EncodeError::AlreadyRegistered)
        );

        let calls = signer.take_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.action, ActionKind::Register { name: "pilot".into() });
        for (_, reply) in calls {
            reply.send(Ok("sig-reg".into())).unwrap();
        }
        settle().await;
        h.engine.frame(h.now + h.dt).unwrap();

        assert!(pending.wait().await);
    }

    #[tokio::test]
    async fn test_rejected_registration_can_be_retried() {
        let signer = MockSigner::new();
        let mut h = Harness::new(Some(&signer));
        h.engine.set_player_name("pilot").unwrap();

        let mut pending = h.engine.register_player(h.now).unwrap();
        assert_eq!(pending.try_result(), None);
        for (_, reply) in signer.take_calls() {
            reply.send(Err(SignerError::Rejected("name taken".into()))).unwrap();
        }
        settle().await;
        h.engine.frame(h.now + h.dt).unwrap();

        assert_eq!(pending.try_result(), Some(false));
        assert!(h.engine.register_player(h.now + h.dt).is_ok());
    }

    #[tokio::test]
    async fn test_register_without_session() {
        let mut h = Harness::new(None);
        h.engine.set_player_name("pilot").unwrap();
        assert_eq!(
            h.engine.register_player(h.now).unwrap_err(),
            RegistrationError::Encode(EncodeError::NoSession)
        );
    }

    #[tokio::test]
    async fn test_renders_running_and_paused_frames() {
        let mut h = Harness::new(None);
        h.engine.frame(h.now).unwrap();
        assert_eq!(h.canvas.0.lock().unwrap().frames(), 0);

        h.start();
        h.run_ticks(2);
        assert_eq!(h.canvas.0.lock().unwrap().frames(), 3);

        h.engine.pause().unwrap();
        h.run_ticks(1);
        let canvas = h.canvas.0.lock().unwrap();
        assert!(canvas
            .commands()
            .iter()
            .any(|c| matches!(c, DrawCommand::Text { text, .. } if text == "PAUSED")));
    }

    #[tokio::test]
    async fn test_key_codes() {
        let mut h = Harness::new(None);
        assert!(h.engine.key_event("ArrowLeft", true));
        assert!(!h.engine.key_event("KeyQ", true));
        h.start();
        h.run_ticks(5);
        assert!(h.engine.state().player().unwrap().position.x < 400.0);
    }

    #[tokio::test]
    async fn test_fatal_error_destroys_engine() {
        let mut h = Harness::new(None);
        h.start();
        let player = h.engine.state.player_id;
        h.engine.state.entities.retain(|e| e.id != player);

        h.now += h.dt;
        let err = h.engine.frame(h.now).unwrap_err();
        assert!(matches!(err, EngineError::Simulation(SimulationError::PlayerMissing)));
        assert!(h.engine.is_destroyed());
        assert_eq!(h.log.lock().unwrap().fatal.len(), 1);
    }

    #[tokio::test]
    async fn test_recording_replays_to_same_hash() {
        let mut h = Harness::new(None);
        h.start();
        h.engine.key_down(Key::ArrowLeft);
        h.engine.key_down(Key::Space);
        h.run_ticks(90);
        h.engine.key_up(Key::ArrowLeft);
        h.engine.key_down(Key::ArrowRight);
        h.run_ticks(120);

        let ticks = h.engine.state().tick;
        let (replayed, _) = replay(&h.engine.config().sim, h.engine.recording(), ticks).unwrap();
        assert_eq!(replayed.compute_hash(), h.engine.state_hash());
    }
}
