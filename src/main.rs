//! Chain Shooter Demo
//!
//! Runs one headless session the way a browser host would: scripted keys,
//! a frame every 16ms, and a simulated session signer with latency and
//! dropped transactions. Finishes with a replay determinism check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use chain_shooter::{
    CommandCanvas, DeterministicRng, Engine, EngineConfig, EngineError, EngineListener, Key,
    PerformanceStats, SessionHandle, SessionSigner, Signature, SignerError, TICK_RATE, VERSION,
    chain::action::ActionPayload,
    core::rng::derive_game_seed,
    game::tick::replay,
};

const PLAYER_NAME: &str = "demo-pilot";

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Chain Shooter v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(demo_session())
}

/// Session signer standing in for the wallet library.
struct SimulatedSigner {
    session_id: Uuid,
    rng: Mutex<DeterministicRng>,
    failure_rate: f32,
    min_latency_ms: f32,
    max_latency_ms: f32,
    submitted: AtomicU64,
}

impl SimulatedSigner {
    fn new(session_id: Uuid, seed: u64) -> Self {
        Self {
            session_id,
            rng: Mutex::new(DeterministicRng::new(seed ^ 0x5167_4E45)),
            failure_rate: 0.1,
            min_latency_ms: 150.0,
            max_latency_ms: 900.0,
            submitted: AtomicU64::new(0),
        }
    }

    fn sign(&self, bytes: &[u8]) -> Signature {
        let mut hasher = Sha256::new();
        hasher.update(self.session_id.as_bytes());
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

impl SessionSigner for SimulatedSigner {
    fn submit(&self, payload: ActionPayload) -> BoxFuture<'static, Result<Signature, SignerError>> {
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let bytes = match payload.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return futures_util::future::ready(Err(SignerError::Rejected(e.to_string()))).boxed(),
        };
        let signature = self.sign(&bytes);

        let (latency, dropped) = match self.rng.lock() {
            Ok(mut rng) => (
                Duration::from_millis(rng.next_range(self.min_latency_ms, self.max_latency_ms) as u64),
                rng.next_bool(self.failure_rate),
            ),
            Err(_) => return futures_util::future::ready(Err(SignerError::SessionInactive)).boxed(),
        };

        async move {
            tokio::time::sleep(latency).await;
            if dropped {
                Err(SignerError::Network("simulated packet loss".into()))
            } else {
                Ok(signature)
            }
        }
        .boxed()
    }

    fn is_active(&self) -> bool {
        true
    }
}

/// Logs host callbacks.
struct LogListener;

impl EngineListener for LogListener {
    fn on_score_update(&mut self, score: u32) {
        debug!("Score: {}", score);
    }

    fn on_game_time_update(&mut self, seconds: u32) {
        if seconds % 5 == 0 {
            info!("Game time: {}s", seconds);
        }
    }

    fn on_performance_update(&mut self, stats: &PerformanceStats) {
        debug!("Pending: {}, success: {:.1}%", stats.pending_tx_count, stats.success_rate_pct);
    }

    fn on_fatal_error(&mut self, error: &EngineError) {
        error!("Engine failed: {}", error);
    }
}

/// Scripted keys for a tick: sweep right and left while firing in bursts.
fn scripted_keys(tick: u64) -> (bool, bool, bool) {
    let phase = (tick / 90) % 4;
    let left = phase == 1 || phase == 2;
    let right = !left;
    let shoot = tick % 240 < 200;
    (left, right, shoot)
}

fn apply_keys(engine: &mut Engine, (left, right, shoot): (bool, bool, bool)) {
    for (key, held) in [(Key::ArrowLeft, left), (Key::ArrowRight, right), (Key::Space, shoot)] {
        if held {
            engine.key_down(key);
        } else {
            engine.key_up(key);
        }
    }
}

fn log_stats(label: &str, stats: &PerformanceStats) {
    info!(
        "{}: moves {}, shots {}, avg confirm {:.0}ms, success {:.1}%, pending {}, {:.1} tx/s",
        label,
        stats.moves_sent,
        stats.shots_sent,
        stats.avg_confirm_ms,
        stats.success_rate_pct,
        stats.pending_tx_count,
        stats.chain_speed_tps
    );
}

/// Play one session against the simulated signer.
async fn demo_session() -> Result<()> {
    info!("=== Starting Demo Session ===");

    let mut config = EngineConfig::from_env().context("invalid SHOOTER_* configuration")?;
    let demo_seconds: u64 = std::env::var("SHOOTER_DEMO_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);

    let session_id = Uuid::new_v4();
    config.sim.seed = derive_game_seed(session_id.as_bytes(), PLAYER_NAME);
    info!("Session: {}", session_id);
    info!("RNG Seed: {:#018x}", config.sim.seed);

    let signer = Arc::new(SimulatedSigner::new(session_id, config.sim.seed));
    let mut engine = Engine::new(
        config,
        Box::new(CommandCanvas::new()),
        Some(SessionHandle::new(signer.clone())),
        Box::new(LogListener),
    )?;

    engine.set_player_name(PLAYER_NAME)?;
    let mut registration = engine.register_player(Instant::now())?;
    engine.start()?;

    let mut interval = tokio::time::interval(Duration::from_millis(16));
    let started = Instant::now();
    let mut last_report = started;

    while started.elapsed() < Duration::from_secs(demo_seconds) {
        interval.tick().await;
        let next_tick = engine.state().tick + 1;
        apply_keys(&mut engine, scripted_keys(next_tick));
        engine.frame(Instant::now())?;

        if engine.state().game_over {
            info!("Game over at tick {}", engine.state().tick);
            break;
        }
        if last_report.elapsed() >= Duration::from_secs(2) {
            log_stats("Chain", &engine.stats());
            last_report = Instant::now();
        }
    }

    // Let in-flight transactions land
    apply_keys(&mut engine, (false, false, false));
    engine.pause()?;
    let drain_started = Instant::now();
    while engine.pending_transactions().next().is_some() && drain_started.elapsed() < Duration::from_secs(20) {
        interval.tick().await;
        engine.frame(Instant::now())?;
    }

    // Print final results
    info!("=== Session Results ===");
    let state = engine.state();
    info!("Score: {} ({} kills, {} shots, {} lives left)", state.score, state.kills, state.shots_fired, state.lives());
    log_stats("Final", &engine.stats());
    info!("Signer calls: {}", signer.submitted.load(Ordering::Relaxed));
    match registration.try_result() {
        Some(true) => info!("Registration confirmed"),
        Some(false) => warn!("Registration failed"),
        None => warn!("Registration still pending"),
    }
    for entry in engine.transaction_feed().entries().take(5) {
        info!(
            "  {} {:<8} {:?} {}",
            entry.tx_id,
            entry.action,
            entry.status,
            entry.short_signature().unwrap_or("-")
        );
    }

    // Verify determinism by replaying the recorded input
    info!("=== Verifying Determinism ===");
    let hash = engine.state_hash();
    let (replayed, _) = replay(&engine.config().sim, engine.recording(), engine.state().tick)?;
    let replay_hash = replayed.compute_hash();

    info!("Final State Hash:  {}", hex::encode(hash));
    info!("Replay State Hash: {}", hex::encode(replay_hash));
    if hash == replay_hash {
        info!("DETERMINISM VERIFIED: Hashes match!");
    } else {
        warn!("DETERMINISM FAILURE: Hashes differ!");
    }

    engine.destroy();
    Ok(())
}
