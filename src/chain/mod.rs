//! Chain Mirroring Module
//!
//! Everything between a simulation event and a confirmed session
//! transaction.
//!
//! ## Module Structure
//!
//! - `action`: Game actions and the signer payload
//! - `signer`: Session signer capability
//! - `encoder`: Event to action translation, coalescing and caps
//! - `limiter`: Token-bucket rate limiter
//! - `dispatcher`: Queueing, retries, timeouts, backpressure
//! - `metrics`: Rolling performance statistics
//! - `feed`: Recent terminal transactions

pub mod action;
pub mod signer;
pub mod encoder;
pub mod limiter;
pub mod dispatcher;
pub mod metrics;
pub mod feed;

pub use action::{ActionClass, ActionKind, ActionPayload, Direction, GameAction};
pub use signer::{SessionHandle, SessionSigner, Signature, SignerError};
pub use encoder::{ActionEncoder, EncodeError, EncoderConfig};
pub use dispatcher::{
    Completion, DispatchConfig, DispatchError, DispatchEvent, FailureReason, Launch,
    PendingTransaction, TransactionDispatcher, TxId, TxStatus,
};
pub use metrics::{MetricsAggregator, MetricsConfig, PerformanceStats};
pub use feed::{FeedEntry, TransactionFeed};
