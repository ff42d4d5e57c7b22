//! Live transaction feed: the most recent terminal transactions, newest first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::chain::dispatcher::{PendingTransaction, TxId, TxStatus};
use crate::chain::signer::Signature;

/// An archived transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Transaction id
    pub tx_id: TxId,
    /// Action sequence number
    pub sequence: u64,
    /// Action name
    pub action: String,
    /// Confirmed or Failed
    pub status: TxStatus,
    /// Signature, when confirmed
    pub signature: Option<Signature>,
    /// Retries performed
    pub retry_count: u32,
    /// Accept-to-resolve latency
    pub latency_ms: Option<u64>,
    /// Failure cause, when failed
    pub failure: Option<String>,
    /// Wall-clock time of archiving
    pub recorded_at: DateTime<Utc>,
}

impl FeedEntry {
    /// Archive a terminal transaction.
    pub fn from_transaction(tx: &PendingTransaction) -> Self {
        Self {
            tx_id: tx.id,
            sequence: tx.action.sequence,
            action: tx.action.kind.name().to_string(),
            status: tx.status,
            signature: tx.signature.clone(),
            retry_count: tx.retry_count,
            latency_ms: tx.latency().map(|d| d.as_millis() as u64),
            failure: tx.failure.as_ref().map(|f| f.to_string()),
            recorded_at: Utc::now(),
        }
    }

    /// First eight characters of the signature.
    pub fn short_signature(&self) -> Option<&str> {
        self.signature
            .as_deref()
            .map(|s| s.get(..8).unwrap_or(s))
    }
}

/// Bounded, newest-first list of [`FeedEntry`].
#[derive(Debug, Clone)]
pub struct TransactionFeed {
    capacity: usize,
    entries: VecDeque<FeedEntry>,
}

impl TransactionFeed {
    /// Feed keeping at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Archive a terminal transaction; non-terminal ones are ignored.
    pub fn push(&mut self, tx: &PendingTransaction) {
        if !tx.status.is_terminal() {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(FeedEntry::from_transaction(tx));
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    /// Owned copy of the entries, newest first.
    pub fn to_vec(&self) -> Vec<FeedEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
