//! Session Signer Capability
//!
//! The wallet-session library is an external collaborator. The engine only
//! needs to hand it a payload and learn, eventually, whether it landed.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::chain::action::ActionPayload;

/// Transaction signature returned on confirmation.
pub type Signature = String;

/// Errors reported by the signer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// Transport or RPC failure.
    #[error("network error: {0}")]
    Network(String),

    /// The signer or the chain refused the transaction.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The signer gave up waiting for confirmation.
    #[error("signer timed out")]
    Timeout,

    /// The session backing the signer is gone.
    #[error("session inactive")]
    SessionInactive,
}

impl SignerError {
    /// Worth retrying?
    pub fn is_transient(&self) -> bool {
        matches!(self, SignerError::Network(_) | SignerError::Timeout)
    }
}

/// A gasless session able to sign and submit actions.
pub trait SessionSigner: Send + Sync {
    /// Submit a payload. Resolves with the signature once confirmed.
    fn submit(&self, payload: ActionPayload) -> BoxFuture<'static, Result<Signature, SignerError>>;

    /// Is the session still usable?
    fn is_active(&self) -> bool;
}

/// Shared, replaceable reference to a session signer.
///
/// Handles are swapped wholesale, never mutated. Two handles are the same
/// session when they point at the same signer.
#[derive(Clone)]
pub struct SessionHandle {
    signer: Arc<dyn SessionSigner>,
}

impl SessionHandle {
    /// Wrap a signer.
    pub fn new(signer: Arc<dyn SessionSigner>) -> Self {
        Self { signer }
    }

    /// Is the session still usable?
    pub fn is_active(&self) -> bool {
        self.signer.is_active()
    }

    /// Submit a payload through this session.
    pub fn submit(&self, payload: ActionPayload) -> BoxFuture<'static, Result<Signature, SignerError>> {
        self.signer.submit(payload)
    }

    /// Do both handles refer to the same session?
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.signer, &other.signer)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}
