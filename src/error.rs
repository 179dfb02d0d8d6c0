//! Error classification shared by every public operation.
//!
//! Each subsystem keeps its own error enum; this module defines the coarse
//! kind every error maps onto, plus the retry policy a caller may apply.

use serde::Serialize;

/// Coarse error category surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input. Rejected before any side effect.
    Input,
    /// Requested item does not exist (e.g. proof for a non-member).
    NotFound,
    /// Request conflicts with current state (already whitelisted, already deployed).
    StateConflict,
    /// RPC unreachable, timed out, rejected the transaction, or returned garbage.
    Network,
    /// Transaction was broadcast but no receipt is available yet.
    Pending,
    /// Key material could not sign the transaction.
    Signing,
    /// Persisted state violates an invariant.
    Consistency,
    /// Local persistence failed.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::Network => "network",
            ErrorKind::Pending => "pending",
            ErrorKind::Signing => "signing",
            ErrorKind::Consistency => "consistency",
            ErrorKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller may safely do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryHint {
    /// Do not retry automatically.
    None,
    /// Re-run the operation from the builder stage: fresh nonce, fresh gas price,
    /// new signature. Never re-broadcast the old signed bytes.
    RebuildTransaction,
    /// The transaction is on the wire; poll its hash again later.
    ResumePolling,
}
