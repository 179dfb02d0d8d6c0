//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → stores → whitelist (load or rebuild) → contract artifact → AppState
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C / SIGTERM → Shutdown::trigger → server drains → exit
//! ```
//! A request waiting on a receipt finishes its poll or times out into a
//! pending error; the transaction hash is already persisted.

pub mod shutdown;
pub mod startup;

pub use shutdown::{wait_for_signal, Shutdown};
pub use startup::{build_state, build_state_with, StartupError};
