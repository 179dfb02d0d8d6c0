//! HTTP route layer.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace, timeout, body limit, metrics)
//!     → auth.rs (bearer key, /api/admin/* only)
//!     → handlers.rs (typed body → core operation → JSON)
//!     → error.rs (error kind → status code + structured body)
//! ```

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use error::{ApiError, ErrorBody};
pub use server::{build_router, AppState, HttpServer};
