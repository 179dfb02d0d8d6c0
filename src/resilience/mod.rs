//! Resilience helpers.
//!
//! # Design Decisions
//! - Every wait has a deadline; receipt polling ends in a pending error
//! - Retry delays grow exponentially with jitter and are capped

pub mod backoff;

pub use backoff::{calculate_backoff, PollSchedule};
