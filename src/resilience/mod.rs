//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Registrant accept loop:
//!     → dial/registration fails
//!     → backoff.rs (exponential delay with jitter)
//!     → redial; first success resets the delay
//! ```
//!
//! # Design Decisions
//! - Only transient failures back off; a closed listener or an invalid
//!   registration ends the loop instead
//! - Jitter keeps a fleet of registrants from redialing in lockstep

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
