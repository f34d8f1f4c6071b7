//! Registration pattern routing.
//!
//! # Data Flow
//! ```text
//! Forwarded request (host, path)
//!     → registry.rs walks standby entries oldest first
//!     → matcher.rs (evaluate each entry's registration pattern)
//!     → first match is handed off
//! ```
//!
//! # Design Decisions
//! - Only consulted when the registry runs with pattern selection;
//!   the default hand-off is pure FIFO
//! - Patterns compiled once, when the standby is registered
//! - Deterministic: same input always matches the same way

pub mod matcher;

pub use matcher::{AndMatcher, HostPattern, Matcher, PathPattern};
