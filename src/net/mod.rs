//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Registrant side:
//!     listener.rs accept() (admission: at most pool_size outstanding)
//!     → dial.rs (connect to hub, REGISTER, take raw transport back)
//!     → hook.rs (failure-triggered hook returns the pool slot)
//!     → Hand off to HTTP layer
//!
//! Hub side:
//!     registration endpoint upgrade
//!     → hook.rs (close-triggered hook evicts from the registry)
//!     → connection.rs (ids, bridge session tracking)
//! ```
//!
//! # Design Decisions
//! - One wrapper type for both hooks; only the firing policy differs
//! - End notification fires at most once per connection
//! - Outstanding connections are bounded by a semaphore, not a queue

pub mod connection;
pub mod dial;
pub mod hook;
pub mod listener;

pub use connection::{ConnectionId, SessionGuard, SessionTracker};
pub use dial::{dial, Network};
pub use hook::{ConnEndHook, FirePolicy, HookedConn};
pub use listener::{Listener, ListenerError, RegisteredConn};
