//! Hub-side standby registry.
//!
//! # Data Flow
//! ```text
//! REGISTER accepted (registration endpoint)
//!     → standby.rs add(): hook the transport, queue it, supervise it
//!
//! Client request (forwarding endpoint)
//!     → standby.rs take(): pop oldest eligible entry, claim its transport
//!
//! Registrant hangs up while queued
//!     → supervisor closes the transport
//!     → hook fires → remove(): entry leaves the queue
//! ```
//!
//! # Standby States
//! ```text
//! REGISTERED → TAKEN → BRIDGING → CLOSED
//! REGISTERED → ENDED → REMOVED
//! ```

pub mod standby;

pub use standby::{Registry, RegistryError, Selection, StandbyConn};
