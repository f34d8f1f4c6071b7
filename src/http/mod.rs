//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Hub:
//!     registration endpoint → request.rs (request ID)
//!                           → register.rs (REGISTER → 101 → registry)
//!     forwarding endpoint   → forward.rs (read head, take standby, splice)
//!     server.rs binds both endpoints and runs them until shutdown
//!
//! Registrant:
//!     serve.rs (accept from the outbound listener → serve a Router)
//! ```

pub mod forward;
pub mod register;
pub mod request;
pub mod serve;
pub mod server;

pub use forward::HubState;
pub use request::X_REQUEST_ID;
pub use serve::serve;
pub use server::HubServer;
