//! Registration protocol.
//!
//! # Data Flow
//! ```text
//! Registrant                                  Hub (registration endpoint)
//!     dial ─────────────────────────────────▶ accept
//!     REGISTER <path>, Host: <authority> ───▶ parse, check method
//!     ◀───────────────── 101 Switching Protocols
//!     raw transport ◀──────────────────────▶ standby in registry
//! ```
//!
//! # Design Decisions
//! - REGISTER is an ordinary HTTP/1.1 request with a custom verb
//! - The hub takes the transport over with a standard upgrade, so the
//!   framing layer hands back a clean raw stream on both sides

pub mod registration;

pub use registration::{is_register, ProtocolError, Registration};

/// Request verb announcing a standby connection.
pub const METHOD_REGISTER: &str = "REGISTER";

/// Token sent in the `Upgrade` header of a REGISTER message.
pub const UPGRADE_PROTOCOL: &str = "rendezvous";
