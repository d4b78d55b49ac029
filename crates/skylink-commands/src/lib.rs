//! Downlink command system for the Skylink ADR control plane.
//!
//! Provides:
//! - Command payload data structures
//! - Staging of accepted rate decisions (one pending slot per device)
//! - Command lifecycle events and housekeeping expiry

pub mod command;
pub mod emitter;

// Re-exports
pub use command::{CommandId, CommandStatus, LinkAdrPayload, StagedCommand};
pub use emitter::CommandEmitter;
