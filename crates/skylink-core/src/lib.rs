//! Core types for the Skylink ADR control plane.
//!
//! This crate defines the foundational abstractions shared across the
//! workspace: typed identifiers, simulated time, the telemetry event bus,
//! and the control-loop configuration.

pub mod config;
pub mod event;
pub mod eventbus;
pub mod logging;
pub mod types;

// Event exports
pub use event::{EventMetadata, SkylinkEvent};

// Event bus exports
pub use eventbus::{
    DEFAULT_CHANNEL_CAPACITY, EventBus, EventBusReceiver, FilterBuilder, FilteredReceiver,
    SharedEventBus,
};

// Configuration exports
pub use config::{AdrConfig, PendingCommandPolicy, SnrCombining, StrategyKind};

// Identifier and time exports
pub use types::{DevAddr, GatewayId, SimTime};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{AdrConfig, PendingCommandPolicy, SnrCombining, StrategyKind};
    pub use crate::event::{EventMetadata, SkylinkEvent};
    pub use crate::eventbus::{EventBus, SharedEventBus};
    pub use crate::types::{DevAddr, GatewayId, SimTime};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
