//! Shared identifier and time types.
//!
//! These are the handles the rest of the workspace passes around: device
//! addresses, gateway identities, and simulated time instants supplied by
//! the discrete-event layer that drives the server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque 32-bit device address, assigned once at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DevAddr(pub u32);

impl DevAddr {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DevAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Unique identifier for a gateway.
///
/// Assigned once by the gateway registry. Gateway identity is never
/// reconstructed from transport-address bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GatewayId(pub Uuid);

impl GatewayId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for GatewayId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GatewayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An instant of simulated time, in seconds.
///
/// The server never reads a wall clock; every event carries the time the
/// driving layer assigned to it. Events for a single device arrive in
/// non-decreasing order.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct SimTime(pub f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn from_millis(millis: f64) -> Self {
        Self(millis / 1000.0)
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    pub fn as_millis(&self) -> f64 {
        self.0 * 1000.0
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero.
    pub fn millis_since(&self, earlier: SimTime) -> f64 {
        ((self.0 - earlier.0) * 1000.0).max(0.0)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_addr_display() {
        assert_eq!(DevAddr(0x1a2b).to_string(), "00001a2b");
    }

    #[test]
    fn test_sim_time_millis() {
        let t0 = SimTime::from_millis(500.0);
        let t1 = SimTime::from_secs(1.25);
        assert_eq!(t1.millis_since(t0), 750.0);
        // Saturates instead of going negative.
        assert_eq!(t0.millis_since(t1), 0.0);
    }

    #[test]
    fn test_gateway_ids_are_unique() {
        assert_ne!(GatewayId::new(), GatewayId::new());
    }
}
