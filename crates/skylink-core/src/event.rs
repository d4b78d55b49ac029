//! Telemetry events emitted by the control plane.
//!
//! External reporting subscribes to these through the [`EventBus`]; nothing
//! inside the server depends on anyone listening.
//!
//! [`EventBus`]: crate::eventbus::EventBus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DevAddr, GatewayId};

/// Metadata attached to every published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID.
    pub id: String,
    /// Component that published the event.
    pub source: String,
    /// Wall-clock publication timestamp.
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    /// Create metadata for a new event.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Events published by the ADR control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SkylinkEvent {
    /// A device was added to the registry.
    DeviceRegistered { device: DevAddr },
    /// A gateway was added to the registry.
    GatewayRegistered { gateway: GatewayId },
    /// A device's end-to-end error rate moved past the change threshold.
    ErrorRateUpdated {
        device: DevAddr,
        sent: u64,
        received: u64,
        rate: f64,
    },
    /// A device's delivery ratio moved past the change threshold.
    EfficiencyChanged { device: DevAddr, efficiency: f64 },
    /// An accepted rate decision changed the repetition count.
    NbTransChanged { device: DevAddr, old: u8, new: u8 },
    /// A rate decision was accepted for a device.
    AdrAdjustment {
        device: DevAddr,
        data_rate: u8,
        tx_power_dbm: i8,
        nb_trans: u8,
    },
    /// A downlink command was staged for delivery.
    CommandStaged { device: DevAddr, command_id: Uuid },
    /// A staged command was replaced by a newer decision.
    CommandSuperseded { device: DevAddr, command_id: Uuid },
    /// A staged command expired without being confirmed.
    CommandExpired { device: DevAddr, command_id: Uuid },
}

impl SkylinkEvent {
    /// Device the event concerns, if any.
    pub fn device(&self) -> Option<DevAddr> {
        match self {
            SkylinkEvent::DeviceRegistered { device }
            | SkylinkEvent::ErrorRateUpdated { device, .. }
            | SkylinkEvent::EfficiencyChanged { device, .. }
            | SkylinkEvent::NbTransChanged { device, .. }
            | SkylinkEvent::AdrAdjustment { device, .. }
            | SkylinkEvent::CommandStaged { device, .. }
            | SkylinkEvent::CommandSuperseded { device, .. }
            | SkylinkEvent::CommandExpired { device, .. } => Some(*device),
            SkylinkEvent::GatewayRegistered { .. } => None,
        }
    }

    /// Check if this is a registration event.
    pub fn is_registration_event(&self) -> bool {
        matches!(
            self,
            SkylinkEvent::DeviceRegistered { .. } | SkylinkEvent::GatewayRegistered { .. }
        )
    }

    /// Check if this is a statistics event.
    pub fn is_statistics_event(&self) -> bool {
        matches!(
            self,
            SkylinkEvent::ErrorRateUpdated { .. } | SkylinkEvent::EfficiencyChanged { .. }
        )
    }

    /// Check if this is a rate-adaptation event.
    pub fn is_adr_event(&self) -> bool {
        matches!(
            self,
            SkylinkEvent::AdrAdjustment { .. } | SkylinkEvent::NbTransChanged { .. }
        )
    }

    /// Check if this is a command lifecycle event.
    pub fn is_command_event(&self) -> bool {
        matches!(
            self,
            SkylinkEvent::CommandStaged { .. }
                | SkylinkEvent::CommandSuperseded { .. }
                | SkylinkEvent::CommandExpired { .. }
        )
    }
}
