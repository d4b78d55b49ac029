//! Device and gateway registries.
//!
//! Registration is the one-time setup hook invoked by orchestration code.
//! Devices are keyed by their address; gateways receive a typed identity
//! at registration and are never identified by transport-address bytes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use skylink_core::config::StrategyKind;
use skylink_core::event::SkylinkEvent;
use skylink_core::eventbus::SharedEventBus;
use skylink_core::types::{DevAddr, GatewayId};

use crate::model::{NetworkError, TxParams};
use crate::record::DeviceRecord;

/// Registry of all devices the server manages.
///
/// Each record sits behind its own lock, so handling one device's events
/// never contends with another's.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DevAddr, Arc<RwLock<DeviceRecord>>>>,
    bus: SharedEventBus,
}

impl DeviceRegistry {
    /// Create an empty registry publishing on the given bus.
    pub fn new(bus: SharedEventBus) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Register a device with its initial radio parameters.
    pub async fn register(&self, addr: DevAddr, params: TxParams) -> Result<(), NetworkError> {
        self.register_with_strategy(addr, params, StrategyKind::default())
            .await
    }

    /// Register a device with an explicit strategy assignment.
    ///
    /// The strategy is fixed at registration time; it is never switched by
    /// inspecting state at runtime.
    pub async fn register_with_strategy(
        &self,
        addr: DevAddr,
        params: TxParams,
        strategy: StrategyKind,
    ) -> Result<(), NetworkError> {
        params.validate()?;
        let mut devices = self.devices.write().await;
        if devices.contains_key(&addr) {
            return Err(NetworkError::DuplicateDevice(addr));
        }
        devices.insert(
            addr,
            Arc::new(RwLock::new(DeviceRecord::with_strategy(
                addr, params, strategy,
            ))),
        );
        drop(devices);

        info!(device = %addr, "device registered");
        self.bus
            .publish_with_source(SkylinkEvent::DeviceRegistered { device: addr }, "registry");
        Ok(())
    }

    /// Look up a device's record.
    pub async fn record(&self, addr: DevAddr) -> Result<Arc<RwLock<DeviceRecord>>, NetworkError> {
        self.devices
            .read()
            .await
            .get(&addr)
            .cloned()
            .ok_or(NetworkError::UnknownDevice(addr))
    }

    /// Whether a device is registered.
    pub async fn contains(&self, addr: DevAddr) -> bool {
        self.devices.read().await.contains_key(&addr)
    }

    /// Number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Addresses of all registered devices.
    pub async fn devices(&self) -> Vec<DevAddr> {
        self.devices.read().await.keys().copied().collect()
    }
}

/// Information kept per registered gateway.
#[derive(Debug, Clone)]
pub struct GatewayInfo {
    pub id: GatewayId,
    pub label: String,
}

/// Registry of gateways feeding uplink reports to the server.
pub struct GatewayRegistry {
    gateways: RwLock<HashMap<GatewayId, GatewayInfo>>,
    bus: SharedEventBus,
}

impl GatewayRegistry {
    /// Create an empty registry publishing on the given bus.
    pub fn new(bus: SharedEventBus) -> Self {
        Self {
            gateways: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Register a gateway, minting its identity.
    pub async fn register(&self, label: impl Into<String>) -> GatewayId {
        let id = GatewayId::new();
        let info = GatewayInfo {
            id,
            label: label.into(),
        };
        self.gateways.write().await.insert(id, info);

        info!(gateway = %id, "gateway registered");
        self.bus
            .publish_with_source(SkylinkEvent::GatewayRegistered { gateway: id }, "registry");
        id
    }

    /// Whether a gateway is registered.
    pub async fn contains(&self, id: GatewayId) -> bool {
        self.gateways.read().await.contains_key(&id)
    }

    /// Number of registered gateways.
    pub async fn len(&self) -> usize {
        self.gateways.read().await.len()
    }

    /// All registered gateways.
    pub async fn list(&self) -> Vec<GatewayInfo> {
        self.gateways.read().await.values().cloned().collect()
    }
}
