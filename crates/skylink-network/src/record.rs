//! Per-device state tracked by the network server.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use skylink_core::config::StrategyKind;
use skylink_core::types::{DevAddr, GatewayId, SimTime};
use uuid::Uuid;

use crate::model::{AdrPhase, TxParams, UplinkReception};

/// Everything the server knows about one device.
///
/// Created once at registration and kept for the device's operational
/// lifetime. No state is shared between records; a failure while handling
/// one device's event cannot corrupt another's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device address.
    pub addr: DevAddr,
    /// Rate-control strategy assigned at registration.
    pub strategy: StrategyKind,
    /// Radio parameters the device is currently believed to use.
    pub params: TxParams,
    /// Recent receptions, oldest first. Bounded by the configured history
    /// range; the aggregator evicts the oldest entry at capacity.
    pub history: VecDeque<UplinkReception>,
    /// Control-loop phase.
    pub phase: AdrPhase,
    /// ID of the staged downlink command, if one is pending.
    pub pending_command: Option<Uuid>,
    /// Uplinks the device is known to have transmitted.
    pub sent: u64,
    /// Unique uplinks heard by at least one gateway.
    pub received_by_any_gateway: u64,
    /// Unique uplinks that reached the server.
    pub received_by_server: u64,
    /// Reports per gateway, counting duplicates (diversity accounting).
    pub per_gateway: HashMap<GatewayId, u64>,
    /// Accepted rate adjustments so far.
    pub adjustment_count: u64,
    /// When the last adjustment was accepted.
    pub last_adjustment: Option<SimTime>,
    /// Guard-window state: when a transmission was last recorded.
    pub last_transmission_recorded: Option<SimTime>,
    /// Last end-to-end error rate reported over the event bus.
    pub last_reported_error_rate: Option<f64>,
    /// Last delivery ratio reported over the event bus.
    pub last_reported_efficiency: Option<f64>,
}

impl DeviceRecord {
    /// Create a record for a newly registered device.
    pub fn new(addr: DevAddr, params: TxParams) -> Self {
        Self::with_strategy(addr, params, StrategyKind::default())
    }

    /// Create a record with an explicit strategy assignment.
    pub fn with_strategy(addr: DevAddr, params: TxParams, strategy: StrategyKind) -> Self {
        Self {
            addr,
            strategy,
            params,
            history: VecDeque::new(),
            phase: AdrPhase::Collecting,
            pending_command: None,
            sent: 0,
            received_by_any_gateway: 0,
            received_by_server: 0,
            per_gateway: HashMap::new(),
            adjustment_count: 0,
            last_adjustment: None,
            last_transmission_recorded: None,
            last_reported_error_rate: None,
            last_reported_efficiency: None,
        }
    }

    /// Find a reception by sequence counter, searching newest first.
    pub fn find_reception_mut(&mut self, sequence: u32) -> Option<&mut UplinkReception> {
        self.history
            .iter_mut()
            .rev()
            .find(|r| r.sequence == sequence)
    }

    /// Append a reception, evicting the oldest entry if the window is
    /// already at `capacity`.
    pub fn push_reception(&mut self, reception: UplinkReception, capacity: usize) {
        while self.history.len() >= capacity.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(reception);
    }

    /// Whether the history window holds at least `history_range` samples.
    pub fn history_full(&self, history_range: usize) -> bool {
        self.history.len() >= history_range
    }

    /// Drop all accumulated history, forcing the next decision cycle to
    /// learn fresh statistics.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
