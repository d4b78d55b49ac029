//! Data model for uplink receptions and rate decisions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use skylink_core::types::{DevAddr, GatewayId, SimTime};

use crate::region;

/// Radio parameters a device is currently configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParams {
    /// Data-rate index, 0..=5.
    pub data_rate: u8,
    /// Transmit power in dBm, one of {2, 4, ..., 14}.
    pub tx_power_dbm: i8,
    /// Repetitions per uplink, 1..=3.
    pub nb_trans: u8,
}

impl TxParams {
    pub fn new(data_rate: u8, tx_power_dbm: i8, nb_trans: u8) -> Self {
        Self {
            data_rate,
            tx_power_dbm,
            nb_trans,
        }
    }

    /// Check every field against the region table.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.data_rate > region::MAX_DATA_RATE {
            return Err(NetworkError::InvalidParameterRange(format!(
                "data rate {} above {}",
                self.data_rate,
                region::MAX_DATA_RATE
            )));
        }
        if !region::is_valid_tx_power(self.tx_power_dbm) {
            return Err(NetworkError::InvalidParameterRange(format!(
                "tx power {} dBm not on the ladder",
                self.tx_power_dbm
            )));
        }
        if !(region::MIN_NB_TRANS..=region::MAX_NB_TRANS).contains(&self.nb_trans) {
            return Err(NetworkError::InvalidParameterRange(format!(
                "nb_trans {} outside {}..={}",
                self.nb_trans,
                region::MIN_NB_TRANS,
                region::MAX_NB_TRANS
            )));
        }
        Ok(())
    }

    /// Every field forced into the valid region. The fallback for a
    /// computed parameter that escaped the table.
    pub fn clamped(&self) -> Self {
        Self {
            data_rate: region::clamp_data_rate(self.data_rate),
            tx_power_dbm: region::clamp_tx_power(self.tx_power_dbm),
            nb_trans: region::clamp_nb_trans(self.nb_trans),
        }
    }

    /// Spreading factor implied by the data rate.
    pub fn spreading_factor(&self) -> u8 {
        region::spreading_factor(self.data_rate)
    }
}

impl Default for TxParams {
    /// The join-time configuration: slowest data rate at full power,
    /// single transmission.
    fn default() -> Self {
        Self {
            data_rate: region::MIN_DATA_RATE,
            tx_power_dbm: region::MAX_TX_POWER_DBM,
            nb_trans: 1,
        }
    }
}

impl std::fmt::Display for TxParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DR{}/{}dBm/x{}",
            self.data_rate, self.tx_power_dbm, self.nb_trans
        )
    }
}

/// What one gateway reported about one transmission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GatewayReception {
    /// Received signal power at the gateway, dBm.
    pub rx_power_dbm: f64,
    /// When the gateway received the transmission.
    pub received_at: SimTime,
}

/// One logical uplink transmission, merged across the gateways that
/// heard it.
///
/// Identified by `(device, sequence)`. Always holds at least one gateway
/// entry; a reception nobody heard is never constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkReception {
    /// Device frame counter.
    pub sequence: u32,
    /// Spreading factor the uplink used.
    pub spreading_factor: u8,
    /// Center frequency in Hz.
    pub frequency_hz: u32,
    /// When the device sent the uplink.
    pub send_time: SimTime,
    /// Per-gateway reception info (macro-diversity).
    pub gateways: HashMap<GatewayId, GatewayReception>,
}

impl UplinkReception {
    /// Create a reception from the first gateway report.
    pub fn new(
        sequence: u32,
        spreading_factor: u8,
        frequency_hz: u32,
        send_time: SimTime,
        gateway: GatewayId,
        info: GatewayReception,
    ) -> Self {
        let mut gateways = HashMap::new();
        gateways.insert(gateway, info);
        Self {
            sequence,
            spreading_factor,
            frequency_hz,
            send_time,
            gateways,
        }
    }

    /// Merge another gateway's report of the same transmission.
    ///
    /// A second report from a gateway already present keeps the first-seen
    /// entry. Returns `true` if the gateway was newly added.
    pub fn merge_gateway(&mut self, gateway: GatewayId, info: GatewayReception) -> bool {
        match self.gateways.entry(gateway) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(info);
                true
            }
        }
    }

    /// SNR seen at each gateway, derived from rx power and the noise floor.
    pub fn gateway_snrs(&self, noise_floor_dbm: f64) -> Vec<f64> {
        self.gateways
            .values()
            .map(|g| g.rx_power_dbm - noise_floor_dbm)
            .collect()
    }

    /// SNR seen at one specific gateway, if it heard this transmission.
    pub fn snr_at(&self, gateway: GatewayId, noise_floor_dbm: f64) -> Option<f64> {
        self.gateways
            .get(&gateway)
            .map(|g| g.rx_power_dbm - noise_floor_dbm)
    }
}

/// Output of one control-loop invocation: the parameters a device should
/// switch to, with the model predictions that justified them.
///
/// Transient; not persisted beyond command emission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateDecision {
    pub data_rate: u8,
    pub tx_power_dbm: i8,
    pub nb_trans: u8,
    /// Predicted channel occupancy for one uplink, milliseconds.
    pub predicted_airtime_ms: f64,
    /// Predicted packet error rate under the new parameters.
    pub predicted_per: f64,
}

impl RateDecision {
    /// The radio parameters this decision selects.
    pub fn params(&self) -> TxParams {
        TxParams {
            data_rate: self.data_rate,
            tx_power_dbm: self.tx_power_dbm,
            nb_trans: self.nb_trans,
        }
    }
}

impl std::fmt::Display for RateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DR{}/{}dBm/x{} (airtime {:.1}ms, per {:.3})",
            self.data_rate,
            self.tx_power_dbm,
            self.nb_trans,
            self.predicted_airtime_ms,
            self.predicted_per
        )
    }
}

/// Control-loop phase of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdrPhase {
    /// Accumulating reception history.
    #[default]
    Collecting,
    /// History full; eligible for evaluation on the next adaptation
    /// request.
    Evaluating,
    /// A decision is staged and awaiting downlink delivery.
    CommandPending,
}

/// Errors raised by the network-side components.
///
/// All of these are device-local: a failed event is logged and dropped
/// without affecting any other device.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// Event references a device that was never registered.
    #[error("unknown device: {0}")]
    UnknownDevice(DevAddr),

    /// Registration attempted for an address already in use.
    #[error("device already registered: {0}")]
    DuplicateDevice(DevAddr),

    /// Control loop invoked before the history window filled. Soft;
    /// callers skip the evaluation rather than surfacing a failure.
    #[error("insufficient history: {have} of {need} receptions")]
    InsufficientHistory { have: usize, need: usize },

    /// A computed parameter fell outside the region table. Signals a
    /// configuration defect; the computation is clamped, not aborted.
    #[error("parameter out of range: {0}")]
    InvalidParameterRange(String),

    /// A receive counter would exceed the send counter. Clamped and
    /// logged, never propagated.
    #[error("counter inconsistency: received {received} > sent {sent}")]
    CounterInconsistency { sent: u64, received: u64 },
}
