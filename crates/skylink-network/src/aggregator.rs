//! Uplink reception aggregation.
//!
//! Raw per-gateway reports come in; deduplicated, multi-gateway-merged
//! logical receptions go into the device's history. The same transmission
//! heard by several gateways becomes one [`UplinkReception`] with one
//! server-reception increment, however many reports arrive and in whatever
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use skylink_core::types::{DevAddr, GatewayId, SimTime};

use crate::model::{AdrPhase, GatewayReception, NetworkError, UplinkReception};
use crate::registry::DeviceRegistry;
use crate::stats::StatisticsEngine;

/// Uplink ingress: what the physical/MAC layer reports about one
/// transmission, possibly already carrying several gateways' receptions.
#[derive(Debug, Clone)]
pub struct UplinkFrame {
    pub device: DevAddr,
    pub sequence: u32,
    pub spreading_factor: u8,
    pub frequency_hz: u32,
    /// Received power per reporting gateway, dBm.
    pub rx_power_by_gateway: HashMap<GatewayId, f64>,
    /// Device set the ADR acknowledgment-request flag.
    pub adaptation_requested: bool,
    pub send_time: SimTime,
}

impl UplinkFrame {
    /// Frame with a single reporting gateway.
    pub fn single(
        device: DevAddr,
        sequence: u32,
        spreading_factor: u8,
        frequency_hz: u32,
        gateway: GatewayId,
        rx_power_dbm: f64,
        send_time: SimTime,
    ) -> Self {
        let mut rx_power_by_gateway = HashMap::new();
        rx_power_by_gateway.insert(gateway, rx_power_dbm);
        Self {
            device,
            sequence,
            spreading_factor,
            frequency_hz,
            rx_power_by_gateway,
            adaptation_requested: false,
            send_time,
        }
    }

    /// Set the adaptation-requested flag.
    pub fn with_adaptation_requested(mut self) -> Self {
        self.adaptation_requested = true;
        self
    }

    /// Add another gateway's report to the frame.
    pub fn with_gateway(mut self, gateway: GatewayId, rx_power_dbm: f64) -> Self {
        self.rx_power_by_gateway.insert(gateway, rx_power_dbm);
        self
    }
}

/// Merges raw gateway reports into per-device reception history.
pub struct ReceptionAggregator {
    registry: Arc<DeviceRegistry>,
    stats: Arc<StatisticsEngine>,
    history_range: usize,
}

impl ReceptionAggregator {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        stats: Arc<StatisticsEngine>,
        history_range: usize,
    ) -> Self {
        Self {
            registry,
            stats,
            history_range,
        }
    }

    /// Ingest one uplink report.
    ///
    /// An unknown device fails only this event; nothing else is touched.
    /// A report for a sequence counter already in the history is merged
    /// into the existing reception (macro-diversity); a new sequence
    /// creates a reception, evicting the oldest once the window is full.
    pub async fn on_uplink(&self, frame: &UplinkFrame) -> Result<(), NetworkError> {
        if frame.rx_power_by_gateway.is_empty() {
            warn!(device = %frame.device, sequence = frame.sequence, "uplink report with no gateways, ignored");
            return Ok(());
        }

        let record = self.registry.record(frame.device).await?;
        let mut record = record.write().await;

        let created = match record.find_reception_mut(frame.sequence) {
            Some(existing) => {
                for (&gateway, &rx_power_dbm) in &frame.rx_power_by_gateway {
                    existing.merge_gateway(
                        gateway,
                        GatewayReception {
                            rx_power_dbm,
                            received_at: frame.send_time,
                        },
                    );
                }
                debug!(
                    device = %frame.device,
                    sequence = frame.sequence,
                    gateways = existing.gateways.len(),
                    "merged gateway reports into existing reception"
                );
                false
            }
            None => {
                let mut entries = frame.rx_power_by_gateway.iter();
                let (&first_gateway, &first_power) =
                    entries.next().expect("checked non-empty above");
                let mut reception = UplinkReception::new(
                    frame.sequence,
                    frame.spreading_factor,
                    frame.frequency_hz,
                    frame.send_time,
                    first_gateway,
                    GatewayReception {
                        rx_power_dbm: first_power,
                        received_at: frame.send_time,
                    },
                );
                for (&gateway, &rx_power_dbm) in entries {
                    reception.merge_gateway(
                        gateway,
                        GatewayReception {
                            rx_power_dbm,
                            received_at: frame.send_time,
                        },
                    );
                }
                record.push_reception(reception, self.history_range);
                true
            }
        };

        for &gateway in frame.rx_power_by_gateway.keys() {
            self.stats.record_gateway_reception(&mut record, gateway);
        }
        if created {
            self.stats.record_server_reception(&mut record);
        }

        if record.phase == AdrPhase::Collecting && record.history_full(self.history_range) {
            record.phase = AdrPhase::Evaluating;
        }

        Ok(())
    }
}
