//! Send/receive accounting and derived error rates.
//!
//! Counters live on the [`DeviceRecord`]; this engine owns the update
//! rules: duplicate suppression, clamping, and thresholded telemetry so a
//! chatty device cannot flood the event bus.

use tracing::{debug, warn};

use skylink_core::config::AdrConfig;
use skylink_core::event::SkylinkEvent;
use skylink_core::eventbus::SharedEventBus;
use skylink_core::types::{GatewayId, SimTime};

use crate::model::NetworkError;
use crate::record::DeviceRecord;

/// Error rates derived from a device's counters, both in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorRates {
    /// Fraction of transmissions no gateway heard.
    pub device_to_gateway: f64,
    /// Fraction of transmissions that never reached the server.
    pub end_to_end: f64,
}

/// Maintains per-device counters and emits statistics telemetry.
pub struct StatisticsEngine {
    bus: SharedEventBus,
    guard_window_ms: f64,
    rate_change_threshold: f64,
}

impl StatisticsEngine {
    /// Create an engine with the configured guard window and notification
    /// threshold.
    pub fn new(bus: SharedEventBus, config: &AdrConfig) -> Self {
        Self {
            bus,
            guard_window_ms: config.guard_window_ms,
            rate_change_threshold: config.rate_change_threshold,
        }
    }

    /// Record that the device transmitted an uplink at `now`.
    ///
    /// A second report inside the guard window is the same physical event
    /// arriving through another code path; it is suppressed. Returns
    /// whether the transmission was counted.
    pub fn record_transmission(&self, record: &mut DeviceRecord, now: SimTime) -> bool {
        if let Some(last) = record.last_transmission_recorded {
            let elapsed_ms = now.millis_since(last);
            if elapsed_ms < self.guard_window_ms {
                debug!(
                    device = %record.addr,
                    elapsed_ms,
                    "duplicate transmission report suppressed"
                );
                return false;
            }
        }
        record.last_transmission_recorded = Some(now);
        record.sent += 1;
        self.maybe_publish(record);
        true
    }

    /// Record that `gateway` reported a reception for the device.
    ///
    /// Counts every report, including duplicates of the same transmission;
    /// this is the macro-diversity accounting.
    pub fn record_gateway_reception(&self, record: &mut DeviceRecord, gateway: GatewayId) {
        *record.per_gateway.entry(gateway).or_insert(0) += 1;
        debug!(device = %record.addr, gateway = %gateway, "gateway reception recorded");
    }

    /// Record that a unique uplink reached the server.
    ///
    /// Called exactly once per sequence counter, on first creation of the
    /// reception. The server counter can never exceed the send counter;
    /// a violation is clamped and logged, not propagated.
    pub fn record_server_reception(&self, record: &mut DeviceRecord) {
        record.received_by_any_gateway += 1;
        if record.received_by_server >= record.sent {
            let err = NetworkError::CounterInconsistency {
                sent: record.sent,
                received: record.received_by_server + 1,
            };
            warn!(device = %record.addr, %err, "clamping server reception counter");
            record.received_by_server = record.sent;
        } else {
            record.received_by_server += 1;
        }
        self.maybe_publish(record);
    }

    /// Current error rates for the device.
    ///
    /// Both rates are clamped to [0, 1] and defined as 0 when nothing was
    /// sent yet.
    pub fn error_rates(&self, record: &DeviceRecord) -> ErrorRates {
        if record.sent == 0 {
            return ErrorRates {
                device_to_gateway: 0.0,
                end_to_end: 0.0,
            };
        }
        let sent = record.sent as f64;
        let device_to_gateway =
            ((sent - record.received_by_any_gateway as f64) / sent).clamp(0.0, 1.0);
        let end_to_end = ((sent - record.received_by_server as f64) / sent).clamp(0.0, 1.0);
        ErrorRates {
            device_to_gateway,
            end_to_end,
        }
    }

    /// Emit telemetry if a figure moved past the change threshold since it
    /// was last reported.
    fn maybe_publish(&self, record: &mut DeviceRecord) {
        let rates = self.error_rates(record);

        let rate_moved = match record.last_reported_error_rate {
            Some(last) => (rates.end_to_end - last).abs() > self.rate_change_threshold,
            None => true,
        };
        if rate_moved {
            record.last_reported_error_rate = Some(rates.end_to_end);
            self.bus.publish_with_source(
                SkylinkEvent::ErrorRateUpdated {
                    device: record.addr,
                    sent: record.sent,
                    received: record.received_by_server,
                    rate: rates.end_to_end,
                },
                "statistics",
            );
        }

        let efficiency = 1.0 - rates.end_to_end;
        let efficiency_moved = match record.last_reported_efficiency {
            Some(last) => (efficiency - last).abs() > self.rate_change_threshold,
            None => true,
        };
        if efficiency_moved {
            record.last_reported_efficiency = Some(efficiency);
            self.bus.publish_with_source(
                SkylinkEvent::EfficiencyChanged {
                    device: record.addr,
                    efficiency,
                },
                "statistics",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use skylink_core::eventbus::EventBus;
    use skylink_core::types::DevAddr;

    use crate::model::TxParams;

    fn engine() -> (StatisticsEngine, SharedEventBus) {
        let bus: SharedEventBus = Arc::new(EventBus::new());
        let engine = StatisticsEngine::new(bus.clone(), &AdrConfig::default());
        (engine, bus)
    }

    #[test]
    fn test_guard_window_suppresses_duplicates() {
        let (engine, _bus) = engine();
        let mut record = DeviceRecord::new(DevAddr(1), TxParams::default());

        assert!(engine.record_transmission(&mut record, SimTime::from_millis(100.0)));
        // Same physical event reported again 0.5 ms later.
        assert!(!engine.record_transmission(&mut record, SimTime::from_millis(100.5)));
        assert_eq!(record.sent, 1);

        // A real follow-up transmission outside the window counts.
        assert!(engine.record_transmission(&mut record, SimTime::from_millis(1200.0)));
        assert_eq!(record.sent, 2);
    }

    #[test]
    fn test_server_counter_clamped() {
        let (engine, _bus) = engine();
        let mut record = DeviceRecord::new(DevAddr(1), TxParams::default());

        engine.record_transmission(&mut record, SimTime::from_millis(0.0));
        engine.record_server_reception(&mut record);
        // A second server reception without a matching transmission must
        // clamp, never exceed `sent`.
        engine.record_server_reception(&mut record);
        assert_eq!(record.sent, 1);
        assert_eq!(record.received_by_server, 1);
        assert!(record.received_by_server <= record.sent);
    }

    #[test]
    fn test_error_rates_zero_sent() {
        let (engine, _bus) = engine();
        let record = DeviceRecord::new(DevAddr(1), TxParams::default());
        let rates = engine.error_rates(&record);
        assert_eq!(rates.device_to_gateway, 0.0);
        assert_eq!(rates.end_to_end, 0.0);
    }

    #[test]
    fn test_error_rates_all_lost() {
        let (engine, _bus) = engine();
        let mut record = DeviceRecord::new(DevAddr(1), TxParams::default());
        for i in 0..5 {
            engine.record_transmission(&mut record, SimTime::from_secs(i as f64));
        }
        let rates = engine.error_rates(&record);
        assert_eq!(rates.end_to_end, 1.0);
        assert_eq!(rates.device_to_gateway, 1.0);
    }

    #[tokio::test]
    async fn test_rate_telemetry_thresholded() {
        let (engine, bus) = engine();
        let mut rx = bus.filter().statistics_events();
        let mut record = DeviceRecord::new(DevAddr(1), TxParams::default());

        // With small counters every update moves the rate past the
        // threshold, so events flow.
        engine.record_transmission(&mut record, SimTime::from_secs(0.0));
        engine.record_server_reception(&mut record);
        assert!(rx.try_recv().is_some());

        // Once the counters converge, the per-update jitter drops under
        // the threshold and the telemetry goes quiet.
        for i in 1..=100 {
            engine.record_transmission(&mut record, SimTime::from_secs(i as f64));
            engine.record_server_reception(&mut record);
        }
        while rx.try_recv().is_some() {}

        engine.record_transmission(&mut record, SimTime::from_secs(101.0));
        engine.record_server_reception(&mut record);
        assert!(rx.try_recv().is_none());
    }
}
