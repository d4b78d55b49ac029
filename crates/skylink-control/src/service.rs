//! Unified interface for the ADR control plane.
//!
//! `NetworkService` wires the pipeline together: uplink reports flow
//! through the aggregator into per-device history, the statistics engine
//! keeps the counters honest, and when a device asks for adaptation with a
//! full history window its registered strategy is evaluated. Accepted
//! decisions update the device record and are staged for the next
//! downlink.

use std::sync::Arc;

use tracing::{debug, info, warn};

use skylink_commands::{CommandEmitter, StagedCommand};
use skylink_core::config::{AdrConfig, StrategyKind};
use skylink_core::event::SkylinkEvent;
use skylink_core::eventbus::{EventBus, SharedEventBus};
use skylink_core::types::{DevAddr, GatewayId, SimTime};
use skylink_network::aggregator::{ReceptionAggregator, UplinkFrame};
use skylink_network::model::{AdrPhase, NetworkError, RateDecision, TxParams};
use skylink_network::registry::{DeviceRegistry, GatewayRegistry};
use skylink_network::stats::{ErrorRates, StatisticsEngine};

use crate::strategy::{EvaluationContext, RateStrategy, build_strategy};

/// The ADR control plane, one instance per network server.
pub struct NetworkService {
    config: AdrConfig,
    bus: SharedEventBus,
    devices: Arc<DeviceRegistry>,
    gateways: Arc<GatewayRegistry>,
    stats: Arc<StatisticsEngine>,
    aggregator: ReceptionAggregator,
    emitter: CommandEmitter,
    stepwise: Arc<dyn RateStrategy>,
    optimizing: Arc<dyn RateStrategy>,
}

impl NetworkService {
    /// Create a service with its own event bus.
    pub fn new(config: AdrConfig) -> Self {
        Self::with_bus(config, Arc::new(EventBus::with_name("skylink")))
    }

    /// Create a service publishing on an existing bus.
    pub fn with_bus(config: AdrConfig, bus: SharedEventBus) -> Self {
        let devices = Arc::new(DeviceRegistry::new(bus.clone()));
        let gateways = Arc::new(GatewayRegistry::new(bus.clone()));
        let stats = Arc::new(StatisticsEngine::new(bus.clone(), &config));
        let aggregator =
            ReceptionAggregator::new(devices.clone(), stats.clone(), config.history_range);
        let emitter = CommandEmitter::new(bus.clone());
        let stepwise = build_strategy(StrategyKind::StepwiseMargin, &config);
        let optimizing = build_strategy(StrategyKind::SearchOptimizing, &config);

        Self {
            config,
            bus,
            devices,
            gateways,
            stats,
            aggregator,
            emitter,
            stepwise,
            optimizing,
        }
    }

    /// The event bus telemetry consumers subscribe to.
    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    /// The active configuration.
    pub fn config(&self) -> &AdrConfig {
        &self.config
    }

    /// Register a device with default join parameters and the configured
    /// strategy.
    pub async fn register_device(&self, addr: DevAddr) -> Result<(), NetworkError> {
        self.register_device_with(addr, TxParams::default(), self.config.strategy)
            .await
    }

    /// Register a device with explicit parameters and strategy.
    pub async fn register_device_with(
        &self,
        addr: DevAddr,
        params: TxParams,
        strategy: StrategyKind,
    ) -> Result<(), NetworkError> {
        self.devices
            .register_with_strategy(addr, params, strategy)
            .await
    }

    /// Register a gateway, minting its identity.
    pub async fn register_gateway(&self, label: impl Into<String>) -> GatewayId {
        self.gateways.register(label).await
    }

    /// Record that a device transmitted an uplink.
    ///
    /// Returns whether the transmission was counted (duplicates inside the
    /// guard window are suppressed).
    pub async fn record_transmission(
        &self,
        addr: DevAddr,
        now: SimTime,
    ) -> Result<bool, NetworkError> {
        let record = self.devices.record(addr).await?;
        let mut record = record.write().await;
        Ok(self.stats.record_transmission(&mut record, now))
    }

    /// Handle one uplink report from the gateway layer.
    ///
    /// Returns the rate decision this uplink triggered, if any. Errors are
    /// device-local; the caller logs and moves on.
    pub async fn handle_uplink(
        &self,
        frame: &UplinkFrame,
    ) -> Result<Option<RateDecision>, NetworkError> {
        self.aggregator.on_uplink(frame).await?;

        let record = self.devices.record(frame.device).await?;
        let mut record = record.write().await;

        // An uplink under the new (or unchanged) parameters restarts the
        // cycle for a device that was waiting on a command.
        if record.phase == AdrPhase::CommandPending {
            record.phase = if record.history_full(self.config.history_range) {
                AdrPhase::Evaluating
            } else {
                AdrPhase::Collecting
            };
        }

        if !frame.adaptation_requested {
            return Ok(None);
        }
        if !record.history_full(self.config.history_range) {
            // Soft condition, not a failure.
            let err = NetworkError::InsufficientHistory {
                have: record.history.len(),
                need: self.config.history_range,
            };
            debug!(device = %frame.device, %err, "adaptation requested too early");
            return Ok(None);
        }

        let strategy = self.strategy_for(record.strategy);
        let ctx = EvaluationContext {
            history: &record.history,
            params: record.params,
            history_range: self.config.history_range,
        };
        let Some(decision) = strategy.evaluate(&ctx) else {
            return Ok(None);
        };

        // A decision outside the region table is a configuration defect:
        // clamp and continue rather than abort.
        let decision = match decision.params().validate() {
            Ok(()) => decision,
            Err(err) => {
                warn!(device = %frame.device, %err, "clamping out-of-range decision");
                let clamped = decision.params().clamped();
                RateDecision {
                    data_rate: clamped.data_rate,
                    tx_power_dbm: clamped.tx_power_dbm,
                    nb_trans: clamped.nb_trans,
                    ..decision
                }
            }
        };

        let old_nb_trans = record.params.nb_trans;
        record.params = decision.params();
        record.adjustment_count += 1;
        record.last_adjustment = Some(frame.send_time);
        if record.strategy == StrategyKind::SearchOptimizing && self.config.clear_history_on_adjust
        {
            // Learn fresh statistics under the new parameters instead of
            // mixing configurations.
            record.clear_history();
        }
        record.phase = AdrPhase::CommandPending;

        let staged = self.emitter.stage(frame.device, decision, frame.send_time);
        record.pending_command = Some(staged.id);

        info!(
            device = %frame.device,
            strategy = strategy.name(),
            %decision,
            adjustments = record.adjustment_count,
            "rate decision accepted"
        );
        self.bus.publish_with_source(
            SkylinkEvent::AdrAdjustment {
                device: frame.device,
                data_rate: decision.data_rate,
                tx_power_dbm: decision.tx_power_dbm,
                nb_trans: decision.nb_trans,
            },
            "control",
        );
        if decision.nb_trans != old_nb_trans {
            self.bus.publish_with_source(
                SkylinkEvent::NbTransChanged {
                    device: frame.device,
                    old: old_nb_trans,
                    new: decision.nb_trans,
                },
                "control",
            );
        }

        Ok(Some(decision))
    }

    /// Hand the pending downlink command for a device to the scheduler.
    pub async fn take_downlink(&self, addr: DevAddr) -> Option<StagedCommand> {
        let command = self.emitter.take(addr)?;
        if let Ok(record) = self.devices.record(addr).await {
            let mut record = record.write().await;
            if record.pending_command == Some(command.id) {
                record.pending_command = None;
            }
        }
        Some(command)
    }

    /// Peek at a device's pending command without consuming it.
    pub fn pending_downlink(&self, addr: DevAddr) -> Option<StagedCommand> {
        self.emitter.pending(addr)
    }

    /// Current error rates for a device.
    pub async fn error_rates(&self, addr: DevAddr) -> Result<ErrorRates, NetworkError> {
        let record = self.devices.record(addr).await?;
        let record = record.read().await;
        Ok(self.stats.error_rates(&record))
    }

    /// Housekeeping sweep: expire stale pending commands per the
    /// configured policy and return the affected devices to collection.
    pub async fn sweep(&self, now: SimTime) -> usize {
        let expired = self.emitter.sweep(now, self.config.pending_policy);
        for command in &expired {
            if let Ok(record) = self.devices.record(command.device).await {
                let mut record = record.write().await;
                if record.pending_command == Some(command.id) {
                    record.pending_command = None;
                    if record.phase == AdrPhase::CommandPending {
                        record.phase = AdrPhase::Collecting;
                    }
                }
            }
        }
        expired.len()
    }

    /// The device registry (read access for orchestration and tests).
    pub fn devices(&self) -> &Arc<DeviceRegistry> {
        &self.devices
    }

    /// The gateway registry.
    pub fn gateways(&self) -> &Arc<GatewayRegistry> {
        &self.gateways
    }

    fn strategy_for(&self, kind: StrategyKind) -> &Arc<dyn RateStrategy> {
        match kind {
            StrategyKind::StepwiseMargin => &self.stepwise,
            StrategyKind::SearchOptimizing => &self.optimizing,
        }
    }
}
