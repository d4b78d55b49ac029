//! Command staging for downlink delivery.
//!
//! One pending slot per device: a newer decision supersedes whatever was
//! staged before it. The external downlink scheduler collects payloads
//! with [`CommandEmitter::take`]; everything past that point (gateway
//! selection, receive-window timing) belongs to it.

use dashmap::DashMap;
use tracing::{debug, info};

use skylink_core::config::PendingCommandPolicy;
use skylink_core::event::SkylinkEvent;
use skylink_core::eventbus::SharedEventBus;
use skylink_core::types::{DevAddr, SimTime};
use skylink_network::model::RateDecision;

use crate::command::{CommandStatus, StagedCommand};

/// Stages accepted rate decisions as downlink commands.
pub struct CommandEmitter {
    pending: DashMap<DevAddr, StagedCommand>,
    bus: SharedEventBus,
}

impl CommandEmitter {
    /// Create an emitter publishing lifecycle events on the given bus.
    pub fn new(bus: SharedEventBus) -> Self {
        Self {
            pending: DashMap::new(),
            bus,
        }
    }

    /// Stage a command for an accepted decision.
    ///
    /// Any command already pending for the device is superseded.
    pub fn stage(&self, device: DevAddr, decision: RateDecision, now: SimTime) -> StagedCommand {
        let command = StagedCommand::new(device, decision, now);

        if let Some((_, mut previous)) = self.pending.remove(&device) {
            previous.status = CommandStatus::Superseded;
            debug!(device = %device, command = %previous.id, "pending command superseded");
            self.bus.publish_with_source(
                SkylinkEvent::CommandSuperseded {
                    device,
                    command_id: previous.id,
                },
                "emitter",
            );
        }

        info!(device = %device, command = %command.id, decision = %decision, "command staged");
        self.bus.publish_with_source(
            SkylinkEvent::CommandStaged {
                device,
                command_id: command.id,
            },
            "emitter",
        );
        self.pending.insert(device, command.clone());
        command
    }

    /// Hand the pending command to the downlink scheduler, if any.
    pub fn take(&self, device: DevAddr) -> Option<StagedCommand> {
        let (_, mut command) = self.pending.remove(&device)?;
        command.status = CommandStatus::Delivered;
        debug!(device = %device, command = %command.id, "command taken for downlink");
        Some(command)
    }

    /// Peek at the pending command without consuming it.
    pub fn pending(&self, device: DevAddr) -> Option<StagedCommand> {
        self.pending.get(&device).map(|c| c.clone())
    }

    /// Drop the pending command for a device, if any, without delivery.
    pub fn discard(&self, device: DevAddr) -> Option<StagedCommand> {
        self.pending.remove(&device).map(|(_, c)| c)
    }

    /// Number of devices with a command pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Housekeeping sweep: expire commands older than the policy allows.
    ///
    /// Returns the devices whose commands expired so the caller can reset
    /// their control-loop phase.
    pub fn sweep(&self, now: SimTime, policy: PendingCommandPolicy) -> Vec<StagedCommand> {
        let max_age_ms = match policy {
            PendingCommandPolicy::WaitIndefinitely => return Vec::new(),
            PendingCommandPolicy::ExpireAfter { ms } => ms,
        };

        let stale: Vec<DevAddr> = self
            .pending
            .iter()
            .filter(|entry| now.millis_since(entry.staged_at) > max_age_ms)
            .map(|entry| *entry.key())
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for device in stale {
            if let Some((_, mut command)) = self.pending.remove(&device) {
                command.status = CommandStatus::Expired;
                info!(device = %device, command = %command.id, "pending command expired");
                self.bus.publish_with_source(
                    SkylinkEvent::CommandExpired {
                        device,
                        command_id: command.id,
                    },
                    "emitter",
                );
                expired.push(command);
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use skylink_core::eventbus::EventBus;

    fn emitter() -> CommandEmitter {
        CommandEmitter::new(Arc::new(EventBus::new()))
    }

    fn decision(data_rate: u8) -> RateDecision {
        RateDecision {
            data_rate,
            tx_power_dbm: 14,
            nb_trans: 1,
            predicted_airtime_ms: 100.0,
            predicted_per: 0.05,
        }
    }

    #[test]
    fn test_stage_and_take() {
        let emitter = emitter();
        let staged = emitter.stage(DevAddr(1), decision(3), SimTime::from_secs(1.0));
        assert_eq!(staged.status, CommandStatus::Staged);
        assert_eq!(emitter.pending_count(), 1);

        let taken = emitter.take(DevAddr(1)).unwrap();
        assert_eq!(taken.id, staged.id);
        assert_eq!(taken.status, CommandStatus::Delivered);
        assert!(emitter.take(DevAddr(1)).is_none());
    }

    #[test]
    fn test_newer_decision_supersedes() {
        let emitter = emitter();
        let first = emitter.stage(DevAddr(1), decision(3), SimTime::from_secs(1.0));
        let second = emitter.stage(DevAddr(1), decision(4), SimTime::from_secs(2.0));

        assert_ne!(first.id, second.id);
        assert_eq!(emitter.pending_count(), 1);
        let taken = emitter.take(DevAddr(1)).unwrap();
        assert_eq!(taken.id, second.id);
        assert_eq!(taken.decision.data_rate, 4);
    }

    #[test]
    fn test_sweep_wait_indefinitely_keeps_commands() {
        let emitter = emitter();
        emitter.stage(DevAddr(1), decision(3), SimTime::from_secs(1.0));

        let expired = emitter.sweep(
            SimTime::from_secs(1_000_000.0),
            PendingCommandPolicy::WaitIndefinitely,
        );
        assert!(expired.is_empty());
        assert_eq!(emitter.pending_count(), 1);
    }

    #[test]
    fn test_sweep_expires_stale_commands() {
        let emitter = emitter();
        emitter.stage(DevAddr(1), decision(3), SimTime::from_secs(1.0));
        emitter.stage(DevAddr(2), decision(4), SimTime::from_secs(90.0));

        let expired = emitter.sweep(
            SimTime::from_secs(100.0),
            PendingCommandPolicy::ExpireAfter { ms: 30_000.0 },
        );
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].device, DevAddr(1));
        assert_eq!(expired[0].status, CommandStatus::Expired);
        // The fresh command survives.
        assert!(emitter.pending(DevAddr(2)).is_some());
    }
}
