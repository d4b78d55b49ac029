//! Downlink command data structures.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use skylink_core::types::{DevAddr, SimTime};
use skylink_network::model::RateDecision;
use skylink_network::region;

/// Unique command identifier.
pub type CommandId = Uuid;

/// Rate-adaptation request payload for the next downlink.
///
/// This is the full content of the command as handed to the downlink
/// scheduler; framing and delivery are not our concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAdrPayload {
    /// Target data-rate index.
    pub data_rate: u8,
    /// TXPower field: 0 is maximum power, one step per -2 dB.
    pub tx_power_index: u8,
    /// Enabled uplink channels.
    pub channel_mask: u16,
    /// Requested repetitions per uplink.
    pub nb_trans: u8,
}

impl LinkAdrPayload {
    /// Build the payload for an accepted rate decision.
    pub fn from_decision(decision: &RateDecision) -> Self {
        Self {
            data_rate: decision.data_rate,
            tx_power_index: region::tx_power_index(decision.tx_power_dbm),
            channel_mask: region::DEFAULT_CHANNEL_MASK,
            nb_trans: decision.nb_trans,
        }
    }
}

/// Lifecycle of a staged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    /// Waiting for the next downlink opportunity.
    Staged,
    /// Handed to the downlink scheduler.
    Delivered,
    /// Replaced by a newer decision before delivery.
    Superseded,
    /// Dropped by the housekeeping sweep.
    Expired,
}

impl CommandStatus {
    /// Check if the command is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Delivered | CommandStatus::Superseded | CommandStatus::Expired
        )
    }
}

/// A rate decision packaged for downlink delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedCommand {
    /// Command ID.
    pub id: CommandId,
    /// Target device.
    pub device: DevAddr,
    /// Downlink payload.
    pub payload: LinkAdrPayload,
    /// The decision that produced this command.
    pub decision: RateDecision,
    /// When the command was staged.
    pub staged_at: SimTime,
    /// Current lifecycle state.
    pub status: CommandStatus,
}

impl StagedCommand {
    /// Stage a new command for a decision.
    pub fn new(device: DevAddr, decision: RateDecision, staged_at: SimTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            payload: LinkAdrPayload::from_decision(&decision),
            decision,
            staged_at,
            status: CommandStatus::Staged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision() -> RateDecision {
        RateDecision {
            data_rate: 5,
            tx_power_dbm: 8,
            nb_trans: 2,
            predicted_airtime_ms: 61.7,
            predicted_per: 0.02,
        }
    }

    #[test]
    fn test_payload_from_decision() {
        let payload = LinkAdrPayload::from_decision(&decision());
        assert_eq!(payload.data_rate, 5);
        // 8 dBm is three 2 dB steps below the 14 dBm maximum.
        assert_eq!(payload.tx_power_index, 3);
        assert_eq!(payload.nb_trans, 2);
        assert_eq!(payload.channel_mask, region::DEFAULT_CHANNEL_MASK);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!CommandStatus::Staged.is_terminal());
        assert!(CommandStatus::Delivered.is_terminal());
        assert!(CommandStatus::Superseded.is_terminal());
        assert!(CommandStatus::Expired.is_terminal());
    }

    #[test]
    fn test_payload_serializes_for_downlink() {
        let payload = LinkAdrPayload::from_decision(&decision());
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"data_rate\":5"));
        assert!(json.contains("\"tx_power_index\":3"));
        assert!(json.contains("\"nb_trans\":2"));
    }
}
