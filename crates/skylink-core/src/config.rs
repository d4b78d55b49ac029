//! Control-plane configuration.
//!
//! All tunables of the rate-adaptation loop live here, with their defaults
//! in one place and optional environment-variable overrides. Components take
//! the config by value or reference at construction; nothing reads the
//! environment after startup.

use serde::{Deserialize, Serialize};

/// Which rate-control strategy a device is registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// SNR-margin-based incremental adjustment (classic ADR).
    #[default]
    StepwiseMargin,
    /// Joint grid search minimizing airtime under a PER constraint.
    SearchOptimizing,
}

impl StrategyKind {
    /// Parse from a string identifier, as used in env overrides.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "stepwise_margin" | "stepwise" | "margin" => Some(StrategyKind::StepwiseMargin),
            "search_optimizing" | "optimizing" | "search" => Some(StrategyKind::SearchOptimizing),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            StrategyKind::StepwiseMargin => "stepwise_margin",
            StrategyKind::SearchOptimizing => "search_optimizing",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Rule for combining several SNR samples into one figure.
///
/// Used twice, independently: once across the gateways that heard a single
/// transmission, once across the transmissions in a device's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnrCombining {
    Average,
    Max,
    Min,
}

impl SnrCombining {
    /// Combine a set of SNR samples. Returns `None` for an empty set.
    pub fn combine(&self, samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        Some(match self {
            SnrCombining::Average => samples.iter().sum::<f64>() / samples.len() as f64,
            SnrCombining::Max => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            SnrCombining::Min => samples.iter().copied().fold(f64::INFINITY, f64::min),
        })
    }
}

/// What to do with a staged command the device never confirms.
///
/// `WaitIndefinitely` relies on a superseding decision to replace the stale
/// command. `ExpireAfter` lets the housekeeping sweep drop it, returning the
/// device to history collection so the next full window re-asserts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingCommandPolicy {
    WaitIndefinitely,
    ExpireAfter { ms: f64 },
}

impl Default for PendingCommandPolicy {
    fn default() -> Self {
        PendingCommandPolicy::WaitIndefinitely
    }
}

/// Default values for all tunables.
pub mod defaults {
    /// Receptions accumulated before a device becomes eligible for
    /// evaluation.
    pub const HISTORY_RANGE: usize = 20;
    /// dB of link margin consumed per data-rate step.
    pub const MARGIN_STEP_DB: f64 = 3.0;
    /// dB per transmit-power step.
    pub const POWER_STEP_DB: f64 = 2.0;
    /// Packet-error-rate ceiling the optimizer must respect.
    pub const PER_TARGET: f64 = 0.1;
    /// Duplicate-transmission suppression window, in simulated
    /// milliseconds. A window wider than a device's legitimate
    /// back-to-back retransmission spacing undercounts `sent`.
    pub const GUARD_WINDOW_MS: f64 = 1.0;
    /// Minimum change in an error rate or efficiency figure before a new
    /// telemetry event is emitted.
    pub const RATE_CHANGE_THRESHOLD: f64 = 0.01;
    /// Thermal noise floor for a 125 kHz channel plus a 6 dB receiver
    /// noise figure. Converts reported rx power to SNR.
    pub const NOISE_FLOOR_DBM: f64 = -117.0;
    /// Application payload size assumed by the airtime model, in bytes.
    pub const PAYLOAD_BYTES: usize = 20;
    /// Preamble length in symbols.
    pub const PREAMBLE_SYMBOLS: usize = 8;
    /// Channel bandwidth in Hz.
    pub const BANDWIDTH_HZ: u32 = 125_000;
    /// Coding rate index: 1 => 4/5.
    pub const CODING_RATE: u8 = 1;
}

/// Environment variable names and parse-or-default helpers.
pub mod env_vars {
    use super::{StrategyKind, defaults};

    pub const HISTORY_RANGE: &str = "SKYLINK_HISTORY_RANGE";
    pub const PER_TARGET: &str = "SKYLINK_PER_TARGET";
    pub const GUARD_WINDOW_MS: &str = "SKYLINK_GUARD_WINDOW_MS";
    pub const STRATEGY: &str = "SKYLINK_STRATEGY";

    /// History range from the environment, or the default.
    pub fn history_range() -> usize {
        std::env::var(HISTORY_RANGE)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::HISTORY_RANGE)
    }

    /// PER target from the environment, or the default.
    pub fn per_target() -> f64 {
        std::env::var(PER_TARGET)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::PER_TARGET)
    }

    /// Guard window from the environment, or the default.
    pub fn guard_window_ms() -> f64 {
        std::env::var(GUARD_WINDOW_MS)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::GUARD_WINDOW_MS)
    }

    /// Strategy from the environment, or the default.
    pub fn strategy() -> StrategyKind {
        std::env::var(STRATEGY)
            .ok()
            .and_then(|s| StrategyKind::from_str_opt(&s))
            .unwrap_or_default()
    }
}

/// Configuration for the rate-adaptation control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdrConfig {
    /// Receptions required before evaluation (the history window size).
    pub history_range: usize,
    /// Strategy newly registered devices are assigned.
    pub strategy: StrategyKind,
    /// SNR combining across the gateways of one reception.
    pub gateway_combining: SnrCombining,
    /// SNR combining across the receptions in the history window.
    pub history_combining: SnrCombining,
    /// dB of margin per data-rate step.
    pub margin_step_db: f64,
    /// dB per transmit-power step.
    pub power_step_db: f64,
    /// PER ceiling for the optimizing strategy.
    pub per_target: f64,
    /// Duplicate-transmission guard window, simulated milliseconds.
    pub guard_window_ms: f64,
    /// Minimum error-rate delta before telemetry is re-emitted.
    pub rate_change_threshold: f64,
    /// Clear the history window after an accepted optimizer decision, so
    /// the next cycle learns statistics under the new parameters instead
    /// of mixing configurations. Disable to retain diversity samples.
    pub clear_history_on_adjust: bool,
    /// Expiry policy for staged commands the device never confirms.
    pub pending_policy: PendingCommandPolicy,
    /// Noise floor used to derive SNR from reported rx power.
    pub noise_floor_dbm: f64,
    /// Airtime model: application payload size in bytes.
    pub payload_bytes: usize,
    /// Airtime model: preamble length in symbols.
    pub preamble_symbols: usize,
    /// Airtime model: channel bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// Airtime model: coding rate index (1..=4, meaning 4/(4+cr)).
    pub coding_rate: u8,
    /// Airtime model: explicit PHY header present.
    pub explicit_header: bool,
    /// Airtime model: payload CRC present.
    pub crc_enabled: bool,
}

impl Default for AdrConfig {
    fn default() -> Self {
        Self {
            history_range: defaults::HISTORY_RANGE,
            strategy: StrategyKind::default(),
            gateway_combining: SnrCombining::Max,
            history_combining: SnrCombining::Average,
            margin_step_db: defaults::MARGIN_STEP_DB,
            power_step_db: defaults::POWER_STEP_DB,
            per_target: defaults::PER_TARGET,
            guard_window_ms: defaults::GUARD_WINDOW_MS,
            rate_change_threshold: defaults::RATE_CHANGE_THRESHOLD,
            clear_history_on_adjust: true,
            pending_policy: PendingCommandPolicy::default(),
            noise_floor_dbm: defaults::NOISE_FLOOR_DBM,
            payload_bytes: defaults::PAYLOAD_BYTES,
            preamble_symbols: defaults::PREAMBLE_SYMBOLS,
            bandwidth_hz: defaults::BANDWIDTH_HZ,
            coding_rate: defaults::CODING_RATE,
            explicit_header: true,
            crc_enabled: true,
        }
    }
}

impl AdrConfig {
    /// Defaults with environment-variable overrides applied.
    pub fn from_env() -> Self {
        Self {
            history_range: env_vars::history_range(),
            per_target: env_vars::per_target(),
            guard_window_ms: env_vars::guard_window_ms(),
            strategy: env_vars::strategy(),
            ..Self::default()
        }
    }
}
