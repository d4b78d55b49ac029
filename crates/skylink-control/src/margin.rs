//! Stepwise SNR-margin controller (classic ADR).
//!
//! Combines the observed SNR across gateways and across the history
//! window, measures the margin over the demodulation threshold at the
//! current data rate, and spends that margin in 3 dB steps: first on
//! faster data rates, then on lower transmit power. A negative margin
//! buys power back instead; the server never slows a device down — devices
//! raise their own spreading factor autonomously on repeated failure.

use tracing::{debug, trace};

use skylink_core::config::{AdrConfig, SnrCombining};
use skylink_network::model::RateDecision;
use skylink_network::region;

use crate::airtime::AirtimeModel;
use crate::per::{mean_snr_by_gateway, predict_per};
use crate::strategy::{EvaluationContext, RateStrategy};

/// SNR-margin-based incremental rate controller.
pub struct StepwiseMarginController {
    gateway_combining: SnrCombining,
    history_combining: SnrCombining,
    margin_step_db: f64,
    power_step_db: i8,
    noise_floor_dbm: f64,
    airtime: AirtimeModel,
}

impl StepwiseMarginController {
    pub fn from_config(config: &AdrConfig) -> Self {
        Self {
            gateway_combining: config.gateway_combining,
            history_combining: config.history_combining,
            margin_step_db: config.margin_step_db,
            power_step_db: config.power_step_db as i8,
            noise_floor_dbm: config.noise_floor_dbm,
            airtime: AirtimeModel::from_config(config),
        }
    }

    /// SNR combined across gateways per reception, then across the
    /// history window.
    fn combined_snr(&self, ctx: &EvaluationContext<'_>) -> Option<f64> {
        let per_reception: Vec<f64> = ctx
            .history
            .iter()
            .filter_map(|r| {
                self.gateway_combining
                    .combine(&r.gateway_snrs(self.noise_floor_dbm))
            })
            .collect();
        self.history_combining.combine(&per_reception)
    }
}

impl RateStrategy for StepwiseMarginController {
    fn name(&self) -> &'static str {
        "stepwise_margin"
    }

    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<RateDecision> {
        if !ctx.history_full() {
            debug!(
                have = ctx.history.len(),
                need = ctx.history_range,
                "history not full, skipping evaluation"
            );
            return None;
        }

        let combined = self.combined_snr(ctx)?;

        // The data rate the device is actually transmitting at, taken
        // from the most recent reception's spreading factor.
        let current_dr = ctx
            .history
            .back()
            .and_then(|r| region::data_rate_for_spreading_factor(r.spreading_factor))
            .unwrap_or(ctx.params.data_rate);

        let threshold = region::snr_threshold_db(current_dr);
        let margin = combined - threshold;
        let mut steps = (margin / self.margin_step_db).floor() as i32;
        trace!(combined, threshold, margin, steps, "margin computed");

        let mut data_rate = current_dr;
        let mut tx_power_dbm = ctx.params.tx_power_dbm;

        // Spend margin on data rate first, then on power.
        while steps > 0 && data_rate < region::MAX_DATA_RATE {
            data_rate += 1;
            steps -= 1;
        }
        while steps > 0 && tx_power_dbm > region::MIN_TX_POWER_DBM {
            tx_power_dbm = region::clamp_tx_power(tx_power_dbm - self.power_step_db);
            steps -= 1;
        }
        // Negative margin buys power back, up to the ceiling.
        while steps < 0 && tx_power_dbm < region::MAX_TX_POWER_DBM {
            tx_power_dbm = region::clamp_tx_power(tx_power_dbm + self.power_step_db);
            steps += 1;
        }

        if data_rate == ctx.params.data_rate && tx_power_dbm == ctx.params.tx_power_dbm {
            return None;
        }

        let mut candidate = ctx.params;
        candidate.data_rate = data_rate;
        candidate.tx_power_dbm = tx_power_dbm;

        let means = mean_snr_by_gateway(ctx.history, self.noise_floor_dbm);
        let decision = RateDecision {
            data_rate,
            tx_power_dbm,
            nb_trans: ctx.params.nb_trans,
            predicted_airtime_ms: self.airtime.time_on_air_ms(data_rate, ctx.params.nb_trans),
            predicted_per: predict_per(&means, ctx.params, candidate),
        };
        debug!(%decision, "stepwise margin decision");
        Some(decision)
    }
}
