//! Joint grid-search rate controller.
//!
//! Minimizes predicted airtime over the full candidate grid
//! data rate × transmit power × repetition count, subject to the predicted
//! PER staying under the configured target. The current configuration is
//! the incumbent: if no feasible candidate beats it, the evaluation
//! explicitly declines.

use tracing::debug;

use skylink_core::config::AdrConfig;
use skylink_network::model::{RateDecision, TxParams};
use skylink_network::region;

use crate::airtime::AirtimeModel;
use crate::per::{mean_snr_by_gateway, predict_per};
use crate::strategy::{EvaluationContext, RateStrategy};

/// Airtime-minimizing grid-search controller.
pub struct SearchOptimizingController {
    per_target: f64,
    noise_floor_dbm: f64,
    airtime: AirtimeModel,
}

impl SearchOptimizingController {
    pub fn from_config(config: &AdrConfig) -> Self {
        Self {
            per_target: config.per_target,
            noise_floor_dbm: config.noise_floor_dbm,
            airtime: AirtimeModel::from_config(config),
        }
    }
}

/// A grid candidate with its model predictions.
struct Candidate {
    params: TxParams,
    airtime_ms: f64,
    per: f64,
}

impl Candidate {
    /// Ordering among feasible candidates: least airtime, then least
    /// power, then fewest repetitions.
    fn better_than(&self, other: &Candidate) -> bool {
        if self.airtime_ms != other.airtime_ms {
            return self.airtime_ms < other.airtime_ms;
        }
        if self.params.tx_power_dbm != other.params.tx_power_dbm {
            return self.params.tx_power_dbm < other.params.tx_power_dbm;
        }
        self.params.nb_trans < other.params.nb_trans
    }
}

impl RateStrategy for SearchOptimizingController {
    fn name(&self) -> &'static str {
        "search_optimizing"
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

        let means = mean_snr_by_gateway(ctx.history, self.noise_floor_dbm);
        if means.is_empty() {
            return None;
        }

        let mut best: Option<Candidate> = None;
        let mut evaluated = 0usize;

        for data_rate in region::MIN_DATA_RATE..=region::MAX_DATA_RATE {
            for &tx_power_dbm in &region::TX_POWERS_DBM {
                for nb_trans in region::MIN_NB_TRANS..=region::MAX_NB_TRANS {
                    evaluated += 1;
                    let params = TxParams::new(data_rate, tx_power_dbm, nb_trans);
                    let per = predict_per(&means, ctx.params, params);
                    if per > self.per_target {
                        continue;
                    }
                    let candidate = Candidate {
                        params,
                        airtime_ms: self.airtime.time_on_air_ms(data_rate, nb_trans),
                        per,
                    };
                    if best.as_ref().is_none_or(|b| candidate.better_than(b)) {
                        best = Some(candidate);
                    }
                }
            }
        }

        let best = best?;
        debug!(
            evaluated,
            winner = %best.params,
            airtime_ms = best.airtime_ms,
            per = best.per,
            "grid search complete"
        );

        if best.params == ctx.params {
            // The incumbent already wins; no change to emit.
            return None;
        }

        Some(RateDecision {
            data_rate: best.params.data_rate,
            tx_power_dbm: best.params.tx_power_dbm,
            nb_trans: best.params.nb_trans,
            predicted_airtime_ms: best.airtime_ms,
            predicted_per: best.per,
        })
    }
}
