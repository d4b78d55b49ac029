//! Packet-error-rate prediction.
//!
//! The benefit side of every rate decision: given the SNR each gateway has
//! been observing, what error rate would the device see under candidate
//! parameters? The model extrapolates each gateway's mean SNR by the power
//! delta, converts margin over the demodulation threshold to a per-frame
//! error probability, discounts repetitions as independent attempts, and
//! multiplies across gateways — the transmission is lost only if every
//! gateway misses every attempt.

use std::collections::HashMap;
use std::collections::VecDeque;

use skylink_core::types::GatewayId;
use skylink_network::model::{TxParams, UplinkReception};
use skylink_network::region;

/// Frame error rate for a single attempt at a single gateway.
///
/// At or above the demodulation threshold the error probability decays
/// exponentially with margin; below it, demodulation fails outright.
pub fn frame_error_rate(snr_db: f64, data_rate: u8) -> f64 {
    let threshold = region::snr_threshold_db(data_rate);
    if snr_db >= threshold {
        (-(snr_db - threshold)).exp()
    } else {
        1.0
    }
}

/// Mean SNR observed at each gateway across the history window.
pub fn mean_snr_by_gateway(
    history: &VecDeque<UplinkReception>,
    noise_floor_dbm: f64,
) -> HashMap<GatewayId, f64> {
    let mut sums: HashMap<GatewayId, (f64, u32)> = HashMap::new();
    for reception in history {
        for (&gateway, info) in &reception.gateways {
            let entry = sums.entry(gateway).or_insert((0.0, 0));
            entry.0 += info.rx_power_dbm - noise_floor_dbm;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(gateway, (sum, count))| (gateway, sum / count as f64))
        .collect()
}

/// Predicted packet error rate under `candidate`, given per-gateway mean
/// SNR observed under `current` power.
///
/// An empty gateway set predicts certain loss.
pub fn predict_per(
    gateway_mean_snr: &HashMap<GatewayId, f64>,
    current: TxParams,
    candidate: TxParams,
) -> f64 {
    if gateway_mean_snr.is_empty() {
        return 1.0;
    }
    let power_shift = (candidate.tx_power_dbm - current.tx_power_dbm) as f64;
    let mut per = 1.0;
    for &mean_snr in gateway_mean_snr.values() {
        let snr = mean_snr + power_shift;
        let fer = frame_error_rate(snr, candidate.data_rate);
        per *= fer.powi(candidate.nb_trans as i32);
    }
    per
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylink_core::types::SimTime;
    use skylink_network::model::GatewayReception;

    fn history_with(gateway: GatewayId, rx_powers: &[f64]) -> VecDeque<UplinkReception> {
        rx_powers
            .iter()
            .enumerate()
            .map(|(i, &rx)| {
                UplinkReception::new(
                    i as u32,
                    12,
                    868_100_000,
                    SimTime::from_secs(i as f64),
                    gateway,
                    GatewayReception {
                        rx_power_dbm: rx,
                        received_at: SimTime::from_secs(i as f64),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_fer_below_threshold_is_certain_loss() {
        // DR5 demodulates down to -7.5 dB.
        assert_eq!(frame_error_rate(-8.0, 5), 1.0);
        assert!(frame_error_rate(-7.5, 5) <= 1.0);
    }

    #[test]
    fn test_fer_decays_with_margin() {
        let at_threshold = frame_error_rate(-7.5, 5);
        let above = frame_error_rate(0.0, 5);
        let well_above = frame_error_rate(10.0, 5);
        assert!(above < at_threshold);
        assert!(well_above < above);
        assert!((at_threshold - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_snr_per_gateway() {
        let gateway = GatewayId::new();
        // -107 dBm over a -117 dBm floor is 10 dB SNR.
        let history = history_with(gateway, &[-107.0, -109.0, -105.0]);
        let means = mean_snr_by_gateway(&history, -117.0);
        assert_eq!(means.len(), 1);
        assert!((means[&gateway] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_power_shift_extrapolation() {
        let gateway = GatewayId::new();
        let mut means = HashMap::new();
        means.insert(gateway, 0.0);
        let current = TxParams::new(0, 14, 1);

        // Dropping power pushes SNR below the DR5 threshold.
        let low = TxParams::new(5, 2, 1);
        assert_eq!(predict_per(&means, current, low), 1.0);
        // At full power the margin survives.
        let high = TxParams::new(5, 14, 1);
        assert!(predict_per(&means, current, high) < 1.0);
    }

    #[test]
    fn test_repetitions_never_increase_per() {
        let gateway = GatewayId::new();
        let mut means = HashMap::new();
        means.insert(gateway, 5.0);
        let current = TxParams::new(0, 14, 1);
        for dr in 0..=5u8 {
            for &power in &region::TX_POWERS_DBM {
                let mut last = f64::INFINITY;
                for nb in 1..=3u8 {
                    let per = predict_per(&means, current, TxParams::new(dr, power, nb));
                    assert!(per <= last + 1e-15);
                    last = per;
                }
            }
        }
    }

    #[test]
    fn test_diversity_reduces_per() {
        let gw_a = GatewayId::new();
        let gw_b = GatewayId::new();
        let current = TxParams::new(0, 14, 1);
        let candidate = TxParams::new(3, 14, 1);

        let mut one = HashMap::new();
        one.insert(gw_a, 0.0);
        let mut two = one.clone();
        two.insert(gw_b, 0.0);

        let per_one = predict_per(&one, current, candidate);
        let per_two = predict_per(&two, current, candidate);
        assert!(per_two < per_one);
    }

    #[test]
    fn test_empty_history_predicts_loss() {
        let means = HashMap::new();
        let params = TxParams::default();
        assert_eq!(predict_per(&means, params, params), 1.0);
    }
}
