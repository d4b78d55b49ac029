//! Regional radio parameter tables.
//!
//! EU868-style plan: six data rates paired with spreading factors 12 down
//! to 7 on a 125 kHz channel, transmit power from 2 to 14 dBm in 2 dB
//! steps, and up to three repetitions per uplink.

/// Lowest data-rate index (SF12, longest airtime, best sensitivity).
pub const MIN_DATA_RATE: u8 = 0;
/// Highest data-rate index (SF7, shortest airtime).
pub const MAX_DATA_RATE: u8 = 5;

/// Lowest permitted transmit power, dBm.
pub const MIN_TX_POWER_DBM: i8 = 2;
/// Highest permitted transmit power, dBm.
pub const MAX_TX_POWER_DBM: i8 = 14;
/// Transmit-power ladder, dBm.
pub const TX_POWERS_DBM: [i8; 7] = [2, 4, 6, 8, 10, 12, 14];

/// Minimum repetitions per uplink.
pub const MIN_NB_TRANS: u8 = 1;
/// Maximum repetitions per uplink.
pub const MAX_NB_TRANS: u8 = 3;

/// Mask enabling the three mandatory uplink channels.
pub const DEFAULT_CHANNEL_MASK: u16 = 0b0000_0000_0000_0111;

/// Spreading factor for a data-rate index.
///
/// Out-of-range indices are clamped first.
pub fn spreading_factor(data_rate: u8) -> u8 {
    12 - clamp_data_rate(data_rate)
}

/// Data-rate index for a spreading factor, if the plan defines one.
pub fn data_rate_for_spreading_factor(sf: u8) -> Option<u8> {
    if (7..=12).contains(&sf) {
        Some(12 - sf)
    } else {
        None
    }
}

/// SNR demodulation threshold for a data rate, dB.
///
/// SF7 demodulates down to -7.5 dB; each additional spreading-factor step
/// buys 2.5 dB of sensitivity, down to -20 dB at SF12.
pub fn snr_threshold_db(data_rate: u8) -> f64 {
    -20.0 + 2.5 * clamp_data_rate(data_rate) as f64
}

/// Clamp a data-rate index into the valid range.
pub fn clamp_data_rate(data_rate: u8) -> u8 {
    data_rate.min(MAX_DATA_RATE)
}

/// Clamp a transmit power onto the ladder: bounded, then rounded down to
/// an even level.
pub fn clamp_tx_power(dbm: i8) -> i8 {
    let bounded = dbm.clamp(MIN_TX_POWER_DBM, MAX_TX_POWER_DBM);
    bounded - (bounded - MIN_TX_POWER_DBM).rem_euclid(2)
}

/// Clamp a repetition count into the valid range.
pub fn clamp_nb_trans(nb_trans: u8) -> u8 {
    nb_trans.clamp(MIN_NB_TRANS, MAX_NB_TRANS)
}

/// Whether a transmit power sits exactly on the ladder.
pub fn is_valid_tx_power(dbm: i8) -> bool {
    TX_POWERS_DBM.contains(&dbm)
}

/// LoRaWAN TXPower field index for a power level: index 0 is the maximum,
/// one index per 2 dB reduction.
pub fn tx_power_index(dbm: i8) -> u8 {
    ((MAX_TX_POWER_DBM - clamp_tx_power(dbm)) / 2) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sf_mapping() {
        assert_eq!(spreading_factor(0), 12);
        assert_eq!(spreading_factor(5), 7);
        assert_eq!(data_rate_for_spreading_factor(7), Some(5));
        assert_eq!(data_rate_for_spreading_factor(12), Some(0));
        assert_eq!(data_rate_for_spreading_factor(6), None);
        assert_eq!(data_rate_for_spreading_factor(13), None);
    }

    #[test]
    fn test_snr_thresholds() {
        assert_eq!(snr_threshold_db(5), -7.5);
        assert_eq!(snr_threshold_db(0), -20.0);
        // Each step costs 2.5 dB of sensitivity.
        for dr in 1..=5u8 {
            assert_eq!(snr_threshold_db(dr) - snr_threshold_db(dr - 1), 2.5);
        }
    }

    #[test]
    fn test_power_clamping() {
        assert_eq!(clamp_tx_power(14), 14);
        assert_eq!(clamp_tx_power(15), 14);
        assert_eq!(clamp_tx_power(0), 2);
        assert_eq!(clamp_tx_power(-3), 2);
        // Odd levels round down onto the ladder.
        assert_eq!(clamp_tx_power(13), 12);
        assert_eq!(clamp_tx_power(5), 4);
    }

    #[test]
    fn test_tx_power_index() {
        assert_eq!(tx_power_index(14), 0);
        assert_eq!(tx_power_index(12), 1);
        assert_eq!(tx_power_index(2), 6);
    }
}
