//! LoRa time-on-air model.
//!
//! Channel occupancy is the cost side of every rate decision. The model
//! follows the standard LoRa frame timing: a preamble of
//! `preamble_symbols + 4.25` symbols followed by the payload symbol count
//! from the payload-length formula, all scaled by the symbol time
//! `2^SF / bandwidth`.

use skylink_core::config::AdrConfig;
use skylink_network::region;

/// Computes predicted time-on-air for candidate parameters.
#[derive(Debug, Clone)]
pub struct AirtimeModel {
    payload_bytes: usize,
    preamble_symbols: usize,
    bandwidth_hz: u32,
    coding_rate: u8,
    explicit_header: bool,
    crc_enabled: bool,
}

impl AirtimeModel {
    pub fn from_config(config: &AdrConfig) -> Self {
        Self {
            payload_bytes: config.payload_bytes,
            preamble_symbols: config.preamble_symbols,
            bandwidth_hz: config.bandwidth_hz,
            coding_rate: config.coding_rate,
            explicit_header: config.explicit_header,
            crc_enabled: config.crc_enabled,
        }
    }

    /// Duration of one symbol at the given spreading factor, milliseconds.
    pub fn symbol_time_ms(&self, sf: u8) -> f64 {
        (1u64 << sf) as f64 * 1000.0 / self.bandwidth_hz as f64
    }

    /// Number of payload symbols at the given spreading factor.
    pub fn payload_symbols(&self, sf: u8) -> u32 {
        // Low-data-rate optimization kicks in at SF11 and above.
        let de: i64 = if sf >= 11 { 1 } else { 0 };
        let h: i64 = if self.explicit_header { 0 } else { 1 };
        let crc: i64 = if self.crc_enabled { 1 } else { 0 };
        let pl = self.payload_bytes as i64;
        let sf = sf as i64;

        let numerator = 8 * pl - 4 * sf + 28 + 16 * crc - 20 * h;
        let denominator = 4 * (sf - 2 * de);
        let blocks = (numerator as f64 / denominator as f64).ceil() as i64;
        let coded = blocks * (self.coding_rate as i64 + 4);
        (8 + coded.max(0)) as u32
    }

    /// Predicted channel occupancy for one uplink at the given data rate,
    /// including repetitions, in milliseconds.
    pub fn time_on_air_ms(&self, data_rate: u8, nb_trans: u8) -> f64 {
        let sf = region::spreading_factor(data_rate);
        let t_sym = self.symbol_time_ms(sf);
        let preamble = (self.preamble_symbols as f64 + 4.25) * t_sym;
        let payload = self.payload_symbols(sf) as f64 * t_sym;
        nb_trans as f64 * (preamble + payload)
    }
}

impl Default for AirtimeModel {
    fn default() -> Self {
        Self::from_config(&AdrConfig::default())
    }
}
