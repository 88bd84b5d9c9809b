//! Privacy mapper configuration with sensible defaults.
//!
//! The fuzzing windows are deliberately small: wide enough that an
//! observer cannot reconstruct exact routing data from rewritten
//! responses, narrow enough that the numbers stay operationally useful.

use serde::{Deserialize, Serialize};

use crate::{GateError, Result};

/// Configuration for the privacy mapper's fuzzed fields.
///
/// Map-backed pseudonyms are not configurable — they are structural.
/// Only the noise windows applied to amounts and timestamps are.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Relative variation applied to amounts. A value of `0.05` means a
    /// rewritten amount lies within ±5% of the real one.
    pub amount_variation: f64,

    /// Absolute variation applied to timestamps, in seconds. A value of
    /// `600` means a rewritten timestamp lies within ±10 minutes of the
    /// real one.
    pub time_variation_secs: u64,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            amount_variation: 0.05,
            time_variation_secs: 600,
        }
    }
}

impl PrivacyConfig {
    /// Returns the timestamp variation window in nanoseconds.
    pub fn time_variation_nanos(&self) -> u64 {
        self.time_variation_secs * 1_000_000_000
    }

    /// Validates all configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if any value is outside its
    /// acceptable range.
    pub fn validate(&self) -> Result<()> {
        if !self.amount_variation.is_finite()
            || self.amount_variation <= 0.0
            || self.amount_variation >= 1.0
        {
            return Err(GateError::Config {
                reason: format!(
                    "amount_variation must be in (0, 1), got {}",
                    self.amount_variation,
                ),
            });
        }

        if self.time_variation_secs == 0 {
            return Err(GateError::Config {
                reason: "time_variation_secs must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = PrivacyConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.time_variation_nanos(), 600_000_000_000);
    }

    #[test]
    fn rejects_zero_amount_variation() {
        let cfg = PrivacyConfig {
            amount_variation: 0.0,
            ..PrivacyConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_full_amount_variation() {
        let cfg = PrivacyConfig {
            amount_variation: 1.0,
            ..PrivacyConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_time_variation() {
        let cfg = PrivacyConfig {
            time_variation_secs: 0,
            ..PrivacyConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
