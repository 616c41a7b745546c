//! Ledger configuration, read from the process environment.

use crate::tax::TaxRate;

/// Environment variable holding the default tax rate in basis points.
pub const DEFAULT_TAX_BPS_VAR: &str = "EINVOICE_DEFAULT_TAX_BPS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Rate applied when an issuance request does not name one.
    pub default_tax_rate: TaxRate,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_tax_rate: TaxRate::STANDARD,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparsable values fall back to the
    /// default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(DEFAULT_TAX_BPS_VAR) {
            match raw.trim().parse::<u32>().map(TaxRate::from_bps) {
                Ok(Ok(rate)) => config.default_tax_rate = rate,
                _ => tracing::warn!(
                    "{DEFAULT_TAX_BPS_VAR}={raw:?} is not a valid tax rate; using {} bps",
                    config.default_tax_rate.bps()
                ),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_uses_standard_rate() {
        let config = LedgerConfig::from_lookup(|_| None);
        assert_eq!(config.default_tax_rate, TaxRate::STANDARD);
    }

    #[test]
    fn variable_overrides_default_rate() {
        let config = LedgerConfig::from_lookup(|key| {
            (key == DEFAULT_TAX_BPS_VAR).then(|| " 0 ".to_string())
        });
        assert_eq!(config.default_tax_rate.bps(), 0);
    }

    #[test]
    fn invalid_values_fall_back() {
        for raw in ["five", "-1", "20000"] {
            let config = LedgerConfig::from_lookup(|_| Some(raw.to_string()));
            assert_eq!(config.default_tax_rate, TaxRate::STANDARD, "{raw}");
        }
    }
}
