//! Billing defaults loaded from a TOML file.
//!
//! The file holds a single `[billing]` table. Every key is optional; a missing file
//! yields [`BillingConfig::default`].
//!
//! ```toml
//! [billing]
//! default_tax_rate = "0.0800"
//! default_payment_terms = 30
//! invoice_prefix = "INV"
//! ```

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming the billing config file
pub const BILLING_CONFIG_ENV: &str = "BILLING_CONFIG";

#[derive(Debug, Default, Deserialize)]
struct BillingFile {
    #[serde(default)]
    billing: BillingConfig,
}

/// Defaults applied when an invoice request leaves them out
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Tax rate as a fraction with 4 decimal places
    pub default_tax_rate: Decimal,
    /// Days between issue and due date
    pub default_payment_terms: i32,
    /// Leading part of generated invoice numbers
    pub invoice_prefix: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_tax_rate: Decimal::ZERO,
            default_payment_terms: 30,
            invoice_prefix: "INV".to_string(),
        }
    }
}

impl BillingConfig {
    fn validate(self) -> Result<Self> {
        if self.default_tax_rate.is_sign_negative() || self.default_tax_rate > Decimal::ONE {
            return Err(Error::Config {
                message: format!(
                    "default_tax_rate must be between 0 and 1, got {}",
                    self.default_tax_rate
                ),
            });
        }
        if self.default_payment_terms < 0 {
            return Err(Error::Config {
                message: "default_payment_terms cannot be negative".to_string(),
            });
        }
        if self.invoice_prefix.trim().is_empty() {
            return Err(Error::Config {
                message: "invoice_prefix cannot be empty".to_string(),
            });
        }
        Ok(Self {
            default_tax_rate: self.default_tax_rate.round_dp(4),
            ..self
        })
    }
}

/// Parses billing defaults from TOML text.
///
/// # Errors
/// Returns an error if the TOML is malformed or a value is out of range.
pub fn parse_config(contents: &str) -> Result<BillingConfig> {
    let file: BillingFile = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse billing config: {e}"),
    })?;
    file.billing.validate()
}

/// Loads billing defaults from a TOML file. A missing file yields the defaults.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BillingConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(?path, "No billing config found, using defaults");
        return Ok(BillingConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .inspect_err(|e| tracing::error!(?path, "Failed to read billing config: {}", e))?;
    parse_config(&contents)
}

/// Loads billing defaults from `$BILLING_CONFIG`, or `./billing.toml`.
pub fn load_default_config() -> Result<BillingConfig> {
    let path = std::env::var(BILLING_CONFIG_ENV).unwrap_or_else(|_| "billing.toml".to_string());
    load_config(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_billing_config() {
        let toml_str = r#"
            [billing]
            default_tax_rate = "0.0800"
            default_payment_terms = 14
            invoice_prefix = "LND"
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.default_tax_rate, dec!(0.08));
        assert_eq!(config.default_payment_terms, 14);
        assert_eq!(config.invoice_prefix, "LND");
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let config = parse_config("[billing]\ndefault_payment_terms = 7\n").unwrap();
        assert_eq!(config.default_tax_rate, Decimal::ZERO);
        assert_eq!(config.default_payment_terms, 7);
        assert_eq!(config.invoice_prefix, "INV");

        assert_eq!(parse_config("").unwrap(), BillingConfig::default());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let result = parse_config("[billing]\ndefault_tax_rate = \"1.5\"\n");
        assert!(matches!(result, Err(Error::Config { .. })));

        let result = parse_config("[billing]\ndefault_payment_terms = -1\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_unreadable_file_is_io_error() {
        // A directory exists but cannot be read as a file
        let result = load_config(std::env::temp_dir());
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config("does/not/exist/billing.toml").unwrap();
        assert_eq!(config, BillingConfig::default());
    }
}
