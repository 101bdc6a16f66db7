//! Processing configuration and per-call options.
//!
//! [`ProcessorConfig`] is built once and handed to the processor; nothing in
//! the crate reads environment variables or global state.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::error::Severity;

/// Default upper bound on input size: 10 MiB.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Default tolerance for total reconciliation.
pub const DEFAULT_TOTAL_TOLERANCE: Decimal = dec!(0.01);

/// What to do when no rate is available for an item and tax kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateNotFoundPolicy {
    /// Record a warning and compute with a rate of zero.
    #[default]
    Warn,
    /// Record a blocking diagnostic and leave the tax kind unset.
    Block,
}

impl RateNotFoundPolicy {
    pub fn severity(self) -> Severity {
        match self {
            Self::Warn => Severity::Warning,
            Self::Block => Severity::Blocking,
        }
    }
}

/// Immutable processor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Inputs larger than this are rejected with a fatal diagnostic.
    pub max_input_bytes: usize,
    /// Allowed difference between declared and computed totals (inclusive).
    pub total_tolerance: Decimal,
    /// Default for [`ProcessOptions::validate_tax_ids`].
    pub validate_tax_ids: bool,
    /// Default for [`ProcessOptions::rate_not_found`].
    pub rate_not_found: RateNotFoundPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            total_tolerance: DEFAULT_TOTAL_TOLERANCE,
            validate_tax_ids: true,
            rate_not_found: RateNotFoundPolicy::Warn,
        }
    }
}

impl ProcessorConfig {
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }

    /// Per-call options defaulted from this configuration.
    pub fn default_options(&self) -> ProcessOptions {
        ProcessOptions {
            validate_tax_ids: self.validate_tax_ids,
            rate_not_found: self.rate_not_found,
            ..ProcessOptions::default()
        }
    }
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn max_input_bytes(mut self, bytes: usize) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    /// Negative tolerances are clamped to zero.
    pub fn total_tolerance(mut self, tolerance: Decimal) -> Self {
        self.config.total_tolerance = tolerance.max(Decimal::ZERO);
        self
    }

    pub fn validate_tax_ids(mut self, enabled: bool) -> Self {
        self.config.validate_tax_ids = enabled;
        self
    }

    pub fn rate_not_found(mut self, policy: RateNotFoundPolicy) -> Self {
        self.config.rate_not_found = policy;
        self
    }

    pub fn build(self) -> ProcessorConfig {
        self.config
    }
}

/// Options for a single `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    /// Run the tax engine.
    pub extract_taxes: bool,
    /// Verify CNPJ/CPF check digits.
    pub validate_tax_ids: bool,
    /// Compare the declared total with the sum of items.
    pub reconcile_totals: bool,
    /// Produce regenerated XML.
    pub generate_updated_output: bool,
    pub rate_not_found: RateNotFoundPolicy,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            extract_taxes: true,
            validate_tax_ids: true,
            reconcile_totals: true,
            generate_updated_output: false,
            rate_not_found: RateNotFoundPolicy::Warn,
        }
    }
}

impl ProcessOptions {
    pub fn validation(&self, total_tolerance: Decimal) -> ValidationOptions {
        ValidationOptions {
            validate_tax_ids: self.validate_tax_ids,
            reconcile_totals: self.reconcile_totals,
            total_tolerance,
        }
    }

    pub fn tax(&self) -> TaxOptions {
        TaxOptions {
            rate_not_found: self.rate_not_found,
        }
    }
}

/// Options for `validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    pub validate_tax_ids: bool,
    pub reconcile_totals: bool,
    pub total_tolerance: Decimal,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            validate_tax_ids: true,
            reconcile_totals: true,
            total_tolerance: DEFAULT_TOTAL_TOLERANCE,
        }
    }
}

/// Options for `compute_taxes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxOptions {
    pub rate_not_found: RateNotFoundPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.max_input_bytes, 10 * 1024 * 1024);
        assert_eq!(config.total_tolerance, dec!(0.01));
        assert!(config.validate_tax_ids);
        assert_eq!(config.rate_not_found, RateNotFoundPolicy::Warn);
    }

    #[test]
    fn builder_overrides() {
        let config = ProcessorConfig::builder()
            .max_input_bytes(1024)
            .total_tolerance(dec!(-1))
            .validate_tax_ids(false)
            .rate_not_found(RateNotFoundPolicy::Block)
            .build();
        assert_eq!(config.max_input_bytes, 1024);
        assert_eq!(config.total_tolerance, Decimal::ZERO);
        let options = config.default_options();
        assert!(!options.validate_tax_ids);
        assert_eq!(options.rate_not_found, RateNotFoundPolicy::Block);
        assert!(options.extract_taxes);
        assert!(!options.generate_updated_output);
    }

    #[test]
    fn policy_severity() {
        assert_eq!(RateNotFoundPolicy::Warn.severity(), Severity::Warning);
        assert_eq!(RateNotFoundPolicy::Block.severity(), Severity::Blocking);
    }
}
