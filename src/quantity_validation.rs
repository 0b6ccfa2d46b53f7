//! # Quantity Validation Module
//!
//! Soft checks of aggregated totals against the planned purchase
//! quantities a menu may carry. A total up to the deadband ratio above its
//! target (inclusive) is only logged; beyond that the overshoot becomes a
//! list issue. Validation never aborts generation.

use log::warn;

use crate::aggregator::{normalize_name, AggregatedItem};
use crate::generation_config::ValidationConfig;
use crate::generation_errors::ValidationWarning;
use crate::measurement_units::Unit;
use crate::menu_model::QuantityTarget;

/// Float slack so that exactly 125% is not pushed over by rounding
const RATIO_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
pub struct QuantityValidator {
    config: ValidationConfig,
}

impl QuantityValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Compare each target with the matching item, in canonical units.
    ///
    /// Targets with an unknown unit or no item of a compatible unit are
    /// skipped. Only overshoots produce warnings.
    pub fn check(&self, items: &[AggregatedItem], targets: &[QuantityTarget]) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        for target in targets {
            let Some(target_unit) = Unit::parse(&target.unit) else {
                warn!("Skipping quantity target for '{}': unknown unit '{}'", target.name, target.unit);
                continue;
            };
            if target.amount <= 0.0 {
                continue;
            }

            let key = normalize_name(&target.name);
            let Some(item) = items
                .iter()
                .find(|i| normalize_name(&i.name) == key && i.base_unit() == target_unit.base_unit())
            else {
                continue;
            };

            let actual = item.base_amount();
            let target_base = target_unit.to_base(target.amount);
            let ratio = actual / target_base;
            if ratio <= 1.0 + RATIO_EPSILON {
                continue;
            }

            let warning = ValidationWarning::OverTarget {
                name: item.name.clone(),
                actual,
                target: target_base,
                ratio,
                beyond_deadband: ratio > self.config.deadband_ratio + RATIO_EPSILON,
            };
            warn!("Quantity check: {}", warning);
            warnings.push(warning);
        }

        warnings
    }

    /// Issue strings for the warnings the shopper should see
    pub fn issues(warnings: &[ValidationWarning]) -> Vec<String> {
        warnings
            .iter()
            .filter(|w| w.is_issue())
            .map(|w| w.to_string())
            .collect()
    }
}
