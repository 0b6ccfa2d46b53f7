//! # Generation Error Types Module
//!
//! This module defines the error types used throughout the shopping-list
//! generation pipeline. Only [`GenerationError::NoListProduced`] is ever
//! meant to reach a caller as a failure; every other kind is absorbed by
//! skipping, falling back or bypassing.

use std::fmt;

/// A single meal could not be turned into ingredient mentions.
///
/// Per-meal and never fatal: the extractor skips the meal and keeps going.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionError {
    /// Identifier of the meal that failed
    pub meal_id: String,
    /// Human-readable reason
    pub reason: String,
}

impl ExtractionError {
    pub fn new(meal_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            meal_id: meal_id.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extraction error in meal '{}': {}", self.meal_id, self.reason)
    }
}

impl std::error::Error for ExtractionError {}

/// Failures of the external text-generation provider or of its response.
///
/// Any of these triggers the deterministic fallback classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The call did not finish within the configured deadline
    Timeout(String),
    /// Transport-level failure (connection refused, TLS, ...)
    Http(String),
    /// The provider answered with a non-success status code
    Status { code: u16, message: String },
    /// The response could not be parsed as the required structure
    Malformed(String),
    /// An item was missing or carried a category outside the closed set
    InvalidCategory(String),
    /// The circuit breaker is open, the provider was not called
    CircuitOpen,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Timeout(msg) => write!(f, "Provider timeout: {msg}"),
            ProviderError::Http(msg) => write!(f, "Provider transport error: {msg}"),
            ProviderError::Status { code, message } => {
                write!(f, "Provider returned status {code}: {message}")
            }
            ProviderError::Malformed(msg) => write!(f, "Malformed provider response: {msg}"),
            ProviderError::InvalidCategory(msg) => write!(f, "Invalid category in response: {msg}"),
            ProviderError::CircuitOpen => write!(f, "Provider circuit breaker is open"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

/// A soft quantity check that did not pass cleanly.
///
/// Logged, and surfaced as a list issue when it matters to the shopper,
/// but never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// An aggregated total is above its planned target
    OverTarget {
        /// Ingredient the target applies to
        name: String,
        /// Aggregated amount in canonical units
        actual: f64,
        /// Target amount in canonical units
        target: f64,
        /// `actual / target`
        ratio: f64,
        /// Whether the ratio is beyond the tolerated deadband
        beyond_deadband: bool,
    },
    /// A mention whose amount is not finite or too large to buy; it was dropped
    ImplausibleQuantity {
        name: String,
        meal_id: String,
        amount: f64,
        unit: String,
    },
}

impl ValidationWarning {
    /// Whether the warning belongs in the list's issues
    pub fn is_issue(&self) -> bool {
        match self {
            ValidationWarning::OverTarget { beyond_deadband, .. } => *beyond_deadband,
            ValidationWarning::ImplausibleQuantity { .. } => true,
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::OverTarget {
                name,
                actual,
                target,
                ratio,
                ..
            } => write!(
                f,
                "{} exceeds its target by {:.0}% ({:.2} vs {:.2})",
                name,
                (ratio - 1.0) * 100.0,
                actual,
                target
            ),
            ValidationWarning::ImplausibleQuantity {
                name,
                meal_id,
                amount,
                unit,
            } => write!(
                f,
                "{} was left off the list: quantity {} {} in meal '{}' is not plausible",
                name, amount, unit, meal_id
            ),
        }
    }
}

/// Errors surfaced by the generation service and its collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// The requested menu does not exist
    MenuNotFound(String),
    /// No job, history record or cache entry is known for a fingerprint
    UnknownFingerprint(String),
    /// The cache backend could not be read or written
    CacheUnavailable(String),
    /// Every meal in the menu failed extraction
    NoListProduced(String),
    /// The menu source failed
    MenuSource(String),
    /// The background job could not be driven to completion
    Job(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::MenuNotFound(id) => write!(f, "Menu not found: {id}"),
            GenerationError::UnknownFingerprint(fp) => write!(f, "Unknown fingerprint: {fp}"),
            GenerationError::CacheUnavailable(msg) => write!(f, "Cache unavailable: {msg}"),
            GenerationError::NoListProduced(msg) => write!(f, "No list could be produced: {msg}"),
            GenerationError::MenuSource(msg) => write!(f, "Menu source error: {msg}"),
            GenerationError::Job(msg) => write!(f, "Job error: {msg}"),
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<sqlx::Error> for GenerationError {
    fn from(err: sqlx::Error) -> Self {
        GenerationError::CacheUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for GenerationError {
    fn from(err: std::io::Error) -> Self {
        GenerationError::CacheUnavailable(err.to_string())
    }
}

impl From<anyhow::Error> for GenerationError {
    fn from(err: anyhow::Error) -> Self {
        GenerationError::Job(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExtractionError::new("meal-1", "no ingredients");
        assert_eq!(
            err.to_string(),
            "Extraction error in meal 'meal-1': no ingredients"
        );

        let timeout = ProviderError::Timeout("after 30s".to_string());
        assert_eq!(format!("{}", timeout), "Provider timeout: after 30s");

        let cache = GenerationError::CacheUnavailable("disk full".to_string());
        assert!(cache.to_string().contains("Cache unavailable"));
    }

    #[test]
    fn test_implausible_quantity_is_always_an_issue() {
        let warning = ValidationWarning::ImplausibleQuantity {
            name: "Rice".to_string(),
            meal_id: "m1".to_string(),
            amount: f64::INFINITY,
            unit: "cup".to_string(),
        };
        assert!(warning.is_issue());
        assert!(warning.to_string().starts_with("Rice was left off the list"));
    }

    #[test]
    fn test_io_error_maps_to_cache_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: GenerationError = io.into();
        assert!(matches!(err, GenerationError::CacheUnavailable(_)));
    }

    #[test]
    fn test_json_error_maps_to_malformed() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ProviderError = json_err.into();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
