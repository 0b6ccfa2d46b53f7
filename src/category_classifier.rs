//! # Category Classifier Module
//!
//! Assigns every aggregated item to a store section. Two strategies share
//! the [`CategoryClassifier`] contract: the AI-backed classifier (see
//! [`crate::ai_classifier`]) and the deterministic [`RuleBasedClassifier`].
//! [`ResilientClassifier`] wires them together: the AI strategy is called
//! under a timeout and a circuit breaker, retried at most once, and any
//! remaining failure falls back to the rules. Its output always has the
//! same shape.

use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::AggregatedItem;
use crate::category_rules::rule_based_category;
use crate::circuit_breaker::CircuitBreaker;
use crate::generation_config::RecoveryConfig;
use crate::generation_errors::ProviderError;
use crate::shopping_list::{HealthyAlternative, ListAdvice};

/// Items with their categories filled in, plus list-level advice
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub items: Vec<AggregatedItem>,
    pub advice: ListAdvice,
}

/// Contract shared by every categorization strategy
#[async_trait]
pub trait CategoryClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Categorize all items. Either every item gets a valid category or the
    /// call fails as a whole.
    async fn classify(&self, items: &[AggregatedItem]) -> Result<Classification, ProviderError>;
}

/// Keyword-table classifier. Never fails.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous form of [`CategoryClassifier::classify`]
    pub fn classify_now(&self, items: &[AggregatedItem]) -> Classification {
        let items = items
            .iter()
            .map(|item| item.clone().with_category(rule_based_category(&item.name)))
            .collect();
        Classification {
            items,
            advice: generic_advice(),
        }
    }
}

#[async_trait]
impl CategoryClassifier for RuleBasedClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(&self, items: &[AggregatedItem]) -> Result<Classification, ProviderError> {
        Ok(self.classify_now(items))
    }
}

/// Fixed advice used when no AI-generated advice is available
pub fn generic_advice() -> ListAdvice {
    ListAdvice {
        recommendations: vec![
            "Check your pantry before shopping to avoid buying duplicates".to_string(),
            "Buy proteins in family packs and freeze portions you will not use this week".to_string(),
        ],
        nutrition_tips: vec![
            "Fill half of each plate with vegetables or fruit".to_string(),
            "Prefer whole grains over refined grains".to_string(),
        ],
        healthy_alternatives: vec![
            HealthyAlternative::new("White Rice", "Brown Rice", "More fiber and minerals"),
            HealthyAlternative::new("Sour Cream", "Greek Yogurt", "More protein, less fat"),
            HealthyAlternative::new("Potato Chips", "Unsalted Nuts", "Healthy fats instead of fried starch"),
        ],
        shopping_tips: vec![
            "Shop the perimeter of the store first for fresh foods".to_string(),
            "Choose seasonal produce for better price and flavor".to_string(),
            "Compare unit prices rather than package prices".to_string(),
        ],
    }
}

/// Which strategy produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationStrategy {
    Ai,
    Fallback,
}

/// Result of the resilient policy. Always carries a classification.
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub classification: Classification,
    pub strategy: ClassificationStrategy,
    /// Last provider error when the fallback was used
    pub provider_error: Option<ProviderError>,
    /// Number of AI attempts made
    pub attempts: u32,
}

/// Calculate the delay before a retry attempt, in milliseconds.
///
/// Exponential in the attempt number starting at `base_retry_delay_ms`,
/// with up to 25% random jitter, capped at `max_retry_delay_ms`.
pub fn calculate_retry_delay(attempt: u32, recovery: &RecoveryConfig) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    let exponential = recovery
        .base_retry_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(recovery.max_retry_delay_ms);
    let jitter_range = exponential / 4;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..=jitter_range)
    } else {
        0
    };
    exponential
        .saturating_add(jitter)
        .min(recovery.max_retry_delay_ms.max(recovery.base_retry_delay_ms))
}

/// Errors worth a second attempt. A response that was delivered but
/// failed validation will not get better by asking again.
fn is_transient(error: &ProviderError) -> bool {
    match error {
        ProviderError::Timeout(_) | ProviderError::Http(_) => true,
        ProviderError::Status { code, .. } => *code == 429 || *code >= 500,
        _ => false,
    }
}

/// AI-first classification with bounded retry and deterministic fallback
pub struct ResilientClassifier {
    primary: Option<Arc<dyn CategoryClassifier>>,
    fallback: RuleBasedClassifier,
    breaker: CircuitBreaker,
    recovery: RecoveryConfig,
}

impl ResilientClassifier {
    pub fn new(primary: Option<Arc<dyn CategoryClassifier>>, recovery: RecoveryConfig) -> Self {
        Self {
            primary,
            fallback: RuleBasedClassifier::new(),
            breaker: CircuitBreaker::new(recovery.clone()),
            recovery,
        }
    }

    /// A policy that only ever uses the rules
    pub fn rules_only() -> Self {
        Self::new(None, RecoveryConfig::default())
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Classify with the AI strategy when allowed, falling back otherwise
    pub async fn classify(&self, items: &[AggregatedItem], use_ai: bool) -> ClassificationOutcome {
        let primary = match (&self.primary, use_ai) {
            (Some(primary), true) => primary,
            _ => return self.fall_back(items, None, 0),
        };

        if self.breaker.is_open() {
            debug!("Skipping {} classifier: circuit breaker open", primary.name());
            return self.fall_back(items, Some(ProviderError::CircuitOpen), 0);
        }

        let max_attempts = 1 + self.recovery.effective_retries();
        let timeout = self.recovery.operation_timeout();
        let mut last_error = None;
        let mut attempts = 0;

        while attempts < max_attempts {
            if attempts > 0 {
                let delay = calculate_retry_delay(attempts, &self.recovery);
                debug!("Retrying {} classifier in {}ms", primary.name(), delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            attempts += 1;

            let result = match tokio::time::timeout(timeout, primary.classify(items)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "no answer within {}s",
                    timeout.as_secs()
                ))),
            };

            match result {
                Ok(classification) => {
                    self.breaker.record_success();
                    info!(
                        "Classified {} items with {} classifier",
                        classification.items.len(),
                        primary.name()
                    );
                    return ClassificationOutcome {
                        classification,
                        strategy: ClassificationStrategy::Ai,
                        provider_error: None,
                        attempts,
                    };
                }
                Err(error) => {
                    self.breaker.record_failure();
                    warn!(
                        "{} classifier attempt {}/{} failed: {}",
                        primary.name(),
                        attempts,
                        max_attempts,
                        error
                    );
                    let retry = is_transient(&error) && !self.breaker.is_open();
                    last_error = Some(error);
                    if !retry {
                        break;
                    }
                }
            }
        }

        self.fall_back(items, last_error, attempts)
    }

    fn fall_back(
        &self,
        items: &[AggregatedItem],
        provider_error: Option<ProviderError>,
        attempts: u32,
    ) -> ClassificationOutcome {
        if provider_error.is_some() {
            info!("Using rule-based categories for {} items", items.len());
        }
        ClassificationOutcome {
            classification: self.fallback.classify_now(items),
            strategy: ClassificationStrategy::Fallback,
            provider_error,
            attempts,
        }
    }
}

impl std::fmt::Debug for ResilientClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClassifier")
            .field("primary", &self.primary.as_ref().map(|p| p.name().to_string()))
            .field("breaker", &self.breaker)
            .finish()
    }
}
