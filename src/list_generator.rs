//! # List Generator Module
//!
//! The generation pipeline for one menu:
//!
//! 1. Deduplicate dish entries (slot-tagged copies of the same dish)
//! 2. Extract ingredient mentions, skipping meals that fail
//! 3. Normalize quantities to canonical base units
//! 4. Aggregate mentions into line items
//! 5. Classify items into store sections (AI first, rules as fallback)
//! 6. Check totals against the menu's quantity targets
//! 7. Assemble the [`ShoppingList`]
//!
//! The only hard failure is a menu on which every meal failed extraction.

use log::{info, warn};

use crate::aggregator::{AggregatedItem, Aggregator};
use crate::category_classifier::{ClassificationStrategy, ResilientClassifier};
use crate::dish_deduplicator::{DishDeduplicator, RemovedDuplicate};
use crate::generation_config::ValidationConfig;
use crate::generation_errors::{ExtractionError, GenerationError, ProviderError, ValidationWarning};
use crate::ingredient_extractor::IngredientExtractor;
use crate::menu_model::Menu;
use crate::quantity_normalizer::QuantityNormalizer;
use crate::quantity_validation::QuantityValidator;
use crate::shopping_list::ShoppingList;

/// Aggregated but not yet classified items of a menu
#[derive(Debug, Clone)]
pub struct PreparedItems {
    pub items: Vec<AggregatedItem>,
    pub removed_duplicates: Vec<RemovedDuplicate>,
    pub extraction_failures: Vec<ExtractionError>,
    /// Mentions dropped for an implausible amount
    pub rejected: Vec<ValidationWarning>,
}

/// A generated list plus what happened along the way
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub list: ShoppingList,
    pub strategy: ClassificationStrategy,
    pub provider_error: Option<ProviderError>,
    pub removed_duplicates: Vec<RemovedDuplicate>,
    pub extraction_failures: Vec<ExtractionError>,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug)]
pub struct ListGenerator {
    deduplicator: DishDeduplicator,
    extractor: IngredientExtractor,
    normalizer: QuantityNormalizer,
    aggregator: Aggregator,
    classifier: ResilientClassifier,
    validator: QuantityValidator,
}

impl ListGenerator {
    pub fn new(classifier: ResilientClassifier, validation: ValidationConfig) -> Self {
        Self {
            deduplicator: DishDeduplicator::new(),
            extractor: IngredientExtractor::new(),
            normalizer: QuantityNormalizer::new(),
            aggregator: Aggregator::new(),
            classifier,
            validator: QuantityValidator::new(validation),
        }
    }

    /// A generator that never calls a provider
    pub fn rules_only() -> Self {
        Self::new(ResilientClassifier::rules_only(), ValidationConfig::default())
    }

    pub fn classifier(&self) -> &ResilientClassifier {
        &self.classifier
    }

    /// Steps 1 to 4: everything up to classification
    pub fn prepare(&self, menu: &Menu) -> Result<PreparedItems, GenerationError> {
        let (meals, removed_duplicates) = self.deduplicator.deduplicate_with_report(&menu.meals);

        let extraction = self.extractor.extract(&meals);
        if extraction.all_meals_failed() {
            let reasons = extraction
                .failures
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GenerationError::NoListProduced(format!(
                "every meal of menu '{}' failed extraction: {}",
                menu.id, reasons
            )));
        }

        let normalization = self.normalizer.normalize_all(&extraction.mentions);
        let items = self.aggregator.aggregate(&normalization.mentions);

        Ok(PreparedItems {
            items,
            removed_duplicates,
            extraction_failures: extraction.failures,
            rejected: normalization.rejected,
        })
    }

    /// Run the whole pipeline for `menu`
    pub async fn generate(
        &self,
        menu: &Menu,
        fingerprint: &str,
        use_ai: bool,
    ) -> Result<GenerationReport, GenerationError> {
        let prepared = self.prepare(menu)?;
        let outcome = self.classifier.classify(&prepared.items, use_ai).await;

        if let Some(error) = &outcome.provider_error {
            warn!("Menu {} categorized by fallback after provider error: {}", menu.id, error);
        }

        let mut report = self.finish(menu, fingerprint, prepared, outcome.classification);
        report.strategy = outcome.strategy;
        report.provider_error = outcome.provider_error;
        Ok(report)
    }

    /// Rules-only generation, used when a job runs out of time
    pub fn generate_fallback(&self, menu: &Menu, fingerprint: &str) -> Result<GenerationReport, GenerationError> {
        let prepared = self.prepare(menu)?;
        let classification = crate::category_classifier::RuleBasedClassifier::new().classify_now(&prepared.items);
        Ok(self.finish(menu, fingerprint, prepared, classification))
    }

    fn finish(
        &self,
        menu: &Menu,
        fingerprint: &str,
        prepared: PreparedItems,
        classification: crate::category_classifier::Classification,
    ) -> GenerationReport {
        let mut warnings = prepared.rejected;
        warnings.extend(self.validator.check(&classification.items, &menu.quantity_targets));

        let mut list = ShoppingList::assemble(classification.items, classification.advice, fingerprint);
        list.issues = QuantityValidator::issues(&warnings);

        info!(
            "Generated shopping list for menu {}: {} items in {} categories",
            menu.id,
            list.item_count(),
            list.categories.len()
        );

        GenerationReport {
            list,
            strategy: ClassificationStrategy::Fallback,
            provider_error: None,
            removed_duplicates: prepared.removed_duplicates,
            extraction_failures: prepared.extraction_failures,
            warnings,
        }
    }
}
