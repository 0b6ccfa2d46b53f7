//! # Aggregator Module
//!
//! Merges normalized mentions of the same ingredient into shopping-list line
//! items. Names are compared case-insensitively after trimming and collapsing
//! whitespace. Amounts are summed in canonical base units only; mentions of
//! the same name in incompatible units stay separate sibling items.
//!
//! ```rust
//! use shopping_list::aggregator::Aggregator;
//! use shopping_list::ingredient_extractor::IngredientMention;
//! use shopping_list::quantity_normalizer::QuantityNormalizer;
//!
//! let mention = |meal: &str| IngredientMention {
//!     name: "Chicken Breast".to_string(),
//!     raw_quantity: Some(8.0),
//!     raw_unit: "oz".to_string(),
//!     source_meal_id: meal.to_string(),
//!     source_meal_label: None,
//! };
//! let normalized = QuantityNormalizer::new().normalize_all(&[mention("m1"), mention("m2")]);
//!
//! let items = Aggregator::new().aggregate(&normalized.mentions);
//! assert_eq!(items[0].display_name, "Chicken Breast: 1-lb");
//! ```

use log::debug;
use std::collections::HashMap;

use crate::category_rules::{rule_based_category, Category};
use crate::measurement_units::{display_unit_for, format_amount, BaseUnit, MeasurementSystem, Unit};
use crate::quantity_normalizer::NormalizedMention;

/// One line of the shopping list
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedItem {
    /// Display name of the ingredient (first-seen casing)
    pub name: String,
    /// Amount in `unit`, rounded to two decimals
    pub total_amount: f64,
    /// Display unit chosen from the conversion ladder
    pub unit: Unit,
    /// Store section; `Other` until the classifier runs
    pub category: Category,
    /// Always `"Name: Quantity-Unit"`
    pub display_name: String,
}

impl AggregatedItem {
    /// Build an item, deriving `display_name` from the other fields
    pub fn new(name: &str, amount: f64, unit: Unit) -> Self {
        let rounded = (amount * 100.0).round() / 100.0;
        Self {
            name: name.to_string(),
            total_amount: rounded,
            unit,
            category: Category::Other,
            display_name: display_name(name, rounded, unit),
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Amount in the unit's canonical base
    pub fn base_amount(&self) -> f64 {
        self.unit.to_base(self.total_amount)
    }

    pub fn base_unit(&self) -> BaseUnit {
        self.unit.base_unit()
    }
}

/// `"Chicken Breast: 1-lb"`
pub fn display_name(name: &str, amount: f64, unit: Unit) -> String {
    format!("{}: {}-{}", name.trim(), format_amount(amount), unit.label())
}

/// Key used to decide that two names denote the same ingredient
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

struct Group {
    name: String,
    base_unit: BaseUnit,
    base_amount: f64,
    any_imperial: bool,
    mentions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Sum mentions per (name, base unit) and re-express each total in its
    /// most legible unit. Output keeps first-seen order.
    pub fn aggregate(&self, mentions: &[NormalizedMention]) -> Vec<AggregatedItem> {
        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<(String, BaseUnit), usize> = HashMap::new();
        // First-seen casing per name, shared by sibling items in other units
        let mut display_names: HashMap<String, String> = HashMap::new();

        for mention in mentions {
            let normalized = normalize_name(&mention.name);
            let name = display_names
                .entry(normalized.clone())
                .or_insert_with(|| mention.name.split_whitespace().collect::<Vec<_>>().join(" "))
                .clone();
            let key = (normalized, mention.quantity.base_unit);
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Group {
                    name,
                    base_unit: mention.quantity.base_unit,
                    base_amount: 0.0,
                    any_imperial: false,
                    mentions: 0,
                });
                groups.len() - 1
            });

            let group = &mut groups[slot];
            group.base_amount += mention.quantity.base_amount;
            group.any_imperial |= mention.system == MeasurementSystem::Imperial;
            group.mentions += 1;
        }

        groups
            .into_iter()
            .map(|group| {
                let system = if group.any_imperial {
                    MeasurementSystem::Imperial
                } else {
                    MeasurementSystem::Metric
                };
                let by_the_pound = rule_based_category(&group.name).sold_by_the_pound();
                let unit = display_unit_for(group.base_unit, group.base_amount, system, by_the_pound);
                let item = AggregatedItem::new(&group.name, unit.from_base(group.base_amount), unit);
                debug!(
                    "Aggregated {} mentions of '{}' into '{}'",
                    group.mentions, group.name, item.display_name
                );
                item
            })
            .collect()
    }
}
