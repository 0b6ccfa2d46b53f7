//! # Shopping List Module
//!
//! The assembled output and its wire schema:
//!
//! ```json
//! {
//!   "groceryList": [{"category": "Protein", "items": [{"name": "Chicken Breast",
//!       "quantity": 1, "unit": "lb", "displayName": "Chicken Breast: 1-lb"}]}],
//!   "recommendations": [], "nutritionTips": [],
//!   "healthyAlternatives": [{"original": "", "alternative": "", "benefit": ""}],
//!   "shoppingTips": [], "generatedAt": "...", "sourceFingerprint": "..."
//! }
//! ```
//!
//! The schema is the same whichever classifier produced the list.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::aggregator::AggregatedItem;
use crate::category_rules::Category;
use crate::measurement_units::Unit;

lazy_static! {
    /// Shape every `displayName` must have
    pub static ref DISPLAY_NAME_REGEX: Regex =
        Regex::new(r"^.+:\s*[\d.]+-[a-zA-Z]+$").expect("Display name pattern should be valid");
}

/// A healthier swap suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthyAlternative {
    pub original: String,
    pub alternative: String,
    pub benefit: String,
}

impl HealthyAlternative {
    pub fn new(original: &str, alternative: &str, benefit: &str) -> Self {
        Self {
            original: original.to_string(),
            alternative: alternative.to_string(),
            benefit: benefit.to_string(),
        }
    }
}

/// All items of one store section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CategoryGroupWire")]
pub struct CategoryGroup {
    pub category: Category,
    pub items: Vec<AggregatedItem>,
}

#[derive(Deserialize)]
struct CategoryGroupWire {
    category: Category,
    items: Vec<AggregatedItem>,
}

impl From<CategoryGroupWire> for CategoryGroup {
    fn from(wire: CategoryGroupWire) -> Self {
        // Items do not carry their category on the wire
        let items = wire
            .items
            .into_iter()
            .map(|item| item.with_category(wire.category))
            .collect();
        Self {
            category: wire.category,
            items,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemWire {
    name: String,
    quantity: f64,
    unit: String,
    display_name: String,
}

impl Serialize for AggregatedItem {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ItemWire {
            name: self.name.clone(),
            quantity: self.total_amount,
            unit: self.unit.label().to_string(),
            display_name: self.display_name.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AggregatedItem {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ItemWire::deserialize(deserializer)?;
        let unit = Unit::parse(&wire.unit)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown unit '{}'", wire.unit)))?;
        Ok(AggregatedItem::new(&wire.name, wire.quantity, unit))
    }
}

/// The consolidated, categorized shopping list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    #[serde(rename = "groceryList")]
    pub categories: Vec<CategoryGroup>,
    pub recommendations: Vec<String>,
    pub nutrition_tips: Vec<String>,
    pub healthy_alternatives: Vec<HealthyAlternative>,
    pub shopping_tips: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub source_fingerprint: String,
    /// Soft validation findings (quantities beyond their target deadband)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// List-level advice produced alongside the categories
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListAdvice {
    pub recommendations: Vec<String>,
    pub nutrition_tips: Vec<String>,
    pub healthy_alternatives: Vec<HealthyAlternative>,
    pub shopping_tips: Vec<String>,
}

impl ShoppingList {
    /// Group categorized items by section, in the fixed store-walk order.
    /// Empty sections are omitted; items keep their relative order.
    pub fn assemble(
        items: Vec<AggregatedItem>,
        advice: ListAdvice,
        fingerprint: &str,
    ) -> Self {
        let mut categories: Vec<CategoryGroup> = Vec::new();
        for category in Category::ALL {
            let group_items: Vec<AggregatedItem> = items
                .iter()
                .filter(|item| item.category == category)
                .cloned()
                .collect();
            if !group_items.is_empty() {
                categories.push(CategoryGroup {
                    category,
                    items: group_items,
                });
            }
        }

        Self {
            categories,
            recommendations: advice.recommendations,
            nutrition_tips: advice.nutrition_tips,
            healthy_alternatives: advice.healthy_alternatives,
            shopping_tips: advice.shopping_tips,
            generated_at: Utc::now(),
            source_fingerprint: fingerprint.to_string(),
            issues: Vec::new(),
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &AggregatedItem> {
        self.categories.iter().flat_map(|group| group.items.iter())
    }

    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|group| group.items.len()).sum()
    }

    /// Find an item by its display name
    pub fn find(&self, display_name: &str) -> Option<&AggregatedItem> {
        self.items().find(|item| item.display_name == display_name)
    }

    /// Check the output invariants: every display name has the required
    /// shape and every item sits in the group of its own category.
    pub fn is_schema_conformant(&self) -> bool {
        self.categories.iter().all(|group| {
            group.items.iter().all(|item| {
                item.category == group.category && DISPLAY_NAME_REGEX.is_match(&item.display_name)
            })
        })
    }

    /// Content that must be identical across repeated generations of the
    /// same menu: (category, name, quantity, unit) per item.
    pub fn content_signature(&self) -> Vec<(Category, String, String, Unit)> {
        self.items()
            .map(|item| {
                (
                    item.category,
                    item.name.clone(),
                    format!("{:.2}", item.total_amount),
                    item.unit,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ShoppingList {
        let items = vec![
            AggregatedItem::new("Egg", 8.0, Unit::Large).with_category(Category::Protein),
            AggregatedItem::new("Cherry Tomato", 2.0, Unit::Medium).with_category(Category::Produce),
            AggregatedItem::new("Chicken Breast", 1.0, Unit::Pound).with_category(Category::Protein),
        ];
        let advice = ListAdvice {
            shopping_tips: vec!["Shop the perimeter first".to_string()],
            healthy_alternatives: vec![HealthyAlternative::new("White Rice", "Brown Rice", "More fiber")],
            ..Default::default()
        };
        ShoppingList::assemble(items, advice, "fp-1")
    }

    #[test]
    fn test_assemble_groups_in_store_order() {
        let list = sample();
        assert_eq!(list.categories.len(), 2);
        assert_eq!(list.categories[0].category, Category::Produce);
        assert_eq!(list.categories[1].category, Category::Protein);
        assert_eq!(list.categories[1].items[0].name, "Egg");
        assert_eq!(list.item_count(), 3);
        assert!(list.is_schema_conformant());
    }

    #[test]
    fn test_wire_schema_field_names() {
        let value = serde_json::to_value(sample()).unwrap();

        assert!(value.get("groceryList").is_some());
        assert!(value.get("nutritionTips").is_some());
        assert!(value.get("healthyAlternatives").is_some());
        assert!(value.get("shoppingTips").is_some());
        assert!(value.get("issues").is_none());

        let item = &value["groceryList"][1]["items"][1];
        assert_eq!(item["name"], "Chicken Breast");
        assert_eq!(item["quantity"], 1.0);
        assert_eq!(item["unit"], "lb");
        assert_eq!(item["displayName"], "Chicken Breast: 1-lb");
        assert!(item.get("category").is_none());
        assert_eq!(value["groceryList"][1]["category"], "Protein");
    }

    #[test]
    fn test_deserialize_restores_item_categories() {
        let list = sample();
        let json = serde_json::to_string(&list).unwrap();
        let back: ShoppingList = serde_json::from_str(&json).unwrap();

        assert_eq!(back, list);
        assert!(back.items().all(|i| i.category != Category::Other));
    }

    #[test]
    fn test_unknown_unit_is_rejected() {
        let json = r#"{"name":"X","quantity":1,"unit":"bushel","displayName":"X: 1-bushel"}"#;
        assert!(serde_json::from_str::<AggregatedItem>(json).is_err());
    }
}
