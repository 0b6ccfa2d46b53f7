//! # Menu Data Model
//!
//! Input side of the pipeline: a multi-day menu of meals, each listing its
//! ingredients either as free text or as structured entries.
//!
//! ```rust
//! use shopping_list::menu_model::{IngredientEntry, Meal, Menu};
//!
//! let menu = Menu::new("menu-42")
//!     .with_meal(
//!         Meal::new("m1", "Grilled Chicken")
//!             .with_ingredient(IngredientEntry::text("Chicken Breast: 8 oz"))
//!             .with_ingredient(IngredientEntry::structured("Garlic", Some(2.0), Some("clove"))),
//!     );
//! assert_eq!(menu.meals.len(), 1);
//! ```

use serde::{Deserialize, Serialize};

/// A multi-day meal menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    /// Stable identifier of the menu in the upstream store
    pub id: String,

    /// Optional human title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Meals in menu order
    #[serde(default)]
    pub meals: Vec<Meal>,

    /// Planned purchase quantities checked after aggregation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quantity_targets: Vec<QuantityTarget>,
}

/// One dish entry of the menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: String,

    /// Dish title, possibly carrying a `(slot_n)` disambiguation tag
    pub title: String,

    /// Day number within the menu (1-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,

    /// breakfast / lunch / dinner / snack ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,

    /// `None` when the upstream record had no ingredient list at all
    #[serde(default)]
    pub ingredients: Option<Vec<IngredientEntry>>,
}

/// An ingredient as written in the recipe data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IngredientEntry {
    /// Free text such as `"Chicken Breast: 8 oz"` or `"2 cups rice"`
    Text(String),
    /// Already split into parts
    Structured {
        name: String,
        #[serde(default)]
        quantity: Option<QuantityValue>,
        #[serde(default)]
        unit: Option<String>,
    },
}

/// Quantities arrive either as JSON numbers or as strings like `"1/2"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuantityValue {
    Number(f64),
    Text(String),
}

/// Planned purchase amount for one ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityTarget {
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

impl Menu {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: None,
            meals: Vec::new(),
            quantity_targets: Vec::new(),
        }
    }

    pub fn with_meal(mut self, meal: Meal) -> Self {
        self.meals.push(meal);
        self
    }

    pub fn with_target(mut self, name: &str, amount: f64, unit: &str) -> Self {
        self.quantity_targets.push(QuantityTarget {
            name: name.to_string(),
            amount,
            unit: unit.to_string(),
        });
        self
    }
}

impl Meal {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            day: None,
            slot: None,
            ingredients: Some(Vec::new()),
        }
    }

    pub fn on_day(mut self, day: u32) -> Self {
        self.day = Some(day);
        self
    }

    pub fn in_slot(mut self, slot: &str) -> Self {
        self.slot = Some(slot.to_string());
        self
    }

    pub fn with_ingredient(mut self, entry: IngredientEntry) -> Self {
        self.ingredients.get_or_insert_with(Vec::new).push(entry);
        self
    }

    /// Mark the meal as having no ingredient list
    pub fn without_ingredients(mut self) -> Self {
        self.ingredients = None;
        self
    }
}

impl IngredientEntry {
    pub fn text(text: &str) -> Self {
        IngredientEntry::Text(text.to_string())
    }

    pub fn structured(name: &str, quantity: Option<f64>, unit: Option<&str>) -> Self {
        IngredientEntry::Structured {
            name: name.to_string(),
            quantity: quantity.map(QuantityValue::Number),
            unit: unit.map(str::to_string),
        }
    }
}
