//! # Ingredient Extractor Module
//!
//! Pulls raw ingredient mentions out of per-meal recipe data.
//!
//! ## Features
//!
//! - Accepts `"Name: qty unit"`, `"qty unit name"` and bare-name text entries
//!   as well as structured `{name, quantity, unit}` entries
//! - Strips trailing `(slot_n)` disambiguation tags and records the tag as
//!   the mention's `source_meal_label`
//! - Partial-failure tolerant: a meal without a parseable ingredient list is
//!   logged and skipped, the remaining meals are still extracted

use log::{debug, info, trace, warn};

use crate::generation_errors::ExtractionError;
use crate::measurement_patterns::{
    parse_quantity, split_slot_suffix, NAME_FIRST_REGEX, QUANTITY_FIRST_REGEX,
};
use crate::measurement_units::Unit;
use crate::menu_model::{IngredientEntry, Meal, QuantityValue};

/// One ingredient as mentioned by one meal. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientMention {
    /// Cleaned ingredient name, original casing kept for display
    pub name: String,
    /// Amount as written; `None` when the recipe gave no amount
    pub raw_quantity: Option<f64>,
    /// Unit as written, empty when absent
    pub raw_unit: String,
    pub source_meal_id: String,
    /// Stripped `(slot_n)` tag, kept for deduplication only
    pub source_meal_label: Option<String>,
}

/// Configuration options for extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Maximum length for ingredient names (truncated at a word boundary if longer)
    pub max_ingredient_length: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_ingredient_length: 100,
        }
    }
}

/// Everything extracted from a menu, plus the meals that were skipped
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub mentions: Vec<IngredientMention>,
    pub failures: Vec<ExtractionError>,
    pub meals_seen: usize,
}

impl Extraction {
    /// True when the menu had meals and every one of them failed
    pub fn all_meals_failed(&self) -> bool {
        self.meals_seen > 0 && self.failures.len() == self.meals_seen
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngredientExtractor {
    config: ExtractorConfig,
}

impl IngredientExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Lazily extract mentions from every meal, skipping (and logging) meals
    /// that fail.
    pub fn mentions<'a>(
        &'a self,
        meals: &'a [Meal],
    ) -> impl Iterator<Item = IngredientMention> + 'a {
        meals
            .iter()
            .flat_map(move |meal| match self.extract_meal(meal) {
                Ok(mentions) => mentions,
                Err(e) => {
                    warn!("Skipping meal: {e}");
                    Vec::new()
                }
            })
    }

    /// Extract all meals eagerly, keeping track of failures
    pub fn extract(&self, meals: &[Meal]) -> Extraction {
        let mut extraction = Extraction {
            meals_seen: meals.len(),
            ..Default::default()
        };

        for meal in meals {
            match self.extract_meal(meal) {
                Ok(mentions) => extraction.mentions.extend(mentions),
                Err(e) => {
                    warn!("Skipping meal: {e}");
                    extraction.failures.push(e);
                }
            }
        }

        info!(
            "Extracted {} ingredient mentions from {} meals ({} skipped)",
            extraction.mentions.len(),
            extraction.meals_seen,
            extraction.failures.len()
        );
        extraction
    }

    /// Extract the mentions of a single meal
    ///
    /// # Errors
    ///
    /// Returns `ExtractionError` when the meal has no ingredient list or none
    /// of its entries yields a usable ingredient name.
    pub fn extract_meal(&self, meal: &Meal) -> Result<Vec<IngredientMention>, ExtractionError> {
        let entries = match &meal.ingredients {
            Some(entries) if !entries.is_empty() => entries,
            Some(_) => return Err(ExtractionError::new(&meal.id, "ingredient list is empty")),
            None => return Err(ExtractionError::new(&meal.id, "meal has no ingredient list")),
        };

        let (_, meal_tag) = split_slot_suffix(&meal.title);
        let meal_label = meal_tag.map(|(tag, _)| tag);

        let mentions: Vec<IngredientMention> = entries
            .iter()
            .filter_map(|entry| {
                let parsed = self.parse_entry(entry);
                if parsed.is_none() {
                    debug!("Unparseable ingredient entry in meal {}: {:?}", meal.id, entry);
                }
                parsed
            })
            .map(|(name, raw_quantity, raw_unit, entry_label)| IngredientMention {
                name,
                raw_quantity,
                raw_unit,
                source_meal_id: meal.id.clone(),
                source_meal_label: entry_label.or_else(|| meal_label.clone()),
            })
            .collect();

        if mentions.is_empty() {
            return Err(ExtractionError::new(
                &meal.id,
                "no parseable ingredient entries",
            ));
        }

        trace!("Meal {} yielded {} mentions", meal.id, mentions.len());
        Ok(mentions)
    }

    #[allow(clippy::type_complexity)]
    fn parse_entry(
        &self,
        entry: &IngredientEntry,
    ) -> Option<(String, Option<f64>, String, Option<String>)> {
        match entry {
            IngredientEntry::Text(text) => self.parse_text(text),
            IngredientEntry::Structured {
                name,
                quantity,
                unit,
            } => {
                let (clean, tag) = split_slot_suffix(name);
                let name = self.clean_name(&clean)?;
                let quantity = match quantity {
                    Some(QuantityValue::Number(n)) if n.is_finite() => Some(*n),
                    Some(QuantityValue::Text(t)) => parse_quantity(t),
                    _ => None,
                };
                let unit = unit.as_deref().unwrap_or("").trim().to_string();
                Some((name, quantity, unit, tag.map(|(t, _)| t)))
            }
        }
    }

    fn parse_text(&self, text: &str) -> Option<(String, Option<f64>, String, Option<String>)> {
        let (text, tag) = split_slot_suffix(text);
        let tag = tag.map(|(t, _)| t);
        if text.is_empty() {
            return None;
        }

        if let Some(caps) = NAME_FIRST_REGEX.captures(&text) {
            let name = self.clean_name(&caps["name"])?;
            let quantity = caps.name("qty").and_then(|m| parse_quantity(m.as_str()));
            let unit = caps
                .name("unit")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            return Some((name, quantity, unit, tag));
        }

        if let Some(caps) = QUANTITY_FIRST_REGEX.captures(&text) {
            let quantity = parse_quantity(&caps["qty"]);
            let rest = caps["rest"].trim();
            let (first, remainder) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));

            // "2 cups rice" carries a unit, "2 eggs" does not
            if Unit::parse(first).is_some() && !remainder.trim().is_empty() {
                let name = self.clean_name(remainder)?;
                return Some((name, quantity, first.to_string(), tag));
            }
            let name = self.clean_name(rest)?;
            return Some((name, quantity, String::new(), tag));
        }

        let name = self.clean_name(&text)?;
        Some((name, None, String::new(), tag))
    }

    /// Tidy an ingredient name: drop a leading "of", trailing punctuation and
    /// repeated whitespace, and cap the length at a word boundary.
    fn clean_name(&self, raw_name: &str) -> Option<String> {
        let mut name = raw_name
            .trim()
            .trim_end_matches(|c: char| !c.is_alphanumeric() && c != ')')
            .to_string();

        if name.to_lowercase().starts_with("of ") {
            name = name[3..].trim_start().to_string();
        }

        name = name.split_whitespace().collect::<Vec<&str>>().join(" ");

        if name.len() > self.config.max_ingredient_length {
            let mut cut = self.config.max_ingredient_length;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            let truncated = &name[..cut];
            let at_word_end = name[cut..].starts_with(' ');
            name = match truncated.rfind(' ') {
                Some(last_space) if !at_word_end => truncated[..last_space].to_string(),
                _ => truncated.to_string(),
            };
        }

        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu_model::Meal;

    fn meal_with(entries: &[&str]) -> Meal {
        entries.iter().fold(Meal::new("m1", "Dinner"), |meal, e| {
            meal.with_ingredient(IngredientEntry::text(e))
        })
    }

    #[test]
    fn test_name_first_entries() {
        let extractor = IngredientExtractor::new();
        let mentions = extractor
            .extract_meal(&meal_with(&["Chicken Breast: 8 oz", "Egg: 8"]))
            .unwrap();

        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].name, "Chicken Breast");
        assert_eq!(mentions[0].raw_quantity, Some(8.0));
        assert_eq!(mentions[0].raw_unit, "oz");
        assert_eq!(mentions[1].name, "Egg");
        assert_eq!(mentions[1].raw_unit, "");
    }

    #[test]
    fn test_name_first_with_descriptor() {
        let extractor = IngredientExtractor::new();
        let mentions = extractor
            .extract_meal(&meal_with(&["Chicken Breast: 8 ounces boneless", "Cherry Tomato: 2 medium, halved"]))
            .unwrap();

        assert_eq!(mentions[0].name, "Chicken Breast");
        assert_eq!(mentions[0].raw_quantity, Some(8.0));
        assert_eq!(Unit::parse(&mentions[0].raw_unit), Some(Unit::Ounce));
        assert_eq!(mentions[1].name, "Cherry Tomato");
        assert_eq!(mentions[1].raw_quantity, Some(2.0));
        assert_eq!(mentions[1].raw_unit, "medium");
    }

    #[test]
    fn test_quantity_first_entries() {
        let extractor = IngredientExtractor::new();
        let mentions = extractor
            .extract_meal(&meal_with(&["2 cups of brown rice", "3 eggs", "1 1/2 lb ground beef"]))
            .unwrap();

        assert_eq!(mentions[0].name, "brown rice");
        assert_eq!(mentions[0].raw_unit, "cups");
        assert_eq!(mentions[1].name, "eggs");
        assert_eq!(mentions[1].raw_quantity, Some(3.0));
        assert_eq!(mentions[1].raw_unit, "");
        assert_eq!(mentions[2].name, "ground beef");
        assert_eq!(mentions[2].raw_quantity, Some(1.5));
    }

    #[test]
    fn test_bare_name_has_no_quantity() {
        let extractor = IngredientExtractor::new();
        let mentions = extractor.extract_meal(&meal_with(&["Salt"])).unwrap();
        assert_eq!(mentions[0].name, "Salt");
        assert_eq!(mentions[0].raw_quantity, None);
    }

    #[test]
    fn test_slot_suffix_becomes_label() {
        let extractor = IngredientExtractor::new();
        let meal = Meal::new("s1", "Spicy Edamame (snack_1)")
            .with_ingredient(IngredientEntry::text("Edamame: 1 cup"))
            .with_ingredient(IngredientEntry::text("Chili Flakes (snack_2)"));

        let mentions = extractor.extract_meal(&meal).unwrap();
        assert_eq!(mentions[0].name, "Edamame");
        assert_eq!(mentions[0].source_meal_label.as_deref(), Some("snack_1"));
        assert_eq!(mentions[1].name, "Chili Flakes");
        assert_eq!(mentions[1].source_meal_label.as_deref(), Some("snack_2"));
    }

    #[test]
    fn test_failing_meals_are_skipped() {
        let extractor = IngredientExtractor::new();
        let meals = vec![
            Meal::new("empty", "Nothing"),
            Meal::new("missing", "Unknown").without_ingredients(),
            meal_with(&["Onion: 1"]),
            Meal::new("junk", "Junk").with_ingredient(IngredientEntry::text("  ...  ")),
        ];

        let extraction = extractor.extract(&meals);
        assert_eq!(extraction.mentions.len(), 1);
        assert_eq!(extraction.failures.len(), 3);
        assert!(!extraction.all_meals_failed());

        let lazy: Vec<_> = extractor.mentions(&meals).collect();
        assert_eq!(lazy, extraction.mentions);
    }

    #[test]
    fn test_all_meals_failed() {
        let extractor = IngredientExtractor::new();
        let meals = vec![Meal::new("a", "A").without_ingredients()];
        assert!(extractor.extract(&meals).all_meals_failed());
        assert!(!extractor.extract(&[]).all_meals_failed());
    }

    #[test]
    fn test_name_length_limit() {
        let extractor = IngredientExtractor::with_config(ExtractorConfig {
            max_ingredient_length: 20,
        });
        let mentions = extractor
            .extract_meal(&meal_with(&["very long ingredient name that keeps going: 1"]))
            .unwrap();
        assert!(mentions[0].name.len() <= 20);
        assert_eq!(mentions[0].name, "very long ingredient");
    }
}
