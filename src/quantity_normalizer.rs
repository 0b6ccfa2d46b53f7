//! # Quantity Normalizer Module
//!
//! Resolves the unit of every ingredient mention and converts the amount to
//! its canonical base unit so that aggregation is a plain sum.
//!
//! Mentions without a recognized unit get a default from an ordered
//! name-pattern table: the longest matching pattern wins, ties go to the
//! first entry, and unmatched names become bare piece counts.

use lazy_static::lazy_static;
use log::{debug, trace, warn};

use crate::category_rules::{contains_phrase, name_tokens};
use crate::generation_errors::ValidationWarning;
use crate::ingredient_extractor::IngredientMention;
use crate::measurement_units::{BaseUnit, MeasurementSystem, Unit, MAX_BASE_AMOUNT};

/// An amount expressed in a canonical base unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedQuantity {
    pub base_unit: BaseUnit,
    pub base_amount: f64,
}

/// A mention after unit resolution and base conversion
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMention {
    pub name: String,
    pub quantity: NormalizedQuantity,
    /// Unit family the mention was written in; drives the display unit
    pub system: MeasurementSystem,
    /// The unit the mention was resolved to before conversion
    pub unit: Unit,
    /// True when the unit came from the default table
    pub unit_defaulted: bool,
    pub source_meal_id: String,
}

/// Mentions of a menu after normalization
#[derive(Debug, Clone, Default)]
pub struct Normalization {
    pub mentions: Vec<NormalizedMention>,
    /// Mentions dropped for an implausible amount
    pub rejected: Vec<ValidationWarning>,
}

lazy_static! {
    /// Name pattern -> unit used when a mention carries no recognized unit
    static ref DEFAULT_UNITS: Vec<(&'static str, Unit)> = vec![
        ("egg", Unit::Large),
        ("garlic", Unit::Clove),
        ("garlic powder", Unit::Teaspoon),
        ("tomato", Unit::Medium),
        ("cherry tomato", Unit::Medium),
        ("tomato sauce", Unit::Can),
        ("tomato paste", Unit::Can),
        ("diced tomato", Unit::Can),
        ("onion", Unit::Medium),
        ("onion powder", Unit::Teaspoon),
        ("green onion", Unit::Piece),
        ("potato", Unit::Medium),
        ("sweet potato", Unit::Medium),
        ("bell pepper", Unit::Medium),
        ("avocado", Unit::Medium),
        ("apple", Unit::Medium),
        ("banana", Unit::Medium),
        ("lemon", Unit::Medium),
        ("lime", Unit::Medium),
        ("orange", Unit::Medium),
        ("carrot", Unit::Medium),
        ("cucumber", Unit::Medium),
        ("zucchini", Unit::Medium),
        ("lettuce", Unit::Head),
        ("cabbage", Unit::Head),
        ("broccoli", Unit::Head),
        ("cauliflower", Unit::Head),
        ("bean", Unit::Can),
        ("black bean", Unit::Can),
        ("chickpea", Unit::Can),
        ("coconut milk", Unit::Can),
        ("tuna", Unit::Can),
        ("green bean", Unit::Cup),
        ("salt", Unit::Teaspoon),
        ("pepper", Unit::Teaspoon),
        ("black pepper", Unit::Teaspoon),
        ("cumin", Unit::Teaspoon),
        ("paprika", Unit::Teaspoon),
        ("cinnamon", Unit::Teaspoon),
        ("oregano", Unit::Teaspoon),
        ("chili powder", Unit::Teaspoon),
        ("oil", Unit::Tablespoon),
        ("butter", Unit::Tablespoon),
        ("peanut butter", Unit::Tablespoon),
        ("honey", Unit::Tablespoon),
        ("vinegar", Unit::Tablespoon),
        ("soy sauce", Unit::Tablespoon),
        ("milk", Unit::Cup),
        ("rice", Unit::Cup),
        ("quinoa", Unit::Cup),
        ("oat", Unit::Cup),
        ("flour", Unit::Cup),
        ("yogurt", Unit::Cup),
        ("spinach", Unit::Cup),
        ("broth", Unit::Cup),
        ("ground beef", Unit::Pound),
        ("ground turkey", Unit::Pound),
    ];
}

/// Default unit for a name without a recognized unit
pub fn default_unit_for(name: &str) -> Unit {
    let tokens = name_tokens(name);
    let mut best: Option<(&str, Unit)> = None;
    for (pattern, unit) in DEFAULT_UNITS.iter() {
        if !contains_phrase(&tokens, pattern) {
            continue;
        }
        // Strictly longer replaces, so ties keep the first entry
        if best.map_or(true, |(current, _)| pattern.len() > current.len()) {
            best = Some((pattern, *unit));
        }
    }
    best.map(|(_, unit)| unit).unwrap_or(Unit::Piece)
}

#[derive(Debug, Clone, Default)]
pub struct QuantityNormalizer;

impl QuantityNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the unit of a mention and convert it to its base unit.
    ///
    /// Fails when the amount is not finite or exceeds [`MAX_BASE_AMOUNT`]
    /// once converted, so every sum downstream stays finite.
    pub fn normalize(&self, mention: &IngredientMention) -> Result<NormalizedMention, ValidationWarning> {
        let amount = mention.raw_quantity.unwrap_or(1.0).max(0.0);

        let (unit, unit_defaulted) = match Unit::parse(&mention.raw_unit) {
            Some(unit) => (unit, false),
            None => {
                let unit = default_unit_for(&mention.name);
                if !mention.raw_unit.trim().is_empty() {
                    debug!(
                        "Unrecognized unit '{}' for '{}', using default '{}'",
                        mention.raw_unit, mention.name, unit
                    );
                }
                (unit, true)
            }
        };

        let quantity = NormalizedQuantity {
            base_unit: unit.base_unit(),
            base_amount: unit.to_base(amount),
        };
        if !quantity.base_amount.is_finite() || quantity.base_amount > MAX_BASE_AMOUNT {
            return Err(ValidationWarning::ImplausibleQuantity {
                name: mention.name.clone(),
                meal_id: mention.source_meal_id.clone(),
                amount,
                unit: unit.label().to_string(),
            });
        }
        trace!(
            "Normalized '{}' {} {} -> {:.3} {:?}",
            mention.name,
            amount,
            unit,
            quantity.base_amount,
            quantity.base_unit
        );

        Ok(NormalizedMention {
            name: mention.name.clone(),
            quantity,
            system: unit.system(),
            unit,
            unit_defaulted,
            source_meal_id: mention.source_meal_id.clone(),
        })
    }

    /// Normalize every mention, setting aside the implausible ones
    pub fn normalize_all<'a, I>(&self, mentions: I) -> Normalization
    where
        I: IntoIterator<Item = &'a IngredientMention>,
    {
        let mut normalization = Normalization::default();
        for mention in mentions {
            match self.normalize(mention) {
                Ok(normalized) => normalization.mentions.push(normalized),
                Err(warning) => {
                    warn!("Dropping mention: {}", warning);
                    normalization.rejected.push(warning);
                }
            }
        }
        normalization
    }
}
