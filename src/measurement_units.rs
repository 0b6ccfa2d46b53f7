//! # Measurement Units Module
//!
//! The closed vocabulary of recognized units, their physical dimension, and
//! the conversions to canonical base units (grams for mass, milliliters for
//! volume). Count units are never converted: each is its own base unit, so a
//! clove of garlic is never summed with a can of beans.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const GRAMS_PER_OUNCE: f64 = 28.349_523_125;
const GRAMS_PER_POUND: f64 = 453.592_37;
const ML_PER_TEASPOON: f64 = 4.928_921_593_75;
const ML_PER_TABLESPOON: f64 = 14.786_764_781_25;
const ML_PER_CUP: f64 = 236.588_236_5;

/// Relative tolerance applied to ladder thresholds so that 8 oz + 8 oz
/// reaches one pound despite floating-point rounding.
const THRESHOLD_EPSILON: f64 = 1e-6;

/// Largest amount of one mention, in base units (a tonne, a thousand cubic
/// meters, a billion pieces). Anything above is a data error.
pub const MAX_BASE_AMOUNT: f64 = 1e9;

/// Recognized measurement units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    // Mass
    Ounce,
    Pound,
    Gram,
    Kilogram,
    // Volume
    Teaspoon,
    Tablespoon,
    Cup,
    Milliliter,
    Liter,
    // Count
    Clove,
    Piece,
    Can,
    Head,
    Small,
    Medium,
    Large,
}

/// Physical dimension of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

/// Which family of units a mention was written in, used to pick the
/// display unit after summation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementSystem {
    Metric,
    Imperial,
}

/// Canonical unit amounts are summed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseUnit {
    Gram,
    Milliliter,
    Count(Unit),
}

lazy_static! {
    /// Spelling variants accepted for each unit
    static ref UNIT_ALIASES: HashMap<&'static str, Unit> = {
        let mut map = HashMap::new();

        for alias in ["oz", "ounce", "ounces"] {
            map.insert(alias, Unit::Ounce);
        }
        for alias in ["lb", "lbs", "pound", "pounds"] {
            map.insert(alias, Unit::Pound);
        }
        for alias in ["g", "gram", "grams", "gr"] {
            map.insert(alias, Unit::Gram);
        }
        for alias in ["kg", "kilogram", "kilograms", "kilo", "kilos"] {
            map.insert(alias, Unit::Kilogram);
        }
        for alias in ["tsp", "teaspoon", "teaspoons"] {
            map.insert(alias, Unit::Teaspoon);
        }
        for alias in ["tbsp", "tablespoon", "tablespoons", "tbs"] {
            map.insert(alias, Unit::Tablespoon);
        }
        for alias in ["cup", "cups", "c"] {
            map.insert(alias, Unit::Cup);
        }
        for alias in ["ml", "milliliter", "milliliters", "millilitre", "millilitres"] {
            map.insert(alias, Unit::Milliliter);
        }
        for alias in ["l", "liter", "liters", "litre", "litres"] {
            map.insert(alias, Unit::Liter);
        }
        for alias in ["clove", "cloves"] {
            map.insert(alias, Unit::Clove);
        }
        for alias in ["piece", "pieces", "pc", "pcs", "whole", "count", "item", "items"] {
            map.insert(alias, Unit::Piece);
        }
        for alias in ["can", "cans", "tin", "tins"] {
            map.insert(alias, Unit::Can);
        }
        for alias in ["head", "heads"] {
            map.insert(alias, Unit::Head);
        }
        map.insert("small", Unit::Small);
        map.insert("medium", Unit::Medium);
        map.insert("large", Unit::Large);

        map
    };
}

impl Unit {
    /// Parse a raw unit string. Returns `None` for anything outside the
    /// recognized vocabulary (including the empty string).
    pub fn parse(raw: &str) -> Option<Unit> {
        let cleaned = raw.trim().trim_end_matches('.').to_lowercase();
        if cleaned.is_empty() {
            return None;
        }
        UNIT_ALIASES.get(cleaned.as_str()).copied()
    }

    /// Short label used in display names; always ASCII letters only
    pub fn label(&self) -> &'static str {
        match self {
            Unit::Ounce => "oz",
            Unit::Pound => "lb",
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Teaspoon => "tsp",
            Unit::Tablespoon => "tbsp",
            Unit::Cup => "cup",
            Unit::Milliliter => "ml",
            Unit::Liter => "l",
            Unit::Clove => "clove",
            Unit::Piece => "piece",
            Unit::Can => "can",
            Unit::Head => "head",
            Unit::Small => "small",
            Unit::Medium => "medium",
            Unit::Large => "large",
        }
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            Unit::Ounce | Unit::Pound | Unit::Gram | Unit::Kilogram => Dimension::Mass,
            Unit::Teaspoon | Unit::Tablespoon | Unit::Cup | Unit::Milliliter | Unit::Liter => {
                Dimension::Volume
            }
            _ => Dimension::Count,
        }
    }

    pub fn system(&self) -> MeasurementSystem {
        match self {
            Unit::Gram | Unit::Kilogram | Unit::Milliliter | Unit::Liter => {
                MeasurementSystem::Metric
            }
            _ => MeasurementSystem::Imperial,
        }
    }

    pub fn base_unit(&self) -> BaseUnit {
        match self.dimension() {
            Dimension::Mass => BaseUnit::Gram,
            Dimension::Volume => BaseUnit::Milliliter,
            Dimension::Count => BaseUnit::Count(*self),
        }
    }

    /// Multiplier from this unit to its base unit
    pub fn base_factor(&self) -> f64 {
        match self {
            Unit::Ounce => GRAMS_PER_OUNCE,
            Unit::Pound => GRAMS_PER_POUND,
            Unit::Gram => 1.0,
            Unit::Kilogram => 1000.0,
            Unit::Teaspoon => ML_PER_TEASPOON,
            Unit::Tablespoon => ML_PER_TABLESPOON,
            Unit::Cup => ML_PER_CUP,
            Unit::Milliliter => 1.0,
            Unit::Liter => 1000.0,
            _ => 1.0,
        }
    }

    pub fn to_base(&self, amount: f64) -> f64 {
        amount * self.base_factor()
    }

    pub fn from_base(&self, base_amount: f64) -> f64 {
        base_amount / self.base_factor()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn at_least(amount: f64, threshold: f64) -> bool {
    amount >= threshold * (1.0 - THRESHOLD_EPSILON)
}

/// Re-express a summed base amount in the most legible unit.
///
/// * imperial mass: lb when ≥ 1 lb and `prefers_pounds` (meat/produce), else oz
/// * metric mass: kg when ≥ 1000 g, else g
/// * metric volume: l when ≥ 1000 ml, else ml
/// * kitchen volume: cup when ≥ 1/4 cup, tbsp when ≥ 1 tbsp, else tsp
/// * counts: unchanged
pub fn display_unit_for(
    base: BaseUnit,
    base_amount: f64,
    system: MeasurementSystem,
    prefers_pounds: bool,
) -> Unit {
    match (base, system) {
        (BaseUnit::Gram, MeasurementSystem::Imperial) => {
            if prefers_pounds && at_least(base_amount, GRAMS_PER_POUND) {
                Unit::Pound
            } else {
                Unit::Ounce
            }
        }
        (BaseUnit::Gram, MeasurementSystem::Metric) => {
            if at_least(base_amount, 1000.0) {
                Unit::Kilogram
            } else {
                Unit::Gram
            }
        }
        (BaseUnit::Milliliter, MeasurementSystem::Metric) => {
            if at_least(base_amount, 1000.0) {
                Unit::Liter
            } else {
                Unit::Milliliter
            }
        }
        (BaseUnit::Milliliter, MeasurementSystem::Imperial) => {
            if at_least(base_amount, ML_PER_CUP / 4.0) {
                Unit::Cup
            } else if at_least(base_amount, ML_PER_TABLESPOON) {
                Unit::Tablespoon
            } else {
                Unit::Teaspoon
            }
        }
        (BaseUnit::Count(unit), _) => unit,
    }
}

/// Round to two decimals and print without trailing zeros.
///
/// The output only ever contains digits and at most one dot. Callers pass
/// finite amounts; the normalizer drops everything else.
pub fn format_amount(amount: f64) -> String {
    let rounded = (amount.abs() * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        let text = format!("{:.2}", rounded);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
