//! # Measurement Patterns Module
//!
//! This module contains regex patterns used to pull quantities, units and
//! disambiguation tags out of free-text ingredient and dish strings.

use lazy_static::lazy_static;
use regex::Regex;

/// A number: mixed fraction, simple fraction, decimal or a unicode vulgar fraction
pub const QUANTITY_PATTERN: &str = r"\d+\s+\d+/\d+|\d+/\d+|\d*\.\d+|\d+|[½⅓⅔¼¾⅛⅜⅝⅞]";

// Trailing "(snack_1)" style tag appended upstream to tell duplicate dishes apart
const SLOT_SUFFIX_PATTERN: &str = r"(?i)\s*\(\s*([a-z]+)_(\d+)\s*\)\s*$";

lazy_static! {
    pub static ref SLOT_SUFFIX_REGEX: Regex =
        Regex::new(SLOT_SUFFIX_PATTERN).expect("Slot suffix pattern should be valid");

    /// "Chicken Breast: 8 oz", "Egg: 8", "Chicken Breast: 1-lb",
    /// "Chicken Breast: 8 ounces boneless", "Egg: 2, beaten"
    pub static ref NAME_FIRST_REGEX: Regex = Regex::new(&format!(
        r"^(?P<name>[^:]+?)\s*:\s*(?P<qty>{QUANTITY_PATTERN})?\s*-?\s*(?P<unit>[A-Za-z]+\.?)?(?:(?:\s*,\s*|\s+)(?P<descriptor>\S.*?))?\s*$"
    ))
    .expect("Name-first ingredient pattern should be valid");

    /// "2 cups rice", "8 eggs", "1 1/2 lb ground beef"
    pub static ref QUANTITY_FIRST_REGEX: Regex = Regex::new(&format!(
        r"^(?P<qty>{QUANTITY_PATTERN})\s*-?\s*(?P<rest>\S.*)$"
    ))
    .expect("Quantity-first ingredient pattern should be valid");
}

/// Value of a unicode vulgar fraction character
pub fn vulgar_fraction_value(c: char) -> Option<f64> {
    match c {
        '½' => Some(0.5),
        '⅓' => Some(1.0 / 3.0),
        '⅔' => Some(2.0 / 3.0),
        '¼' => Some(0.25),
        '¾' => Some(0.75),
        '⅛' => Some(0.125),
        '⅜' => Some(0.375),
        '⅝' => Some(0.625),
        '⅞' => Some(0.875),
        _ => None,
    }
}

/// Parse a quantity token matched by [`QUANTITY_PATTERN`]
pub fn parse_quantity(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let mut chars = raw.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(value) = vulgar_fraction_value(c) {
            return Some(value);
        }
    }

    let parse_fraction = |text: &str| -> Option<f64> {
        let (num, den) = text.split_once('/')?;
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            None
        } else {
            Some(num / den)
        }
    };

    if let Some((whole, fraction)) = raw.split_once(char::is_whitespace) {
        let whole: f64 = whole.parse().ok()?;
        return Some(whole + parse_fraction(fraction.trim())?);
    }

    if raw.contains('/') {
        return parse_fraction(raw);
    }

    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Split a trailing `(slot_n)` tag off a title.
///
/// Returns the clean title and the tag (e.g. `"snack_1"`) with its number.
pub fn split_slot_suffix(title: &str) -> (String, Option<(String, u32)>) {
    match SLOT_SUFFIX_REGEX.captures(title) {
        Some(caps) => {
            let clean = title[..caps.get(0).map_or(title.len(), |m| m.start())]
                .trim()
                .to_string();
            let slot = caps[1].to_lowercase();
            let number = caps[2].parse::<u32>().unwrap_or(u32::MAX);
            (clean, Some((format!("{slot}_{number}"), number)))
        }
        None => (title.trim().to_string(), None),
    }
}
