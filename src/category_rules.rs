//! # Category Rules Module
//!
//! The closed set of store-section categories and the keyword table used by
//! the deterministic classifier. The table is also consulted by the
//! aggregator to decide whether an item is sold by the pound.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store sections a shopping-list item can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Produce,
    Protein,
    Dairy,
    Grains,
    Condiments,
    Spices,
    Snacks,
    Beverages,
    Frozen,
    Other,
}

impl Category {
    /// Every category in store-walk order
    pub const ALL: [Category; 10] = [
        Category::Produce,
        Category::Protein,
        Category::Dairy,
        Category::Grains,
        Category::Condiments,
        Category::Spices,
        Category::Snacks,
        Category::Beverages,
        Category::Frozen,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Produce => "Produce",
            Category::Protein => "Protein",
            Category::Dairy => "Dairy",
            Category::Grains => "Grains",
            Category::Condiments => "Condiments",
            Category::Spices => "Spices",
            Category::Snacks => "Snacks",
            Category::Beverages => "Beverages",
            Category::Frozen => "Frozen",
            Category::Other => "Other",
        }
    }

    /// Strict, case-insensitive parse against the closed set
    pub fn parse(raw: &str) -> Option<Category> {
        let raw = raw.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw))
    }

    /// Items in these sections are bought by weight and display in lb
    pub fn sold_by_the_pound(&self) -> bool {
        matches!(self, Category::Protein | Category::Produce)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

lazy_static! {
    /// Keyword -> category. Longest matching keyword wins.
    static ref CATEGORY_KEYWORDS: Vec<(&'static str, Category)> = {
        use Category::*;
        vec![
            // Produce
            ("apple", Produce), ("banana", Produce), ("berry", Produce), ("blueberry", Produce),
            ("strawberry", Produce), ("raspberry", Produce), ("lemon", Produce), ("lime", Produce),
            ("orange", Produce), ("avocado", Produce), ("tomato", Produce), ("cherry tomato", Produce),
            ("onion", Produce), ("red onion", Produce), ("green onion", Produce), ("scallion", Produce),
            ("garlic", Produce), ("ginger", Produce), ("potato", Produce), ("sweet potato", Produce),
            ("carrot", Produce), ("celery", Produce), ("cucumber", Produce), ("zucchini", Produce),
            ("spinach", Produce), ("kale", Produce), ("lettuce", Produce), ("cabbage", Produce),
            ("broccoli", Produce), ("cauliflower", Produce), ("bell pepper", Produce),
            ("mushroom", Produce), ("cilantro", Produce), ("parsley", Produce), ("basil", Produce),
            ("mint", Produce), ("asparagus", Produce), ("green bean", Produce), ("grape", Produce),
            ("mango", Produce), ("pineapple", Produce), ("peach", Produce), ("pear", Produce),
            ("arugula", Produce), ("mixed greens", Produce),
            // Protein
            ("chicken", Protein), ("chicken breast", Protein), ("chicken thigh", Protein),
            ("beef", Protein), ("ground beef", Protein), ("steak", Protein), ("pork", Protein),
            ("turkey", Protein), ("ground turkey", Protein), ("lamb", Protein), ("bacon", Protein),
            ("sausage", Protein), ("ham", Protein), ("salmon", Protein), ("tuna", Protein),
            ("cod", Protein), ("tilapia", Protein), ("shrimp", Protein), ("fish", Protein),
            ("tofu", Protein), ("tempeh", Protein), ("egg", Protein), ("lentil", Protein),
            ("chickpea", Protein), ("black bean", Protein), ("kidney bean", Protein),
            ("protein powder", Protein),
            // Dairy
            ("milk", Dairy), ("cheese", Dairy), ("yogurt", Dairy), ("greek yogurt", Dairy),
            ("butter", Dairy), ("cream", Dairy), ("sour cream", Dairy), ("cottage cheese", Dairy),
            ("feta", Dairy), ("mozzarella", Dairy), ("parmesan", Dairy), ("cheddar", Dairy),
            ("almond milk", Dairy),
            // Grains
            ("rice", Grains), ("brown rice", Grains), ("quinoa", Grains), ("oat", Grains),
            ("pasta", Grains), ("spaghetti", Grains), ("bread", Grains), ("tortilla", Grains),
            ("flour", Grains), ("couscous", Grains), ("barley", Grains), ("noodle", Grains),
            ("cereal", Grains), ("bagel", Grains), ("pita", Grains),
            // Condiments
            ("oil", Condiments), ("olive oil", Condiments), ("vinegar", Condiments),
            ("soy sauce", Condiments), ("sauce", Condiments), ("tomato sauce", Condiments),
            ("ketchup", Condiments), ("mustard", Condiments), ("mayonnaise", Condiments),
            ("honey", Condiments), ("maple syrup", Condiments), ("salsa", Condiments),
            ("hummus", Condiments), ("peanut butter", Condiments), ("almond butter", Condiments),
            ("dressing", Condiments), ("broth", Condiments), ("stock", Condiments),
            ("coconut milk", Condiments), ("pesto", Condiments),
            // Spices
            ("salt", Spices), ("pepper", Spices), ("black pepper", Spices), ("cumin", Spices),
            ("paprika", Spices), ("cinnamon", Spices), ("oregano", Spices), ("chili powder", Spices),
            ("chili flake", Spices), ("red pepper flake", Spices), ("turmeric", Spices),
            ("garlic powder", Spices), ("onion powder", Spices), ("nutmeg", Spices),
            ("thyme", Spices), ("rosemary", Spices), ("seasoning", Spices), ("vanilla", Spices),
            // Snacks
            ("almond", Snacks), ("walnut", Snacks), ("cashew", Snacks), ("peanut", Snacks),
            ("nut", Snacks), ("chip", Snacks), ("cracker", Snacks), ("granola", Snacks),
            ("popcorn", Snacks), ("dark chocolate", Snacks), ("trail mix", Snacks),
            ("chia seed", Snacks), ("seed", Snacks), ("protein bar", Snacks),
            // Beverages
            ("coffee", Beverages), ("tea", Beverages), ("juice", Beverages), ("water", Beverages),
            ("sparkling water", Beverages),
            // Frozen
            ("frozen", Frozen), ("ice cream", Frozen), ("edamame", Frozen),
        ]
    };
}

/// Singularize one lowercase word well enough for keyword matching
fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    if let Some(stem) = word.strip_suffix("oes") {
        return format!("{stem}o");
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Split a name into lowercase singular words
pub fn name_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(singular)
        .collect()
}

/// Does `phrase` occur as a run of whole words in `tokens`?
pub fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let phrase_tokens = name_tokens(phrase);
    if phrase_tokens.is_empty() || phrase_tokens.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(phrase_tokens.len())
        .any(|window| window == phrase_tokens.as_slice())
}

/// Deterministic category for an ingredient name
pub fn rule_based_category(name: &str) -> Category {
    let tokens = name_tokens(name);
    CATEGORY_KEYWORDS
        .iter()
        .filter(|(keyword, _)| contains_phrase(&tokens, keyword))
        .max_by_key(|(keyword, _)| keyword.len())
        .map(|(_, category)| *category)
        .unwrap_or(Category::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_strict() {
        assert_eq!(Category::parse("produce"), Some(Category::Produce));
        assert_eq!(Category::parse(" Dairy "), Some(Category::Dairy));
        assert_eq!(Category::parse("Meat"), None);
        assert_eq!(Category::parse(""), None);
    }

    #[test]
    fn test_rule_based_category() {
        assert_eq!(rule_based_category("Chicken Breast"), Category::Protein);
        assert_eq!(rule_based_category("Cherry Tomatoes"), Category::Produce);
        assert_eq!(rule_based_category("Eggs"), Category::Protein);
        assert_eq!(rule_based_category("Greek Yogurt"), Category::Dairy);
        assert_eq!(rule_based_category("Brown Rice"), Category::Grains);
        assert_eq!(rule_based_category("Extra Virgin Olive Oil"), Category::Condiments);
        assert_eq!(rule_based_category("Unicorn Dust"), Category::Other);
    }

    #[test]
    fn test_longest_keyword_wins() {
        assert_eq!(rule_based_category("Peanut Butter"), Category::Condiments);
        assert_eq!(rule_based_category("Garlic Powder"), Category::Spices);
        assert_eq!(rule_based_category("Red Bell Pepper"), Category::Produce);
        assert_eq!(rule_based_category("Black Pepper"), Category::Spices);
        assert_eq!(rule_based_category("Tomato Sauce"), Category::Condiments);
    }

    #[test]
    fn test_whole_word_matching() {
        // "oat" must not match inside "goat"
        assert_eq!(rule_based_category("Goat"), Category::Other);
        assert_eq!(rule_based_category("Rolled Oats"), Category::Grains);
    }

    #[test]
    fn test_sold_by_the_pound() {
        assert!(Category::Protein.sold_by_the_pound());
        assert!(Category::Produce.sold_by_the_pound());
        assert!(!Category::Dairy.sold_by_the_pound());
    }
}
