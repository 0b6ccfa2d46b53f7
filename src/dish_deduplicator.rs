//! # Dish Deduplicator Module
//!
//! Upstream menu data sometimes carries the same dish twice: once as
//! `"Spicy Edamame"` and once as `"Spicy Edamame (snack_1)"`. Entries are
//! grouped by clean title (case-insensitive, per day). An entry without a
//! day joins the first dated group of the same title. Within a group the
//! entry without a slot tag is kept; if every entry is tagged the
//! lowest-numbered one is kept. Never fails.

use log::info;
use std::collections::HashMap;

use crate::measurement_patterns::split_slot_suffix;
use crate::menu_model::Meal;

/// Anything that can be deduplicated by title
pub trait DishEntry {
    fn title(&self) -> &str;

    /// Entries only collapse within the same scope (the menu day for meals).
    /// `None` matches any scope.
    fn scope(&self) -> Option<u32> {
        None
    }
}

impl DishEntry for Meal {
    fn title(&self) -> &str {
        &self.title
    }

    fn scope(&self) -> Option<u32> {
        self.day
    }
}

impl DishEntry for String {
    fn title(&self) -> &str {
        self
    }
}

impl DishEntry for &str {
    fn title(&self) -> &str {
        self
    }
}

/// Record of one dropped duplicate
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedDuplicate {
    pub name: String,
    pub removed_variant: String,
    pub kept_variant: String,
}

/// Rank of an entry within its group: untagged first, then by slot number
fn preference(title: &str) -> (bool, u32) {
    match split_slot_suffix(title).1 {
        None => (false, 0),
        Some((_, number)) => (true, number),
    }
}

/// Clean display title of an entry (slot tag removed)
pub fn clean_title(title: &str) -> String {
    split_slot_suffix(title).0
}

#[derive(Debug, Clone, Default)]
pub struct DishDeduplicator;

impl DishDeduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Keep one entry per clean title, in first-seen group order
    pub fn deduplicate<T: DishEntry + Clone>(&self, entries: &[T]) -> Vec<T> {
        self.deduplicate_with_report(entries).0
    }

    /// Like [`deduplicate`](Self::deduplicate) but also returns what was removed
    pub fn deduplicate_with_report<T: DishEntry + Clone>(
        &self,
        entries: &[T],
    ) -> (Vec<T>, Vec<RemovedDuplicate>) {
        let titles: Vec<String> = entries
            .iter()
            .map(|entry| clean_title(entry.title()).to_lowercase())
            .collect();

        let mut first_scope: HashMap<&str, u32> = HashMap::new();
        for (entry, title) in entries.iter().zip(&titles) {
            if let Some(scope) = entry.scope() {
                first_scope.entry(title.as_str()).or_insert(scope);
            }
        }

        let mut order: Vec<(Option<u32>, String)> = Vec::new();
        let mut groups: HashMap<(Option<u32>, String), Vec<usize>> = HashMap::new();

        for (i, entry) in entries.iter().enumerate() {
            let scope = entry
                .scope()
                .or_else(|| first_scope.get(titles[i].as_str()).copied());
            let key = (scope, titles[i].clone());
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(i);
        }

        let mut kept = Vec::with_capacity(order.len());
        let mut removed = Vec::new();

        for key in &order {
            let members = &groups[key];
            // min_by_key returns the first minimum, so equal ranks keep menu order
            let Some(&winner) = members
                .iter()
                .min_by_key(|&&i| preference(entries[i].title()))
            else {
                continue;
            };

            let kept_title = entries[winner].title();
            for &loser in members.iter().filter(|&&i| i != winner) {
                let record = RemovedDuplicate {
                    name: clean_title(kept_title),
                    removed_variant: entries[loser].title().to_string(),
                    kept_variant: kept_title.to_string(),
                };
                info!(
                    "Removed duplicate dish '{}': dropped '{}', kept '{}'",
                    record.name, record.removed_variant, record.kept_variant
                );
                removed.push(record);
            }
            kept.push(entries[winner].clone());
        }

        (kept, removed)
    }
}
