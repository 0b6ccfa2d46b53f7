//! # AI Classifier Module
//!
//! Categorization through a [`TextGenerationProvider`]. The provider is
//! asked for a JSON document with one category per item plus list-level
//! advice. The answer is validated strictly: a missing item, a category
//! outside the closed set, or empty advice fails the whole call.

use async_trait::async_trait;
use log::{debug, trace};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregator::{normalize_name, AggregatedItem};
use crate::category_classifier::{CategoryClassifier, Classification};
use crate::category_rules::Category;
use crate::generation_errors::ProviderError;
use crate::shopping_list::{HealthyAlternative, ListAdvice};
use crate::text_provider::TextGenerationProvider;

const SYSTEM_PROMPT: &str = "You are a grocery shopping assistant. \
You sort shopping-list items into store sections and give short, practical advice. \
Answer with a single JSON object and nothing else.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiResponse {
    items: Vec<AiItem>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    nutrition_tips: Vec<String>,
    #[serde(default)]
    healthy_alternatives: Vec<HealthyAlternative>,
    #[serde(default)]
    shopping_tips: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AiItem {
    name: String,
    category: String,
}

/// Build the user prompt listing every item name once
pub fn build_prompt(items: &[AggregatedItem]) -> String {
    let allowed: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();

    let mut names: Vec<&str> = Vec::new();
    for item in items {
        if !names.iter().any(|n| normalize_name(n) == normalize_name(&item.name)) {
            names.push(&item.name);
        }
    }
    let list = names
        .iter()
        .map(|name| format!("- {name}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Categorize each shopping-list item into exactly one of: {}.\n\n\
         Items:\n{}\n\n\
         Respond with JSON of this shape:\n\
         {{\"items\": [{{\"name\": \"<item name exactly as given>\", \"category\": \"<category>\"}}],\n \
         \"recommendations\": [\"...\"],\n \
         \"nutritionTips\": [\"...\"],\n \
         \"healthyAlternatives\": [{{\"original\": \"...\", \"alternative\": \"...\", \"benefit\": \"...\"}}],\n \
         \"shoppingTips\": [\"...\"]}}\n\
         Every item must appear once. healthyAlternatives and shoppingTips must not be empty.",
        allowed.join(", "),
        list
    )
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse and validate a provider answer against the items it was asked about
pub fn parse_response(raw: &str, items: &[AggregatedItem]) -> Result<Classification, ProviderError> {
    let response: AiResponse = serde_json::from_str(strip_code_fences(raw))?;

    let mut categories: HashMap<String, Category> = HashMap::new();
    for entry in &response.items {
        let category = Category::parse(&entry.category).ok_or_else(|| {
            ProviderError::InvalidCategory(format!("'{}' for item '{}'", entry.category, entry.name))
        })?;
        categories.insert(normalize_name(&entry.name), category);
    }

    let mut classified = Vec::with_capacity(items.len());
    for item in items {
        let category = categories
            .get(&normalize_name(&item.name))
            .copied()
            .ok_or_else(|| ProviderError::InvalidCategory(format!("no category for item '{}'", item.name)))?;
        classified.push(item.clone().with_category(category));
    }

    let healthy_alternatives: Vec<HealthyAlternative> = response
        .healthy_alternatives
        .into_iter()
        .filter(|alt| !alt.original.trim().is_empty() && !alt.alternative.trim().is_empty())
        .collect();
    let shopping_tips = non_empty(response.shopping_tips);
    if healthy_alternatives.is_empty() {
        return Err(ProviderError::Malformed("no healthyAlternatives".to_string()));
    }
    if shopping_tips.is_empty() {
        return Err(ProviderError::Malformed("no shoppingTips".to_string()));
    }

    Ok(Classification {
        items: classified,
        advice: ListAdvice {
            recommendations: non_empty(response.recommendations),
            nutrition_tips: non_empty(response.nutrition_tips),
            healthy_alternatives,
            shopping_tips,
        },
    })
}

fn non_empty(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Classifier backed by an external text-generation provider
pub struct AiClassifier {
    provider: Arc<dyn TextGenerationProvider>,
}

impl AiClassifier {
    pub fn new(provider: Arc<dyn TextGenerationProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CategoryClassifier for AiClassifier {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn classify(&self, items: &[AggregatedItem]) -> Result<Classification, ProviderError> {
        let prompt = build_prompt(items);
        trace!("Categorization prompt:\n{}", prompt);

        let raw = self.provider.generate(SYSTEM_PROMPT, &prompt).await?;
        debug!("Received {} bytes from {}", raw.len(), self.provider.name());

        parse_response(&raw, items)
    }
}

impl std::fmt::Debug for AiClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiClassifier")
            .field("provider", &self.provider.name())
            .finish()
    }
}
