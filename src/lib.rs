//! # Shopping List Generator
//!
//! Turns a multi-day meal menu into a consolidated, categorized shopping
//! list with healthy-alternative suggestions and shopping tips.
//!
//! Ingredients are extracted per meal, normalized to canonical units,
//! summed and re-expressed in a legible unit, then sorted into store
//! sections by an AI classifier with a deterministic fallback. Generated
//! lists are cached per menu fingerprint and produced by background jobs
//! that concurrent requests share.

pub mod aggregator;
pub mod ai_classifier;
pub mod cache_manager;
pub mod category_classifier;
pub mod category_rules;
pub mod circuit_breaker;
pub mod db;
pub mod dish_deduplicator;
pub mod fingerprint;
pub mod generation_config;
pub mod generation_errors;
pub mod ingredient_extractor;
pub mod job_orchestrator;
pub mod keyed_locks;
pub mod list_generator;
pub mod measurement_patterns;
pub mod measurement_units;
pub mod menu_model;
pub mod quantity_normalizer;
pub mod quantity_validation;
pub mod service;
pub mod shopping_list;
pub mod text_provider;
