//! # Menu Source Tests
//!
//! Menus read from a directory of `<menu_id>.json` files.

use std::sync::Arc;
use tempfile::TempDir;

use shopping_list::cache_manager::CacheManager;
use shopping_list::generation_config::JobConfig;
use shopping_list::generation_errors::GenerationError;
use shopping_list::list_generator::ListGenerator;
use shopping_list::service::{GenerateRequest, JsonFileMenuSource, MenuSource, ShoppingListService};

const MENU_JSON: &str = r#"{
    "id": "menu-9",
    "meals": [
        {
            "id": "m1",
            "title": "Garlic Chicken",
            "day": 1,
            "ingredients": ["Chicken Breast: 8 oz", {"name": "Garlic", "quantity": 3, "unit": "clove"}]
        }
    ]
}"#;

fn menu_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("menu-9.json"), MENU_JSON).unwrap();
    std::fs::write(dir.path().join("broken.json"), "{ \"id\": ").unwrap();
    dir
}

fn service_on(dir: &TempDir) -> ShoppingListService {
    ShoppingListService::new(
        Arc::new(JsonFileMenuSource::new(dir.path())),
        ListGenerator::rules_only(),
        CacheManager::in_memory(),
        JobConfig {
            sync_wait_ms: 2000,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_loads_menu_by_id() {
    let dir = menu_dir();
    let source = JsonFileMenuSource::new(dir.path());

    let menu = source.load_menu("menu-9").await.unwrap().unwrap();
    assert_eq!(menu.id, "menu-9");
    assert_eq!(menu.meals.len(), 1);
    assert_eq!(menu.meals[0].ingredients.as_ref().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_missing_and_path_like_ids_are_not_found() {
    let dir = menu_dir();
    let source = JsonFileMenuSource::new(dir.path());

    assert!(source.load_menu("menu-404").await.unwrap().is_none());
    assert!(source.load_menu("../menu-9").await.unwrap().is_none());
    assert!(source.load_menu("").await.unwrap().is_none());
}

#[tokio::test]
async fn test_malformed_file_is_a_source_error() {
    let dir = menu_dir();
    let source = JsonFileMenuSource::new(dir.path());

    let err = source.load_menu("broken").await.unwrap_err();
    assert!(matches!(err, GenerationError::MenuSource(_)));
}

#[tokio::test]
async fn test_service_over_menu_directory() {
    let dir = menu_dir();
    let service = service_on(&dir);

    let response = service.generate(GenerateRequest::new("menu-9").without_ai()).await.unwrap();
    let list = response.list().unwrap();
    assert!(list.find("Chicken Breast: 8-oz").is_some());

    assert!(matches!(
        service.generate(GenerateRequest::new("menu-404")).await,
        Err(GenerationError::MenuNotFound(_))
    ));
    assert!(matches!(
        service.generate(GenerateRequest::new("broken")).await,
        Err(GenerationError::MenuSource(_))
    ));
}
