//! # Service Integration Tests
//!
//! Concurrency and caching contract of the generation service:
//! single-flight coalescing, cache bypass, token supersession,
//! invalidation and polling.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shopping_list::aggregator::AggregatedItem;
use shopping_list::cache_manager::CacheManager;
use shopping_list::category_classifier::{
    CategoryClassifier, Classification, ResilientClassifier, RuleBasedClassifier,
};
use shopping_list::generation_config::{JobConfig, RecoveryConfig, ValidationConfig};
use shopping_list::generation_errors::{GenerationError, ProviderError};
use shopping_list::job_orchestrator::JobState;
use shopping_list::list_generator::ListGenerator;
use shopping_list::menu_model::{IngredientEntry, Meal, Menu};
use shopping_list::service::{GenerateRequest, GenerateResponse, InMemoryMenuSource, ShoppingListService};

/// Classifier with a bug: every call panics
struct PanickingClassifier;

#[async_trait]
impl CategoryClassifier for PanickingClassifier {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn classify(&self, _items: &[AggregatedItem]) -> Result<Classification, ProviderError> {
        panic!("classifier bug");
    }
}

/// Classifier that counts invocations and takes a while to answer
struct CountingClassifier {
    calls: AtomicU32,
    delay: Duration,
}

impl CountingClassifier {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            delay,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CategoryClassifier for CountingClassifier {
    fn name(&self) -> &str {
        "counting"
    }

    async fn classify(&self, items: &[AggregatedItem]) -> Result<Classification, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(RuleBasedClassifier::new().classify_now(items))
    }
}

fn menu() -> Menu {
    Menu::new("menu-1")
        .with_meal(
            Meal::new("m1", "Chicken Bowl")
                .on_day(1)
                .with_ingredient(IngredientEntry::text("Chicken Breast: 8 oz"))
                .with_ingredient(IngredientEntry::structured("Egg", Some(8.0), None)),
        )
        .with_meal(
            Meal::new("m2", "Chicken Wrap")
                .on_day(2)
                .with_ingredient(IngredientEntry::text("Chicken Breast: 8 oz"))
                .with_ingredient(IngredientEntry::structured("Cherry Tomato", Some(2.0), None)),
        )
}

fn service_with(classifier: Arc<CountingClassifier>, sync_wait_ms: u64) -> ShoppingListService {
    let primary: Arc<dyn CategoryClassifier> = classifier;
    let generator = ListGenerator::new(
        ResilientClassifier::new(Some(primary), RecoveryConfig::default()),
        ValidationConfig::default(),
    );
    let menus = Arc::new(InMemoryMenuSource::new().with_menu(menu()));
    ShoppingListService::new(
        menus,
        generator,
        CacheManager::in_memory(),
        JobConfig {
            sync_wait_ms,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_concurrent_requests_invoke_classifier_once() {
    let classifier = CountingClassifier::new(Duration::from_millis(100));
    let service = service_with(classifier.clone(), 0);
    let request = GenerateRequest::new("menu-1");
    let fp = request.fingerprint();

    let (first, second) = tokio::join!(
        service.generate(request.clone()),
        service.generate(request.clone())
    );
    assert!(matches!(first.unwrap(), GenerateResponse::Processing { .. }));
    assert!(matches!(second.unwrap(), GenerateResponse::Processing { .. }));

    let list = service.wait_for_list(&fp, Duration::from_secs(5)).await.unwrap();
    assert!(list.find("Chicken Breast: 1-lb").is_some());

    // A third request after completion is served from the cache
    let third = service.generate(request).await.unwrap();
    assert!(third.list().is_some());

    assert_eq!(classifier.calls(), 1);
    assert_eq!(service.jobs().stats().started, 1);
    assert_eq!(service.jobs().stats().attached, 1);
}

#[tokio::test]
async fn test_many_concurrent_requests_share_one_job() {
    let classifier = CountingClassifier::new(Duration::from_millis(50));
    let service = Arc::new(service_with(classifier.clone(), 2000));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.generate(GenerateRequest::new("menu-1")).await
        }));
    }

    let mut stamps = Vec::new();
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        stamps.push(response.list().unwrap().generated_at);
    }

    assert_eq!(classifier.calls(), 1);
    assert!(stamps.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_cache_bypass_regenerates_and_replaces_entry() {
    let classifier = CountingClassifier::new(Duration::from_millis(1));
    let service = service_with(classifier.clone(), 2000);
    let request = GenerateRequest::new("menu-1");
    let fp = request.fingerprint();

    let first = service.generate(request.clone()).await.unwrap().list().cloned().unwrap();
    let cached = service.generate(request.clone()).await.unwrap().list().cloned().unwrap();
    assert_eq!(first.generated_at, cached.generated_at);
    assert_eq!(classifier.calls(), 1);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let fresh = service
        .generate(request.bypass_cache())
        .await
        .unwrap()
        .list()
        .cloned()
        .unwrap();

    assert!(fresh.generated_at > first.generated_at);
    assert_eq!(classifier.calls(), 2);

    let entry = service.cache().get(&fp).await.unwrap().unwrap();
    assert_eq!(entry.payload.generated_at, fresh.generated_at);
    assert_eq!(first.content_signature(), fresh.content_signature());
}

#[tokio::test]
async fn test_superseded_job_result_is_discarded() {
    let classifier = CountingClassifier::new(Duration::from_millis(150));
    let service = service_with(classifier.clone(), 0);
    let request = GenerateRequest::new("menu-1");
    let fp = request.fingerprint();

    service.generate(request.clone()).await.unwrap();
    let stale_token = service.jobs().status(&fp).unwrap().generation_token;

    tokio::time::sleep(Duration::from_millis(20)).await;
    service.generate(request.bypass_cache()).await.unwrap();
    let current_token = service.jobs().status(&fp).unwrap().generation_token;
    assert!(current_token > stale_token);

    service.wait_for_list(&fp, Duration::from_secs(5)).await.unwrap();
    // Let the superseded job run to completion too
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(classifier.calls(), 2);
    let entry = service.cache().get(&fp).await.unwrap().unwrap();
    assert_eq!(entry.generation_token, current_token);

    let job = service.jobs().status(&fp).unwrap();
    assert_eq!(job.generation_token, current_token);
    assert_eq!(job.state, JobState::Completed);
}

#[tokio::test]
async fn test_status_polling_contract() {
    let classifier = CountingClassifier::new(Duration::from_millis(100));
    let service = service_with(classifier, 0);
    let request = GenerateRequest::new("menu-1");
    let fp = request.fingerprint();

    service.generate(request).await.unwrap();
    let status = service.status(&fp).await.unwrap();
    assert!(status.status.is_live());
    assert!(status.result.is_none());

    let mut polls = 0;
    let status = loop {
        let status = service.status(&fp).await.unwrap();
        if status.status.is_terminal() {
            break status;
        }
        polls += 1;
        assert!(polls < 200, "job never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(status.status, JobState::Completed);
    assert!(status.result.is_some());
    assert!(status.error.is_none());

    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["status"], "completed");
    assert!(value["result"]["groceryList"].is_array());
}

#[tokio::test]
async fn test_invalidate_is_idempotent() {
    let classifier = CountingClassifier::new(Duration::from_millis(1));
    let service = service_with(classifier.clone(), 2000);
    let request = GenerateRequest::new("menu-1");
    let fp = request.fingerprint();

    service.generate(request.clone()).await.unwrap();
    assert!(service.cache().get(&fp).await.unwrap().is_some());

    let removed = service.invalidate("menu-1").await.unwrap();
    assert_eq!(removed.cache_entries_removed, 1);
    assert_eq!(removed.jobs_cancelled, 1);
    assert!(matches!(
        service.status(&fp).await,
        Err(GenerationError::UnknownFingerprint(_))
    ));

    let again = service.invalidate("menu-1").await.unwrap();
    assert_eq!(again.cache_entries_removed, 0);
    assert_eq!(again.jobs_cancelled, 0);

    // The next request generates afresh
    service.generate(request).await.unwrap();
    assert_eq!(classifier.calls(), 2);
}

#[tokio::test]
async fn test_invalidate_drops_in_flight_result() {
    let classifier = CountingClassifier::new(Duration::from_millis(100));
    let service = service_with(classifier, 0);
    let request = GenerateRequest::new("menu-1");
    let fp = request.fingerprint();

    service.generate(request).await.unwrap();
    service.invalidate("menu-1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(service.cache().get(&fp).await.unwrap().is_none());
    assert!(service.jobs().status(&fp).is_none());
}

#[tokio::test]
async fn test_menu_with_no_usable_meals_reports_failure() {
    let menus = Arc::new(
        InMemoryMenuSource::new()
            .with_menu(Menu::new("empty-plates").with_meal(Meal::new("m1", "Nothing").without_ingredients())),
    );
    let service = ShoppingListService::new(
        menus,
        ListGenerator::rules_only(),
        CacheManager::in_memory(),
        JobConfig {
            sync_wait_ms: 2000,
            ..Default::default()
        },
    );
    let request = GenerateRequest::new("empty-plates").without_ai();
    let fp = request.fingerprint();

    let result = service.generate(request).await;
    assert!(matches!(result, Err(GenerationError::NoListProduced(_))));

    // Pollers still get a fallback-shaped list next to the error
    let status = service.status(&fp).await.unwrap();
    assert_eq!(status.status, JobState::Failed);
    assert!(status.error.is_some());
    let list = status.result.unwrap();
    assert!(!list.shopping_tips.is_empty());
    assert!(service.cache().get(&fp).await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_rejects_new_work() {
    let classifier = CountingClassifier::new(Duration::from_millis(500));
    let service = service_with(classifier, 0);

    service.generate(GenerateRequest::new("menu-1")).await.unwrap();
    service.shutdown();

    assert!(service.jobs().is_shut_down());
    assert!(matches!(
        service.generate(GenerateRequest::new("menu-1")).await,
        Err(GenerationError::Job(_))
    ));
}

#[tokio::test]
async fn test_panicking_job_fails_instead_of_hanging() {
    let primary: Arc<dyn CategoryClassifier> = Arc::new(PanickingClassifier);
    let generator = ListGenerator::new(
        ResilientClassifier::new(Some(primary), RecoveryConfig::default()),
        ValidationConfig::default(),
    );
    let service = ShoppingListService::new(
        Arc::new(InMemoryMenuSource::new().with_menu(menu())),
        generator,
        CacheManager::in_memory(),
        JobConfig {
            sync_wait_ms: 2000,
            ..Default::default()
        },
    );
    let request = GenerateRequest::new("menu-1");
    let fp = request.fingerprint();

    // Callers get the rules-only list within the sync wait
    let response = service.generate(request.clone()).await.unwrap();
    let list = response.list().unwrap();
    assert!(list.find("Chicken Breast: 1-lb").is_some());

    let status = service.status(&fp).await.unwrap();
    assert_eq!(status.status, JobState::Failed);
    assert!(status.error.unwrap().contains("classifier bug"));
    assert_eq!(service.jobs().stats().live, 0);
    assert!(service.cache().get(&fp).await.unwrap().is_none());

    // The slot is free again, so the next request starts a new job
    service.generate(request).await.unwrap();
    assert_eq!(service.jobs().stats().started, 2);
}

#[tokio::test]
async fn test_locks_are_released_after_jobs() {
    let menus = InMemoryMenuSource::new();
    for i in 0..5 {
        menus.insert(
            Menu::new(&format!("menu-extra-{i}"))
                .with_meal(Meal::new("m1", "Toast").with_ingredient(IngredientEntry::text("Bread: 2 slices"))),
        );
    }
    let service = ShoppingListService::new(
        Arc::new(menus),
        ListGenerator::rules_only(),
        CacheManager::in_memory(),
        JobConfig {
            sync_wait_ms: 2000,
            ..Default::default()
        },
    );

    for i in 0..5 {
        let request = GenerateRequest::new(&format!("menu-extra-{i}")).without_ai();
        assert!(service.generate(request).await.unwrap().list().is_some());
    }
    // Let the job tasks run past their final unlock
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(service.lock_count(), 0);
}

#[tokio::test]
async fn test_reaper_reclaims_history_without_traffic() {
    let service = ShoppingListService::new(
        Arc::new(InMemoryMenuSource::new().with_menu(menu())),
        ListGenerator::rules_only(),
        CacheManager::in_memory(),
        JobConfig {
            sync_wait_ms: 2000,
            history_retention_secs: 1,
            ..Default::default()
        },
    );

    service.generate(GenerateRequest::new("menu-1").without_ai()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.jobs().stats().history, 1);

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(service.jobs().stats().history, 0);
}
