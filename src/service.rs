//! # Shopping List Service Module
//!
//! Front door of the crate. Ties a [`MenuSource`], the [`ListGenerator`]
//! pipeline, the [`CacheManager`], per-fingerprint [`KeyedLocks`] and the
//! [`JobOrchestrator`] together behind three operations:
//!
//! - `generate`: cached list, or start/attach to a background job
//! - `status`: poll a fingerprint
//! - `invalidate`: drop cached lists and live jobs of a menu
//!
//! The check-cache, attach-or-start sequence and the completion, cache-write
//! sequence both run under the fingerprint's lock, so at most one job per
//! fingerprint is live and a stale job never overwrites a newer result.

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::ai_classifier::AiClassifier;
use crate::cache_manager::{CacheManager, CacheStore};
use crate::category_classifier::{generic_advice, CategoryClassifier, ResilientClassifier};
use crate::fingerprint::{all_fingerprints, fingerprint, GenerationOptions};
use crate::generation_config::{GenerationConfig, JobConfig};
use crate::generation_errors::GenerationError;
use crate::job_orchestrator::{Admission, Job, JobOrchestrator, JobState, JobTicket};
use crate::keyed_locks::KeyedLocks;
use crate::list_generator::ListGenerator;
use crate::menu_model::Menu;
use crate::shopping_list::ShoppingList;
use crate::text_provider::OpenAiProvider;

/// Where menus come from. Persistence itself lives outside this crate.
#[async_trait]
pub trait MenuSource: Send + Sync {
    async fn load_menu(&self, menu_id: &str) -> Result<Option<Menu>, GenerationError>;
}

/// Menus held in memory
#[derive(Debug, Default)]
pub struct InMemoryMenuSource {
    menus: std::sync::RwLock<HashMap<String, Menu>>,
}

impl InMemoryMenuSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_menu(mut self, menu: Menu) -> Self {
        self.menus
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(menu.id.clone(), menu);
        self
    }

    pub fn insert(&self, menu: Menu) {
        self.menus
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(menu.id.clone(), menu);
    }
}

#[async_trait]
impl MenuSource for InMemoryMenuSource {
    async fn load_menu(&self, menu_id: &str) -> Result<Option<Menu>, GenerationError> {
        let menus = self.menus.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(menus.get(menu_id).cloned())
    }
}

/// Menus stored as `<menu_id>.json` in a directory
#[derive(Debug, Clone)]
pub struct JsonFileMenuSource {
    dir: PathBuf,
}

impl JsonFileMenuSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MenuSource for JsonFileMenuSource {
    async fn load_menu(&self, menu_id: &str) -> Result<Option<Menu>, GenerationError> {
        if menu_id.is_empty() || menu_id.contains(['/', '\\']) || menu_id.starts_with('.') {
            return Ok(None);
        }
        let path = self.dir.join(format!("{menu_id}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GenerationError::MenuSource(format!("{}: {}", path.display(), e))),
        };
        let menu: Menu = serde_json::from_slice(&bytes)
            .map_err(|e| GenerationError::MenuSource(format!("{}: {}", path.display(), e)))?;
        Ok(Some(menu))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub menu_id: String,
    #[serde(default = "default_true")]
    pub use_ai: bool,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_true() -> bool {
    true
}

impl GenerateRequest {
    pub fn new(menu_id: &str) -> Self {
        Self {
            menu_id: menu_id.to_string(),
            use_ai: true,
            use_cache: true,
        }
    }

    pub fn without_ai(mut self) -> Self {
        self.use_ai = false;
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.menu_id, GenerationOptions { use_ai: self.use_ai })
    }
}

/// Answer to a generate request
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GenerateResponse {
    /// The list is ready
    Completed(Arc<ShoppingList>),
    /// A job is running; poll `status(fingerprint)`
    Processing { status: JobState, fingerprint: String },
}

impl GenerateResponse {
    pub fn list(&self) -> Option<&Arc<ShoppingList>> {
        match self {
            GenerateResponse::Completed(list) => Some(list),
            GenerateResponse::Processing { .. } => None,
        }
    }
}

/// Answer to a status poll
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: JobState,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Arc<ShoppingList>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for StatusResponse {
    fn from(job: Job) -> Self {
        Self {
            status: job.state,
            fingerprint: job.fingerprint,
            result: job.result,
            error: job.error,
        }
    }
}

/// What an invalidation removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResponse {
    pub menu_id: String,
    pub cache_entries_removed: usize,
    pub jobs_cancelled: usize,
}

pub struct ShoppingListService {
    menus: Arc<dyn MenuSource>,
    generator: Arc<ListGenerator>,
    cache: Arc<CacheManager>,
    locks: Arc<KeyedLocks>,
    jobs: Arc<JobOrchestrator>,
}

impl ShoppingListService {
    pub fn new(
        menus: Arc<dyn MenuSource>,
        generator: ListGenerator,
        cache: CacheManager,
        jobs: JobConfig,
    ) -> Self {
        let reaper_interval = jobs.reaper_interval();
        let jobs = Arc::new(JobOrchestrator::new(jobs));
        // Without a runtime, history is still reclaimed on access
        if tokio::runtime::Handle::try_current().is_ok() {
            jobs.spawn_reaper(reaper_interval);
        }

        info!(
            "Shopping list service ready: cache store '{}', AI classifier {}",
            cache.store_name(),
            if generator.classifier().has_primary() { "enabled" } else { "disabled" }
        );
        Self {
            menus,
            generator: Arc::new(generator),
            cache: Arc::new(cache),
            locks: Arc::new(KeyedLocks::new()),
            jobs,
        }
    }

    /// Wire a service from configuration. The AI classifier is enabled when
    /// an API key is configured.
    pub fn from_config(
        config: &GenerationConfig,
        menus: Arc<dyn MenuSource>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let primary: Option<Arc<dyn CategoryClassifier>> = OpenAiProvider::from_config(&config.provider)
            .map(|provider| Arc::new(AiClassifier::new(Arc::new(provider))) as Arc<dyn CategoryClassifier>);
        if primary.is_none() {
            info!("No provider API key configured, using rule-based categories only");
        }

        let classifier = ResilientClassifier::new(primary, config.provider.recovery.clone());
        let generator = ListGenerator::new(classifier, config.validation.clone());
        let cache = CacheManager::new(store).with_ttl(config.cache.ttl());

        Self::new(menus, generator, cache, config.jobs.clone())
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn jobs(&self) -> &JobOrchestrator {
        &self.jobs
    }

    /// Number of per-fingerprint locks currently allocated
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Serve a cached list, or start or join a generation job.
    ///
    /// With `use_cache = false` the cache is not read and a fresh job
    /// supersedes any in-flight one. Waits up to the configured sync wait
    /// for the job before answering `processing`.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GenerationError> {
        if self.jobs.is_shut_down() {
            return Err(GenerationError::Job("service is shut down".to_string()));
        }

        let fp = request.fingerprint();
        let guard = self.locks.lock(&fp).await;

        if request.use_cache {
            match self.cache.get(&fp).await {
                Ok(Some(entry)) => {
                    debug!("Cache hit for menu {} ({})", request.menu_id, fp);
                    return Ok(GenerateResponse::Completed(entry.payload));
                }
                Ok(None) => {}
                Err(e) => warn!("Cache unavailable, generating without it: {}", e),
            }
        }

        let menu = self
            .menus
            .load_menu(&request.menu_id)
            .await?
            .ok_or_else(|| GenerationError::MenuNotFound(request.menu_id.clone()))?;

        let ticket = match self.jobs.admit(&fp, !request.use_cache) {
            Admission::Started(ticket) => {
                self.spawn_job(menu, &ticket, request.use_ai);
                ticket
            }
            Admission::Attached(ticket) => ticket,
        };
        drop(guard);
        self.locks.prune();

        self.respond(ticket, self.jobs.config().sync_wait()).await
    }

    async fn respond(&self, mut ticket: JobTicket, wait: Duration) -> Result<GenerateResponse, GenerationError> {
        let processing = |fingerprint: String| GenerateResponse::Processing {
            status: JobState::Processing,
            fingerprint,
        };
        if wait.is_zero() {
            return Ok(processing(ticket.fingerprint));
        }

        match ticket.wait(wait).await {
            Some(job) => finished_list(job).map(GenerateResponse::Completed),
            None => Ok(processing(ticket.fingerprint)),
        }
    }

    fn spawn_job(&self, menu: Menu, ticket: &JobTicket, use_ai: bool) {
        let generator = Arc::clone(&self.generator);
        let cache = Arc::clone(&self.cache);
        let locks = Arc::clone(&self.locks);
        let jobs = Arc::clone(&self.jobs);
        let fp = ticket.fingerprint.clone();
        let token = ticket.generation_token;
        let job_timeout = jobs.config().job_timeout();
        let span = tracing::info_span!("generation_job", fingerprint = %fp, token, menu_id = %menu.id);

        let handle = tokio::spawn(
            async move {
                jobs.mark_processing(&fp, token);

                let generated =
                    AssertUnwindSafe(tokio::time::timeout(job_timeout, generator.generate(&menu, &fp, use_ai)))
                        .catch_unwind()
                        .await;
                let (list, error) = match generated {
                    Ok(Ok(Ok(report))) => (report.list, None),
                    Ok(Ok(Err(e))) => {
                        warn!("Generation failed for menu {}: {}", menu.id, e);
                        let empty = ShoppingList::assemble(Vec::new(), generic_advice(), &fp);
                        (empty, Some(e.to_string()))
                    }
                    Ok(Err(_)) => {
                        warn!("Generation for menu {} exceeded {:?}, using fallback", menu.id, job_timeout);
                        let error = format!("job timed out after {}s", job_timeout.as_secs());
                        fallback_list(&generator, &menu, &fp, error)
                    }
                    Err(panic) => {
                        let error = format!("job panicked: {}", panic_message(&*panic));
                        error!("Generation for menu {} aborted, {}", menu.id, error);
                        fallback_list(&generator, &menu, &fp, error)
                    }
                };

                let guard = locks.lock(&fp).await;
                if !jobs.is_current(&fp, token) {
                    info!("Discarding result of superseded job for menu {}", menu.id);
                    drop(guard);
                    locks.prune();
                    return;
                }

                match error {
                    None => {
                        let payload = match cache.put(&fp, list.clone(), token).await {
                            Ok(entry) => entry.payload,
                            Err(e) => {
                                warn!("Could not cache shopping list {}: {}", fp, e);
                                Arc::new(list)
                            }
                        };
                        jobs.complete(&fp, token, payload);
                    }
                    Some(error) => {
                        jobs.fail(&fp, token, error, Some(Arc::new(list)));
                    }
                }
                drop(guard);
                locks.prune();
            }
            .instrument(span),
        );
        self.jobs.track(handle);
    }

    /// Poll a fingerprint: the live or recent job, else the cached list
    pub async fn status(&self, fingerprint: &str) -> Result<StatusResponse, GenerationError> {
        if let Some(job) = self.jobs.status(fingerprint) {
            return Ok(job.into());
        }

        match self.cache.get(fingerprint).await {
            Ok(Some(entry)) => Ok(StatusResponse {
                status: JobState::Completed,
                fingerprint: fingerprint.to_string(),
                result: Some(entry.payload),
                error: None,
            }),
            Ok(None) => Err(GenerationError::UnknownFingerprint(fingerprint.to_string())),
            Err(e) => {
                warn!("Cache unavailable while polling {}: {}", fingerprint, e);
                Err(GenerationError::UnknownFingerprint(fingerprint.to_string()))
            }
        }
    }

    /// Wait up to `deadline` for the list of a fingerprint
    pub async fn wait_for_list(
        &self,
        fingerprint: &str,
        deadline: Duration,
    ) -> Result<Arc<ShoppingList>, GenerationError> {
        if let Some(mut ticket) = self.jobs.watch(fingerprint) {
            return match ticket.wait(deadline).await {
                Some(job) => finished_list(job),
                None => Err(GenerationError::Job(format!(
                    "no result for {fingerprint} within {}s",
                    deadline.as_secs()
                ))),
            };
        }

        self.status(fingerprint)
            .await?
            .result
            .ok_or_else(|| GenerationError::UnknownFingerprint(fingerprint.to_string()))
    }

    /// Drop cached lists and live jobs for every fingerprint of a menu.
    /// Idempotent.
    pub async fn invalidate(&self, menu_id: &str) -> Result<InvalidateResponse, GenerationError> {
        let mut response = InvalidateResponse {
            menu_id: menu_id.to_string(),
            ..Default::default()
        };

        for fp in all_fingerprints(menu_id) {
            let _guard = self.locks.lock(&fp).await;
            if self.jobs.cancel(&fp) {
                response.jobs_cancelled += 1;
            }
            if self.cache.invalidate(&fp).await? {
                response.cache_entries_removed += 1;
            }
        }

        self.locks.prune();
        info!(
            "Invalidated menu {}: {} cache entries, {} jobs",
            menu_id, response.cache_entries_removed, response.jobs_cancelled
        );
        Ok(response)
    }

    /// Stop background work. Live jobs end as failed.
    pub fn shutdown(&self) {
        self.jobs.shutdown();
        self.locks.prune();
    }
}

/// Rules-only list for a job whose own run did not finish
fn fallback_list(
    generator: &ListGenerator,
    menu: &Menu,
    fp: &str,
    error: String,
) -> (ShoppingList, Option<String>) {
    let fallback = std::panic::catch_unwind(AssertUnwindSafe(|| generator.generate_fallback(menu, fp)));
    match fallback {
        Ok(Ok(report)) => (report.list, Some(error)),
        Ok(Err(e)) => (
            ShoppingList::assemble(Vec::new(), generic_advice(), fp),
            Some(format!("{error}; {e}")),
        ),
        Err(panic) => (
            ShoppingList::assemble(Vec::new(), generic_advice(), fp),
            Some(format!("{error}; fallback panicked: {}", panic_message(&*panic))),
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The list a terminal job delivers to callers.
///
/// A failed job still carries a fallback list unless nothing could be
/// extracted at all, which is the one failure callers see.
fn finished_list(job: Job) -> Result<Arc<ShoppingList>, GenerationError> {
    match (job.state, job.result, job.error) {
        (JobState::Completed, Some(list), _) => Ok(list),
        (JobState::Failed, Some(list), _) if list.item_count() > 0 => Ok(list),
        (_, _, error) => Err(GenerationError::NoListProduced(
            error.unwrap_or_else(|| "job finished without a list".to_string()),
        )),
    }
}

impl std::fmt::Debug for ShoppingListService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShoppingListService")
            .field("generator", &self.generator)
            .field("cache", &self.cache)
            .field("jobs", &self.jobs)
            .finish()
    }
}

impl Drop for ShoppingListService {
    fn drop(&mut self) {
        self.jobs.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu_model::{IngredientEntry, Meal};

    fn menu() -> Menu {
        Menu::new("menu-1").with_meal(
            Meal::new("m1", "Omelette")
                .with_ingredient(IngredientEntry::structured("Egg", Some(8.0), None))
                .with_ingredient(IngredientEntry::structured("Cherry Tomato", Some(2.0), None)),
        )
    }

    fn service(sync_wait_ms: u64) -> ShoppingListService {
        let menus = Arc::new(InMemoryMenuSource::new().with_menu(menu()));
        ShoppingListService::new(
            menus,
            ListGenerator::rules_only(),
            CacheManager::in_memory(),
            JobConfig {
                sync_wait_ms,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_sync_path_returns_list() {
        let service = service(2000);
        let response = service.generate(GenerateRequest::new("menu-1").without_ai()).await.unwrap();
        let list = response.list().unwrap();

        assert!(list.find("Egg: 8-large").is_some());
        assert!(list.find("Cherry Tomato: 2-medium").is_some());
    }

    #[tokio::test]
    async fn test_async_path_then_poll() {
        let service = service(0);
        let request = GenerateRequest::new("menu-1").without_ai();
        let fp = request.fingerprint();

        let response = service.generate(request).await.unwrap();
        assert!(matches!(response, GenerateResponse::Processing { .. }));

        let list = service.wait_for_list(&fp, Duration::from_secs(2)).await.unwrap();
        assert_eq!(list.source_fingerprint, fp);
        assert_eq!(service.status(&fp).await.unwrap().status, JobState::Completed);
    }

    #[tokio::test]
    async fn test_unknown_menu_and_fingerprint() {
        let service = service(0);
        assert!(matches!(
            service.generate(GenerateRequest::new("nope")).await,
            Err(GenerationError::MenuNotFound(_))
        ));
        assert!(matches!(
            service.status("deadbeef").await,
            Err(GenerationError::UnknownFingerprint(_))
        ));
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: GenerateRequest = serde_json::from_str(r#"{"menuId": "m"}"#).unwrap();
        assert!(request.use_ai);
        assert!(request.use_cache);
    }

    #[test]
    fn test_processing_response_shape() {
        let response = GenerateResponse::Processing {
            status: JobState::Processing,
            fingerprint: "abc".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "processing");
        assert_eq!(value["fingerprint"], "abc");
    }
}
