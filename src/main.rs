use anyhow::{bail, Context, Result};
use log::info;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use shopping_list::cache_manager::{CacheStore, FileCacheStore};
use shopping_list::db::PgCacheStore;
use shopping_list::generation_config::{GenerationConfig, DEFAULT_CACHE_DIR};
use shopping_list::menu_model::Menu;
use shopping_list::service::{
    GenerateRequest, GenerateResponse, InMemoryMenuSource, JsonFileMenuSource, MenuSource, ShoppingListService,
};

const USAGE: &str = "usage: shopping-list <menu.json> [--no-ai] [--no-cache]\n       shopping-list --menu-dir <dir> <menu-id> [--no-ai] [--no-cache]";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    // Diagnostics go to stderr so stdout carries only the list
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

struct Args {
    /// A menu file, or a menu id when `menu_dir` is set
    menu: String,
    menu_dir: Option<String>,
    use_ai: bool,
    use_cache: bool,
}

fn parse_args() -> Result<Args> {
    let mut menu = None;
    let mut menu_dir = None;
    let mut use_ai = true;
    let mut use_cache = true;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-ai" => use_ai = false,
            "--no-cache" => use_cache = false,
            "--menu-dir" => menu_dir = Some(args.next().context(USAGE)?),
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n{USAGE}"),
            value if menu.is_none() => menu = Some(value.to_string()),
            _ => bail!(USAGE),
        }
    }

    Ok(Args {
        menu: menu.context(USAGE)?,
        menu_dir,
        use_ai,
        use_cache,
    })
}

/// The menu source and the id to generate for
async fn menu_source(args: &Args) -> Result<(Arc<dyn MenuSource>, String)> {
    if let Some(dir) = &args.menu_dir {
        info!("Loading menu {} from {}", args.menu, dir);
        return Ok((Arc::new(JsonFileMenuSource::new(dir)), args.menu.clone()));
    }

    let raw = tokio::fs::read_to_string(&args.menu)
        .await
        .with_context(|| format!("Failed to read menu file {}", args.menu))?;
    let menu: Menu = serde_json::from_str(&raw).context("Failed to parse menu JSON")?;
    let menu_id = menu.id.clone();
    info!("Loaded menu {} with {} meals", menu_id, menu.meals.len());

    Ok((Arc::new(InMemoryMenuSource::new().with_menu(menu)), menu_id))
}

async fn cache_store() -> Result<Arc<dyn CacheStore>> {
    if let Ok(database_url) = env::var("DATABASE_URL") {
        info!("Using PostgreSQL cache");
        return Ok(Arc::new(PgCacheStore::connect(&database_url).await?));
    }

    let dir = env::var("SHOPPING_LIST_CACHE_DIR").unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string());
    info!("Using file cache in {}", dir);
    Ok(Arc::new(FileCacheStore::new(dir)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_logging();

    let args = parse_args()?;
    let config = GenerationConfig::from_env();

    let (menus, menu_id) = menu_source(&args).await?;
    let service = ShoppingListService::from_config(&config, menus, cache_store().await?);

    let mut request = GenerateRequest::new(&menu_id);
    if !args.use_ai {
        request = request.without_ai();
    }
    if !args.use_cache {
        request = request.bypass_cache();
    }

    let list = match service.generate(request).await? {
        GenerateResponse::Completed(list) => list,
        GenerateResponse::Processing { fingerprint, .. } => {
            // The job deadline already bounds generation; allow a little slack
            let deadline = config.jobs.job_timeout() + Duration::from_secs(5);
            service.wait_for_list(&fingerprint, deadline).await?
        }
    };

    if !list.issues.is_empty() {
        for issue in &list.issues {
            log::warn!("{}", issue);
        }
    }
    println!("{}", serde_json::to_string_pretty(list.as_ref())?);

    service.shutdown();
    Ok(())
}
