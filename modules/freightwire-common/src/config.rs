use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,
    pub db_pool_size: u32,

    // LLM provider (OpenAI-compatible chat completions + embeddings)
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: String,
    pub embedding_model: String,

    // Discovery search (optional custom-search API)
    pub search_api_key: String,
    pub search_engine_id: String,

    // Worker pools
    pub fetch_concurrency: usize,
    pub enrich_workers: usize,
    pub webhook_workers: usize,

    // API surface
    pub listen_addr: String,
    pub rate_limit_rpm: u32,
    pub max_push_connections: usize,

    // Logging: "json" or "text"
    pub log_format: String,

    // Seed files
    pub sources_file: Option<PathBuf>,
    pub seeds_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            db_pool_size: parsed_env("DB_POOL_SIZE", 20),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_api_key: required_env("LLM_API_KEY"),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-large".to_string()),
            search_api_key: env::var("SEARCH_API_KEY").unwrap_or_default(),
            search_engine_id: env::var("SEARCH_ENGINE_ID").unwrap_or_default(),
            fetch_concurrency: parsed_env("FETCH_CONCURRENCY", 8),
            enrich_workers: parsed_env("ENRICH_WORKERS", 4),
            webhook_workers: parsed_env("WEBHOOK_WORKERS", 4),
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            rate_limit_rpm: parsed_env("RATE_LIMIT_RPM", 120),
            max_push_connections: parsed_env("MAX_PUSH_CONNECTIONS", 100),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            sources_file: env::var("SOURCES_FILE").ok().map(PathBuf::from),
            seeds_file: env::var("DISCOVERY_SEEDS_FILE").ok().map(PathBuf::from),
        }
    }

    /// Log secret lengths only, never values.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("LLM_API_KEY", &self.llm_api_key),
            ("SEARCH_API_KEY", &self.search_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
