use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::context_files::ContextFileAnalyzer;
use crate::error::{AppError, Result};
use crate::generation::{GenerationClient, RetryPolicy};
use crate::snapshot::SnapshotBuilder;

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL every endpoint path is appended to.
    pub api_url: String,
    pub connect_timeout: Duration,
    /// Longest silence tolerated while waiting for response bytes.
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            api_url: lookup("SCREEN_GUIDE_API_URL").unwrap_or(defaults.api_url),
            connect_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SCREEN_GUIDE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )?),
            read_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SCREEN_GUIDE_HTTP_TIMEOUT_SECS",
                defaults.read_timeout.as_secs(),
            )?),
            retry: RetryPolicy {
                max_retries: parse_or(
                    &lookup,
                    "SCREEN_GUIDE_MAX_RETRIES",
                    defaults.retry.max_retries,
                )?,
                base_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "SCREEN_GUIDE_RETRY_BASE_MS",
                    defaults.retry.base_delay.as_millis() as u64,
                )?),
            },
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path)
    }

    /// No overall deadline: a long generation stream stays alive while bytes keep arriving.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .build()
            .map_err(|e| AppError::config(format!("HTTP client: {}", e)))
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::config(format!("{} is not a valid value: {:?}", key, raw))),
        None => Ok(default),
    }
}

// ============================================================================
// Application state
// ============================================================================

pub struct AppState {
    pub config: Config,
    pub generation: GenerationClient,
    pub analyzer: ContextFileAnalyzer,
    pub snapshots: SnapshotBuilder,
}

pub fn app_init() -> Result<Arc<AppState>> {
    let config = Config::from_env()?;
    log::info!("✅ Configuration loaded (backend: {})", config.api_url);

    let http = config.http_client()?;
    let generation = GenerationClient::new(&config, http.clone());
    let analyzer = ContextFileAnalyzer::new(&config, http);

    Ok(Arc::new(AppState {
        config,
        generation,
        analyzer,
        snapshots: SnapshotBuilder::default(),
    }))
}
