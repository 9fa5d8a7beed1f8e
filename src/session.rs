//! One automatic reload per session after a code-chunk load failure.

use aho_corasick::AhoCorasick;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{AppError, Result};

pub const RELOAD_FLAG_KEY: &str = "chunk-error-reload";

const CHUNK_ERROR_NAME: &str = "ChunkLoadError";
const CHUNK_ERROR_PATTERNS: &[&str] = &[
    "Loading chunk",
    CHUNK_ERROR_NAME,
    "Failed to fetch dynamically imported module",
];

/// Session-scoped key/value flags.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, String>>,
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
    }
}

pub struct ReloadGuard<S: SessionStore> {
    store: S,
    matcher: AhoCorasick,
}

impl<S: SessionStore> ReloadGuard<S> {
    pub fn new(store: S) -> Result<Self> {
        let matcher = AhoCorasick::new(CHUNK_ERROR_PATTERNS)
            .map_err(|e| AppError::config(format!("chunk error patterns: {}", e)))?;
        Ok(Self { store, matcher })
    }

    /// Normal startup: forget any reload from a previous failure.
    pub fn on_startup(&self) {
        self.store.remove(RELOAD_FLAG_KEY);
    }

    pub fn is_chunk_load_error(&self, message: &str, error_name: Option<&str>) -> bool {
        error_name == Some(CHUNK_ERROR_NAME) || self.matcher.is_match(message)
    }

    /// True at most once per session for a chunk-load failure; consumes the flag.
    pub fn should_reload(&self, message: &str, error_name: Option<&str>) -> bool {
        if !self.is_chunk_load_error(message, error_name) {
            return false;
        }
        if self.store.get(RELOAD_FLAG_KEY).is_some() {
            log::warn!("Chunk load failed again after reload, not reloading: {}", message);
            return false;
        }

        self.store.set(RELOAD_FLAG_KEY, "true");
        log::info!("Chunk load failed, reloading once: {}", message);
        true
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
