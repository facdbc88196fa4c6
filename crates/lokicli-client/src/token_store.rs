//! Session cookie storage
//!
//! Saves the `_oauth2_proxy` cookie per project so a login survives across
//! invocations. Entries older than the proxy's default cookie lifetime
//! (168 hours) are treated as gone.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

use lokicli_types::{LokiError, Result};

/// Lifetime of an oauth2-proxy session cookie
const TOKEN_TTL_HOURS: i64 = 168;

/// Saved session entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedToken {
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

impl SavedToken {
    /// Whether the cookie is still within its lifetime at `now`
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.saved_at + Duration::hours(TOKEN_TTL_HOURS)
    }
}

/// Token store backed by a JSON file
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    tokens: HashMap<String, SavedToken>,
}

impl TokenStore {
    /// Load the store at `path`; a missing or unreadable file is an empty store
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self { path, tokens }
    }

    /// Persist the store, dropping expired entries first
    pub fn save(&mut self) -> Result<()> {
        let now = Utc::now();
        self.tokens.retain(|_, t| t.is_valid(now));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.tokens)
            .map_err(|e| LokiError::Decode(e.to_string()))?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Saved token for a project, if still valid
    pub fn get(&self, project: &str) -> Option<&str> {
        self.tokens
            .get(project)
            .filter(|t| t.is_valid(Utc::now()))
            .map(|t| t.token.as_str())
    }

    pub fn set(&mut self, project: &str, token: &str) {
        self.tokens.insert(
            project.to_string(),
            SavedToken {
                token: token.to_string(),
                saved_at: Utc::now(),
            },
        );
    }

    pub fn remove(&mut self, project: &str) {
        self.tokens.remove(project);
    }
}
