use std::env;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::catalog::{now_iso, Catalog};

/// Singleton row the full snapshot is upserted under on the remote side.
const SINGLETON_ID: u32 = 1;

const URL_VAR: &str = "EVAL360_API_URL";
const KEY_VAR: &str = "EVAL360_API_KEY";

/// Remote endpoint configuration, supplied externally (environment or .env).
/// An empty URL means the feature is off and every push is a local-only
/// no-op.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub api_url: String,
    pub api_key: String,
}

impl SyncConfig {
    pub fn from_env() -> SyncConfig {
        SyncConfig {
            api_url: env::var(URL_VAR)
                .unwrap_or_default()
                .trim()
                .trim_end_matches('/')
                .to_string(),
            api_key: env::var(KEY_VAR).unwrap_or_default().trim().to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_url.is_empty()
    }

    /// The endpoint dialect is picked by inspecting the URL; anything else
    /// gets the generic JSON contract.
    pub fn is_supabase(&self) -> bool {
        self.api_url.contains("supabase.co")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// No endpoint configured; local persistence is the whole story.
    LocalOnly,
    Synced,
    /// Logged and reported, never raised; local success stands on its own.
    Failed(String),
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::LocalOnly => "localOnly",
            SyncOutcome::Synced => "synced",
            SyncOutcome::Failed(_) => "failed",
        }
    }
}

fn client() -> Result<reqwest::blocking::Client, String> {
    reqwest::blocking::Client::builder()
        .build()
        .map_err(|e| e.to_string())
}

/// Upsert the full catalog snapshot on the remote endpoint. One attempt, no
/// retry; transport-default timeouts.
pub fn push_snapshot(cfg: &SyncConfig, catalog: &Catalog) -> SyncOutcome {
    if !cfg.is_configured() {
        debug!("no sync endpoint configured, local save only");
        return SyncOutcome::LocalOnly;
    }

    let result = if cfg.is_supabase() {
        push_supabase(cfg, catalog)
    } else {
        push_generic(cfg, catalog)
    };

    match result {
        Ok(()) => {
            info!("catalog snapshot synced to remote endpoint");
            SyncOutcome::Synced
        }
        Err(e) => {
            warn!("remote sync failed (local save unaffected): {e}");
            SyncOutcome::Failed(e)
        }
    }
}

fn push_supabase(cfg: &SyncConfig, catalog: &Catalog) -> Result<(), String> {
    let client = client()?;
    let url = format!("{}/rest/v1/app_data", cfg.api_url);
    let timestamp = now_iso();
    let body = json!({
        "id": SINGLETON_ID,
        "data": catalog,
        "timestamp": timestamp,
        "updated_at": timestamp,
    });

    // Update-if-exists first; a missing row falls back to a create.
    let mut response = client
        .patch(format!("{url}?id=eq.{SINGLETON_ID}"))
        .header("apikey", &cfg.api_key)
        .bearer_auth(&cfg.api_key)
        .header("Prefer", "return=representation")
        .json(&body)
        .send()
        .map_err(|e| e.to_string())?;

    if matches!(response.status().as_u16(), 404 | 406) {
        response = client
            .post(&url)
            .header("apikey", &cfg.api_key)
            .bearer_auth(&cfg.api_key)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .map_err(|e| e.to_string())?;
    }

    check_status(response)
}

fn push_generic(cfg: &SyncConfig, catalog: &Catalog) -> Result<(), String> {
    let client = client()?;
    let body = json!({ "timestamp": now_iso(), "data": catalog });
    let mut request = client.post(format!("{}/api/data", cfg.api_url)).json(&body);
    if !cfg.api_key.is_empty() {
        request = request.bearer_auth(&cfg.api_key);
    }
    let response = request.send().map_err(|e| e.to_string())?;
    check_status(response)
}

fn check_status(response: reqwest::blocking::Response) -> Result<(), String> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let detail = response.text().unwrap_or_default();
    Err(format!("server returned {status}: {detail}"))
}

/// Fire-and-forget push on a detached thread with a cloned snapshot, so
/// neither local persistence nor the request loop waits on the network.
pub fn spawn_push(cfg: &SyncConfig, catalog: &Catalog) {
    if !cfg.is_configured() {
        return;
    }
    let cfg = cfg.clone();
    let snapshot = catalog.clone();
    std::thread::spawn(move || {
        let _ = push_snapshot(&cfg, &snapshot);
    });
}

/// Fetch the remote snapshot, if any. Absence, 404 and transport errors all
/// come back as None; local data stays authoritative.
pub fn pull_snapshot(cfg: &SyncConfig) -> Option<serde_json::Value> {
    if !cfg.is_configured() {
        debug!("no sync endpoint configured, using local data");
        return None;
    }

    let result = if cfg.is_supabase() {
        pull_supabase(cfg)
    } else {
        pull_generic(cfg)
    };

    match result {
        Ok(v) => v,
        Err(e) => {
            warn!("remote fetch failed, using local data: {e}");
            None
        }
    }
}

fn pull_supabase(cfg: &SyncConfig) -> Result<Option<serde_json::Value>, String> {
    let client = client()?;
    let url = format!(
        "{}/rest/v1/app_data?id=eq.{SINGLETON_ID}&select=*",
        cfg.api_url
    );
    let response = client
        .get(url)
        .header("apikey", &cfg.api_key)
        .bearer_auth(&cfg.api_key)
        .send()
        .map_err(|e| e.to_string())?;
    if response.status().as_u16() == 404 {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(format!("server returned {}", response.status()));
    }
    let rows: serde_json::Value = response.json().map_err(|e| e.to_string())?;
    Ok(rows
        .as_array()
        .and_then(|a| a.first())
        .and_then(|row| row.get("data"))
        .cloned())
}

fn pull_generic(cfg: &SyncConfig) -> Result<Option<serde_json::Value>, String> {
    let client = client()?;
    let mut request = client.get(format!("{}/api/data", cfg.api_url));
    if !cfg.api_key.is_empty() {
        request = request.bearer_auth(&cfg.api_key);
    }
    let response = request.send().map_err(|e| e.to_string())?;
    if response.status().as_u16() == 404 {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(format!("server returned {}", response.status()));
    }
    let body: serde_json::Value = response.json().map_err(|e| e.to_string())?;
    Ok(body.get("data").cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;

    #[test]
    fn unconfigured_push_is_local_only() {
        let cfg = SyncConfig::default();
        assert_eq!(
            push_snapshot(&cfg, seed::catalog()),
            SyncOutcome::LocalOnly
        );
    }

    #[test]
    fn unconfigured_pull_is_none() {
        assert_eq!(pull_snapshot(&SyncConfig::default()), None);
    }

    #[test]
    fn dialect_is_picked_from_the_url() {
        let supabase = SyncConfig {
            api_url: "https://abc.supabase.co".to_string(),
            api_key: String::new(),
        };
        let generic = SyncConfig {
            api_url: "https://example.com".to_string(),
            api_key: String::new(),
        };
        assert!(supabase.is_supabase());
        assert!(!generic.is_supabase());
    }
}
