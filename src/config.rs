//! Runtime configuration
//!
//! Values come from the environment (after `.env` is loaded). API keys may
//! also live in a JSON key file; the environment wins over the file.

use crate::error::OrchestrationError;
use crate::run::PollPolicy;
use crate::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_KEYS_FILE: &str = "keys.json";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub serp_api_key: String,
    pub model: String,
    pub classifier_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub openai_base_url: String,
    pub serpapi_base_url: String,
    pub poll_interval: Duration,
    pub run_deadline: Duration,
    pub max_polls: Option<u32>,
    pub tool_timeout: Duration,
    pub max_tool_calls: u32,
    pub port: u16,
}

/// Key file layout, e.g. `{"OPENAI_API_KEY": "...", "SERP_API_KEY": "..."}`.
#[derive(Debug, Default, Deserialize)]
struct KeyFile {
    #[serde(rename = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,
    #[serde(rename = "SERP_API_KEY")]
    serp_api_key: Option<String>,
}

impl AppConfig {
    /// Load `.env`, the optional key file, then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let keys_path = env::var("KEYS_FILE").unwrap_or_else(|_| DEFAULT_KEYS_FILE.to_string());
        let keys = load_key_file(Path::new(&keys_path))?;

        Self::from_lookup(|key| {
            env::var(key).ok().or_else(|| match key {
                "OPENAI_API_KEY" => keys.openai_api_key.clone(),
                "SERP_API_KEY" => keys.serp_api_key.clone(),
                _ => None,
            })
        })
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = get("OPENAI_API_KEY").ok_or_else(|| {
            OrchestrationError::ConfigError("OPENAI_API_KEY is not set".to_string())
        })?;
        let serp_api_key = get("SERP_API_KEY").ok_or_else(|| {
            OrchestrationError::ConfigError("SERP_API_KEY is not set".to_string())
        })?;

        let model = get("MODEL_NAME").unwrap_or_else(|| "gpt-4".to_string());
        let classifier_model = get("CLASSIFIER_MODEL").unwrap_or_else(|| "gpt-4".to_string());

        let port: u16 = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => 8080,
        };

        let config = Self {
            openai_api_key,
            serp_api_key,
            model,
            classifier_model,
            temperature: parse_or(&get, "TEMPERATURE", 0.0)?,
            max_tokens: parse_or(&get, "MAX_TOKENS", 1024)?,
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            serpapi_base_url: get("SERPAPI_BASE_URL")
                .unwrap_or_else(|| "https://serpapi.com/search.json".to_string()),
            poll_interval: Duration::from_millis(parse_or(&get, "POLL_INTERVAL_MS", 500)?),
            run_deadline: Duration::from_secs(parse_or(&get, "RUN_DEADLINE_SECS", 120)?),
            max_polls: get("MAX_POLLS")
                .map(|raw| parse_value("MAX_POLLS", &raw))
                .transpose()?,
            tool_timeout: Duration::from_secs(parse_or(&get, "TOOL_TIMEOUT_SECS", 30)?),
            max_tool_calls: parse_or(&get, "MAX_TOOL_CALLS", 2)?,
            port,
        };

        debug!(
            model = %config.model,
            classifier_model = %config.classifier_model,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            run_deadline_secs = config.run_deadline.as_secs(),
            "Configuration loaded"
        );

        Ok(config)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            deadline: Some(self.run_deadline),
            max_polls: self.max_polls,
        }
    }
}

fn load_key_file(path: &Path) -> Result<KeyFile> {
    if !path.exists() {
        return Ok(KeyFile::default());
    }

    let raw = std::fs::read_to_string(path)?;
    let keys: KeyFile = serde_json::from_str(&raw).map_err(|e| {
        OrchestrationError::ConfigError(format!("Invalid key file {}: {}", path.display(), e))
    })?;

    info!(path = %path.display(), "Loaded API keys from key file");
    Ok(keys)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        OrchestrationError::ConfigError(format!("{} has an invalid value: '{}'", key, raw))
    })
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

/// Convenience for tests and embedding: a lookup over fixed pairs.
pub fn lookup_from_pairs(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [(&str, &str); 2] = [("OPENAI_API_KEY", "sk-test"), ("SERP_API_KEY", "serp-test")];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from_pairs(&KEYS)).unwrap();

        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.run_deadline, Duration::from_secs(120));
        assert_eq!(config.max_polls, None);
        assert_eq!(config.max_tool_calls, 2);
        assert_eq!(config.port, 8080);
        assert_eq!(config.openai_base_url, "https://api.openai.com/v1");

        let policy = config.poll_policy();
        assert_eq!(policy.deadline, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = KEYS.to_vec();
        pairs.extend([
            ("MODEL_NAME", "gpt-4o"),
            ("TEMPERATURE", "0.2"),
            ("POLL_INTERVAL_MS", "250"),
            ("MAX_POLLS", "40"),
            ("API_PORT", "9000"),
            ("OPENAI_BASE_URL", "http://localhost:4000/v1/"),
        ]);
        let config = AppConfig::from_lookup(lookup_from_pairs(&pairs)).unwrap();

        assert_eq!(config.model, "gpt-4o");
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_polls, Some(40));
        assert_eq!(config.port, 9000);
        assert_eq!(config.openai_base_url, "http://localhost:4000/v1");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = AppConfig::from_lookup(lookup_from_pairs(&[("OPENAI_API_KEY", "sk")]))
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigError(msg) if msg.contains("SERP_API_KEY")));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("POLL_INTERVAL_MS", "soon"));
        let err = AppConfig::from_lookup(lookup_from_pairs(&pairs)).unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_MS"));
    }

    #[test]
    fn test_key_file_parsing() {
        let dir = std::env::temp_dir().join(format!("keys-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("keys.json");
        std::fs::write(&path, r#"{"OPENAI_API_KEY": "sk-file", "SERP_API_KEY": "serp-file"}"#)
            .unwrap();

        let keys = load_key_file(&path).unwrap();
        assert_eq!(keys.openai_api_key.as_deref(), Some("sk-file"));
        assert_eq!(keys.serp_api_key.as_deref(), Some("serp-file"));

        let missing = load_key_file(&dir.join("absent.json")).unwrap();
        assert!(missing.openai_api_key.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
