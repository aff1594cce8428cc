//! Settings resolution
//!
//! Sources, highest precedence first: command line, `config.toml` in the
//! Odysseus home (`~/.odysseus`, or `$ODYSSEUS_HOME`), environment
//! (`ODYSSEUS_MODEL`, `OPENAI_BASE_URL`), built-in defaults. Credentials come
//! only from the environment.

use crate::agent::SuggestionMode;
use crate::llm::DEFAULT_BASE_URL;
use crate::search::SearchBackend;
use crate::{reading, OdysseusConfig, OdysseusError, Result, DEFAULT_MAX_PAGES, DEFAULT_MODEL};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Optional `config.toml` contents
///
/// ```toml
/// model = "gpt-4o-mini"
/// base_url = "http://localhost:11434/v1"
/// search_provider = "duckduckgo"
/// token_limit = 8000
/// char_cut = 40000
/// temperature = 0.3
/// log_dir = "/home/me/odysseus-logs"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub search_provider: Option<SearchBackend>,
    #[serde(default)]
    pub token_limit: Option<usize>,
    #[serde(default)]
    pub char_cut: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub max_pages: Option<u32>,
}

/// Values given on the command line
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub model: Option<String>,
    pub search: Option<SearchBackend>,
    pub log_dir: Option<PathBuf>,
    pub max_pages: Option<u32>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: String,
    pub base_url: String,
    pub search: SearchBackend,
    pub token_limit: usize,
    pub char_cut: usize,
    pub temperature: f32,
    pub log_dir: PathBuf,
    pub max_pages: u32,
}

/// API keys read from the environment
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub brave_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"<redacted>")
            .field("brave_api_key", &self.brave_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// `$ODYSSEUS_HOME`, else `~/.odysseus`.
pub fn odysseus_home(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(home) = env("ODYSSEUS_HOME").filter(|h| !h.trim().is_empty()) {
        return Some(PathBuf::from(home));
    }
    dirs::home_dir().map(|h| h.join(".odysseus"))
}

/// Read `config.toml` from `home`. Missing is fine; a malformed file is an error.
pub async fn load_settings_file(home: Option<&Path>) -> Result<SettingsFile> {
    let Some(home) = home else {
        return Ok(SettingsFile::default());
    };
    let path = home.join(CONFIG_FILE);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No config file at {}", path.display());
            return Ok(SettingsFile::default());
        }
        Err(e) => return Err(e.into()),
    };
    toml::from_str(&content)
        .map_err(|e| OdysseusError::Config(format!("{}: {}", path.display(), e)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Merge all sources.
pub fn resolve(file: SettingsFile, overrides: Overrides, env: impl Fn(&str) -> Option<String>) -> Settings {
    let model = non_empty(overrides.model)
        .or(non_empty(file.model))
        .or_else(|| non_empty(env("ODYSSEUS_MODEL")))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let base_url = non_empty(file.base_url)
        .or_else(|| non_empty(env("OPENAI_BASE_URL")))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let settings = Settings {
        model,
        base_url,
        search: overrides.search.or(file.search_provider).unwrap_or_default(),
        token_limit: file.token_limit.unwrap_or(reading::DEFAULT_TOKEN_LIMIT),
        char_cut: file.char_cut.unwrap_or(reading::DEFAULT_CHAR_CUT),
        temperature: file.temperature.unwrap_or(0.5),
        log_dir: overrides
            .log_dir
            .or(file.log_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        max_pages: overrides.max_pages.or(file.max_pages).unwrap_or(DEFAULT_MAX_PAGES),
    };

    info!(
        "Settings resolved: model='{}', base_url='{}', search={}, max_pages={}",
        settings.model, settings.base_url, settings.search, settings.max_pages
    );
    settings
}

/// Read API keys. The model key is required; Brave only when it is the backend.
pub fn credentials(search: SearchBackend, env: impl Fn(&str) -> Option<String>) -> Result<Credentials> {
    let openai_api_key = non_empty(env("OPENAI_API_KEY"))
        .or_else(|| non_empty(env("API_KEY")))
        .ok_or_else(|| OdysseusError::Auth("OPENAI_API_KEY (or API_KEY) is not set".to_string()))?;

    let brave_api_key = non_empty(env("BRAVE_API_KEY")).or_else(|| non_empty(env("BRAVE_KEY")));
    if search == SearchBackend::Brave && brave_api_key.is_none() {
        return Err(OdysseusError::Auth(
            "BRAVE_API_KEY (or BRAVE_KEY) is not set; use --search duckduckgo to search without a key"
                .to_string(),
        ));
    }

    Ok(Credentials {
        openai_api_key,
        brave_api_key,
    })
}

impl Settings {
    /// Run configuration rooted at `run_dir`.
    pub fn to_config(&self, run_dir: PathBuf, suggestions: SuggestionMode) -> OdysseusConfig {
        if self.temperature < 0.0 {
            warn!("Negative temperature {} clamped to 0", self.temperature);
        }
        OdysseusConfig::new(run_dir)
            .with_model(&self.model)
            .with_max_pages(self.max_pages)
            .with_token_budget(self.token_limit, self.char_cut)
            .with_temperature(self.temperature.max(0.0))
            .with_suggestions(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let s = resolve(SettingsFile::default(), Overrides::default(), env_of(&[]));
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(s.base_url, DEFAULT_BASE_URL);
        assert_eq!(s.search, SearchBackend::Brave);
        assert_eq!(s.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(s.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_precedence() {
        let env = env_of(&[("ODYSSEUS_MODEL", "env-model"), ("OPENAI_BASE_URL", "http://env/v1")]);
        let file = SettingsFile {
            model: Some("file-model".to_string()),
            ..Default::default()
        };
        let s = resolve(file, Overrides::default(), &env);
        assert_eq!(s.model, "file-model");
        assert_eq!(s.base_url, "http://env/v1");

        let file = SettingsFile {
            model: Some("file-model".to_string()),
            search_provider: Some(SearchBackend::DuckDuckGo),
            ..Default::default()
        };
        let overrides = Overrides {
            model: Some("cli-model".to_string()),
            search: Some(SearchBackend::Brave),
            ..Default::default()
        };
        let s = resolve(file, overrides, &env);
        assert_eq!(s.model, "cli-model");
        assert_eq!(s.search, SearchBackend::Brave);

        let s = resolve(SettingsFile::default(), Overrides::default(), &env);
        assert_eq!(s.model, "env-model");
    }

    #[test]
    fn test_credentials() {
        let creds = credentials(
            SearchBackend::Brave,
            env_of(&[("API_KEY", "sk-1"), ("BRAVE_KEY", "b-1")]),
        )
        .unwrap();
        assert_eq!(creds.openai_api_key, "sk-1");
        assert_eq!(creds.brave_api_key.as_deref(), Some("b-1"));
        assert!(!format!("{creds:?}").contains("sk-1"));

        assert!(matches!(
            credentials(SearchBackend::Brave, env_of(&[("OPENAI_API_KEY", "sk")])),
            Err(OdysseusError::Auth(_))
        ));
        assert!(credentials(SearchBackend::DuckDuckGo, env_of(&[("OPENAI_API_KEY", "sk")])).is_ok());
        assert!(credentials(SearchBackend::DuckDuckGo, env_of(&[])).is_err());
    }

    #[test]
    fn test_home_override() {
        let home = odysseus_home(env_of(&[("ODYSSEUS_HOME", "/tmp/ody")]));
        assert_eq!(home, Some(PathBuf::from("/tmp/ody")));
    }

    #[tokio::test]
    async fn test_load_settings_file() {
        let tmp = TempDir::new().unwrap();
        assert!(load_settings_file(Some(tmp.path())).await.unwrap().model.is_none());

        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "model = \"gpt-4o-mini\"\nsearch_provider = \"duckduckgo\"\ntoken_limit = 8000\n",
        )
        .unwrap();
        let file = load_settings_file(Some(tmp.path())).await.unwrap();
        assert_eq!(file.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(file.search_provider, Some(SearchBackend::DuckDuckGo));
        assert_eq!(file.token_limit, Some(8000));

        std::fs::write(tmp.path().join(CONFIG_FILE), "model = [").unwrap();
        assert!(matches!(
            load_settings_file(Some(tmp.path())).await,
            Err(OdysseusError::Config(_))
        ));
    }
}
