//! The config loader: CLI flag > environment variable > TOML config file >
//! legacy key file > built-in default, resolved independently per key.
//!
//! The auth token is the one exception — it is never read from or written
//! to the TOML file, only from the environment or the legacy key file, so
//! it can never leak into `config show` by accident.

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GolemError;

pub const DEFAULT_MODEL: &str = "glm-4.7";
pub const DEFAULT_PERMISSION_MODE: &str = "bypassPermissions";
pub const DEFAULT_MAX_PARALLEL: u64 = 3;
pub const DEFAULT_ZAI_BASE_URL: &str = "https://api.z.ai/api/anthropic";
pub const DEFAULT_ZAI_API_TIMEOUT_MS: &str = "3000000";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub model: Option<String>,
    pub opus_model: Option<String>,
    pub sonnet_model: Option<String>,
    pub haiku_model: Option<String>,
    pub permission_mode: Option<String>,
    pub max_parallel: Option<u64>,
    pub zai_base_url: Option<String>,
    pub zai_api_timeout_ms: Option<String>,
    pub debug: Option<bool>,
}

/// Fully resolved configuration, independent of where each value came from.
#[derive(Debug, Clone)]
pub struct Config {
    pub model: String,
    pub opus_model: String,
    pub sonnet_model: String,
    pub haiku_model: String,
    pub permission_mode: String,
    pub max_parallel: u64,
    pub zai_base_url: String,
    pub zai_api_timeout_ms: String,
    pub debug: bool,
    pub auth_token: String,
}

/// The recognized keys in the TOML config file, for `config get`/`config set`.
pub const TOML_KEYS: [&str; 9] = [
    "model",
    "opus_model",
    "sonnet_model",
    "haiku_model",
    "permission_mode",
    "max_parallel",
    "zai_base_url",
    "zai_api_timeout_ms",
    "debug",
];

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn legacy_key_path() -> PathBuf {
    config_dir().join("zai.env")
}

fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("golem");
        }
    }
    if let Some(base_dirs) = BaseDirs::new() {
        return base_dirs.home_dir().join(".config").join("golem");
    }
    PathBuf::from("~/.config/golem")
}

/// Read and parse the TOML config file. A missing file is `Ok(None)`, not
/// an error. A present-but-unparsable file is a `config`-category error.
pub fn load_file() -> Result<Option<FileConfig>, GolemError> {
    let path = config_path();
    match std::fs::read_to_string(&path) {
        Ok(text) => toml::from_str(&text)
            .map(Some)
            .map_err(|e| GolemError::config(format!("failed to parse {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GolemError::config(format!("failed to read {}: {e}", path.display()))),
    }
}

/// Read the legacy `ZAI_API_KEY="..."` key file, stripping exactly one pair
/// of surrounding double quotes if present. A missing file is `Ok(None)`.
pub fn load_legacy_key() -> Result<Option<String>, GolemError> {
    let path = legacy_key_path();
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(GolemError::config(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };

    for line in text.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("ZAI_API_KEY=") else {
            continue;
        };
        return Ok(Some(strip_one_quote_pair(rest)));
    }
    Ok(None)
}

fn strip_one_quote_pair(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Flag overrides a caller may supply from its own CLI subcommand. Each
/// field is `None` when the flag wasn't given.
#[derive(Debug, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub opus_model: Option<String>,
    pub sonnet_model: Option<String>,
    pub haiku_model: Option<String>,
    pub permission_mode: Option<String>,
    pub max_parallel: Option<u64>,
    pub zai_base_url: Option<String>,
    pub zai_api_timeout_ms: Option<String>,
    pub debug: Option<bool>,
}

/// Resolve the full configuration: CLI overrides, then environment
/// variables, then the TOML file, then the legacy key file (auth token
/// only), then defaults.
pub fn load(overrides: &Overrides) -> Result<Config, GolemError> {
    let file = load_file()?.unwrap_or_default();

    let model = overrides
        .model
        .clone()
        .or_else(|| env_var("GOLEM_MODEL"))
        .or_else(|| file.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let opus_model = overrides
        .opus_model
        .clone()
        .or_else(|| env_var("GOLEM_OPUS_MODEL"))
        .or_else(|| file.opus_model.clone())
        .unwrap_or_else(|| model.clone());

    let sonnet_model = overrides
        .sonnet_model
        .clone()
        .or_else(|| env_var("GOLEM_SONNET_MODEL"))
        .or_else(|| file.sonnet_model.clone())
        .unwrap_or_else(|| model.clone());

    let haiku_model = overrides
        .haiku_model
        .clone()
        .or_else(|| env_var("GOLEM_HAIKU_MODEL"))
        .or_else(|| file.haiku_model.clone())
        .unwrap_or_else(|| model.clone());

    let permission_mode = overrides
        .permission_mode
        .clone()
        .or_else(|| env_var("GOLEM_PERMISSION_MODE"))
        .or_else(|| file.permission_mode.clone())
        .unwrap_or_else(|| DEFAULT_PERMISSION_MODE.to_string());

    let max_parallel = overrides
        .max_parallel
        .or_else(|| env_var("GOLEM_MAX_PARALLEL").and_then(|v| v.parse().ok()))
        .or(file.max_parallel)
        .unwrap_or(DEFAULT_MAX_PARALLEL);

    let zai_base_url = overrides
        .zai_base_url
        .clone()
        .or_else(|| env_var("GOLEM_ZAI_BASE_URL"))
        .or_else(|| file.zai_base_url.clone())
        .unwrap_or_else(|| DEFAULT_ZAI_BASE_URL.to_string());

    let zai_api_timeout_ms = overrides
        .zai_api_timeout_ms
        .clone()
        .or_else(|| env_var("GOLEM_ZAI_API_TIMEOUT_MS"))
        .or_else(|| file.zai_api_timeout_ms.clone())
        .unwrap_or_else(|| DEFAULT_ZAI_API_TIMEOUT_MS.to_string());

    let debug = overrides
        .debug
        .or_else(|| env_var("GOLEM_DEBUG").map(|v| v == "1" || v.eq_ignore_ascii_case("true")))
        .or(file.debug)
        .unwrap_or(false);

    let auth_token = env_var("GOLEM_API_KEY")
        .or_else(|| env_var("ZAI_API_KEY"))
        .or_else(|| load_legacy_key().unwrap_or(None))
        .unwrap_or_default();

    if auth_token.is_empty() {
        debug!("no auth token resolved from environment or legacy key file");
    }

    Ok(Config {
        model,
        opus_model,
        sonnet_model,
        haiku_model,
        permission_mode,
        max_parallel,
        zai_base_url,
        zai_api_timeout_ms,
        debug,
        auth_token,
    })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get a single recognized key's resolved value (as it would appear in the
/// TOML file, not overlaid with env/CLI), for `config get`.
pub fn get_key(file: &FileConfig, key: &str) -> Result<String, GolemError> {
    let value = match key {
        "model" => file.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        "opus_model" => file
            .opus_model
            .clone()
            .unwrap_or_else(|| file.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())),
        "sonnet_model" => file
            .sonnet_model
            .clone()
            .unwrap_or_else(|| file.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())),
        "haiku_model" => file
            .haiku_model
            .clone()
            .unwrap_or_else(|| file.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())),
        "permission_mode" => file
            .permission_mode
            .clone()
            .unwrap_or_else(|| DEFAULT_PERMISSION_MODE.to_string()),
        "max_parallel" => file.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL).to_string(),
        "zai_base_url" => file.zai_base_url.clone().unwrap_or_else(|| DEFAULT_ZAI_BASE_URL.to_string()),
        "zai_api_timeout_ms" => file
            .zai_api_timeout_ms
            .clone()
            .unwrap_or_else(|| DEFAULT_ZAI_API_TIMEOUT_MS.to_string()),
        "debug" => file.debug.unwrap_or(false).to_string(),
        other => {
            return Err(GolemError::user(format!(
                "unrecognized config key `{other}`; valid keys: {}",
                TOML_KEYS.join(", ")
            )))
        }
    };
    Ok(value)
}

/// Set a single recognized key in the TOML file, writing the file
/// atomically. Returns the path written.
pub fn set_key(key: &str, value: &str) -> Result<PathBuf, GolemError> {
    let mut file = load_file()?.unwrap_or_default();

    match key {
        "model" => file.model = Some(value.to_string()),
        "opus_model" => file.opus_model = Some(value.to_string()),
        "sonnet_model" => file.sonnet_model = Some(value.to_string()),
        "haiku_model" => file.haiku_model = Some(value.to_string()),
        "permission_mode" => file.permission_mode = Some(value.to_string()),
        "max_parallel" => {
            let parsed: u64 = value
                .parse()
                .map_err(|_| GolemError::validation(format!("max_parallel must be a non-negative integer, got `{value}`")))?;
            file.max_parallel = Some(parsed);
        }
        "zai_base_url" => file.zai_base_url = Some(value.to_string()),
        "zai_api_timeout_ms" => file.zai_api_timeout_ms = Some(value.to_string()),
        "debug" => {
            let parsed: bool = value
                .parse()
                .map_err(|_| GolemError::validation(format!("debug must be `true` or `false`, got `{value}`")))?;
            file.debug = Some(parsed);
        }
        other => {
            return Err(GolemError::user(format!(
                "unrecognized config key `{other}`; valid keys: {}",
                TOML_KEYS.join(", ")
            )))
        }
    }

    let path = config_path();
    write_file_config(&path, &file).map_err(|e| GolemError::internal(format!("{e:#}")))?;
    Ok(path)
}

fn write_file_config(path: &Path, file: &FileConfig) -> anyhow::Result<()> {
    let text = toml::to_string_pretty(file).context("serialize config")?;
    crate::atomic::write_atomic(path, text.as_bytes()).context("write config file")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_config_home<F: FnOnce()>(dir: &Path, f: F) {
        let original = std::env::var_os("XDG_CONFIG_HOME");
        unsafe { std::env::set_var("XDG_CONFIG_HOME", dir) };
        f();
        match original {
            Some(v) => unsafe { std::env::set_var("XDG_CONFIG_HOME", v) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
    }

    #[test]
    fn defaults_apply_with_no_file_env_or_flags() {
        let dir = tempfile::tempdir().unwrap();
        with_config_home(dir.path(), || {
            let original_key = std::env::var_os("GOLEM_API_KEY");
            unsafe { std::env::remove_var("GOLEM_API_KEY") };
            unsafe { std::env::remove_var("ZAI_API_KEY") };

            let cfg = load(&Overrides::default()).unwrap();
            assert_eq!(cfg.model, DEFAULT_MODEL);
            assert_eq!(cfg.opus_model, DEFAULT_MODEL);
            assert_eq!(cfg.permission_mode, DEFAULT_PERMISSION_MODE);
            assert_eq!(cfg.max_parallel, DEFAULT_MAX_PARALLEL);

            if let Some(v) = original_key {
                unsafe { std::env::set_var("GOLEM_API_KEY", v) };
            }
        });
    }

    #[test]
    fn cli_override_beats_everything() {
        let dir = tempfile::tempdir().unwrap();
        with_config_home(dir.path(), || {
            unsafe { std::env::set_var("GOLEM_MODEL", "from-env") };
            let overrides = Overrides {
                model: Some("from-flag".to_string()),
                ..Default::default()
            };
            let cfg = load(&overrides).unwrap();
            assert_eq!(cfg.model, "from-flag");
            unsafe { std::env::remove_var("GOLEM_MODEL") };
        });
    }

    #[test]
    fn env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        with_config_home(dir.path(), || {
            set_key("model", "from-file").unwrap();
            unsafe { std::env::set_var("GOLEM_MODEL", "from-env") };
            let cfg = load(&Overrides::default()).unwrap();
            assert_eq!(cfg.model, "from-env");
            unsafe { std::env::remove_var("GOLEM_MODEL") };
        });
    }

    #[test]
    fn per_model_slots_default_to_model_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        with_config_home(dir.path(), || {
            let overrides = Overrides {
                model: Some("glm-x".to_string()),
                ..Default::default()
            };
            let cfg = load(&overrides).unwrap();
            assert_eq!(cfg.opus_model, "glm-x");
            assert_eq!(cfg.sonnet_model, "glm-x");
            assert_eq!(cfg.haiku_model, "glm-x");
        });
    }

    #[test]
    fn legacy_key_file_strips_exactly_one_quote_pair() {
        let dir = tempfile::tempdir().unwrap();
        with_config_home(dir.path(), || {
            std::fs::create_dir_all(dir.path().join("golem")).unwrap();
            std::fs::write(
                dir.path().join("golem").join("zai.env"),
                "ZAI_API_KEY=\"\"\"abc\"\"\"\n",
            )
            .unwrap();
            let key = load_legacy_key().unwrap().unwrap();
            assert_eq!(key, "\"\"abc\"\"");
        });
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        with_config_home(dir.path(), || {
            set_key("max_parallel", "7").unwrap();
            let file = load_file().unwrap().unwrap();
            assert_eq!(get_key(&file, "max_parallel").unwrap(), "7");
        });
    }

    #[test]
    fn unrecognized_key_is_user_error() {
        let dir = tempfile::tempdir().unwrap();
        with_config_home(dir.path(), || {
            let err = set_key("nonsense", "x").unwrap_err();
            assert_eq!(err.category, crate::error::Category::User);
        });
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        with_config_home(dir.path(), || {
            assert!(load_file().unwrap().is_none());
        });
    }
}
