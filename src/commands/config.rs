//! `config` — show, get, set, install, uninstall operator-facing settings.

use std::io::Write as _;

use crate::config::{self, Overrides};
use crate::engine;
use crate::error::GolemError;
use crate::schema::{
    ConfigGetData, ConfigInstallData, ConfigSetData, ConfigShowData, ConfigUninstallData, Response,
};

pub enum ConfigAction {
    Show,
    Get { key: String },
    Set { key: String, value: String },
    Install { api_key: Option<String> },
    Uninstall { yes: bool },
}

pub struct ConfigOpts {
    pub action: ConfigAction,
    pub plain: bool,
}

pub fn execute(opts: ConfigOpts) -> Result<(), GolemError> {
    match opts.action {
        ConfigAction::Show => show(opts.plain),
        ConfigAction::Get { key } => get(&key, opts.plain),
        ConfigAction::Set { key, value } => set(&key, &value, opts.plain),
        ConfigAction::Install { api_key } => install(api_key, opts.plain),
        ConfigAction::Uninstall { yes } => uninstall(yes, opts.plain),
    }
}

fn show(plain: bool) -> Result<(), GolemError> {
    let cfg = config::load(&Overrides::default())?;
    let data = ConfigShowData {
        model: cfg.model,
        opus_model: cfg.opus_model,
        sonnet_model: cfg.sonnet_model,
        haiku_model: cfg.haiku_model,
        permission_mode: cfg.permission_mode,
        max_parallel: cfg.max_parallel,
        zai_base_url: cfg.zai_base_url,
        zai_api_timeout_ms: cfg.zai_api_timeout_ms,
        debug: cfg.debug,
        zai_api_key: "***".to_string(),
    };

    if plain {
        println!("model={}", data.model);
        println!("opus_model={}", data.opus_model);
        println!("sonnet_model={}", data.sonnet_model);
        println!("haiku_model={}", data.haiku_model);
        println!("permission_mode={}", data.permission_mode);
        println!("max_parallel={}", data.max_parallel);
        println!("zai_base_url={}", data.zai_base_url);
        println!("zai_api_timeout_ms={}", data.zai_api_timeout_ms);
        println!("debug={}", data.debug);
        println!("zai_api_key={}", data.zai_api_key);
    } else {
        Response::new("config_show", data).print();
    }
    Ok(())
}

fn get(key: &str, plain: bool) -> Result<(), GolemError> {
    let file = config::load_file()?.unwrap_or_default();
    let value = config::get_key(&file, key)?;
    let data = ConfigGetData {
        key: key.to_string(),
        value,
    };
    if plain {
        println!("{}", data.value);
    } else {
        Response::new("config_get", data).print();
    }
    Ok(())
}

fn set(key: &str, value: &str, plain: bool) -> Result<(), GolemError> {
    let path = config::set_key(key, value)?;
    let data = ConfigSetData {
        key: key.to_string(),
        value: value.to_string(),
        path: path.display().to_string(),
    };
    if plain {
        println!("{}={} ({})", data.key, data.value, data.path);
    } else {
        Response::new("config_set", data).print();
    }
    Ok(())
}

fn install(api_key: Option<String>, plain: bool) -> Result<(), GolemError> {
    let api_key = match api_key {
        Some(k) => k,
        None => prompt_for_api_key()?,
    };

    let path = config::legacy_key_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| GolemError::config(format!("{e}")))?;
    }
    let contents = format!("ZAI_API_KEY=\"{api_key}\"\n");
    crate::atomic::write_atomic(&path, contents.as_bytes())
        .map_err(|e| GolemError::config(format!("failed to write {}: {e}", path.display())))?;

    let claude_on_path = engine::check_dependency().is_ok();
    let data = ConfigInstallData {
        path: path.display().to_string(),
        claude_on_path,
    };

    if plain {
        println!("installed {} claude_on_path={}", data.path, data.claude_on_path);
    } else {
        Response::new("config_install", data).print();
    }
    Ok(())
}

fn prompt_for_api_key() -> Result<String, GolemError> {
    print!("Z.ai API key: ");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| GolemError::user(format!("failed to read API key from stdin: {e}")))?;
    let trimmed = line.trim().to_string();
    if trimmed.is_empty() {
        return Err(GolemError::user("no API key provided"));
    }
    Ok(trimmed)
}

fn uninstall(yes: bool, plain: bool) -> Result<(), GolemError> {
    if !yes {
        print!("Remove golem config and legacy key file? [y/N] ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .map_err(|e| GolemError::user(format!("failed to read confirmation: {e}")))?;
        if !line.trim().eq_ignore_ascii_case("y") {
            return Err(GolemError::user("uninstall cancelled"));
        }
    }

    let mut removed = Vec::new();
    for path in [config::config_path(), config::legacy_key_path()] {
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| GolemError::config(format!("{e}")))?;
            removed.push(path.display().to_string());
        }
    }

    let data = ConfigUninstallData { removed };
    if plain {
        for path in &data.removed {
            println!("{path}");
        }
    } else {
        Response::new("config_uninstall", data).print();
    }
    Ok(())
}
