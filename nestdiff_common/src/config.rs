use crate::{AppConfig, NestDiffError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "nestdiff.toml";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    pub portable: bool,
}

pub fn load_config(prefer_portable: bool) -> Result<LoadedConfig, NestDiffError> {
    let (path, portable) = resolve_config_path(prefer_portable)?;
    load_config_from(path, portable)
}

/// Load a config file from an explicit location; a missing file yields defaults
pub fn load_config_from(path: PathBuf, portable: bool) -> Result<LoadedConfig, NestDiffError> {
    let mut config = if path.exists() {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data).map_err(|e| NestDiffError::Config(format!("{}: {}", path.display(), e)))?
    } else {
        AppConfig::default()
    };
    config.portable_mode = portable;

    Ok(LoadedConfig {
        config,
        path,
        portable,
    })
}

/// Staging root used when neither the config nor the CLI names one
pub fn default_work_dir(portable: bool, config_path: &Path) -> Result<PathBuf, NestDiffError> {
    if portable {
        let base = config_path
            .parent()
            .map(|path| path.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        return Ok(base.join("nestdiff_work"));
    }

    let dirs = ProjectDirs::from("", "", "nestdiff")
        .ok_or_else(|| NestDiffError::Config("Unable to determine cache directory".to_string()))?;
    Ok(dirs.cache_dir().join("workdir"))
}

fn resolve_config_path(prefer_portable: bool) -> Result<(PathBuf, bool), NestDiffError> {
    if let Some(portable_path) = portable_config_path() {
        if prefer_portable || portable_path.exists() {
            return Ok((portable_path, true));
        }
    }

    let dirs = ProjectDirs::from("", "", "nestdiff")
        .ok_or_else(|| NestDiffError::Config("Unable to determine config directory".to_string()))?;
    Ok((dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

fn portable_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
}
