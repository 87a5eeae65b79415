// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

const APP_DIR_NAME: &str = "jobwizard";
const CONFIG_FILE_NAME: &str = "wizard.toml";
const CONFIG_ENV_VAR: &str = "JOBWIZARD_CONFIG_PATH";
const DATABASE_FILE_NAME: &str = "jobwizard.sqlite";
const CATALOG_FILE_NAME: &str = "catalog.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    database_path: Option<String>,
    catalog_path: Option<String>,
    verbose: Option<bool>,
}

#[derive(Debug)]
pub struct Config {
    pub database_path: PathBuf,
    pub catalog_path: PathBuf,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub database_path: ConfigValue<PathBuf>,
    pub catalog_path: ConfigValue<PathBuf>,
    pub verbose: ConfigValue<bool>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub verbose: Option<bool>,
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path.as_deref().is_some_and(Path::exists);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };
    let base_dir = config_path.as_deref().and_then(Path::parent);

    let database_path = resolve_path_setting(
        overrides.database_path,
        file_config.database_path.as_deref(),
        base_dir,
        || {
            default_data_file(DATABASE_FILE_NAME).with_context(|| {
                "failed to resolve default database path; specify --database-path or set database_path in the config file"
            })
        },
    )?;
    let catalog_path = resolve_path_setting(
        overrides.catalog_path,
        file_config.catalog_path.as_deref(),
        base_dir,
        || {
            default_config_file(CATALOG_FILE_NAME).with_context(|| {
                "failed to resolve default catalog path; specify --catalog-path or set catalog_path in the config file"
            })
        },
    )?;

    let verbose = match overrides.verbose {
        Some(verbose) => ConfigValue {
            value: verbose,
            source: ConfigSource::Override,
        },
        None => match file_config.verbose {
            Some(verbose) => ConfigValue {
                value: verbose,
                source: ConfigSource::ConfigFile,
            },
            None => ConfigValue {
                value: false,
                source: ConfigSource::Default,
            },
        },
    };

    let config = Config {
        database_path: database_path.value.clone(),
        catalog_path: catalog_path.value.clone(),
        verbose: verbose.value,
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        database_path,
        catalog_path,
        verbose,
    };

    Ok(LoadResult { config, report })
}

/// Flag, then config file (relative to its directory), then default.
fn resolve_path_setting(
    flag: Option<PathBuf>,
    from_file: Option<&str>,
    base_dir: Option<&Path>,
    default: impl FnOnce() -> Result<PathBuf>,
) -> Result<ConfigValue<PathBuf>> {
    Ok(match (flag, from_file) {
        (Some(path), _) => ConfigValue {
            value: expand_path(path),
            source: ConfigSource::Override,
        },
        (None, Some(raw)) => ConfigValue {
            value: resolve_path(raw, base_dir),
            source: ConfigSource::ConfigFile,
        },
        (None, None) => ConfigValue {
            value: default()?,
            source: ConfigSource::Default,
        },
    })
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    default_config_file(CONFIG_FILE_NAME)
}

fn default_config_file(name: &str) -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(name))
}

fn default_data_file(name: &str) -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME).join(name))
}
