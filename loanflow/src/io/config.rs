//! Loanflow configuration stored in `loanflow.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, resolved relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "loanflow.toml";

/// Loanflow configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values the hosted record store uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LoanflowConfig {
    pub store: StoreConfig,
    pub tables: TableNames,
    pub forms: FormsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the record store API (table endpoints live under `/tables`).
    pub base_url: String,

    /// Environment variable holding the store's bearer token.
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key_env: "LOANFLOW_STORE_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Store table names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TableNames {
    pub applications: String,
    pub audit_log: String,
    pub form_fields: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            applications: "Loan Applications".to_string(),
            audit_log: "File Auditing Log".to_string(),
            form_fields: "Form Fields".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct FormsConfig {
    /// JSON form configuration file. When unset, fields are read from the
    /// `form_fields` table.
    pub path: Option<PathBuf>,
}

impl LoanflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.store.base_url.trim().is_empty() {
            return Err(anyhow!("store.base_url must be set"));
        }
        if self.store.timeout_secs == 0 {
            return Err(anyhow!("store.timeout_secs must be > 0"));
        }
        for (name, value) in [
            ("tables.applications", &self.tables.applications),
            ("tables.audit_log", &self.tables.audit_log),
            ("tables.form_fields", &self.tables.form_fields),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must be a non-empty table name"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoanflowConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoanflowConfig> {
    if !path.exists() {
        let cfg = LoanflowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoanflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoanflowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
