use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Name of the per-project state directory.
pub const LANES_DIR: &str = ".lanes";
/// Config file inside [`LANES_DIR`].
pub const CONFIG_FILE: &str = "config.toml";
/// Database file inside [`LANES_DIR`].
pub const DB_FILE: &str = "lanes.db";

const DEFAULT_PROJECT_ID: &str = "PRJ";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub cascade: CascadeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default = "default_project_id")]
    pub id: String,
    /// Prefix for auto-numbered keys; falls back to `id` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            id: default_project_id(),
            key_prefix: None,
        }
    }
}

impl ProjectSection {
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        self.key_prefix.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default = "default_true")]
    pub auto_complete: bool,
    #[serde(default = "default_true")]
    pub pull_forward: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            auto_complete: default_true(),
            pull_forward: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

#[must_use]
pub fn lanes_dir(project_root: &Path) -> PathBuf {
    project_root.join(LANES_DIR)
}

#[must_use]
pub fn config_path(project_root: &Path) -> PathBuf {
    lanes_dir(project_root).join(CONFIG_FILE)
}

#[must_use]
pub fn db_path(project_root: &Path) -> PathBuf {
    lanes_dir(project_root).join(DB_FILE)
}

/// Walk up from `start` to the nearest directory containing `.lanes/`.
#[must_use]
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(LANES_DIR).is_dir())
        .map(Path::to_path_buf)
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write `config` to `.lanes/config.toml`, creating the directory if needed.
pub fn save_project_config(project_root: &Path, config: &ProjectConfig) -> Result<PathBuf> {
    let dir = lanes_dir(project_root);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = config_path(project_root);
    let content = toml::to_string_pretty(config).context("Failed to serialize project config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("lanes/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("LANES_FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_true() -> bool {
    true
}

fn default_project_id() -> String {
    DEFAULT_PROJECT_ID.to_string()
}
