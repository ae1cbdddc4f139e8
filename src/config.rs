use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::agent::AgentPoolConfig;
use crate::{clog_debug, Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent pool settings for task execution.
    #[serde(default)]
    pub pool: AgentPoolConfig,
    /// Override for the headless agent binary name.
    pub command: Option<String>,
    /// Override for the default refinement iteration budget.
    pub max_iterations: Option<usize>,
    /// Override for the task storage directory.
    pub tasks_dir: Option<String>,
}

impl Config {
    pub fn crucible_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".crucible"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::crucible_dir()?.join("crucible.toml"))
    }

    pub fn tasks_dir(&self) -> Result<PathBuf> {
        match &self.tasks_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::crucible_dir()?.join("tasks")),
        }
    }

    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::crucible_dir()?.join("logs"))
    }

    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or("claude")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        clog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        clog_debug!(
            "Config loaded: command={:?}, max_iterations={:?}, agent_kinds={}",
            config.command,
            config.max_iterations,
            config.pool.agent_kinds.len()
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let crucible_dir = Self::crucible_dir()?;
        clog_debug!("Config::save crucible_dir={}", crucible_dir.display());
        if !crucible_dir.exists() {
            fs::create_dir_all(&crucible_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        clog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let crucible_dir = Self::crucible_dir()?;
        let tasks_dir = self.tasks_dir()?;
        let logs_dir = Self::logs_dir()?;
        clog_debug!(
            "Config::ensure_dirs crucible={} tasks={} logs={}",
            crucible_dir.display(),
            tasks_dir.display(),
            logs_dir.display()
        );
        for dir in [&crucible_dir, &tasks_dir, &logs_dir] {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
