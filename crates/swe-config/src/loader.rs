use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use swe_core::{Result, SweError};

use crate::schema::SweConfig;

/// Loads the swe-workflow configuration once per session.
pub struct ConfigLoader {
    config: SweConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > SWE_CONFIG env > ~/.swe-workflow/swe.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("SWE_CONFIG") {
            return PathBuf::from(p);
        }
        crate::paths::home_base_dir().join("swe.toml")
    }

    /// Load the config from disk (defaults when absent), apply environment
    /// overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = Self::read_file(&config_path)?;
        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());
        Self::finish(config, config_path)
    }

    /// Parse a TOML string without touching the environment.
    pub fn from_toml(raw: &str) -> Result<SweConfig> {
        toml::from_str::<SweConfig>(raw)
            .map_err(|e| SweError::Config(format!("failed to parse config: {e}")))
    }

    fn read_file(config_path: &Path) -> Result<SweConfig> {
        if !config_path.exists() {
            debug!(?config_path, "config file not found, using defaults");
            return Ok(SweConfig::default());
        }
        info!(?config_path, "loading configuration");
        let raw = std::fs::read_to_string(config_path)?;
        toml::from_str::<SweConfig>(&raw).map_err(|e| {
            SweError::Config(format!("failed to parse {}: {}", config_path.display(), e))
        })
    }

    fn finish(config: SweConfig, config_path: PathBuf) -> Result<Self> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => return Err(SweError::Config(e)),
        }
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get(&self) -> &SweConfig {
        &self.config
    }

    pub fn into_config(self) -> SweConfig {
        self.config
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (SWE_AGENT_MODEL, SWE_AUTO_APPROVE, ...).
    /// `lookup` is the environment; tests pass a map instead.
    pub fn apply_env_overrides<F>(mut config: SweConfig, lookup: F) -> SweConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SWE_AGENT_MODEL") {
            config.agent.model = v;
        }
        if let Some(v) = lookup("SWE_AGENT_NAME") {
            config.agent.name = v;
        }
        if let Some(v) = lookup("SWE_AUTO_APPROVE") {
            config.approval.auto_approve = matches!(v.trim(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = lookup("SWE_MAX_CYCLES") {
            match v.parse::<u32>() {
                Ok(n) => config.agent.max_cycles = n,
                Err(_) => warn!(value = %v, "ignoring unparseable SWE_MAX_CYCLES"),
            }
        }
        if let Some(v) = lookup("SWE_LOG_LEVEL") {
            config.logging.level = v;
        }
        // Config file takes priority, env is the fallback.
        if config.services.anthropic_api_key.is_none() {
            config.services.anthropic_api_key = lookup("ANTHROPIC_API_KEY");
        }
        if config.services.openai_api_key.is_none() {
            config.services.openai_api_key = lookup("OPENAI_API_KEY");
        }
        if config.services.openai_base_url.is_none() {
            config.services.openai_base_url = lookup("OPENAI_BASE_URL");
        }
        if config.services.tavily_api_key.is_none() {
            config.services.tavily_api_key = lookup("TAVILY_API_KEY");
        }
        config
    }
}
