use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths;

/// Name of the config file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Optional user defaults, read from `config.toml`
///
/// ```toml
/// state_file = "~/infra/state.db"
/// deployment = "production"
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StratusConfig {
    /// State database; `~` and `$VARS` are expanded
    #[serde(default)]
    pub state_file: Option<String>,

    /// Deployment UUID or name used when `-d` is not given
    #[serde(default)]
    pub deployment: Option<String>,
}

impl StratusConfig {
    /// Load the config from the config directory; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    /// State file to operate on
    ///
    /// Priority: `--state` / `STRATUS_STATE`, then `state_file`, then the
    /// default file in the state directory.
    pub fn state_file(&self, cli: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = cli {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = &self.state_file {
            return Ok(paths::expand(path));
        }
        paths::default_state_file()
    }

    /// Deployment to operate on
    ///
    /// Priority: `-d` / `STRATUS_DEPLOYMENT`, then `deployment`.
    pub fn deployment<'a>(&'a self, cli: Option<&'a str>) -> Result<&'a str> {
        match cli.or(self.deployment.as_deref()) {
            Some(deployment) => Ok(deployment),
            None => bail!(
                "No deployment selected. Pass -d <uuid|name>, set STRATUS_DEPLOYMENT \
                 or add `deployment` to {CONFIG_FILE_NAME}"
            ),
        }
    }
}
