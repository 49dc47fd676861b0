//! Where stratus keeps its files
//!
//! Both directories resolve the same way: an explicit `STRATUS_*_DIR`
//! override wins, then the matching XDG base directory, then a location under
//! the home directory. The state directory holds the default `state.db`.

use anyhow::{Context, Result};
use std::path::PathBuf;

const CONFIG_DIR_VAR: &str = "STRATUS_CONFIG_DIR";
const STATE_DIR_VAR: &str = "STRATUS_STATE_DIR";
const APP_DIR: &str = "stratus";
const STATE_FILE_NAME: &str = "state.db";

/// Directory holding `config.toml`
pub fn config_dir() -> Result<PathBuf> {
    resolve_dir(CONFIG_DIR_VAR, "XDG_CONFIG_HOME", &[".config"])
}

/// Directory holding the default state database
pub fn state_dir() -> Result<PathBuf> {
    resolve_dir(STATE_DIR_VAR, "XDG_STATE_HOME", &[".local", "state"])
}

pub fn default_state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join(STATE_FILE_NAME))
}

/// Expand `~` and `$VARS` in a user-supplied path; unknown variables stay as written
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

fn resolve_dir(override_var: &str, xdg_var: &str, under_home: &[&str]) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(override_var) {
        let path = expand(&dir);
        log::debug!("{override_var} set, using {}", path.display());
        return Ok(path);
    }
    if let Ok(base) = std::env::var(xdg_var) {
        return Ok(PathBuf::from(base).join(APP_DIR));
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = under_home
        .iter()
        .fold(home, |path, part| path.join(part))
        .join(APP_DIR);
    log::debug!("No {override_var} or {xdg_var}, using {}", path.display());
    Ok(path)
}
