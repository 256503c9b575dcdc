//! Run options, plus the optional `.lockstashrc` (JSON) in the working or home directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::lockfile::ResolveOptions;

pub const RC_FILE: &str = ".lockstashrc";
pub const DEFAULT_LOCKFILE: &str = "package-lock.json";
pub const DEFAULT_DOWNLOAD_DIR: &str = "npm-deps";
pub const DEFAULT_CACHE_DIR: &str = "npm-cache";

/// Settings read from an rc file. Every field is optional; CLI flags override these.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RcConfig {
    pub lockfile: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub force_git_deps: Option<bool>,
    pub keep_temp: Option<bool>,
    pub delete_orphans: Option<bool>,
}

/// Everything one run needs. Built from defaults, then the rc file, then CLI flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    pub lockfile: PathBuf,
    pub dir: PathBuf,
    pub cache_dir: PathBuf,
    pub force_git_deps: bool,
    pub force_empty_cache: bool,
    pub delete_orphans: bool,
    pub keep_temp: bool,
    pub assume_yes: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            lockfile: PathBuf::from(DEFAULT_LOCKFILE),
            dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            force_git_deps: false,
            force_empty_cache: false,
            delete_orphans: false,
            keep_temp: false,
            assume_yes: false,
        }
    }
}

impl Options {
    /// Defaults overlaid with whatever the rc file sets.
    pub fn from_rc(rc: &RcConfig) -> Self {
        let d = Self::default();
        Self {
            lockfile: rc.lockfile.clone().unwrap_or(d.lockfile),
            dir: rc.dir.clone().unwrap_or(d.dir),
            cache_dir: rc.cache_dir.clone().unwrap_or(d.cache_dir),
            force_git_deps: rc.force_git_deps.unwrap_or(d.force_git_deps),
            keep_temp: rc.keep_temp.unwrap_or(d.keep_temp),
            delete_orphans: rc.delete_orphans.unwrap_or(d.delete_orphans),
            ..d
        }
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            force_git_deps: self.force_git_deps,
            force_empty_cache: self.force_empty_cache,
            keep_temp: self.keep_temp,
        }
    }
}

/// Load `.lockstashrc` from `dir`, falling back to the home directory.
///
/// The first file found wins. No file at all yields the empty config; a file
/// that exists but does not parse is an error.
pub fn load_config(dir: &Path) -> Result<RcConfig> {
    let mut candidates = vec![dir.join(RC_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(RC_FILE));
    }
    for path in &candidates {
        if path.is_file() {
            return read_rc(path);
        }
    }
    Ok(RcConfig::default())
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let s = std::fs::read_to_string(path).map_err(|e| Error::io("reading", path, e))?;
    let rc = serde_json::from_str(&s).map_err(|e| Error::InvalidConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(path = %path.display(), "loaded rc file");
    Ok(rc)
}
