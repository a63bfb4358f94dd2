//! Configuration file support (`.ppa-copy.toml`).
//!
//! Everything the CLI accepts as a flag can also live in a small TOML file,
//! so recurring invocations reduce to `ppa-copy -w`. Flags always win over
//! file values; the merge happens in the CLI.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".ppa-copy.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub ppa: PpaSection,
    #[serde(default)]
    pub copy: CopySection,
    #[serde(default)]
    pub wait: WaitSection,
}

/// Which archive to talk to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PpaSection {
    pub owner: Option<String>,
    pub name: Option<String>,
    pub instance: Option<String>,
}

/// What to copy where.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CopySection {
    pub packages: Option<Vec<String>>,
    pub source_series: Option<String>,
    pub target_series: Option<Vec<String>>,
    pub architectures: Option<Vec<String>>,
    pub pocket: Option<String>,
}

/// Polling behavior.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitSection {
    /// Sleep between reconciliation passes, e.g. "60s" or "2m".
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
}

impl ConfigFile {
    /// Parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Load an explicitly named file (must exist), or [`CONFIG_FILE`] from
    /// the working directory if present, or defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(CONFIG_FILE);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
