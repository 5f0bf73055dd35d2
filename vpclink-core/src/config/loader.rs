//! Configuration file loading and merging

use super::schema::Config;
use crate::error::{Result, TopologyError};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

pub const CONFIG_ENV: &str = "VPCLINK_CONFIG";
const CONFIG_RELATIVE: &str = "vpclink/topology.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Find user config by checking environment and standard locations
    pub fn find_user_config() -> Option<PathBuf> {
        // 1. $VPCLINK_CONFIG
        if let Ok(path) = env::var(CONFIG_ENV) {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }

        // 2. $XDG_CONFIG_HOME/vpclink/topology.toml
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            let p = PathBuf::from(xdg).join(CONFIG_RELATIVE);
            if p.exists() {
                return Some(p);
            }
        }

        // 3. ~/.config/vpclink/topology.toml
        if let Ok(home) = env::var("HOME") {
            let p = PathBuf::from(home).join(".config").join(CONFIG_RELATIVE);
            if p.exists() {
                return Some(p);
            }
        }

        None
    }

    /// Load config from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let table = Self::read_table(path.as_ref())?;
        Ok(Value::Table(table).try_into()?)
    }

    pub fn load_from_str(contents: &str) -> Result<Config> {
        Ok(toml::from_str(contents)?)
    }

    /// Load with full config priority order
    /// Priority: defaults < user < explicit
    ///
    /// Files are merged table by table; a key set in a later file replaces
    /// the same key from an earlier one, arrays included.
    pub fn load_with_priority(explicit_config: Option<PathBuf>) -> Result<Config> {
        let mut merged = Table::new();

        if let Some(user_path) = Self::find_user_config() {
            tracing::debug!("Loading user config from {:?}", user_path);
            merge_tables(&mut merged, Self::read_table(&user_path)?);
        }

        if let Some(path) = explicit_config {
            tracing::debug!("Loading explicit config from {:?}", path);
            merge_tables(&mut merged, Self::read_table(&path)?);
        }

        if merged.is_empty() {
            tracing::debug!("No config file found, using built-in topology");
        }

        Ok(Value::Table(merged).try_into()?)
    }

    fn read_table(path: &Path) -> Result<Table> {
        let contents = fs::read_to_string(path).map_err(|source| TopologyError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }
}

fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match value {
            Value::Table(incoming) => {
                if let Some(Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, incoming);
                    continue;
                }
                base.insert(key, Value::Table(incoming));
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}
