//! Plugin search path configuration

use std::env;
use std::path::{Path, PathBuf};

use log::debug;

use crate::constants::{self, paths};

/// Where the plugin manager looks for plugin modules and description files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub root: PathBuf,
    pub core_path: PathBuf,
    pub builtin_path: PathBuf,
    /// Description files of the core types
    pub metadata_path: PathBuf,
    pub external_paths: Vec<PathBuf>,
}

impl PluginConfig {
    /// Standard layout below `root`, with no external paths
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            core_path: root.join(paths::CORE_DIR),
            builtin_path: root.join(paths::BUILTIN_DIR),
            metadata_path: root.join(paths::METADATA_DIR),
            external_paths: Vec::new(),
            root,
        }
    }

    /// Layout from the environment: root from `SCENEGRAPH_ROOT` (or the
    /// platform data directory) and external paths from
    /// `SCENEGRAPH_EXTERNAL_PLUGINS`
    pub fn from_env() -> Self {
        let root = env::var_os(constants::ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_root);
        let mut config = Self::with_root(root);
        if let Ok(value) = env::var(constants::EXTERNAL_PLUGINS_ENV) {
            config.external_paths = Self::parse_external_paths(&value);
        }
        debug!("plugin config: {:?}", config);
        config
    }

    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join(paths::APP_DIR))
            .unwrap_or_else(|| PathBuf::from(".").join(paths::APP_DIR))
    }

    /// Splits a colon separated path list, dropping empty items
    pub fn parse_external_paths(value: &str) -> Vec<PathBuf> {
        value
            .split(':')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    pub fn with_external_path(mut self, path: impl AsRef<Path>) -> Self {
        self.external_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// All scan paths: core, built-in, then external in order
    pub fn plugin_paths(&self) -> Vec<&Path> {
        let mut result = vec![self.core_path.as_path(), self.builtin_path.as_path()];
        result.extend(self.external_paths.iter().map(PathBuf::as_path));
        result
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_below_root() {
        let config = PluginConfig::with_root("/opt/sg").with_external_path("/studio/plugins");
        assert_eq!(config.core_path, PathBuf::from("/opt/sg/core"));
        assert_eq!(config.metadata_path, PathBuf::from("/opt/sg/metadata"));
        assert_eq!(
            config.plugin_paths(),
            vec![
                Path::new("/opt/sg/core"),
                Path::new("/opt/sg/plugins"),
                Path::new("/studio/plugins")
            ]
        );
    }

    #[test]
    fn test_parse_external_paths() {
        assert_eq!(
            PluginConfig::parse_external_paths("/a:/b::/c "),
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
        assert!(PluginConfig::parse_external_paths("").is_empty());
    }
}
