//! `jobdir.toml` の読み込み
//!
//! ```toml
//! root = "/srv/jobdir"
//!
//! [dispatcher]
//! pool_size = 4
//! poll_interval_ms = 500
//! recover_interrupted = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use jobdir_core::DispatcherConfig;
use serde::Deserialize;

/// Store root used when neither `--root` nor the config file names one.
pub const DEFAULT_ROOT: &str = "jobdir";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub root: Option<PathBuf>,
    pub dispatcher: DispatcherConfig,
}

impl CliConfig {
    /// Read `path`, or return defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// `--root` wins over the file, the file wins over the default.
    pub fn resolve_root(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.root.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_root_and_dispatcher_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobdir.toml");
        std::fs::write(
            &path,
            "root = \"/srv/queue\"\n\n[dispatcher]\npool_size = 3\npoll_interval_ms = 250\n",
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.root, Some(PathBuf::from("/srv/queue")));
        assert_eq!(config.dispatcher.pool_size, 3);
        assert_eq!(config.dispatcher.poll_interval_ms, 250);
        assert!(config.dispatcher.recover_interrupted);
    }

    #[test]
    fn root_flag_overrides_file() {
        let config = CliConfig {
            root: Some(PathBuf::from("/from/file")),
            ..CliConfig::default()
        };
        assert_eq!(
            config.resolve_root(Some(PathBuf::from("/from/flag"))),
            PathBuf::from("/from/flag")
        );
        assert_eq!(config.resolve_root(None), PathBuf::from("/from/file"));
        assert_eq!(
            CliConfig::default().resolve_root(None),
            PathBuf::from(DEFAULT_ROOT)
        );
    }

    #[test]
    fn unknown_keys_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobdir.toml");
        std::fs::write(&path, "rooot = \"/typo\"\n").unwrap();
        assert!(CliConfig::load(Some(&path)).is_err());
    }
}
