use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the `chamberd` host process, read from `CHAMBERD_*`
/// environment variables. Unset or unparseable values fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub ledger_file: String,
    pub metrics_port: Option<u16>,
    /// Appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            ledger_file: "ledger.wal".into(),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, or a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            data_dir: lookup("CHAMBERD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            ledger_file: lookup("CHAMBERD_LEDGER_FILE")
                .filter(|f| !f.is_empty())
                .unwrap_or(defaults.ledger_file),
            metrics_port: lookup("CHAMBERD_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            compact_threshold: parsed("CHAMBERD_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parsed("CHAMBERD_COMPACT_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }
}
