use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Worker config ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the store snapshot.
    pub data_dir: PathBuf,
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// 6-field cron expression for the recertification sweep.
    pub schedule: String,
    /// Candidates whose `valid_until` is older than this are never resurrected.
    pub lookback_days: i64,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(env_or("RECERT_DATA_DIR", "data")),
            sweep: SweepConfig {
                schedule: env_or("RECERT_SWEEP_SCHEDULE", "0 0 * * * *"),
                lookback_days: env_i64("RECERT_SWEEP_LOOKBACK_DAYS", 90),
            },
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  data_dir: {}", self.data_dir.display());
        tracing::info!(
            "  sweep:    schedule={}, lookback_days={}",
            self.sweep.schedule,
            self.sweep.lookback_days
        );
    }
}
