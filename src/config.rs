//! Minimal runtime configuration helpers.
//! Defaults align with docker-compose (localhost TimescaleDB) and the
//! 5-minute sampling cadence of the fleet.

use crate::analytics::ComparisonWindow;
use crate::models::MachineSpec;
use std::path::{Path, PathBuf};
use std::{fs, num::NonZeroUsize};

pub const DEFAULT_SAMPLE_INTERVAL_MINUTES: f64 = 5.0;
pub const DEFAULT_RECENT_LIMIT: usize = 100;
pub const DEFAULT_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_SPLIT_DAYS: i64 = 3;
pub const DEFAULT_SEED_RNG: u64 = 0x0048_5641_C0DE_2024;
pub const DEFAULT_SEED_DAYS: i64 = 7;

/// Knobs used by [`crate::store::TelemetryDb`] when answering analytics queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticsConfig {
    pub comparison: ComparisonWindow,
    /// Default `n` for the recent readings/decisions views.
    pub recent_limit: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            comparison: ComparisonWindow {
                window_days: DEFAULT_WINDOW_DAYS,
                split_days: DEFAULT_SPLIT_DAYS,
                sample_interval_minutes: DEFAULT_SAMPLE_INTERVAL_MINUTES,
            },
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Optional PostgreSQL/TimescaleDB URL; persistence is skipped when unset.
    pub database_url: Option<String>,
    pub analytics: AnalyticsConfig,
    /// Generate synthetic history when the store starts out empty.
    pub seed_enabled: bool,
    pub seed_rng: u64,
    pub seed_days: i64,
    /// JSON array of machine specs; the built-in fleet is used when unset.
    pub roster_file: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String> {
    match std::env::var(name) {
        Ok(s) if !s.trim().is_empty() => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("{} has an invalid value: {}", name, s.trim())),
        _ => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());

        let sample_interval_minutes =
            env_parse::<f64>("SAMPLE_INTERVAL_MINUTES")?.unwrap_or(DEFAULT_SAMPLE_INTERVAL_MINUTES);
        if !sample_interval_minutes.is_finite() || sample_interval_minutes <= 0.0 {
            return Err("SAMPLE_INTERVAL_MINUTES must be a positive number".to_string());
        }

        let recent_limit = env_parse::<NonZeroUsize>("RECENT_LIMIT")?
            .map(NonZeroUsize::get)
            .unwrap_or(DEFAULT_RECENT_LIMIT);

        let window_days = env_parse::<i64>("COMPARISON_WINDOW_DAYS")?.unwrap_or(DEFAULT_WINDOW_DAYS);
        let split_days = env_parse::<i64>("COMPARISON_SPLIT_DAYS")?.unwrap_or(DEFAULT_SPLIT_DAYS);
        if window_days <= 0 || split_days < 0 || split_days > window_days {
            return Err(format!(
                "COMPARISON_SPLIT_DAYS ({}) must lie within COMPARISON_WINDOW_DAYS ({})",
                split_days, window_days
            ));
        }

        let seed_enabled = std::env::var("SEED_ENABLED")
            .ok()
            .map(|s| matches!(s.as_str(), "1" | "true" | "TRUE"))
            .unwrap_or(true);
        let seed_rng = env_parse::<u64>("SEED_RNG")?.unwrap_or(DEFAULT_SEED_RNG);
        let seed_days = env_parse::<i64>("SEED_DAYS")?.unwrap_or(DEFAULT_SEED_DAYS);
        if seed_days <= 0 {
            return Err("SEED_DAYS must be at least 1".to_string());
        }

        let roster_file = std::env::var("ROSTER_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Config {
            database_url,
            analytics: AnalyticsConfig {
                comparison: ComparisonWindow {
                    window_days,
                    split_days,
                    sample_interval_minutes,
                },
                recent_limit,
            },
            seed_enabled,
            seed_rng,
            seed_days,
            roster_file,
        })
    }
}

/// Load a machine roster from a JSON file, reporting the exact path of any
/// malformed field (e.g. `[2].rated_power_kw`).
pub fn load_roster(path: &Path) -> Result<Vec<MachineSpec>, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_roster(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

pub fn parse_roster(text: &str) -> Result<Vec<MachineSpec>, String> {
    let de = &mut serde_json::Deserializer::from_str(text);
    let roster: Vec<MachineSpec> =
        serde_path_to_error::deserialize(de).map_err(|e| format!("invalid roster at {}: {}", e.path(), e.inner()))?;
    if roster.is_empty() {
        return Err("roster must list at least one machine".to_string());
    }
    Ok(roster)
}
