use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use hvac_telemetry::config::{self, Config};
use hvac_telemetry::services::{ingest, simulation};
use hvac_telemetry::TelemetryDb;
use log::{error, info};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (persistence={}, sample_interval={}min, window={}d, split={}d, recent_limit={}, seed_enabled={}, seed_days={}, roster={})",
        cfg.database_url.is_some(),
        cfg.analytics.comparison.sample_interval_minutes,
        cfg.analytics.comparison.window_days,
        cfg.analytics.comparison.split_days,
        cfg.analytics.recent_limit,
        cfg.seed_enabled,
        cfg.seed_days,
        cfg.roster_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    let db = TelemetryDb::new(cfg.analytics);

    // 2) Connect DB, migrate and restore the last snapshot
    let mut conn = match cfg.database_url.as_deref() {
        Some(url) => {
            let mut conn = PgConnection::establish(url).map_err(|e| format!("DB connection failed: {}", e))?;
            info!("Connected to database");
            apply_database_migrations(&mut conn)?;
            ingest::load_snapshot(&mut conn, &db)?;
            Some(conn)
        }
        None => {
            info!("DATABASE_URL not set; running without persistence");
            None
        }
    };

    // 3) Seed synthetic history into an empty store
    if db.list_machines().is_empty() && cfg.seed_enabled {
        let roster = match cfg.roster_file.as_deref() {
            Some(path) => config::load_roster(path)?,
            None => simulation::default_fleet(),
        };
        let interval_secs = (cfg.analytics.comparison.sample_interval_minutes * 60.0).round() as i64;
        let interval = Duration::try_seconds(interval_secs)
            .ok_or_else(|| format!("sample interval of {}s is out of range", interval_secs))?;
        let plan = simulation::SimulationPlan::ending_at(
            Utc::now(),
            cfg.seed_days,
            cfg.analytics.comparison.split_days,
            interval,
            cfg.seed_rng,
        )?;
        simulation::seed(&db, &roster, &plan)?;
        if let Some(conn) = conn.as_mut() {
            ingest::save_snapshot(conn, &db)?;
        }
    } else if db.list_machines().is_empty() {
        info!("Store is empty and seeding is disabled via SEED_ENABLED={}", cfg.seed_enabled);
    }

    // 4) Report
    let as_of = Utc::now();
    let comparison = match db.energy_comparison(as_of) {
        Ok(c) => Some(c),
        Err(e) => {
            error!("energy comparison unavailable: {}", e);
            None
        }
    };
    let report = json!({
        "as_of": as_of,
        "summary": db.building_summary(as_of),
        "energy_comparison": comparison,
        "machines": db.machine_overview(),
        "recent_decisions": db.recent_decision_log(),
    });
    let text = serde_json::to_string_pretty(&report).map_err(|e| format!("report serialization failed: {}", e))?;
    println!("{}", text);

    Ok(())
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            Some(s) if s.starts_with("--env-file=") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path_str = &s["--env-file=".len()..];
                if path_str.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                env_file = Some(PathBuf::from(path_str));
            }
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    if let Some(path) = env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(&path)?;
        Ok(Some(LoadedEnvFile { path, explicit: true }))
    } else {
        let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
        let default_path = cwd.join(".env");
        if default_path.is_file() {
            load_env_file(&default_path)?;
            Ok(Some(LoadedEnvFile {
                path: default_path,
                explicit: false,
            }))
        } else {
            Ok(None)
        }
    }
}

fn load_env_file(path: &Path) -> Result<(), String> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read {} at line {}: {}", path.display(), index + 1, e))?;
        match parse_env_assignment(&line) {
            Ok(Some((key, value))) => {
                // Preserve any value that was already supplied via the process environment.
                if std::env::var_os(&key).is_none() {
                    // Updating process-level environment variables is unsafe on some targets.
                    unsafe {
                        std::env::set_var(key, value);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                return Err(format!("{}:{}: {}", path.display(), index + 1, e));
            }
        }
    }

    Ok(())
}

fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let without_export = trimmed
        .strip_prefix("export ")
        .map(|s| s.trim_start())
        .unwrap_or(trimmed);

    let mut parts = without_export.splitn(2, '=');
    let key = parts
        .next()
        .map(str::trim)
        .ok_or_else(|| "missing environment variable name".to_string())?;
    let value_part = parts.next().ok_or_else(|| "missing '=' in assignment".to_string())?;

    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(|c| c.is_whitespace()) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    let value = parse_env_value(value_part)?;
    Ok(Some((key.to_string(), value)))
}

fn parse_env_value(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    if let Some(rest) = trimmed.strip_prefix('"') {
        parse_double_quoted(rest)
    } else if let Some(rest) = trimmed.strip_prefix('\'') {
        parse_single_quoted(rest)
    } else {
        let value = trimmed.splitn(2, '#').next().unwrap_or_default().trim_end();
        Ok(value.to_string())
    }
}

fn parse_double_quoted(input: &str) -> Result<String, String> {
    let mut result = String::new();
    let mut chars = input.chars();
    let mut escape = false;

    while let Some(ch) = chars.next() {
        if escape {
            let value = match ch {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                '\\' => '\\',
                '"' => '"',
                other => other,
            };
            result.push(value);
            escape = false;
            continue;
        }

        match ch {
            '\\' => escape = true,
            '"' => {
                let remainder = chars.as_str().trim();
                if remainder.is_empty() || remainder.starts_with('#') {
                    return Ok(result);
                } else {
                    return Err("unexpected characters after closing double quote".to_string());
                }
            }
            other => result.push(other),
        }
    }

    if escape {
        Err("unterminated escape sequence in double-quoted value".to_string())
    } else {
        Err("unterminated double-quoted value".to_string())
    }
}

fn parse_single_quoted(input: &str) -> Result<String, String> {
    let mut result = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if ch == '\'' {
            let remainder = chars.as_str().trim();
            if remainder.is_empty() || remainder.starts_with('#') {
                return Ok(result);
            } else {
                return Err("unexpected characters after closing single quote".to_string());
            }
        } else {
            result.push(ch);
        }
    }

    Err("unterminated single-quoted value".to_string())
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "hvac-telemetry {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(line: &str) -> Option<(String, String)> {
        parse_env_assignment(line).unwrap()
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        assert_eq!(parsed(""), None);
        assert_eq!(parsed("   "), None);
        assert_eq!(parsed("# DATABASE_URL=postgres://localhost"), None);
    }

    #[test]
    fn parses_plain_and_exported_values() {
        assert_eq!(parsed("SEED_DAYS=7"), Some(("SEED_DAYS".into(), "7".into())));
        assert_eq!(
            parsed("export RECENT_LIMIT = 50 # per view"),
            Some(("RECENT_LIMIT".into(), "50".into()))
        );
        assert_eq!(parsed("ROSTER_FILE="), Some(("ROSTER_FILE".into(), String::new())));
    }

    #[test]
    fn handles_quoting() {
        assert_eq!(
            parsed(r#"RUST_LOG="hvac_telemetry=debug\tinfo" # verbose"#),
            Some(("RUST_LOG".into(), "hvac_telemetry=debug\tinfo".into()))
        );
        assert_eq!(
            parsed("ROSTER_FILE='fleet #2.json'"),
            Some(("ROSTER_FILE".into(), "fleet #2.json".into()))
        );
    }

    #[test]
    fn rejects_malformed_assignments() {
        assert!(parse_env_assignment("SEED_ENABLED").is_err());
        assert!(parse_env_assignment("=true").is_err());
        assert!(parse_env_assignment("SEED RNG=1").is_err());
        assert!(parse_env_assignment(r#"DATABASE_URL="postgres://db"#).is_err());
        assert!(parse_env_assignment("DATABASE_URL='postgres://db' trailing").is_err());
    }
}
