//! Configuration loading and resolution, narrowed from the teacher's
//! TOML-then-env-then-CLI layering to the handful of settings this service
//! needs: where the state store lives, where to find a callback plugin, and
//! the bind address / deadlines / list defaults for the HTTP surface.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ServerError;

/// Helper macro to apply an optional owned value directly to a target field.
macro_rules! apply_option {
    ($opt:expr => $target:expr) => {
        if let Some(v) = $opt {
            $target = v;
        }
    };
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `REDIS_URL` (or equivalent) — state store connection URL.
    pub redis_url: String,
    /// `SIMPLY_MIGRATE_CALLBACK_FILE` — path to a handler artifact; optional.
    pub callback_file: Option<PathBuf>,
    pub bind_addr: String,
    /// TTL renewed on every job-record write, in seconds (spec default: 7 days).
    pub job_ttl_secs: u64,
    /// Soft per-tenant deadline (spec default: 3600s).
    pub soft_deadline_secs: u64,
    /// Hard per-tenant deadline (spec default: 3900s).
    pub hard_deadline_secs: u64,
    /// Default `limit` for `GET /api/migrations/jobs` when unspecified.
    pub default_list_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            callback_file: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            job_ttl_secs: fleet_migrate_core::store::JOB_TTL_SECS,
            soft_deadline_secs: 3600,
            hard_deadline_secs: 3900,
            default_list_limit: 50,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    server: Option<TomlServer>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlServer {
    redis_url: Option<String>,
    callback_file: Option<String>,
    bind_addr: Option<String>,
    job_ttl_secs: Option<u64>,
    soft_deadline_secs: Option<u64>,
    hard_deadline_secs: Option<u64>,
    default_list_limit: Option<usize>,
}

/// CLI-sourced overrides; `None` fields leave the lower-priority layer in place.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub redis_url: Option<String>,
    pub callback_file: Option<String>,
    pub bind_addr: Option<String>,
}

impl AppConfig {
    /// Load configuration with the following priority (highest wins):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. TOML config file
    /// 4. Built-in defaults
    pub fn load(config_path: Option<&str>, overrides: &CliOverrides) -> Result<Self, ServerError> {
        let mut config = AppConfig::default();

        let toml_path = config_path.unwrap_or("fleet-migrate.toml");
        if let Ok(content) = std::fs::read_to_string(toml_path) {
            let toml_config: TomlConfig = toml::from_str(&content)
                .map_err(|e| ServerError::Config(format!("failed to parse config file '{}': {}", toml_path, e)))?;
            config.apply_toml(toml_config);
        } else if config_path.is_some() {
            return Err(ServerError::Config(format!("config file '{}' not found", toml_path)));
        }

        config.apply_env();
        config.apply_cli(overrides);

        Ok(config)
    }

    fn apply_toml(&mut self, toml: TomlConfig) {
        if let Some(s) = toml.server {
            apply_option!(s.redis_url => self.redis_url);
            if let Some(v) = s.callback_file {
                self.callback_file = Some(PathBuf::from(v));
            }
            apply_option!(s.bind_addr => self.bind_addr);
            apply_option!(s.job_ttl_secs => self.job_ttl_secs);
            apply_option!(s.soft_deadline_secs => self.soft_deadline_secs);
            apply_option!(s.hard_deadline_secs => self.hard_deadline_secs);
            apply_option!(s.default_list_limit => self.default_list_limit);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("REDIS_URL") {
            self.redis_url = v;
        }
        if let Ok(v) = std::env::var("SIMPLY_MIGRATE_CALLBACK_FILE") {
            if !v.is_empty() {
                self.callback_file = Some(PathBuf::from(v));
            }
        }
        if let Ok(v) = std::env::var("FLEET_MIGRATE_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("FLEET_MIGRATE_JOB_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.job_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("FLEET_MIGRATE_SOFT_DEADLINE_SECS") {
            if let Ok(n) = v.parse() {
                self.soft_deadline_secs = n;
            }
        }
        if let Ok(v) = std::env::var("FLEET_MIGRATE_HARD_DEADLINE_SECS") {
            if let Ok(n) = v.parse() {
                self.hard_deadline_secs = n;
            }
        }
    }

    fn apply_cli(&mut self, overrides: &CliOverrides) {
        if let Some(v) = &overrides.redis_url {
            self.redis_url = v.clone();
        }
        if let Some(v) = &overrides.callback_file {
            self.callback_file = Some(PathBuf::from(v));
        }
        if let Some(v) = &overrides.bind_addr {
            self.bind_addr = v.clone();
        }
    }
}
