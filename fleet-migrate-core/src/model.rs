//! Core data model: scripts, tenants, jobs, and their serialized shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Migration,
    Rollback,
    Seed,
}

/// One parsed `.sql` file: a version, a description, a kind, and its content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub filename: String,
    pub version: String,
    pub description: String,
    pub kind: ScriptKind,
    pub content: String,
}

impl Script {
    /// Description is the filename tail with `_` replaced by space.
    pub fn description_from_tail(tail: &str) -> String {
        tail.replace('_', " ")
    }
}

/// Ordered, conflict-free collection of scripts for one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptSet {
    scripts: Vec<Script>,
}

impl ScriptSet {
    /// Builds a set from already-parsed scripts, sorting lexicographically by
    /// filename and rejecting duplicate `(kind, version)` pairs.
    pub fn build(mut scripts: Vec<Script>) -> Result<Self> {
        scripts.sort_by(|a, b| a.filename.cmp(&b.filename));
        let mut seen: BTreeMap<(ScriptKind, String), String> = BTreeMap::new();
        for s in &scripts {
            let key = (s.kind, s.version.clone());
            if let Some(existing) = seen.get(&key) {
                return Err(OrchestratorError::validation(format!(
                    "duplicate {:?} version {}: '{}' conflicts with '{}'",
                    s.kind, s.version, s.filename, existing
                )));
            }
            seen.insert(key, s.filename.clone());
        }
        Ok(ScriptSet { scripts })
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.scripts.iter().map(|s| s.filename.clone()).collect()
    }

    pub fn as_slice(&self) -> &[Script] {
        &self.scripts
    }
}

/// One tenant's connection parameters. Either `connection_string` is set, or
/// the `(user, password, database_name, host)` tuple is sufficient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSpec {
    pub tenant_id: String,
    pub tenant_name: Option<String>,
    pub user: String,
    pub password: String,
    pub database_name: String,
    pub host: Option<String>,
    pub connection_string: Option<String>,
}

impl TenantSpec {
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.is_empty() {
            return Err(OrchestratorError::validation("tenant_id must not be empty"));
        }
        let has_connection_string = self
            .connection_string
            .as_ref()
            .is_some_and(|s| !s.is_empty());
        let has_parts = !self.user.is_empty()
            && !self.database_name.is_empty()
            && self.host.as_ref().is_some_and(|h| !h.is_empty());
        if !has_connection_string && !has_parts {
            return Err(OrchestratorError::validation(format!(
                "tenant '{}' needs either connection_string or user/password/database_name/host",
                self.tenant_id
            )));
        }
        Ok(())
    }

    /// Resolves an effective connection string, preferring an explicit one.
    pub fn connection_string(&self) -> String {
        if let Some(cs) = &self.connection_string {
            if !cs.is_empty() {
                return cs.clone();
            }
        }
        format!(
            "postgresql://{}:{}@{}:5432/{}",
            self.user,
            self.password,
            self.host.as_deref().unwrap_or("localhost"),
            self.database_name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Success,
    Failed,
    RolledBack,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantResult {
    pub tenant_id: String,
    pub status: Status,
    pub scripts_applied: Vec<String>,
    pub scripts_skipped: Vec<String>,
    pub callback_metadata: serde_json::Map<String, serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
}

impl TenantResult {
    pub fn new(tenant_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        TenantResult {
            tenant_id: tenant_id.into(),
            status: Status::Running,
            scripts_applied: Vec::new(),
            scripts_skipped: Vec::new(),
            callback_metadata: serde_json::Map::new(),
            error_message: None,
            started_at,
            completed_at: None,
            duration_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: Status,
    pub tenants: Vec<String>,
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub tenant_results: BTreeMap<String, TenantResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub job_name: Option<String>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, tenants: Vec<String>, started_at: DateTime<Utc>) -> Self {
        let total = tenants.len();
        Job {
            job_id: job_id.into(),
            status: Status::Pending,
            tenants,
            total,
            completed: 0,
            successful: 0,
            failed: 0,
            tenant_results: BTreeMap::new(),
            started_at,
            completed_at: None,
            error_message: None,
            job_name: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.completed >= self.total
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }

    /// Terminal mapping per the invariants: all-success -> Success,
    /// all-failed -> Failed, mixed -> Partial.
    pub fn terminal_status(&self) -> Status {
        if self.failed == 0 {
            Status::Success
        } else if self.successful == 0 {
            Status::Failed
        } else {
            Status::Partial
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    DryRun,
    Apply,
    ValidateOnly,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::DryRun
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(filename: &str, kind: ScriptKind, version: &str) -> Script {
        Script {
            filename: filename.to_string(),
            version: version.to_string(),
            description: "x".to_string(),
            kind,
            content: "select 1;".to_string(),
        }
    }

    #[test]
    fn script_set_sorts_by_filename() {
        let set = ScriptSet::build(vec![
            script("V2__b.sql", ScriptKind::Migration, "2"),
            script("V1__a.sql", ScriptKind::Migration, "1"),
        ])
        .unwrap();
        assert_eq!(set.filenames(), vec!["V1__a.sql", "V2__b.sql"]);
    }

    #[test]
    fn script_set_rejects_duplicate_kind_version() {
        let err = ScriptSet::build(vec![
            script("V1__a.sql", ScriptKind::Migration, "1"),
            script("V1__b.sql", ScriptKind::Migration, "1"),
        ])
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::ValidationError(_)));
    }

    #[test]
    fn tenant_spec_requires_connection_string_or_parts() {
        let spec = TenantSpec {
            tenant_id: "t1".to_string(),
            tenant_name: None,
            user: String::new(),
            password: String::new(),
            database_name: String::new(),
            host: None,
            connection_string: None,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn job_terminal_status_mixed_is_partial() {
        let mut job = Job::new("j1", vec!["a".into(), "b".into()], Utc::now());
        job.completed = 2;
        job.successful = 1;
        job.failed = 1;
        assert_eq!(job.terminal_status(), Status::Partial);
    }

    #[test]
    fn job_percent_zero_total_is_zero() {
        let job = Job::new("j1", vec![], Utc::now());
        assert_eq!(job.percent(), 0.0);
    }
}
