//! Script Loader & Validator (C1): scans a directory, parses filenames
//! against the migration/rollback/seed grammar, validates content, and
//! detects version conflicts.

use std::path::Path;

use regex::Regex;

use crate::error::Result;
use crate::model::{Script, ScriptKind, ScriptSet};

const DANGEROUS_OPS: [&str; 3] = ["drop table", "drop database", "truncate"];

/// Outcome of loading a directory: the usable set plus collected problems.
/// The set is usable iff `errors` is empty.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub set: ScriptSet,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl LoadReport {
    pub fn is_usable(&self) -> bool {
        self.errors.is_empty()
    }
}

fn pattern(prefix: char) -> Regex {
    Regex::new(&format!(r"^{}(\d*\.\d*)__(.+)\.sql$", prefix)).expect("static pattern is valid")
}

/// Parses a bare filename (no directory component) against the three
/// patterns in Migration -> Rollback -> Seed order. Returns `None` if no
/// pattern matches.
pub fn parse_filename(filename: &str) -> Option<(ScriptKind, String, String)> {
    for (kind, prefix) in [
        (ScriptKind::Migration, 'V'),
        (ScriptKind::Rollback, 'R'),
        (ScriptKind::Seed, 'S'),
    ] {
        let re = pattern(prefix);
        if let Some(caps) = re.captures(filename) {
            let version = caps.get(1).unwrap().as_str().to_string();
            let tail = caps.get(2).unwrap().as_str().to_string();
            return Some((kind, version, tail));
        }
    }
    None
}

/// Runs the content checks from the spec against one script's body,
/// appending to `errors`/`warnings` tagged by filename.
fn validate_content(filename: &str, content: &str, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    if content.trim().is_empty() {
        errors.push(format!("{}: script content is empty", filename));
        return;
    }
    if !content.trim_end().ends_with(';') {
        warnings.push(format!("{}: content is not terminated by ';'", filename));
    }
    let lower = content.to_lowercase();
    let has_dangerous = DANGEROUS_OPS.iter().any(|op| lower.contains(op));
    let wrapped = lower.contains("begin") && lower.contains("commit");
    if has_dangerous && !wrapped {
        warnings.push(format!(
            "{}: contains a dangerous operation without begin/commit",
            filename
        ));
    }
}

/// Loads and validates every `*.sql` file directly under `dir`.
pub fn load_scripts(dir: &Path) -> Result<LoadReport> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut scripts = Vec::new();

    if !dir.is_dir() {
        errors.push(format!("migrations directory does not exist: {}", dir.display()));
        return Ok(LoadReport {
            set: ScriptSet::default(),
            errors,
            warnings,
        });
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("sql"))
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.file_name());

    if entries.is_empty() {
        warnings.push(format!("no .sql files found in {}", dir.display()));
    }

    for entry in entries {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().to_string();

        let Some((kind, version, tail)) = parse_filename(&filename) else {
            warnings.push(format!("{}: does not match the migration filename grammar, ignored", filename));
            continue;
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                errors.push(format!("{}: failed to read file: {}", filename, e));
                continue;
            }
        };

        validate_content(&filename, &content, &mut errors, &mut warnings);

        scripts.push(Script {
            filename,
            version,
            description: Script::description_from_tail(&tail),
            kind,
            content,
        });
    }

    let set = match ScriptSet::build(scripts) {
        Ok(set) => set,
        Err(e) => {
            errors.push(e.to_string());
            ScriptSet::default()
        }
    };

    Ok(LoadReport {
        set,
        errors,
        warnings,
    })
}
