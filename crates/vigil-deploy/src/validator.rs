//! Compose manifest environment validation.
//!
//! Before a target is deployed its compose file is checked for variable
//! references that nothing will satisfy and for `env_file` entries that point
//! at files which do not exist. Both make `docker compose up` fail or, worse,
//! start containers with empty configuration.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::Value;
use vigil_core::secrets::parse_env_lines;

/// `${NAME}`, `${NAME<op><word>}` and `$NAME`.
static VARIABLE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?:(:?[-+?])[^}]*)?\}|\$([A-Za-z_][A-Za-z0-9_]*)").ok()
});

/// How a variable reference behaves when the variable is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reference {
    /// Must be set (`$X`, `${X}`, `${X?err}`, `${X:?err}`).
    Required,
    /// Falls back to inline text (`${X-d}`, `${X:-d}`, `${X+a}`, `${X:+a}`).
    Defaulted,
}

/// Outcome of validating one compose file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Problems that block the deployment.
    pub warnings: Vec<String>,
    /// Advisory findings that do not block it.
    pub notes: Vec<String>,
}

impl ValidationReport {
    /// Returns true if nothing blocks the deployment.
    pub fn is_valid(&self) -> bool {
        self.warnings.is_empty()
    }

    fn failed(warning: String) -> Self {
        Self {
            warnings: vec![warning],
            notes: Vec::new(),
        }
    }
}

/// Checks compose files against the environment they will run in.
#[derive(Debug, Clone)]
pub struct EnvironmentValidator {
    process_env: HashMap<String, String>,
}

impl EnvironmentValidator {
    /// Creates a validator that sees the current process environment.
    pub fn new() -> Self {
        Self::with_process_env(std::env::vars())
    }

    /// Creates a validator that sees `vars` as the process environment.
    pub fn with_process_env<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            process_env: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Validates `compose_file`.
    ///
    /// Required variables may come from the process environment or from a
    /// `.env` file next to the compose file. `env_file` entries are resolved
    /// against `working_dir`.
    pub fn validate(&self, compose_file: &Path, working_dir: &Path) -> ValidationReport {
        if !compose_file.is_file() {
            return ValidationReport::failed(format!(
                "Compose file not found: {}",
                compose_file.display()
            ));
        }

        let content = match std::fs::read_to_string(compose_file) {
            Ok(content) => content,
            Err(e) => return ValidationReport::failed(format!("Validation error: {}", e)),
        };

        let manifest: Value = match serde_yaml::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                return ValidationReport::failed(format!("Invalid YAML in compose file: {}", e));
            },
        };

        if !manifest.is_mapping() {
            return ValidationReport::failed(format!(
                "Validation error: {} is not a compose mapping",
                compose_file.display()
            ));
        }

        let mut report = ValidationReport::default();

        for env_file in env_files(&manifest) {
            let expected = resolve_against(working_dir, &env_file);
            if !expected.is_file() {
                report.warnings.push(format!(
                    "Referenced env_file not found: {} (expected at: {})",
                    env_file,
                    expected.display()
                ));
            }
        }

        let dotenv = compose_file
            .parent()
            .map(|dir| dir.join(".env"))
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|content| parse_env_lines(&content))
            .unwrap_or_default();

        let mut references = HashMap::new();
        collect_references(&manifest, &mut references);

        let is_set = |name: &str| self.process_env.contains_key(name) || dotenv.contains_key(name);

        let mut missing = BTreeSet::new();
        let mut defaulted = BTreeSet::new();
        for (name, kind) in references {
            if is_set(&name) {
                continue;
            }
            match kind {
                Reference::Required => missing.insert(name),
                Reference::Defaulted => defaulted.insert(name),
            };
        }

        if !missing.is_empty() {
            report.warnings.push(format!(
                "Missing environment variables: {}",
                missing.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        if !defaulted.is_empty() {
            report.notes.push(format!(
                "Using default values for: {}",
                defaulted.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }

        report
    }
}

fn resolve_against(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Every variable referenced in a string value of `value`.
///
/// A variable referenced both with and without a default is required.
fn collect_references(value: &Value, out: &mut HashMap<String, Reference>) {
    match value {
        Value::String(text) => scan(text, out),
        Value::Sequence(items) => items.iter().for_each(|item| collect_references(item, out)),
        Value::Mapping(map) => map.values().for_each(|item| collect_references(item, out)),
        Value::Tagged(tagged) => collect_references(&tagged.value, out),
        Value::Null | Value::Bool(_) | Value::Number(_) => {},
    }
}

fn scan(text: &str, out: &mut HashMap<String, Reference>) {
    let Some(pattern) = VARIABLE_RE.as_ref() else {
        return;
    };

    // `$$` is a literal dollar sign.
    let text = text.replace("$$", "");

    for captures in pattern.captures_iter(&text) {
        let (name, kind) = match (captures.get(1), captures.get(3)) {
            (Some(name), _) => {
                let kind = match captures.get(2).map(|m| m.as_str()) {
                    Some("-" | ":-" | "+" | ":+") => Reference::Defaulted,
                    _ => Reference::Required,
                };
                (name.as_str(), kind)
            },
            (None, Some(name)) => (name.as_str(), Reference::Required),
            (None, None) => continue,
        };

        out.entry(name.to_string())
            .and_modify(|existing| {
                if kind == Reference::Required {
                    *existing = Reference::Required;
                }
            })
            .or_insert(kind);
    }
}

/// `env_file` entries at the top level and under each service.
///
/// Entries marked `required: false` are skipped.
fn env_files(manifest: &Value) -> Vec<String> {
    let mut files = Vec::new();

    if let Some(entry) = manifest.get("env_file") {
        push_env_files(entry, &mut files);
    }

    if let Some(Value::Mapping(services)) = manifest.get("services") {
        for service in services.values() {
            if let Some(entry) = service.get("env_file") {
                push_env_files(entry, &mut files);
            }
        }
    }

    files
}

fn push_env_files(entry: &Value, files: &mut Vec<String>) {
    match entry {
        Value::String(path) => files.push(path.clone()),
        Value::Sequence(items) => items.iter().for_each(|item| push_env_files(item, files)),
        Value::Mapping(_) => {
            let required = entry.get("required").and_then(Value::as_bool).unwrap_or(true);
            if required && let Some(path) = entry.get("path").and_then(Value::as_str) {
                files.push(path.to_string());
            }
        },
        _ => {},
    }
}
