//! Environment-scoped configuration: base defaults with the cloud overlay on top.

use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::error::{Result, SvcstatError};
use crate::git::RepoSnapshot;

pub const BASE_CONFIG_PATH: &str = "config/config.yaml";
pub const OVERLAY_CONFIG_PATH: &str = "config/config.msft.clouds-overlay.yaml";

/// Files whose content defines an environment release.
pub const INTERESTING_FILES: [&str; 2] = [BASE_CONFIG_PATH, OVERLAY_CONFIG_PATH];

pub const KNOWN_ENVIRONMENTS: [&str; 3] = ["int", "stg", "prod"];

const CLOUD: &str = "public";

/// Template fragments in the base file that are not valid YAML, and the
/// literal each is replaced with before parsing.
const TEMPLATE_COERCIONS: [(&str, &str); 2] = [
    ("{{ .ev2.availabilityZoneCount }}", "2"),
    (
        "environmentName: {{ .ctx.environment }}",
        "environmentName: ANY_KEY",
    ),
];

pub fn is_known_environment(environment: &str) -> bool {
    KNOWN_ENVIRONMENTS.contains(&environment)
}

/// Recursively merge `overlay` over `base`. Objects merge key by key; any
/// other overlay value replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, overlay_value) in overlay {
                let merged = match base.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

fn parse_yaml(path: &str, bytes: &[u8]) -> Result<Value> {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    for (template, literal) in TEMPLATE_COERCIONS {
        text = text.replace(template, literal);
    }
    serde_yaml::from_str(&text).map_err(|e| SvcstatError::Config(format!("{path}: {e}")))
}

fn object_at<'a>(value: &'a Value, path: &[&str], file: &str) -> Result<Option<&'a Map<String, Value>>> {
    let mut current = value;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    match current {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(SvcstatError::Config(format!(
            "{file}: expected a mapping at {}, found {}",
            path.join("."),
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Produces the merged configuration an environment ran at one commit.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver;

impl ConfigResolver {
    pub fn new() -> Self {
        Self
    }

    /// Merged document for `environment`, or `None` when the snapshot
    /// predates environment-scoped configuration.
    ///
    /// An environment outside [`KNOWN_ENVIRONMENTS`] is an error, as is a
    /// document whose shape does not match (historical schema drift).
    pub fn resolve(&self, snapshot: &RepoSnapshot, environment: &str) -> Result<Option<Value>> {
        if !is_known_environment(environment) {
            return Err(SvcstatError::UnknownEnvironment(environment.to_string()));
        }

        let (Some(base_bytes), Some(overlay_bytes)) = (
            snapshot.file(BASE_CONFIG_PATH),
            snapshot.file(OVERLAY_CONFIG_PATH),
        ) else {
            debug!(commit = %snapshot.commit, "no environment-scoped configuration at commit");
            return Ok(None);
        };

        let base_doc = parse_yaml(BASE_CONFIG_PATH, base_bytes)?;
        let base = object_at(&base_doc, &["defaults"], BASE_CONFIG_PATH)?
            .ok_or_else(|| SvcstatError::Config(format!("{BASE_CONFIG_PATH}: missing defaults")))?;

        let overlay_doc = parse_yaml(OVERLAY_CONFIG_PATH, overlay_bytes)?;
        let Some(overlay) = object_at(
            &overlay_doc,
            &["clouds", CLOUD, "environments", environment, "defaults"],
            OVERLAY_CONFIG_PATH,
        )?
        else {
            debug!(commit = %snapshot.commit, environment = %environment, "environment not in overlay at commit");
            return Ok(None);
        };

        Ok(Some(deep_merge(
            Value::Object(base.clone()),
            Value::Object(overlay.clone()),
        )))
    }
}
