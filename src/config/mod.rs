//! Configuration management for `gitlab_transfer`.
//!
//! Sources, lowest to highest precedence:
//! - Built-in defaults
//! - User config: `~/.config/glt/config.yaml`
//! - Project config: `./glt.yaml`, or the file named by `--config`
//! - Environment: `GLT_*` variables
//! - Command-line flags
//!
//! YAML is flattened to dotted keys (`source.host`, `destination.assignee-id`).
//! The merged layer is turned into an immutable [`TransferConfig`] once per
//! invocation and handed to the orchestrator.

use crate::error::{OptionExt, Result, TransferError};
use serde::Serialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_STAGING_PREFIX: &str = "sourceProjectData";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PROJECT_CONFIG_FILE: &str = "glt.yaml";
const ENV_PREFIX: &str = "GLT_";

/// Which tracker a setting or operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Destination,
}

impl Side {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flat set of dotted keys from one configuration source.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: HashMap<String, String>,
}

impl fmt::Debug for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        let mut map = f.debug_map();
        for key in keys {
            if key.ends_with("token") {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, &self.values[key]);
            }
        }
        map.finish()
    }
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        let mut layer = Self::default();
        flatten_yaml(&value, "", &mut layer.values);
        layer.values = layer
            .values
            .into_iter()
            .map(|(key, value)| (normalize_key(&key), value))
            .collect();
        Ok(layer)
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_vars(env::vars())
    }

    /// Build a layer from `GLT_*` pairs; other names are ignored.
    #[must_use]
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = Self::default();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                for variant in env_key_variants(stripped) {
                    layer.values.insert(variant, value.clone());
                }
            }
        }
        layer
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|value| parse_bool(value).ok_or_else(|| invalid(key, value)))
            .transpose()
    }

    fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.get(key)
            .map(|value| value.parse::<u64>().map_err(|_| invalid(key, value)))
            .transpose()
    }
}

fn invalid(key: &str, value: &str) -> TransferError {
    TransferError::Config(format!("invalid value '{value}' for '{key}'"))
}

/// Command-line overrides (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub source_project: Option<String>,
    pub destination_project: Option<String>,
    pub assignee_id: Option<u64>,
    pub source_prefix: Option<PathBuf>,
    pub destination_prefix: Option<PathBuf>,
    pub audit_path: Option<PathBuf>,
    pub skip_system_notes: Option<bool>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();
        let mut set = |key: &str, value: String| {
            layer.values.insert(key.to_string(), value);
        };

        if let Some(project) = &self.source_project {
            set("source.project", project.clone());
        }
        if let Some(project) = &self.destination_project {
            set("destination.project", project.clone());
        }
        if let Some(id) = self.assignee_id {
            set("destination.assignee-id", id.to_string());
        }
        if let Some(prefix) = &self.source_prefix {
            set("staging.source-prefix", prefix.to_string_lossy().to_string());
        }
        if let Some(prefix) = &self.destination_prefix {
            set(
                "staging.destination-prefix",
                prefix.to_string_lossy().to_string(),
            );
        }
        if let Some(path) = &self.audit_path {
            set("audit.path", path.to_string_lossy().to_string());
        }
        if let Some(skip) = self.skip_system_notes {
            set("notes.skip-system", skip.to_string());
        }

        layer
    }
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    for (key, value) in [
        ("staging.source-prefix", DEFAULT_STAGING_PREFIX.to_string()),
        ("staging.destination-prefix", DEFAULT_STAGING_PREFIX.to_string()),
        ("http.timeout-secs", DEFAULT_TIMEOUT_SECS.to_string()),
        ("source.insecure-tls", "false".to_string()),
        ("destination.insecure-tls", "false".to_string()),
        ("notes.skip-system", "false".to_string()),
    ] {
        layer.values.insert(key.to_string(), value);
    }
    layer
}

/// Load user config (`~/.config/glt/config.yaml`).
pub fn load_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home)
        .join(".config")
        .join("glt")
        .join("config.yaml");
    ConfigLayer::from_yaml(&path)
}

/// Load the project config: `explicit` if given (it must exist), else `./glt.yaml`.
pub fn load_project_config(explicit: Option<&Path>) -> Result<ConfigLayer> {
    match explicit {
        Some(path) if !path.exists() => Err(TransferError::Config(format!(
            "config file '{}' does not exist",
            path.display()
        ))),
        Some(path) => ConfigLayer::from_yaml(path),
        None => ConfigLayer::from_yaml(Path::new(PROJECT_CONFIG_FILE)),
    }
}

/// Load configuration with the full precedence order.
pub fn load_config(explicit: Option<&Path>, cli: &CliOverrides) -> Result<ConfigLayer> {
    Ok(ConfigLayer::merge_layers(&[
        default_config_layer(),
        load_user_config()?,
        load_project_config(explicit)?,
        ConfigLayer::from_env(),
        cli.as_layer(),
    ]))
}

/// Connection settings for one tracker.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub token: String,
    /// Project name (exact, or an anchored regular expression).
    pub project: String,
    pub insecure_tls: bool,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("project", &self.project)
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}

/// Settings for one side; any of them may be missing until the side is used.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SideConfig {
    pub host: Option<String>,
    pub token: Option<String>,
    pub project: Option<String>,
    pub insecure_tls: bool,
}

impl fmt::Debug for SideConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideConfig")
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("project", &self.project)
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}

impl SideConfig {
    fn from_layer(layer: &ConfigLayer, side: Side) -> Result<Self> {
        let key = |name: &str| format!("{side}.{name}");
        Ok(Self {
            host: layer.get(&key("host")).map(ToString::to_string),
            token: layer.get(&key("token")).map(ToString::to_string),
            project: layer.get(&key("project")).map(ToString::to_string),
            insecure_tls: layer.get_bool(&key("insecure-tls"))?.unwrap_or(false),
        })
    }
}

/// Everything one invocation needs, resolved from the merged layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub source: SideConfig,
    pub destination: SideConfig,
    pub assignee_id: Option<u64>,
    pub source_prefix: PathBuf,
    pub destination_prefix: PathBuf,
    pub audit_path: PathBuf,
    pub skip_system_notes: bool,
    pub http_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            source: SideConfig::default(),
            destination: SideConfig::default(),
            assignee_id: None,
            source_prefix: PathBuf::from(DEFAULT_STAGING_PREFIX),
            destination_prefix: PathBuf::from(DEFAULT_STAGING_PREFIX),
            audit_path: default_audit_path(Path::new(DEFAULT_STAGING_PREFIX)),
            skip_system_notes: false,
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

fn default_audit_path(destination_prefix: &Path) -> PathBuf {
    let mut name = destination_prefix.as_os_str().to_owned();
    name.push("_audit.jsonl");
    PathBuf::from(name)
}

impl TransferConfig {
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let source_prefix = layer
            .get("staging.source-prefix")
            .map_or_else(|| PathBuf::from(DEFAULT_STAGING_PREFIX), PathBuf::from);
        let destination_prefix = layer
            .get("staging.destination-prefix")
            .map_or_else(|| PathBuf::from(DEFAULT_STAGING_PREFIX), PathBuf::from);
        let audit_path = layer
            .get("audit.path")
            .map_or_else(|| default_audit_path(&destination_prefix), PathBuf::from);
        let timeout = layer
            .get_u64("http.timeout-secs")?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            source: SideConfig::from_layer(layer, Side::Source)?,
            destination: SideConfig::from_layer(layer, Side::Destination)?,
            assignee_id: layer.get_u64("destination.assignee-id")?,
            source_prefix,
            destination_prefix,
            audit_path,
            skip_system_notes: layer.get_bool("notes.skip-system")?.unwrap_or(false),
            http_timeout: Duration::from_secs(timeout),
        })
    }

    #[must_use]
    pub fn side(&self, side: Side) -> &SideConfig {
        match side {
            Side::Source => &self.source,
            Side::Destination => &self.destination,
        }
    }

    /// Connection settings for `side`; fails naming the first missing key.
    pub fn endpoint(&self, side: Side) -> Result<Endpoint> {
        let config = self.side(side);
        Ok(Endpoint {
            host: config.host.clone().required(&format!("{side}.host"))?,
            token: config.token.clone().required(&format!("{side}.token"))?,
            project: config.project.clone().required(&format!("{side}.project"))?,
            insecure_tls: config.insecure_tls,
        })
    }

    /// Project name configured for `side`.
    pub fn project_name(&self, side: Side) -> Result<&str> {
        self.side(side)
            .project
            .as_deref()
            .required(&format!("{side}.project"))
    }

    /// The destination user every replayed issue is assigned to.
    pub fn assignee(&self) -> Result<u64> {
        self.assignee_id.required("destination.assignee-id")
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

/// Dotted keys an environment name may stand for.
///
/// `SOURCE_INSECURE_TLS` yields `source_insecure_tls`, `source.insecure.tls`,
/// `source-insecure-tls` and `source.insecure-tls`.
fn env_key_variants(raw: &str) -> Vec<String> {
    let raw_lower = raw.to_lowercase();
    let mut variants = vec![
        raw_lower.clone(),
        raw_lower.replace('_', "."),
        raw_lower.replace('_', "-"),
    ];
    if let Some((section, rest)) = raw_lower.split_once('_') {
        variants.push(format!("{section}.{}", rest.replace('_', "-")));
    }
    variants.dedup();
    variants
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
