//! Reporting configuration.
//!
//! Options are read by name from a [`ConfigurationSource`]. The bundled
//! source reads one section of a YAML file:
//!
//! ```yaml
//! dxleventreporting:
//!   enabled: true
//!   dxl_client_config_file: /etc/cuckoo/dxlclient.yaml
//!   send_compressed_event: true
//!   compressed_event_max_size: 512000
//!   items_to_include_in_report: "network.dns, signatures"
//!   not_found_policy: skip
//! ```

use crate::encode::MAX_COMPRESSION_LEVEL;
use cuckoo_dxl_common::{Error, Result};
use cuckoo_dxl_report::NotFoundPolicy;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Section read by default.
pub const DEFAULT_SECTION: &str = "dxleventreporting";

/// Default upper bound for the compressed report event, in bytes.
pub const DEFAULT_COMPRESSED_EVENT_MAX_SIZE: usize = 512_000;

pub const OPT_ENABLED: &str = "enabled";
pub const OPT_CLIENT_CONFIG_FILE: &str = "dxl_client_config_file";
pub const OPT_SEND_COMPRESSED_EVENT: &str = "send_compressed_event";
pub const OPT_COMPRESSED_EVENT_MAX_SIZE: &str = "compressed_event_max_size";
pub const OPT_ITEMS_TO_INCLUDE: &str = "items_to_include_in_report";
pub const OPT_NOT_FOUND_POLICY: &str = "not_found_policy";
pub const OPT_COMPRESSION_LEVEL: &str = "compression_level";

/// A single configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl OptionValue {
    /// Read as a flag. Accepts common string spellings.
    pub fn as_bool(&self, name: &str) -> Result<bool> {
        match self {
            OptionValue::Bool(b) => Ok(*b),
            OptionValue::Integer(0) => Ok(false),
            OptionValue::Integer(1) => Ok(true),
            OptionValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(type_error(name, "a boolean", self)),
            },
            _ => Err(type_error(name, "a boolean", self)),
        }
    }

    /// Read as a non-negative integer.
    pub fn as_u64(&self, name: &str) -> Result<u64> {
        match self {
            OptionValue::Integer(i) => {
                u64::try_from(*i).map_err(|_| type_error(name, "a non-negative integer", self))
            }
            OptionValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| type_error(name, "a non-negative integer", self)),
            OptionValue::Bool(_) => Err(type_error(name, "a non-negative integer", self)),
        }
    }

    /// Read as text. Scalars are rendered.
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Integer(i) => write!(f, "{}", i),
            OptionValue::String(s) => write!(f, "{}", s),
        }
    }
}

fn type_error(name: &str, expected: &str, got: &OptionValue) -> Error {
    Error::Configuration(format!(
        "{} must be {}, got '{}'",
        name, expected, got
    ))
}

/// Lookup of configuration options by name.
pub trait ConfigurationSource {
    fn get_option(&self, name: &str) -> Option<OptionValue>;
}

impl ConfigurationSource for BTreeMap<String, OptionValue> {
    fn get_option(&self, name: &str) -> Option<OptionValue> {
        self.get(name).cloned()
    }
}

/// Options from one section of a YAML file.
#[derive(Debug, Clone, Default)]
pub struct YamlConfigSource {
    options: BTreeMap<String, OptionValue>,
}

impl YamlConfigSource {
    /// Load `section` from the YAML file at `path`.
    pub fn load(path: &Path, section: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content, section)
    }

    /// Parse `section` out of a YAML document. A missing section yields an
    /// empty source.
    pub fn from_yaml_str(content: &str, section: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(content)?;
        let mut options = BTreeMap::new();

        let Some(table) = doc.get(section) else {
            return Ok(Self { options });
        };
        let Some(mapping) = table.as_mapping() else {
            return Err(Error::Configuration(format!(
                "[{}] must be a mapping",
                section
            )));
        };

        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                continue;
            };
            if let Some(option) = scalar_option(key, value)? {
                options.insert(key.to_string(), option);
            }
        }

        Ok(Self { options })
    }

    /// Source over options that are already parsed.
    pub fn from_options(options: BTreeMap<String, OptionValue>) -> Self {
        Self { options }
    }
}

/// Convert one YAML value. A null value reads as an absent option; lists,
/// mappings and tagged values are rejected.
fn scalar_option(key: &str, value: &Value) -> Result<Option<OptionValue>> {
    match value {
        Value::Bool(b) => Ok(Some(OptionValue::Bool(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Some(OptionValue::Integer(i))),
            None => Ok(Some(OptionValue::String(n.to_string()))),
        },
        Value::String(s) => Ok(Some(OptionValue::String(s.clone()))),
        Value::Null => {
            warn!("{} has no value, using the default", key);
            Ok(None)
        }
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => Err(Error::Configuration(
            format!("{} must be a scalar", key),
        )),
    }
}

impl ConfigurationSource for YamlConfigSource {
    fn get_option(&self, name: &str) -> Option<OptionValue> {
        self.options.get(name).cloned()
    }
}

/// Settings for one publish run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Publish the gzip-compressed full report.
    pub send_compressed_event: bool,
    /// Largest compressed report, in bytes, that is still published.
    pub compressed_event_max_size: usize,
    /// Comma-separated dot paths copied into the curated report.
    pub items_to_include: Option<String>,
    pub not_found_policy: NotFoundPolicy,
    /// gzip level, 0 to 9.
    pub compression_level: u32,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            send_compressed_event: false,
            compressed_event_max_size: DEFAULT_COMPRESSED_EVENT_MAX_SIZE,
            items_to_include: None,
            not_found_policy: NotFoundPolicy::default(),
            compression_level: MAX_COMPRESSION_LEVEL,
        }
    }
}

impl PublishOptions {
    /// Read the recognized options, falling back to defaults for absent ones.
    pub fn from_source(source: &dyn ConfigurationSource) -> Result<Self> {
        let mut options = Self::default();

        if let Some(v) = source.get_option(OPT_SEND_COMPRESSED_EVENT) {
            options.send_compressed_event = v.as_bool(OPT_SEND_COMPRESSED_EVENT)?;
        }

        if let Some(v) = source.get_option(OPT_COMPRESSED_EVENT_MAX_SIZE) {
            let size = v.as_u64(OPT_COMPRESSED_EVENT_MAX_SIZE)?;
            options.compressed_event_max_size = usize::try_from(size).map_err(|_| {
                Error::Configuration(format!(
                    "{} is too large: {}",
                    OPT_COMPRESSED_EVENT_MAX_SIZE, size
                ))
            })?;
        }

        if let Some(v) = source.get_option(OPT_ITEMS_TO_INCLUDE) {
            options.items_to_include = Some(v.as_string());
        }

        if let Some(v) = source.get_option(OPT_NOT_FOUND_POLICY) {
            options.not_found_policy = v.as_string().parse()?;
        }

        if let Some(v) = source.get_option(OPT_COMPRESSION_LEVEL) {
            let level = v.as_u64(OPT_COMPRESSION_LEVEL)?;
            if level > u64::from(MAX_COMPRESSION_LEVEL) {
                return Err(Error::Configuration(format!(
                    "{} must be between 0 and {}, got {}",
                    OPT_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL, level
                )));
            }
            options.compression_level = level as u32;
        }

        Ok(options)
    }
}

/// Everything the host reads at startup.
#[derive(Debug, Clone)]
pub struct ReportingConfig {
    pub enabled: bool,
    /// Bus client configuration, loaded by the client itself.
    pub client_config_file: PathBuf,
    pub publish: PublishOptions,
}

impl ReportingConfig {
    /// Read the reporting section. The client config file is required even
    /// when reporting is disabled.
    pub fn from_source(source: &dyn ConfigurationSource) -> Result<Self> {
        let enabled = match source.get_option(OPT_ENABLED) {
            Some(v) => v.as_bool(OPT_ENABLED)?,
            None => false,
        };

        let client_config_file = source
            .get_option(OPT_CLIENT_CONFIG_FILE)
            .map(|v| PathBuf::from(v.as_string()))
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "Missing {} setting under the [{}] section",
                    OPT_CLIENT_CONFIG_FILE, DEFAULT_SECTION
                ))
            })?;

        Ok(Self {
            enabled,
            client_config_file,
            publish: PublishOptions::from_source(source)?,
        })
    }
}
