//! Bridge configuration (`tether.toml`)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tether_host::HostConfig;
use tether_script::IsolateConfig;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How a wrapper finds its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionStrategy {
    /// Materialize the public method table when the wrapper is created
    Eager,
    /// Synthesize each binding on first read
    Lazy,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub isolate: IsolateSection,
    pub reflection: ReflectionSection,
    pub host: HostSection,
}

/// `[isolate]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IsolateSection {
    pub max_call_depth: usize,
    pub gc_threshold: usize,
}

impl Default for IsolateSection {
    fn default() -> Self {
        let defaults = IsolateConfig::default();
        Self {
            max_call_depth: defaults.max_call_depth,
            gc_threshold: defaults.gc_threshold,
        }
    }
}

/// `[reflection]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReflectionSection {
    /// Strategy for `create_instance` and objects returned by host calls
    pub construction: ReflectionStrategy,
    /// Strategy for `Class.forName` / `for_name`
    pub class_lookup: ReflectionStrategy,
    /// Member names answered by the echo invoker, with their sentinel
    pub stub_methods: HashMap<String, String>,
}

impl Default for ReflectionSection {
    fn default() -> Self {
        Self {
            construction: ReflectionStrategy::Eager,
            class_lookup: ReflectionStrategy::Lazy,
            stub_methods: HashMap::new(),
        }
    }
}

/// `[host]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostSection {
    pub max_attached_threads: usize,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            max_attached_threads: HostConfig::default().max_attached_threads,
        }
    }
}

impl BridgeConfig {
    /// Parse a config from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a config from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.isolate.max_call_depth == 0 {
            return Err(ConfigError::Invalid(
                "isolate.max_call_depth must be at least 1".to_string(),
            ));
        }
        if self.isolate.gc_threshold == 0 {
            return Err(ConfigError::Invalid(
                "isolate.gc_threshold must be at least 1".to_string(),
            ));
        }
        if self.host.max_attached_threads == 0 {
            return Err(ConfigError::Invalid(
                "host.max_attached_threads must be at least 1".to_string(),
            ));
        }
        let blank = self.reflection.stub_methods.keys().find(|name| name.trim().is_empty());
        if let Some(name) = blank {
            return Err(ConfigError::Invalid(format!(
                "reflection.stub_methods has an empty member name: {:?}",
                name
            )));
        }
        Ok(())
    }

    pub fn isolate_config(&self) -> IsolateConfig {
        IsolateConfig {
            max_call_depth: self.isolate.max_call_depth,
            gc_threshold: self.isolate.gc_threshold,
        }
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            max_attached_threads: self.host.max_attached_threads,
        }
    }

    /// Sentinel for a stubbed member, if any
    pub fn stub_for(&self, member: &str) -> Option<&str> {
        self.reflection.stub_methods.get(member).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.isolate.max_call_depth, 64);
        assert_eq!(config.isolate.gc_threshold, 4096);
        assert_eq!(config.reflection.construction, ReflectionStrategy::Eager);
        assert_eq!(config.reflection.class_lookup, ReflectionStrategy::Lazy);
        assert_eq!(config.host.max_attached_threads, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[isolate]
max_call_depth = 96
gc_threshold = 128

[reflection]
construction = "lazy"
class_lookup = "eager"

[reflection.stub_methods]
describeLater = "Not implemented yet"

[host]
max_attached_threads = 4
"#;
        let config = BridgeConfig::from_str(toml).unwrap();
        assert_eq!(config.isolate.max_call_depth, 96);
        assert_eq!(config.isolate_config().gc_threshold, 128);
        assert_eq!(config.reflection.construction, ReflectionStrategy::Lazy);
        assert_eq!(config.reflection.class_lookup, ReflectionStrategy::Eager);
        assert_eq!(config.stub_for("describeLater"), Some("Not implemented yet"));
        assert_eq!(config.stub_for("getName"), None);
        assert_eq!(config.host_config().max_attached_threads, 4);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = BridgeConfig::from_str("[isolate]\ngc_threshold = 10\n").unwrap();
        assert_eq!(config.isolate.gc_threshold, 10);
        assert_eq!(config.isolate.max_call_depth, 64);
        assert_eq!(config.reflection.construction, ReflectionStrategy::Eager);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = BridgeConfig::from_str("[isolate]\nmax_call_depth = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = BridgeConfig::from_str("[host]\nmax_attached_threads = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        let result = BridgeConfig::from_str("[reflection]\nconstruction = \"sometimes\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[reflection.stub_methods]\nping = \"pong\"").unwrap();
        let config = BridgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.stub_for("ping"), Some("pong"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = BridgeConfig::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
