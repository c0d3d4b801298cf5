//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for an application.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::engine::EngineKind;

/// Root configuration for an application.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Application-level settings.
    pub app: AppSettings,

    /// Subsystem engines, built lazily on first use.
    pub engines: EnginesConfig,

    /// Extra file extension to content type mappings.
    pub mime: MimeConfig,

    /// Listener configuration for the bundled HTTP server.
    pub listener: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Settings visible to handlers and templates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppSettings {
    /// Application name, used in logs and as the `settings.appname` token.
    pub name: String,

    /// Charset appended to textual content types.
    pub charset: String,

    /// Directory for static files and `send_file`.
    pub public_dir: Option<PathBuf>,

    /// Default template directory when the template engine sets no `path`.
    pub views: Option<PathBuf>,

    /// Default layout when the template engine sets no `layout`.
    pub layout: Option<String>,

    /// Render error details into 500 responses.
    pub show_errors: bool,

    /// Maximum number of nested `forward` hops in one dispatch.
    pub max_forward_hops: usize,

    /// Free-form settings exposed to templates.
    pub extra: BTreeMap<String, Value>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            charset: "utf-8".to_string(),
            public_dir: None,
            views: None,
            layout: None,
            show_errors: false,
            max_forward_hops: 10,
            extra: BTreeMap::new(),
        }
    }
}

/// Engine selection per kind. Absent kinds are not configured.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EnginesConfig {
    pub logger: Option<EngineConfig>,
    pub session: Option<EngineConfig>,
    pub template: Option<EngineConfig>,
    pub serializer: Option<EngineConfig>,
}

impl EnginesConfig {
    /// Returns the configuration for one engine kind.
    pub fn get(&self, kind: EngineKind) -> Option<&EngineConfig> {
        match kind {
            EngineKind::Logger => self.logger.as_ref(),
            EngineKind::Session => self.session.as_ref(),
            EngineKind::Template => self.template.as_ref(),
            EngineKind::Serializer => self.serializer.as_ref(),
        }
    }

    /// Iterates over configured engines with their kind.
    pub fn configured(&self) -> impl Iterator<Item = (EngineKind, &EngineConfig)> {
        EngineKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|cfg| (kind, cfg)))
    }
}

/// A single engine: a type tag plus an option tree.
///
/// Options may either be given flat, or nested under the camel-cased type
/// name (`[engines.session.options.Simple]`); the nested table wins.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Engine variant, e.g. `"simple"`, `"minijinja"`, `"json"`.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub options: Map<String, Value>,
}

impl EngineConfig {
    /// Creates a config with no options.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: Map::new(),
        }
    }

    /// Adds one option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Returns the option sub-tree scoped to this engine's type.
    pub fn scoped_options(&self) -> Map<String, Value> {
        match self.options.get(&camelize(&self.kind)) {
            Some(Value::Object(scoped)) => scoped.clone(),
            _ => self.options.clone(),
        }
    }
}

/// Converts `simple_store` or `simple-store` to `SimpleStore`.
pub fn camelize(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Content type overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MimeConfig {
    /// Content type used for unknown extensions.
    pub default: String,

    /// Extension (without dot) to content type.
    pub types: BTreeMap<String, String>,
}

impl Default for MimeConfig {
    fn default() -> Self {
        Self {
            default: "application/data".to_string(),
            types: BTreeMap::new(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
