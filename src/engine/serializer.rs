//! Serializer engines.
//!
//! Turn structured handler output into a response body and decode request
//! bodies of the matching content type. `engine.serializer.before` sees the
//! data, `engine.serializer.after` sees the encoded text.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::dispatch::Flow;
use crate::error::Result;
use crate::hooks::{AsHookable, HookArgs, HookTable, HookType, Hookable};

pub const BEFORE: &str = "engine.serializer.before";
pub const AFTER: &str = "engine.serializer.after";

/// A serializer backend.
pub trait SerializerEngine: Hookable + AsHookable {
    fn content_type(&self) -> &str;

    fn encode(&self, data: &Value) -> Result<String>;

    fn decode(&self, text: &str) -> Result<Value>;

    /// Encode with hooks.
    fn serialize(&self, data: &Value) -> Flow<String> {
        let mut data = data.clone();
        self.execute_hook(BEFORE, &mut HookArgs::Data(&mut data))?;
        let mut text = self.encode(&data)?;
        self.execute_hook(AFTER, &mut HookArgs::Content(&mut text))?;
        Ok(text)
    }

    /// Decode a request body.
    fn deserialize(&self, body: &[u8]) -> Result<Value> {
        self.decode(&String::from_utf8_lossy(body))
    }

    /// Whether a request content type is handled by this serializer.
    fn accepts(&self, content_type: &str) -> bool {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        essence.eq_ignore_ascii_case(self.content_type())
    }
}

/// Closed set of serializer variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerBackend {
    Json,
    Yaml,
}

impl SerializerBackend {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match super::normalize_tag(tag).as_str() {
            "json" => Some(SerializerBackend::Json),
            "yaml" | "yml" => Some(SerializerBackend::Yaml),
            _ => None,
        }
    }

    /// Recognized option for JSON: `pretty` (bool).
    pub fn build(self, options: &Map<String, Value>) -> Result<Arc<dyn SerializerEngine>> {
        Ok(match self {
            SerializerBackend::Json => Arc::new(JsonSerializer::new(
                options.get("pretty").and_then(Value::as_bool).unwrap_or(false),
            )),
            SerializerBackend::Yaml => Arc::new(YamlSerializer::new()),
        })
    }
}

fn serializer_table() -> HookTable {
    HookTable::new([BEFORE, AFTER])
}

pub struct JsonSerializer {
    pretty: bool,
    hooks: HookTable,
}

impl JsonSerializer {
    pub fn new(pretty: bool) -> Self {
        Self {
            pretty,
            hooks: serializer_table(),
        }
    }
}

impl Hookable for JsonSerializer {
    fn hook_type(&self) -> HookType {
        HookType::Engine
    }

    fn candidate_name(&self) -> &str {
        "serializer"
    }

    fn hook_table(&self) -> &HookTable {
        &self.hooks
    }
}

impl SerializerEngine for JsonSerializer {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, data: &Value) -> Result<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        })
    }

    fn decode(&self, text: &str) -> Result<Value> {
        Ok(serde_json::from_str(text)?)
    }
}

pub struct YamlSerializer {
    hooks: HookTable,
}

impl YamlSerializer {
    pub fn new() -> Self {
        Self {
            hooks: serializer_table(),
        }
    }
}

impl Default for YamlSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Hookable for YamlSerializer {
    fn hook_type(&self) -> HookType {
        HookType::Engine
    }

    fn candidate_name(&self) -> &str {
        "serializer"
    }

    fn hook_table(&self) -> &HookTable {
        &self.hooks
    }
}

impl SerializerEngine for YamlSerializer {
    fn content_type(&self) -> &str {
        "text/x-yaml"
    }

    fn encode(&self, data: &Value) -> Result<String> {
        Ok(serde_yaml::to_string(data)?)
    }

    fn decode(&self, text: &str) -> Result<Value> {
        Ok(serde_yaml::from_str(text)?)
    }
}
