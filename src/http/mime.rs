//! Content type lookup by file extension.
//!
//! Injected into the App at construction so file serving never reaches for
//! process-wide state.

use std::collections::HashMap;
use std::path::Path;

use crate::config::schema::MimeConfig;

const BUILTIN: &[(&str, &str)] = &[
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("gif", "image/gif"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("ico", "image/x-icon"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("txt", "text/plain"),
    ("wasm", "application/wasm"),
    ("webp", "image/webp"),
    ("xml", "application/xml"),
    ("yaml", "text/x-yaml"),
    ("yml", "text/x-yaml"),
];

/// Extension to content type registry.
#[derive(Debug, Clone)]
pub struct MimeTypes {
    by_ext: HashMap<String, String>,
    default: String,
}

impl Default for MimeTypes {
    fn default() -> Self {
        Self::from_config(&MimeConfig::default())
    }
}

impl MimeTypes {
    /// Built-in table extended with configured overrides.
    pub fn from_config(config: &MimeConfig) -> Self {
        let mut by_ext: HashMap<String, String> = BUILTIN
            .iter()
            .map(|(ext, ty)| (ext.to_string(), ty.to_string()))
            .collect();
        for (ext, ty) in &config.types {
            by_ext.insert(ext.trim_start_matches('.').to_ascii_lowercase(), ty.clone());
        }
        Self {
            by_ext,
            default: config.default.clone(),
        }
    }

    /// Register or override one extension.
    pub fn add(&mut self, ext: &str, content_type: impl Into<String>) {
        self.by_ext.insert(
            ext.trim_start_matches('.').to_ascii_lowercase(),
            content_type.into(),
        );
    }

    /// Content type for an extension, if known.
    pub fn for_name(&self, ext: &str) -> Option<&str> {
        self.by_ext
            .get(&ext.trim_start_matches('.').to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Content type for a file path, falling back to the default.
    pub fn for_file(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.for_name(ext))
            .unwrap_or(&self.default)
    }

    pub fn default_type(&self) -> &str {
        &self.default
    }
}
