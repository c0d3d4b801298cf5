//! Template engines.
//!
//! # Data Flow
//! ```text
//! process(view, tokens, layout)
//!     → engine.template.before_render (tokens)
//!     → render_view
//!     → engine.template.after_render (content)
//!     → [layout] engine.template.before_layout_render (tokens, content)
//!     → [layout] render_layout (content available as `content`)
//!     → [layout] engine.template.after_layout_render (full page)
//! ```
//!
//! # Design Decisions
//! - The hook pipeline lives in the trait; backends only render
//! - View names without an extension get the engine's default extension
//! - Layouts live under `layouts/`

use minijinja::Environment;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::schema::AppSettings;
use crate::dispatch::Flow;
use crate::error::Result;
use crate::hooks::{AsHookable, HookArgs, HookTable, HookType, Hookable};

pub const BEFORE_RENDER: &str = "engine.template.before_render";
pub const AFTER_RENDER: &str = "engine.template.after_render";
pub const BEFORE_LAYOUT_RENDER: &str = "engine.template.before_layout_render";
pub const AFTER_LAYOUT_RENDER: &str = "engine.template.after_layout_render";

/// A template backend.
pub trait TemplateEngine: Hookable + AsHookable {
    /// Render one view with the given tokens.
    fn render_view(&self, view: &str, tokens: &Map<String, Value>) -> Result<String>;

    /// Default layout, if any.
    fn layout(&self) -> Option<&str>;

    /// Whether a view exists.
    fn view_exists(&self, view: &str) -> bool;

    fn render_layout(&self, layout: &str, tokens: &Map<String, Value>, content: &str) -> Result<String> {
        let mut tokens = tokens.clone();
        tokens.insert("content".to_string(), Value::String(content.to_string()));
        self.render_view(&format!("layouts/{layout}"), &tokens)
    }

    /// Render `view`, wrapped in `layout` when one is given, running hooks.
    fn process(&self, view: &str, mut tokens: Map<String, Value>, layout: Option<&str>) -> Flow<String> {
        self.execute_hook(BEFORE_RENDER, &mut HookArgs::Tokens(&mut tokens))?;
        let mut content = self.render_view(view, &tokens)?;
        self.execute_hook(AFTER_RENDER, &mut HookArgs::Content(&mut content))?;

        let Some(layout) = layout else {
            return Ok(content);
        };

        self.execute_hook(
            BEFORE_LAYOUT_RENDER,
            &mut HookArgs::Layout {
                tokens: &mut tokens,
                content: &mut content,
            },
        )?;
        let mut full = self.render_layout(layout, &tokens, &content)?;
        self.execute_hook(AFTER_LAYOUT_RENDER, &mut HookArgs::Content(&mut full))?;
        Ok(full)
    }
}

/// Closed set of template variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateBackend {
    Minijinja,
}

impl TemplateBackend {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match super::normalize_tag(tag).as_str() {
            "minijinja" | "jinja" => Some(TemplateBackend::Minijinja),
            _ => None,
        }
    }

    /// Recognized options: `path`, `extension`, `layout`, and `templates`
    /// (a table of inline view name to source).
    pub fn build(self, options: &Map<String, Value>, settings: &AppSettings) -> Result<Arc<dyn TemplateEngine>> {
        match self {
            TemplateBackend::Minijinja => {
                let path = options
                    .get("path")
                    .and_then(Value::as_str)
                    .map(PathBuf::from)
                    .or_else(|| settings.views.clone());
                let mut engine = MinijinjaEngine::new(path);
                if let Some(ext) = options.get("extension").and_then(Value::as_str) {
                    engine = engine.with_extension(ext);
                }
                let layout = options
                    .get("layout")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| settings.layout.clone());
                if let Some(layout) = layout {
                    engine = engine.with_layout(layout);
                }
                if let Some(Value::Object(templates)) = options.get("templates") {
                    for (name, source) in templates {
                        if let Some(source) = source.as_str() {
                            engine = engine.with_template(name.clone(), source.to_string())?;
                        }
                    }
                }
                Ok(Arc::new(engine))
            }
        }
    }
}

pub const DEFAULT_EXTENSION: &str = "html";

/// Jinja-style templates through `minijinja`.
pub struct MinijinjaEngine {
    env: RwLock<Environment<'static>>,
    extension: String,
    layout: Option<String>,
    hooks: HookTable,
}

impl MinijinjaEngine {
    /// Views are loaded from `path` on demand when given.
    pub fn new(path: Option<PathBuf>) -> Self {
        let mut env = Environment::new();
        if let Some(path) = path {
            env.set_loader(minijinja::path_loader(path));
        }
        Self {
            env: RwLock::new(env),
            extension: DEFAULT_EXTENSION.to_string(),
            layout: None,
            hooks: HookTable::new([
                BEFORE_RENDER,
                AFTER_RENDER,
                BEFORE_LAYOUT_RENDER,
                AFTER_LAYOUT_RENDER,
            ]),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    /// Register an in-memory view. The name follows the same extension rule as lookups.
    pub fn with_template(self, name: String, source: String) -> Result<Self> {
        let name = self.view_name(&name);
        self.env.write().add_template_owned(name, source)?;
        Ok(self)
    }

    fn view_name(&self, view: &str) -> String {
        let view = view.trim_start_matches('/');
        let has_extension = view
            .rsplit('/')
            .next()
            .is_some_and(|file| file.contains('.'));
        if has_extension {
            view.to_string()
        } else {
            format!("{view}.{}", self.extension)
        }
    }
}

impl Hookable for MinijinjaEngine {
    fn hook_type(&self) -> HookType {
        HookType::Engine
    }

    fn candidate_name(&self) -> &str {
        "template"
    }

    fn hook_table(&self) -> &HookTable {
        &self.hooks
    }
}

impl TemplateEngine for MinijinjaEngine {
    fn render_view(&self, view: &str, tokens: &Map<String, Value>) -> Result<String> {
        let name = self.view_name(view);
        let env = self.env.read();
        let template = env.get_template(&name)?;
        Ok(template.render(tokens)?)
    }

    fn layout(&self) -> Option<&str> {
        self.layout.as_deref()
    }

    fn render_layout(&self, layout: &str, tokens: &Map<String, Value>, content: &str) -> Result<String> {
        let name = self.view_name(&format!("layouts/{layout}"));
        let env = self.env.read();
        let template = env.get_template(&name)?;
        // Rendered views are already escaped.
        let ctx = minijinja::context! {
            content => minijinja::Value::from_safe_string(content.to_string()),
            ..minijinja::Value::from_serialize(tokens)
        };
        Ok(template.render(ctx)?)
    }

    fn view_exists(&self, view: &str) -> bool {
        self.env.read().get_template(&self.view_name(view)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> MinijinjaEngine {
        MinijinjaEngine::new(None)
            .with_template("hello".into(), "Hello {{ name }}".into())
            .unwrap()
            .with_template("layouts/main".into(), "<b>{{ content }}</b>".into())
            .unwrap()
    }

    fn tokens(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_render_with_layout() {
        let out = engine()
            .process("hello", tokens(json!({"name": "Ann"})), Some("main"))
            .unwrap();
        assert_eq!(out, "<b>Hello Ann</b>");
    }

    #[test]
    fn test_hooks_run_in_order() {
        let engine = engine();
        engine.hook_table().register(
            BEFORE_RENDER,
            Arc::new(|args| {
                if let Some(tokens) = args.tokens() {
                    tokens.insert("name".into(), json!("Bob"));
                }
                Ok(())
            }),
        );
        engine.hook_table().register(
            AFTER_LAYOUT_RENDER,
            Arc::new(|args| {
                if let Some(page) = args.content() {
                    page.push('!');
                }
                Ok(())
            }),
        );
        let out = engine
            .process("hello.html", tokens(json!({"name": "Ann"})), Some("main"))
            .unwrap();
        assert_eq!(out, "<b>Hello Bob</b>!");
    }

    #[test]
    fn test_missing_view() {
        let engine = engine();
        assert!(engine.view_exists("hello"));
        assert!(!engine.view_exists("nope"));
        assert!(engine.process("nope", Map::new(), None).is_err());
    }

    #[test]
    fn test_backend_from_options() {
        let options = tokens(json!({
            "extension": "tt",
            "templates": {"index": "{{ 1 + 1 }}"}
        }));
        let engine = TemplateBackend::Minijinja
            .build(&options, &AppSettings::default())
            .unwrap();
        assert_eq!(engine.process("index", Map::new(), None).unwrap(), "2");
    }
}
