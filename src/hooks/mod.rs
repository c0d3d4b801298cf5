//! Hook subsystem.
//!
//! # Data Flow
//! ```text
//! add_hook(name, callback)
//!     → registry.rs (alias resolution, App-owned events)
//!     → table.rs (live candidates: handlers, engines, plugins)
//!     → registry.rs (postponed store keyed by (type, candidate))
//!
//! Candidate constructed later:
//!     → Hookable::claim_postponed drains its key exactly once
//! ```
//!
//! # Design Decisions
//! - Hook names are `type.candidate.event`, or an event the App owns
//! - Callbacks run in registration order per event
//! - Callbacks return `Flow<()>` so they can halt, redirect or fail
//! - Postponed hooks live on the App, never in global state

pub mod registry;
pub mod table;

use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::dispatch::{Context, ErrorReport, Flow};
use crate::engine::logger::LogLevel;
use crate::error::{Error, Result};
use crate::http::Response;

pub use registry::{HookRegistry, Registration};
pub use table::{AsHookable, HookTable, Hookable};

/// Events owned directly by every App.
pub const BEFORE_REQUEST: &str = "core.app.before_request";
pub const AFTER_REQUEST: &str = "core.app.after_request";
pub const ROUTE_EXCEPTION: &str = "core.app.route_exception";
pub const ERROR_INIT: &str = "core.error.init";
pub const ERROR_BEFORE: &str = "core.error.before";
pub const ERROR_AFTER: &str = "core.error.after";

/// The owner category encoded in the first part of a hook name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    Core,
    Engine,
    Handler,
    Plugin,
}

impl HookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::Core => "core",
            HookType::Engine => "engine",
            HookType::Handler => "handler",
            HookType::Plugin => "plugin",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "core" => Ok(HookType::Core),
            "engine" => Ok(HookType::Engine),
            "handler" => Ok(HookType::Handler),
            "plugin" => Ok(HookType::Plugin),
            _ => Err(()),
        }
    }
}

/// A parsed `type.candidate.event` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookName {
    full: String,
    kind: HookType,
    candidate: String,
    event: String,
}

impl HookName {
    pub fn parse(name: &str) -> Result<Self> {
        let mut parts = name.splitn(3, '.');
        let (kind, candidate, event) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(c), Some(e)) if !k.is_empty() && !c.is_empty() && !e.is_empty() => {
                (k, c, e)
            }
            _ => return Err(Error::MalformedHookName(name.to_string())),
        };
        let kind = kind.parse().map_err(|_| Error::UnknownHookType {
            name: name.to_string(),
            kind: kind.to_string(),
        })?;
        Ok(Self {
            full: name.to_string(),
            kind,
            candidate: candidate.to_string(),
            event: event.to_string(),
        })
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn kind(&self) -> HookType {
        self.kind
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Arguments handed to a hook callback. Which variant arrives depends on the event.
pub enum HookArgs<'a> {
    /// `core.app.before_request`, `core.app.after_request`.
    Context(&'a mut Context),
    /// `core.app.route_exception`.
    Failure {
        context: &'a mut Context,
        error: &'a Error,
    },
    /// `core.error.*`.
    Error(&'a mut ErrorReport),
    /// `engine.template.before_render`.
    Tokens(&'a mut Map<String, Value>),
    /// `engine.template.before_layout_render`.
    Layout {
        tokens: &'a mut Map<String, Value>,
        content: &'a mut String,
    },
    /// `engine.template.after_*`, `engine.serializer.after`.
    Content(&'a mut String),
    /// `engine.serializer.before` and plugin events.
    Data(&'a mut Value),
    /// `engine.logger.before`.
    Log {
        level: LogLevel,
        message: &'a mut String,
    },
    /// `handler.file.before_render`.
    File(&'a mut PathBuf),
    /// `handler.file.after_render`.
    Response(&'a mut Response),
    /// Events with nothing to pass.
    None,
}

impl<'a> HookArgs<'a> {
    pub fn context(&mut self) -> Option<&mut Context> {
        match self {
            HookArgs::Context(ctx) => Some(&mut **ctx),
            HookArgs::Failure { context, .. } => Some(&mut **context),
            _ => None,
        }
    }

    pub fn tokens(&mut self) -> Option<&mut Map<String, Value>> {
        match self {
            HookArgs::Tokens(tokens) | HookArgs::Layout { tokens, .. } => Some(&mut **tokens),
            _ => None,
        }
    }

    pub fn content(&mut self) -> Option<&mut String> {
        match self {
            HookArgs::Content(content) | HookArgs::Layout { content, .. } => Some(&mut **content),
            HookArgs::Log { message, .. } => Some(&mut **message),
            _ => None,
        }
    }

    pub fn data(&mut self) -> Option<&mut Value> {
        match self {
            HookArgs::Data(data) => Some(&mut **data),
            _ => None,
        }
    }

    pub fn response(&mut self) -> Option<&mut Response> {
        match self {
            HookArgs::Context(ctx) => Some(ctx.response_mut()),
            HookArgs::Response(response) => Some(&mut **response),
            _ => None,
        }
    }

    pub fn error_report(&mut self) -> Option<&mut ErrorReport> {
        match self {
            HookArgs::Error(report) => Some(&mut **report),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Error> {
        match self {
            HookArgs::Failure { error, .. } => Some(*error),
            _ => None,
        }
    }

    pub fn file(&mut self) -> Option<&mut PathBuf> {
        match self {
            HookArgs::File(path) => Some(&mut **path),
            _ => None,
        }
    }
}

/// A hook callback.
pub type HookFn = Arc<dyn Fn(&mut HookArgs<'_>) -> Flow<()> + Send + Sync>;

/// A named callback, before alias resolution.
#[derive(Clone)]
pub struct Hook {
    name: String,
    callback: HookFn,
}

impl Hook {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut HookArgs<'_>) -> Flow<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    pub fn from_fn(name: impl Into<String>, callback: HookFn) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callback(&self) -> &HookFn {
        &self.callback
    }

    pub(crate) fn renamed(self, name: String) -> Self {
        Self { name, ..self }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("name", &self.name).finish()
    }
}

/// A hook waiting for its candidate to be constructed.
#[derive(Clone)]
pub struct PostponedHook {
    pub hook: Hook,
    pub caller: &'static Location<'static>,
}

impl fmt::Debug for PostponedHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostponedHook")
            .field("name", &self.hook.name)
            .field("caller", &format_args!("{}:{}", self.caller.file(), self.caller.line()))
            .finish()
    }
}
