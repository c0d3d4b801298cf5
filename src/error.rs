//! Error types for the dispatch core.
//!
//! # Taxonomy
//! - Configuration errors (hook names, engine types, duplicate routes):
//!   returned at build time, fatal to startup
//! - Dispatch failures (hooks, handlers): tagged with the failing position
//! - Missing subsystems: an engine was needed but none is configured
//!
//! Control escapes (`halt`, `redirect`, `pass`, `forward`) are not errors and
//! never appear here; see [`crate::dispatch::Signal`].

use axum::http::Method;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::engine::EngineKind;

/// A boxed error type for failures coming from application code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Hook name is not a known event and does not split into `type.candidate.event`.
    #[error("malformed hook name `{0}` (expected `type.candidate.event`)")]
    MalformedHookName(String),

    /// Hook type is not one of core, engine, handler, plugin.
    #[error("unknown hook type `{kind}` in hook `{name}`")]
    UnknownHookType { name: String, kind: String },

    /// Engine kind is not one of logger, session, template, serializer.
    #[error("unknown engine kind `{0}`")]
    UnknownEngine(String),

    /// Engine type tag does not name a known variant for its kind.
    #[error("invalid {kind} engine type `{name}`")]
    InvalidEngineType { kind: EngineKind, name: String },

    /// A route with the same method and fully-prefixed pattern already exists.
    #[error("route already registered: {method} {spec}")]
    DuplicateRoute { method: Method, spec: String },

    /// Route pattern failed to compile.
    #[error("invalid route pattern `{spec}`: {reason}")]
    InvalidRoutePattern { spec: String, reason: String },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An engine was required but none is configured.
    #[error("no {0} engine configured")]
    MissingEngine(EngineKind),

    /// A hook callback failed.
    #[error("hook `{position}` failed: {source}")]
    Hook {
        position: String,
        #[source]
        source: Box<Error>,
    },

    /// A route handler failed.
    #[error("handler for `{route}` failed: {source}")]
    Handler {
        route: String,
        #[source]
        source: Box<Error>,
    },

    /// Route declarations under a prefix failed.
    #[error("while declaring routes under prefix `{prefix}`: {source}")]
    Prefix {
        prefix: String,
        #[source]
        source: Box<Error>,
    },

    /// Forward chain grew past the configured hop limit.
    #[error("forward to `{path}` exceeds the limit of {max} hops")]
    ForwardLimit { path: String, max: usize },

    /// Forward target was already visited with the same parameters.
    #[error("forward loop detected at {method} {path}")]
    ForwardLoop { method: Method, path: String },

    /// A control signal was raised where no dispatch can receive it.
    #[error("control signal `{0}` raised outside of a dispatch")]
    StraySignal(&'static str),

    /// Template rendering failed.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Serializer failed.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// Header name or value rejected by the HTTP layer.
    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    /// Redirect target or base URL could not be resolved.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Custom(BoxError),
}

impl Error {
    /// Creates an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }

    /// Wraps an arbitrary application error.
    pub fn custom<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Custom(err.into())
    }

    /// Returns true for errors that abort application startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MalformedHookName(_)
                | Error::UnknownHookType { .. }
                | Error::UnknownEngine(_)
                | Error::InvalidEngineType { .. }
                | Error::DuplicateRoute { .. }
                | Error::InvalidRoutePattern { .. }
                | Error::Config(_)
        )
    }

    /// Strips `Hook`/`Handler`/`Prefix` tags down to the original failure.
    pub fn root(&self) -> &Error {
        match self {
            Error::Hook { source, .. }
            | Error::Handler { source, .. }
            | Error::Prefix { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialize(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_tags() {
        let err = Error::Handler {
            route: "GET /".into(),
            source: Box::new(Error::Hook {
                position: "engine.template.before_render".into(),
                source: Box::new(Error::msg("boom")),
            }),
        };
        assert!(matches!(err.root(), Error::Message(m) if m == "boom"));
        assert!(err.to_string().contains("GET /"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::MalformedHookName("x".into()).is_configuration());
        assert!(Error::UnknownEngine("db".into()).is_configuration());
        assert!(!Error::MissingEngine(EngineKind::Session).is_configuration());
        assert!(!Error::msg("runtime").is_configuration());
    }
}
