//! Trellis: the dispatch core of a small web framework.
//!
//! An [`App`] collects routes, hooks, engines and plugins. Once declared it
//! is frozen into a [`Dispatcher`], which runs requests through the route
//! table with `halt`, `redirect`, `pass` and `forward` available to handlers
//! and hooks as explicit [`Signal`]s.

pub mod app;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod hooks;
pub mod http;
pub mod observability;
pub mod plugin;
pub mod routing;

pub use app::App;
pub use config::schema::AppConfig;
pub use dispatch::{Content, Context, Dispatcher, Flow, Interrupt, Signal};
pub use engine::{Engine, EngineKind, LogLevel};
pub use error::{Error, Result};
pub use handlers::SendFileOptions;
pub use hooks::{Hook, HookArgs, HookTable, HookType, Hookable};
pub use http::{Cookie, HttpServer, Params, Request, Response};
pub use plugin::Plugin;
