//! The App: one application's routes, hooks, engines and plugins.
//!
//! # Responsibilities
//! - Declare routes under the current prefix
//! - Register hooks against the App or its live candidates
//! - Own lazily built engines and registered plugins
//!
//! # Design Decisions
//! - Everything is declared through `&mut App`, then the App is frozen in an
//!   `Arc` and handed to a [`Dispatcher`]
//! - Engines are the exception: they are built on first use through `&App`
//! - Candidate order for hooks: file handler, built engines, plugins

use axum::http::Method;
use std::fmt;
use std::panic::{AssertUnwindSafe, Location};
use std::sync::Arc;

use crate::config::loader::ConfigError;
use crate::config::schema::{AppConfig, AppSettings};
use crate::config::validation::validate_config;
use crate::dispatch::{Content, Context, Dispatcher, Flow};
use crate::engine::{
    Engine, EngineKind, Engines, LogLevel, LoggerEngine, SerializerEngine, SessionEngine,
    TemplateEngine,
};
use crate::error::{Error, Result};
use crate::handlers::FileHandler;
use crate::hooks::{AsHookable, Hook, HookArgs, HookRegistry, Hookable, Registration};
use crate::http::MimeTypes;
use crate::plugin::Plugin;
use crate::routing::{HandlerFn, Matcher, PrefixScope, Route, RouteTable, METHODS};

/// A web application under construction, or frozen inside a dispatcher.
pub struct App {
    config: AppConfig,
    routes: RouteTable,
    prefix: PrefixScope,
    hooks: HookRegistry,
    engines: Engines,
    plugins: Vec<Arc<dyn Plugin>>,
    file_handler: Arc<FileHandler>,
    mime: Arc<MimeTypes>,
}

impl App {
    /// An App with default settings and no engines.
    pub fn new(name: impl Into<String>) -> Self {
        let mut config = AppConfig::default();
        config.app.name = name.into();
        Self::build(config)
    }

    /// An App from a configuration, validated first.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(Self::build(config))
    }

    fn build(config: AppConfig) -> Self {
        let file_handler = FileHandler::new(config.app.public_dir.clone(), config.app.charset.clone());
        let mime = MimeTypes::from_config(&config.mime);
        let engines = Engines::new(config.engines.clone(), config.app.clone());
        tracing::debug!(app = %config.app.name, "App created");
        Self {
            routes: RouteTable::new(),
            prefix: PrefixScope::new(),
            hooks: HookRegistry::new(),
            engines,
            plugins: Vec::new(),
            file_handler: Arc::new(file_handler),
            mime: Arc::new(mime),
            config,
        }
    }

    /// Replace the content type registry.
    pub fn with_mime_types(mut self, mime: MimeTypes) -> Self {
        self.mime = Arc::new(mime);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.app.name
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> &AppSettings {
        &self.config.app
    }

    pub fn mime(&self) -> &MimeTypes {
        &self.mime
    }

    pub fn file_handler(&self) -> &Arc<FileHandler> {
        &self.file_handler
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// `content_type` with the App charset appended.
    pub fn text_content_type(&self, content_type: &str) -> String {
        format!("{content_type}; charset={}", self.config.app.charset)
    }

    /// Freeze the App for serving.
    pub fn into_dispatcher(self) -> Dispatcher {
        Dispatcher::new(Arc::new(self))
    }

    // Routes

    /// Register a route under the current prefix. `GET` also registers `HEAD`
    /// unless a `HEAD` route for the same pattern exists.
    pub fn add_route<F>(&mut self, method: Method, spec: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut Context) -> Flow<Content> + Send + Sync + 'static,
    {
        self.insert_route(method, spec, Vec::new(), Arc::new(handler))
    }

    /// Register a route that also requires every condition to match.
    pub fn add_route_when<F>(
        &mut self,
        method: Method,
        spec: &str,
        conditions: Vec<Box<dyn Matcher>>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(&mut Context) -> Flow<Content> + Send + Sync + 'static,
    {
        self.insert_route(method, spec, conditions, Arc::new(handler))
    }

    fn insert_route(
        &mut self,
        method: Method,
        spec: &str,
        conditions: Vec<Box<dyn Matcher>>,
        handler: HandlerFn,
    ) -> Result<()> {
        let route = Route::new(
            method.clone(),
            spec,
            self.prefix.current().map(str::to_string),
            self.prefix.apply(spec),
            handler,
            conditions,
        )?;
        let head = (method == Method::GET).then(|| route.with_method(Method::HEAD));
        self.routes.add(route)?;
        if let Some(head) = head {
            if !self.routes.route_exists(&head) {
                self.routes.add(head)?;
            }
        }
        Ok(())
    }

    pub fn get<F>(&mut self, spec: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut Context) -> Flow<Content> + Send + Sync + 'static,
    {
        self.add_route(Method::GET, spec, handler)
    }

    pub fn post<F>(&mut self, spec: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut Context) -> Flow<Content> + Send + Sync + 'static,
    {
        self.add_route(Method::POST, spec, handler)
    }

    pub fn put<F>(&mut self, spec: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut Context) -> Flow<Content> + Send + Sync + 'static,
    {
        self.add_route(Method::PUT, spec, handler)
    }

    pub fn del<F>(&mut self, spec: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut Context) -> Flow<Content> + Send + Sync + 'static,
    {
        self.add_route(Method::DELETE, spec, handler)
    }

    pub fn options<F>(&mut self, spec: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut Context) -> Flow<Content> + Send + Sync + 'static,
    {
        self.add_route(Method::OPTIONS, spec, handler)
    }

    pub fn patch<F>(&mut self, spec: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut Context) -> Flow<Content> + Send + Sync + 'static,
    {
        self.add_route(Method::PATCH, spec, handler)
    }

    /// One handler for several methods; an empty list means all of them.
    pub fn any<F>(&mut self, methods: &[Method], spec: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut Context) -> Flow<Content> + Send + Sync + 'static,
    {
        let handler: HandlerFn = Arc::new(handler);
        let methods = if methods.is_empty() { &METHODS[..] } else { methods };
        for method in methods {
            if *method == Method::HEAD && self.routes.exists(method, &self.prefix.apply(spec)) {
                continue;
            }
            self.insert_route(method.clone(), spec, Vec::new(), handler.clone())?;
        }
        Ok(())
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn route_exists(&self, route: &Route) -> bool {
        self.routes.route_exists(route)
    }

    // Prefix

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.current()
    }

    /// Replace the current prefix; `"/"` clears it.
    pub fn set_prefix(&mut self, prefix: &str) {
        self.prefix.set(prefix);
    }

    /// Declare routes under `segment` appended to the current prefix.
    ///
    /// The previous prefix is restored whatever `body` does, panics included.
    pub fn with_prefix<F>(&mut self, segment: &str, body: F) -> Result<()>
    where
        F: FnOnce(&mut App) -> Result<()>,
    {
        let previous = self.prefix.enter(segment);
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        self.prefix.restore(previous);
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(Error::Prefix {
                prefix: segment.to_string(),
                source: Box::new(source),
            }),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    // Hooks

    /// Register a hook. Names may be aliases; unknown types fail here.
    #[track_caller]
    pub fn add_hook(&mut self, hook: Hook) -> Result<Registration> {
        let caller = Location::caller();
        self.with_candidates(|candidates| self.hooks.add_hook(hook, candidates, caller))
    }

    #[track_caller]
    pub fn hook<F>(&mut self, name: &str, callback: F) -> Result<Registration>
    where
        F: Fn(&mut HookArgs<'_>) -> Flow<()> + Send + Sync + 'static,
    {
        self.add_hook(Hook::new(name, callback))
    }

    pub fn add_hook_alias(&mut self, alias: impl Into<String>, name: impl Into<String>) {
        self.hooks.add_alias(alias, name);
    }

    /// Run an event: App-owned events run here, others on the first live
    /// candidate declaring them.
    pub fn execute_hook(&self, name: &str, args: &mut HookArgs<'_>) -> Flow<()> {
        let name = self.hooks.resolve(name);
        if self.hooks.owns(name) {
            return self.hooks.run_own(name, args);
        }
        self.with_candidates(|candidates| {
            match candidates.iter().find(|c| c.supports_hook(name)) {
                Some(candidate) => candidate.execute_hook(name, args),
                None => {
                    tracing::debug!(hook = %name, "No live candidate for hook");
                    Ok(())
                }
            }
        })
    }

    /// Every event the App and its live candidates declare.
    pub fn supported_hooks(&self) -> Vec<String> {
        let mut names = self.hooks.supported().to_vec();
        self.with_candidates(|candidates| {
            for candidate in candidates {
                names.extend(candidate.supported_hooks().iter().cloned());
            }
        });
        names
    }

    fn with_candidates<R>(&self, f: impl FnOnce(&[&dyn Hookable]) -> R) -> R {
        let engines = self.engines.built();
        let mut candidates: Vec<&dyn Hookable> = vec![self.file_handler.as_hookable()];
        candidates.extend(engines.iter().map(Engine::as_hookable));
        candidates.extend(self.plugins.iter().map(|p| p.as_hookable()));
        f(&candidates)
    }

    // Engines

    /// Engine by kind name, built on first use.
    pub fn engine(&self, kind: &str) -> Result<Engine> {
        let kind: EngineKind = kind.parse()?;
        self.engines
            .get(kind, &self.hooks)?
            .ok_or(Error::MissingEngine(kind))
    }

    pub fn logger(&self) -> Result<Option<Arc<dyn LoggerEngine>>> {
        self.engines.logger(&self.hooks)
    }

    pub fn session_engine(&self) -> Result<Option<Arc<dyn SessionEngine>>> {
        self.engines.session(&self.hooks)
    }

    pub fn template_engine(&self) -> Result<Option<Arc<dyn TemplateEngine>>> {
        self.engines.template(&self.hooks)
    }

    pub fn serializer_engine(&self) -> Result<Option<Arc<dyn SerializerEngine>>> {
        self.engines.serializer(&self.hooks)
    }

    /// Install a pre-built engine in place of the configured one.
    pub fn set_engine(&mut self, engine: Engine) -> Result<()> {
        self.engines.install(engine, &self.hooks)
    }

    /// Log through the logger engine, or straight to `tracing` without one.
    pub fn log(&self, level: LogLevel, message: &str) -> Flow<()> {
        match self.logger()? {
            Some(logger) => logger.log(level, message),
            None => {
                let app = self.name();
                match level {
                    LogLevel::Core => tracing::trace!(app = %app, "{message}"),
                    LogLevel::Debug => tracing::debug!(app = %app, "{message}"),
                    LogLevel::Info => tracing::info!(app = %app, "{message}"),
                    LogLevel::Warning => tracing::warn!(app = %app, "{message}"),
                    LogLevel::Error => tracing::error!(app = %app, "{message}"),
                }
                Ok(())
            }
        }
    }

    // Plugins

    /// Add a plugin: merge its aliases, let it declare routes and hooks, then
    /// hand it every postponed hook addressed to it.
    ///
    /// When `on_register` fails the plugin is not registered and its aliases
    /// are withdrawn; routes it declared before failing stay.
    pub fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(Error::msg(format!(
                "plugin `{}` is already registered",
                plugin.name()
            )));
        }
        let previous_aliases = self.hooks.plugin_aliases();
        self.hooks.add_plugin_aliases(plugin.hook_aliases());
        if let Err(e) = plugin.on_register(self) {
            self.hooks.restore_plugin_aliases(previous_aliases);
            tracing::warn!(plugin = %plugin.name(), error = %e, "Plugin registration failed");
            return Err(e);
        }
        let claimed = plugin.claim_postponed(&self.hooks);
        self.plugins.push(plugin.clone());
        tracing::info!(plugin = %plugin.name(), claimed, "Plugin registered");
        Ok(())
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("name", &self.name())
            .field("routes", &self.routes.len())
            .field("prefix", &self.prefix.current())
            .field("engines", &self.engines)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
