//! Subsystem engines: logger, session, template, serializer.
//!
//! # Data Flow
//! ```text
//! [engines.<kind>] type = "...", options = {...}
//!     → EngineSpec::resolve (type tag → closed backend enum)
//!     → first use: backend.build(scoped options)
//!     → Hookable::claim_postponed (hooks declared before the engine existed)
//!     → cached for the lifetime of the App
//! ```
//!
//! # Design Decisions
//! - Each kind is built at most once per App, on first use
//! - Type tags resolve at config validation time, never per request
//! - Engines hold no per-request state; the Context passes what they need
//! - Pre-built instances can be installed before first use

pub mod logger;
pub mod serializer;
pub mod session;
pub mod template;

use once_cell::sync::OnceCell;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::schema::{AppSettings, EngineConfig, EnginesConfig};
use crate::error::{Error, Result};
use crate::hooks::{HookRegistry, Hookable};

pub use logger::{LogLevel, LoggerBackend, LoggerEngine};
pub use serializer::{SerializerBackend, SerializerEngine};
pub use session::{Session, SessionBackend, SessionEngine};
pub use template::{TemplateBackend, TemplateEngine};

/// The four engine kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Logger,
    Session,
    Template,
    Serializer,
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Logger,
        EngineKind::Session,
        EngineKind::Template,
        EngineKind::Serializer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Logger => "logger",
            EngineKind::Session => "session",
            EngineKind::Template => "template",
            EngineKind::Serializer => "serializer",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EngineKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownEngine(s.to_string()))
    }
}

/// Lowercase and drop separators so `MiniJinja`, `mini_jinja` and `minijinja` agree.
pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// A resolved engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSpec {
    Logger(LoggerBackend),
    Session(SessionBackend),
    Template(TemplateBackend),
    Serializer(SerializerBackend),
}

impl EngineSpec {
    /// Map a config type tag to a backend for `kind`.
    pub fn resolve(kind: EngineKind, config: &EngineConfig) -> Result<Self> {
        let tag = config.kind.as_str();
        let spec = match kind {
            EngineKind::Logger => LoggerBackend::from_tag(tag).map(EngineSpec::Logger),
            EngineKind::Session => SessionBackend::from_tag(tag).map(EngineSpec::Session),
            EngineKind::Template => TemplateBackend::from_tag(tag).map(EngineSpec::Template),
            EngineKind::Serializer => SerializerBackend::from_tag(tag).map(EngineSpec::Serializer),
        };
        spec.ok_or_else(|| Error::InvalidEngineType {
            kind,
            name: config.kind.clone(),
        })
    }
}

/// A built engine of any kind.
#[derive(Clone)]
pub enum Engine {
    Logger(Arc<dyn LoggerEngine>),
    Session(Arc<dyn SessionEngine>),
    Template(Arc<dyn TemplateEngine>),
    Serializer(Arc<dyn SerializerEngine>),
}

impl Engine {
    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::Logger(_) => EngineKind::Logger,
            Engine::Session(_) => EngineKind::Session,
            Engine::Template(_) => EngineKind::Template,
            Engine::Serializer(_) => EngineKind::Serializer,
        }
    }

    pub fn as_hookable(&self) -> &dyn Hookable {
        match self {
            Engine::Logger(e) => e.as_hookable(),
            Engine::Session(e) => e.as_hookable(),
            Engine::Template(e) => e.as_hookable(),
            Engine::Serializer(e) => e.as_hookable(),
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Engine").field(&self.kind()).finish()
    }
}

/// Lazily built engines of one App.
pub struct Engines {
    config: EnginesConfig,
    settings: AppSettings,
    logger: OnceCell<Arc<dyn LoggerEngine>>,
    session: OnceCell<Arc<dyn SessionEngine>>,
    template: OnceCell<Arc<dyn TemplateEngine>>,
    serializer: OnceCell<Arc<dyn SerializerEngine>>,
}

/// Return the cached engine, or build it from config on first use.
fn lazy<T: ?Sized>(
    cell: &OnceCell<Arc<T>>,
    config: Option<&EngineConfig>,
    build: impl FnOnce(&EngineConfig) -> Result<Arc<T>>,
) -> Result<Option<Arc<T>>> {
    if let Some(engine) = cell.get() {
        return Ok(Some(engine.clone()));
    }
    let Some(config) = config else {
        return Ok(None);
    };
    cell.get_or_try_init(|| build(config))
        .map(|engine| Some(engine.clone()))
}

impl Engines {
    pub fn new(config: EnginesConfig, settings: AppSettings) -> Self {
        Self {
            config,
            settings,
            logger: OnceCell::new(),
            session: OnceCell::new(),
            template: OnceCell::new(),
            serializer: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &EnginesConfig {
        &self.config
    }

    /// Whether `kind` is configured or was installed pre-built.
    pub fn is_configured(&self, kind: EngineKind) -> bool {
        self.config.get(kind).is_some()
            || match kind {
                EngineKind::Logger => self.logger.get().is_some(),
                EngineKind::Session => self.session.get().is_some(),
                EngineKind::Template => self.template.get().is_some(),
                EngineKind::Serializer => self.serializer.get().is_some(),
            }
    }

    pub fn logger(&self, hooks: &HookRegistry) -> Result<Option<Arc<dyn LoggerEngine>>> {
        lazy(&self.logger, self.config.logger.as_ref(), |config| {
            let EngineSpec::Logger(backend) = EngineSpec::resolve(EngineKind::Logger, config)? else {
                return Err(Error::UnknownEngine(config.kind.clone()));
            };
            let engine = backend.build(&config.scoped_options(), &self.settings.name)?;
            announce(EngineKind::Logger, config, engine.as_hookable(), hooks);
            Ok(engine)
        })
    }

    pub fn session(&self, hooks: &HookRegistry) -> Result<Option<Arc<dyn SessionEngine>>> {
        lazy(&self.session, self.config.session.as_ref(), |config| {
            let EngineSpec::Session(backend) = EngineSpec::resolve(EngineKind::Session, config)? else {
                return Err(Error::UnknownEngine(config.kind.clone()));
            };
            let engine = backend.build(&config.scoped_options())?;
            announce(EngineKind::Session, config, engine.as_hookable(), hooks);
            Ok(engine)
        })
    }

    pub fn template(&self, hooks: &HookRegistry) -> Result<Option<Arc<dyn TemplateEngine>>> {
        lazy(&self.template, self.config.template.as_ref(), |config| {
            let EngineSpec::Template(backend) = EngineSpec::resolve(EngineKind::Template, config)? else {
                return Err(Error::UnknownEngine(config.kind.clone()));
            };
            let engine = backend.build(&config.scoped_options(), &self.settings)?;
            announce(EngineKind::Template, config, engine.as_hookable(), hooks);
            Ok(engine)
        })
    }

    pub fn serializer(&self, hooks: &HookRegistry) -> Result<Option<Arc<dyn SerializerEngine>>> {
        lazy(&self.serializer, self.config.serializer.as_ref(), |config| {
            let EngineSpec::Serializer(backend) = EngineSpec::resolve(EngineKind::Serializer, config)? else {
                return Err(Error::UnknownEngine(config.kind.clone()));
            };
            let engine = backend.build(&config.scoped_options())?;
            announce(EngineKind::Serializer, config, engine.as_hookable(), hooks);
            Ok(engine)
        })
    }

    /// Engine of any kind; `None` when the kind is not configured.
    pub fn get(&self, kind: EngineKind, hooks: &HookRegistry) -> Result<Option<Engine>> {
        Ok(match kind {
            EngineKind::Logger => self.logger(hooks)?.map(Engine::Logger),
            EngineKind::Session => self.session(hooks)?.map(Engine::Session),
            EngineKind::Template => self.template(hooks)?.map(Engine::Template),
            EngineKind::Serializer => self.serializer(hooks)?.map(Engine::Serializer),
        })
    }

    /// Install a pre-built engine. Fails if that kind was already built.
    pub fn install(&self, engine: Engine, hooks: &HookRegistry) -> Result<()> {
        let kind = engine.kind();
        let installed = match engine.clone() {
            Engine::Logger(e) => self.logger.set(e).is_ok(),
            Engine::Session(e) => self.session.set(e).is_ok(),
            Engine::Template(e) => self.template.set(e).is_ok(),
            Engine::Serializer(e) => self.serializer.set(e).is_ok(),
        };
        if !installed {
            return Err(Error::msg(format!("{kind} engine already built")));
        }
        let claimed = engine.as_hookable().claim_postponed(hooks);
        tracing::debug!(engine = %kind, claimed, "Pre-built engine installed");
        Ok(())
    }

    /// Engines built so far, in kind order.
    pub fn built(&self) -> Vec<Engine> {
        let mut built = Vec::new();
        if let Some(e) = self.logger.get() {
            built.push(Engine::Logger(e.clone()));
        }
        if let Some(e) = self.session.get() {
            built.push(Engine::Session(e.clone()));
        }
        if let Some(e) = self.template.get() {
            built.push(Engine::Template(e.clone()));
        }
        if let Some(e) = self.serializer.get() {
            built.push(Engine::Serializer(e.clone()));
        }
        built
    }
}

impl fmt::Debug for Engines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engines")
            .field("config", &self.config)
            .field("built", &self.built())
            .finish()
    }
}

fn announce(kind: EngineKind, config: &EngineConfig, engine: &dyn Hookable, hooks: &HookRegistry) {
    let claimed = engine.claim_postponed(hooks);
    tracing::info!(engine = %kind, backend = %config.kind, claimed, "Engine built");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{Hook, HookArgs};
    use std::panic::Location;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_kind_parse() {
        assert_eq!("template".parse::<EngineKind>().unwrap(), EngineKind::Template);
        assert!(matches!(
            "database".parse::<EngineKind>(),
            Err(Error::UnknownEngine(name)) if name == "database"
        ));
    }

    #[test]
    fn test_resolve_tags() {
        let spec = EngineSpec::resolve(EngineKind::Template, &EngineConfig::new("MiniJinja")).unwrap();
        assert_eq!(spec, EngineSpec::Template(TemplateBackend::Minijinja));
        let err = EngineSpec::resolve(EngineKind::Session, &EngineConfig::new("json")).unwrap_err();
        assert!(matches!(err, Error::InvalidEngineType { kind: EngineKind::Session, .. }));
    }

    #[test]
    fn test_built_once_and_claims_postponed() {
        let hooks = HookRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        hooks
            .add_hook(
                Hook::new("engine.serializer.after", move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
                &[],
                Location::caller(),
            )
            .unwrap();

        let config = EnginesConfig {
            serializer: Some(EngineConfig::new("json")),
            ..EnginesConfig::default()
        };
        let engines = Engines::new(config, AppSettings::default());
        assert!(engines.built().is_empty());

        let first = engines.serializer(&hooks).unwrap().unwrap();
        let second = engines.serializer(&hooks).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.serialize(&serde_json::json!([1])).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(first.hook_table().count("engine.serializer.after"), 1);
        assert!(first
            .execute_hook("engine.serializer.before", &mut HookArgs::None)
            .is_ok());
    }

    #[test]
    fn test_unconfigured_is_none() {
        let engines = Engines::new(EnginesConfig::default(), AppSettings::default());
        let hooks = HookRegistry::new();
        assert!(engines.session(&hooks).unwrap().is_none());
        assert!(!engines.is_configured(EngineKind::Session));
    }
}
