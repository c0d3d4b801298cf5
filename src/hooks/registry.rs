//! Hook resolution: aliases, App-owned events, live candidates, postponement.
//!
//! # Responsibilities
//! - Map alias names to canonical hook names
//! - Own the App-level events (`core.app.*`, `core.error.*`)
//! - Attach hooks to every live candidate that declares the event
//! - Remember every candidate-addressed hook so later candidates can claim it
//!
//! # Design Decisions
//! - Plugin aliases override App aliases; among plugins the last registered wins
//! - Postponement is unconditional: a hook attached to a live candidate is
//!   still stored, so a second candidate with the same key built later also
//!   receives it
//! - The postponed store is per App, never process-wide

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;

use crate::dispatch::Flow;
use crate::error::Result;
use crate::hooks::{
    Hook, HookArgs, HookFn, HookName, HookTable, HookType, Hookable, PostponedHook,
    AFTER_REQUEST, BEFORE_REQUEST, ERROR_AFTER, ERROR_BEFORE, ERROR_INIT, ROUTE_EXCEPTION,
};

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("before", BEFORE_REQUEST),
    ("before_request", BEFORE_REQUEST),
    ("after", AFTER_REQUEST),
    ("after_request", AFTER_REQUEST),
    ("on_route_exception", ROUTE_EXCEPTION),
    ("init_error", ERROR_INIT),
    ("before_error", ERROR_BEFORE),
    ("after_error", ERROR_AFTER),
    ("before_file_render", "handler.file.before_render"),
    ("after_file_render", "handler.file.after_render"),
    ("before_template_render", "engine.template.before_render"),
    ("after_template_render", "engine.template.after_render"),
    ("before_layout_render", "engine.template.before_layout_render"),
    ("after_layout_render", "engine.template.after_layout_render"),
    ("before_serializer", "engine.serializer.before"),
    ("after_serializer", "engine.serializer.after"),
];

/// Events every App owns directly.
pub const APP_EVENTS: [&str; 6] = [
    BEFORE_REQUEST,
    AFTER_REQUEST,
    ROUTE_EXCEPTION,
    ERROR_INIT,
    ERROR_BEFORE,
    ERROR_AFTER,
];

/// Outcome of one `add_hook` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Canonical name after alias resolution.
    pub name: String,
    /// Number of live candidates the hook was attached to.
    pub attached: usize,
    /// Whether the App itself owns the event.
    pub owned: bool,
}

type PostponedKey = (HookType, String);

/// Per-App hook registry.
pub struct HookRegistry {
    aliases: HashMap<String, String>,
    plugin_aliases: HashMap<String, String>,
    own: HookTable,
    postponed: Mutex<HashMap<PostponedKey, Vec<PostponedHook>>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            aliases: BUILTIN_ALIASES
                .iter()
                .map(|(alias, name)| (alias.to_string(), name.to_string()))
                .collect(),
            plugin_aliases: HashMap::new(),
            own: HookTable::new(APP_EVENTS),
            postponed: Mutex::new(HashMap::new()),
        }
    }

    /// Canonical name for `name`, or `name` itself when it is not an alias.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.plugin_aliases
            .get(name)
            .or_else(|| self.aliases.get(name))
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Register an App-level alias.
    pub fn add_alias(&mut self, alias: impl Into<String>, name: impl Into<String>) {
        self.aliases.insert(alias.into(), name.into());
    }

    /// Merge a plugin's alias table; later plugins overwrite earlier ones.
    pub fn add_plugin_aliases<I, A, N>(&mut self, aliases: I)
    where
        I: IntoIterator<Item = (A, N)>,
        A: Into<String>,
        N: Into<String>,
    {
        for (alias, name) in aliases {
            self.plugin_aliases.insert(alias.into(), name.into());
        }
    }

    pub(crate) fn plugin_aliases(&self) -> HashMap<String, String> {
        self.plugin_aliases.clone()
    }

    pub(crate) fn restore_plugin_aliases(&mut self, aliases: HashMap<String, String>) {
        self.plugin_aliases = aliases;
    }

    /// Whether the App owns this (already resolved) event.
    pub fn owns(&self, name: &str) -> bool {
        self.own.supports(name)
    }

    pub fn supported(&self) -> &[String] {
        self.own.supported()
    }

    /// Number of callbacks on an App-owned event.
    pub fn count(&self, name: &str) -> usize {
        self.own.count(self.resolve(name))
    }

    /// Run an App-owned event.
    pub fn run_own(&self, name: &str, args: &mut HookArgs<'_>) -> Flow<()> {
        self.own.run(self.resolve(name), args)
    }

    /// Register a hook.
    ///
    /// `candidates` is the live candidate set in walk order: hook-aware route
    /// handlers, built engines, registered plugins.
    pub fn add_hook(
        &self,
        hook: Hook,
        candidates: &[&dyn Hookable],
        caller: &'static Location<'static>,
    ) -> Result<Registration> {
        let name = self.resolve(hook.name()).to_string();

        if self.owns(&name) {
            let callback = if name == BEFORE_REQUEST || name == AFTER_REQUEST {
                skip_when_halted(hook.callback().clone())
            } else {
                hook.callback().clone()
            };
            self.own.register(&name, callback);
            tracing::debug!(hook = %name, "Registered App hook");
            return Ok(Registration {
                name,
                attached: 0,
                owned: true,
            });
        }

        let parsed = HookName::parse(&name)?;
        let hook = hook.renamed(name.clone());

        let mut attached = 0;
        for candidate in candidates {
            if candidate.claims(&parsed)
                && candidate.supports_hook(&name)
                && candidate.hook_table().register(&name, hook.callback().clone())
            {
                attached += 1;
            }
        }

        self.postponed
            .lock()
            .entry((parsed.kind(), parsed.candidate().to_string()))
            .or_default()
            .push(PostponedHook { hook, caller });

        tracing::debug!(
            hook = %name,
            attached,
            caller = %format_args!("{}:{}", caller.file(), caller.line()),
            "Registered hook"
        );

        Ok(Registration {
            name,
            attached,
            owned: false,
        })
    }

    /// Remove and return every hook stored for `(kind, candidate)`.
    pub fn take_postponed(&self, kind: HookType, candidate: &str) -> Vec<PostponedHook> {
        self.postponed
            .lock()
            .remove(&(kind, candidate.to_string()))
            .unwrap_or_default()
    }

    /// Number of hooks still waiting for `(kind, candidate)`.
    pub fn postponed_count(&self, kind: HookType, candidate: &str) -> usize {
        self.postponed
            .lock()
            .get(&(kind, candidate.to_string()))
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("own", &self.own)
            .field("plugin_aliases", &self.plugin_aliases.len())
            .field("postponed", &self.postponed.lock().len())
            .finish()
    }
}

/// Before/after request callbacks do nothing once the response is halted.
fn skip_when_halted(callback: HookFn) -> HookFn {
    Arc::new(move |args: &mut HookArgs<'_>| {
        if args.response().map(|r| r.is_halted()).unwrap_or(false) {
            return Ok(());
        }
        callback(args)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::hooks::HookTable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Widget {
        name: &'static str,
        table: HookTable,
    }

    impl Widget {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                table: HookTable::new([format!("plugin.{name}.fired")]),
            }
        }
    }

    impl Hookable for Widget {
        fn hook_type(&self) -> HookType {
            HookType::Plugin
        }

        fn candidate_name(&self) -> &str {
            self.name
        }

        fn hook_table(&self) -> &HookTable {
            &self.table
        }
    }

    fn counting_hook(name: &str, counter: &Arc<AtomicUsize>) -> Hook {
        let counter = counter.clone();
        Hook::new(name, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_alias_resolution() {
        let mut registry = HookRegistry::new();
        assert_eq!(registry.resolve("before"), BEFORE_REQUEST);
        assert_eq!(registry.resolve("unknown"), "unknown");

        registry.add_alias("render", "engine.template.before_render");
        registry.add_plugin_aliases([("render", "plugin.ajax.render")]);
        assert_eq!(registry.resolve("render"), "plugin.ajax.render");
    }

    #[test]
    fn test_app_owned_event() {
        let registry = HookRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let reg = registry
            .add_hook(counting_hook("init_error", &counter), &[], Location::caller())
            .unwrap();
        assert!(reg.owned);
        assert_eq!(reg.name, ERROR_INIT);

        registry.run_own(ERROR_INIT, &mut HookArgs::None).unwrap();
        registry.run_own("init_error", &mut HookArgs::None).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_attaches_live_and_postpones() {
        let registry = HookRegistry::new();
        let live = Widget::new("ajax");
        let other = Widget::new("rss");
        let counter = Arc::new(AtomicUsize::new(0));

        let reg = registry
            .add_hook(
                counting_hook("plugin.ajax.fired", &counter),
                &[&live, &other],
                Location::caller(),
            )
            .unwrap();
        assert_eq!(reg.attached, 1);
        assert_eq!(registry.postponed_count(HookType::Plugin, "ajax"), 1);

        live.execute_hook("plugin.ajax.fired", &mut HookArgs::None)
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let late = Widget::new("ajax");
        assert_eq!(late.claim_postponed(&registry), 1);
        assert_eq!(registry.postponed_count(HookType::Plugin, "ajax"), 0);
        late.execute_hook("plugin.ajax.fired", &mut HookArgs::None)
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rejects_bad_names() {
        let registry = HookRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let err = registry
            .add_hook(counting_hook("lunch", &counter), &[], Location::caller())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedHookName(_)));

        let err = registry
            .add_hook(
                counting_hook("widget.button.click", &counter),
                &[],
                Location::caller(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownHookType { .. }));
    }
}
