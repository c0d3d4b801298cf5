//! Per-owner hook storage and the `Hookable` candidate trait.
//!
//! # Responsibilities
//! - Store callbacks per event in registration order
//! - Reject events the owner does not declare
//! - Run an event's callbacks, tagging failures with the event name
//!
//! # Design Decisions
//! - Tables are behind a lock because engines are built lazily through `&App`
//! - Callbacks are cloned out before running so a callback never runs under the lock

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

use crate::dispatch::{Flow, Interrupt};
use crate::error::Error;
use crate::hooks::{HookArgs, HookFn, HookName, HookRegistry, HookType};

/// Ordered callbacks per supported event.
pub struct HookTable {
    supported: Vec<String>,
    hooks: RwLock<HashMap<String, Vec<HookFn>>>,
}

impl HookTable {
    /// A table accepting exactly the given fully-qualified event names.
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: supported.into_iter().map(Into::into).collect(),
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// A table that supports no events.
    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    pub fn supports(&self, name: &str) -> bool {
        self.supported.iter().any(|s| s == name)
    }

    /// Append a callback. Returns false when the event is not supported.
    pub fn register(&self, name: &str, callback: HookFn) -> bool {
        if !self.supports(name) {
            return false;
        }
        self.hooks
            .write()
            .entry(name.to_string())
            .or_default()
            .push(callback);
        true
    }

    /// Number of callbacks registered for an event.
    pub fn count(&self, name: &str) -> usize {
        self.hooks.read().get(name).map(Vec::len).unwrap_or(0)
    }

    /// Run every callback for `name` in order.
    ///
    /// The first failure stops the remaining callbacks and comes back wrapped
    /// as [`Error::Hook`]; control signals pass through untouched.
    pub fn run(&self, name: &str, args: &mut HookArgs<'_>) -> Flow<()> {
        let callbacks = match self.hooks.read().get(name) {
            Some(list) => list.clone(),
            None => return Ok(()),
        };
        for callback in callbacks {
            callback(args).map_err(|interrupt| match interrupt {
                Interrupt::Failure(source) => {
                    tracing::warn!(hook = %name, error = %source, "Hook failed");
                    Interrupt::Failure(Error::Hook {
                        position: name.to_string(),
                        source: Box::new(source),
                    })
                }
                signal => signal,
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .hooks
            .read()
            .iter()
            .map(|(name, list)| (name.clone(), list.len()))
            .collect();
        f.debug_struct("HookTable")
            .field("supported", &self.supported)
            .field("registered", &counts)
            .finish()
    }
}

/// Anything that can own hooks: route handlers, engines, plugins.
pub trait Hookable: Send + Sync {
    fn hook_type(&self) -> HookType;

    /// Second part of the hook name (`template` in `engine.template.before_render`).
    fn candidate_name(&self) -> &str;

    fn hook_table(&self) -> &HookTable;

    fn supported_hooks(&self) -> &[String] {
        self.hook_table().supported()
    }

    fn supports_hook(&self, name: &str) -> bool {
        self.hook_table().supports(name)
    }

    /// Whether `name` is addressed to this candidate.
    fn claims(&self, name: &HookName) -> bool {
        name.kind() == self.hook_type() && name.candidate() == self.candidate_name()
    }

    fn execute_hook(&self, name: &str, args: &mut HookArgs<'_>) -> Flow<()> {
        self.hook_table().run(name, args)
    }

    /// Drain hooks that were registered before this candidate existed.
    ///
    /// Call once, right after construction. Returns how many were attached.
    fn claim_postponed(&self, registry: &HookRegistry) -> usize {
        let pending = registry.take_postponed(self.hook_type(), self.candidate_name());
        let mut attached = 0;
        for postponed in pending {
            let name = postponed.hook.name().to_string();
            if self.hook_table().register(&name, postponed.hook.callback().clone()) {
                attached += 1;
            } else {
                tracing::warn!(
                    hook = %name,
                    caller = %format_args!("{}:{}", postponed.caller.file(), postponed.caller.line()),
                    "Postponed hook names an event its candidate does not support"
                );
            }
        }
        if attached > 0 {
            tracing::debug!(
                candidate = %format_args!("{}.{}", self.hook_type(), self.candidate_name()),
                attached,
                "Claimed postponed hooks"
            );
        }
        attached
    }
}

/// Object-safe upcast to `&dyn Hookable` for candidate walks.
pub trait AsHookable {
    fn as_hookable(&self) -> &dyn Hookable;
}

impl<T: Hookable> AsHookable for T {
    fn as_hookable(&self) -> &dyn Hookable {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Signal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: Arc<AtomicUsize>) -> HookFn {
        Arc::new(move |_args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_register_requires_support() {
        let table = HookTable::new(["engine.x.before"]);
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(table.register("engine.x.before", counting(counter.clone())));
        assert!(!table.register("engine.x.after", counting(counter)));
        assert_eq!(table.count("engine.x.before"), 1);
        assert_eq!(table.count("engine.x.after"), 0);
    }

    #[test]
    fn test_run_in_order_and_stop_on_failure() {
        let table = HookTable::new(["engine.x.before"]);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let s1 = seen.clone();
        table.register(
            "engine.x.before",
            Arc::new(move |_| {
                s1.lock().push(1);
                Ok(())
            }),
        );
        table.register(
            "engine.x.before",
            Arc::new(|_| Err(Error::msg("second fails").into())),
        );
        let s3 = seen.clone();
        table.register(
            "engine.x.before",
            Arc::new(move |_| {
                s3.lock().push(3);
                Ok(())
            }),
        );

        let result = table.run("engine.x.before", &mut HookArgs::None);
        match result {
            Err(Interrupt::Failure(Error::Hook { position, .. })) => {
                assert_eq!(position, "engine.x.before")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn test_signals_pass_through() {
        let table = HookTable::new(["engine.x.before"]);
        table.register(
            "engine.x.before",
            Arc::new(|_| Err(Interrupt::Signal(Signal::Pass))),
        );
        let result = table.run("engine.x.before", &mut HookArgs::None);
        assert!(matches!(result, Err(Interrupt::Signal(Signal::Pass))));
    }
}
