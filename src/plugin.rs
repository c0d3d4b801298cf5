//! Plugins: named hook candidates that extend an App.
//!
//! A plugin declares the events it emits through its [`HookTable`], may
//! contribute hook aliases, and gets one chance to register routes and hooks
//! when it joins the App.
//!
//! [`HookTable`]: crate::hooks::HookTable

use crate::app::App;
use crate::error::Result;
use crate::hooks::{AsHookable, Hookable};

/// An App extension. Its hook names are `plugin.<name>.<event>`.
pub trait Plugin: Hookable + AsHookable {
    fn name(&self) -> &str {
        self.candidate_name()
    }

    /// Extra `(alias, canonical)` hook names. These win over App aliases.
    fn hook_aliases(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Called once, after the plugin has joined the candidate list.
    fn on_register(&self, _app: &mut App) -> Result<()> {
        Ok(())
    }
}
