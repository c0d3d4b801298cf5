//! Session engines.
//!
//! # Responsibilities
//! - Create, retrieve, flush and destroy sessions by id
//! - Describe the cookie that carries the session id
//!
//! # Design Decisions
//! - The engine never holds the active session; the request Context does
//! - Sessions track a dirty flag so unchanged sessions are not flushed
//! - Ids are random v4 UUIDs

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::hooks::{AsHookable, HookTable, HookType, Hookable};
use crate::http::{Cookie, Request};

/// One client's session data.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    data: Map<String, Value>,
    dirty: bool,
}

impl Session {
    /// A fresh, dirty session so it is persisted at the end of the request.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Map::new(),
            dirty: true,
        }
    }

    /// A session loaded from a store.
    pub fn restore(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
            dirty: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Write a key. `Null` removes it.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.remove(&key);
        } else {
            self.data.insert(key, value);
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// A session backend.
pub trait SessionEngine: Hookable + AsHookable {
    fn cookie_name(&self) -> &str;

    fn create(&self) -> Session;

    fn retrieve(&self, id: &str) -> Option<Session>;

    /// Persist a session.
    fn flush(&self, session: &Session) -> Result<()>;

    fn destroy(&self, id: &str) -> Result<()>;

    /// The cookie carrying the session id.
    fn cookie(&self, session: &Session) -> Cookie {
        Cookie::new(self.cookie_name(), session.id())
    }

    /// Session id presented by the client, if any.
    fn session_id(&self, req: &Request) -> Option<String> {
        req.cookie(self.cookie_name()).filter(|id| !id.is_empty())
    }
}

/// Closed set of session variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    Simple,
}

impl SessionBackend {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match super::normalize_tag(tag).as_str() {
            "simple" | "memory" => Some(SessionBackend::Simple),
            _ => None,
        }
    }

    pub fn build(self, options: &Map<String, Value>) -> Result<Arc<dyn SessionEngine>> {
        match self {
            SessionBackend::Simple => Ok(Arc::new(SimpleSessionEngine::from_options(options))),
        }
    }
}

pub const DEFAULT_COOKIE_NAME: &str = "trellis.session";

/// In-memory sessions; lost on restart.
pub struct SimpleSessionEngine {
    store: DashMap<String, Map<String, Value>>,
    cookie_name: String,
    cookie_duration: Option<Duration>,
    cookie_domain: Option<String>,
    secure: bool,
    http_only: bool,
    hooks: HookTable,
}

impl Default for SimpleSessionEngine {
    fn default() -> Self {
        Self::from_options(&Map::new())
    }
}

impl SimpleSessionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognized options: `cookie_name`, `cookie_duration` (seconds),
    /// `cookie_domain`, `is_secure`, `is_http_only`.
    pub fn from_options(options: &Map<String, Value>) -> Self {
        Self {
            store: DashMap::new(),
            cookie_name: options
                .get("cookie_name")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_COOKIE_NAME)
                .to_string(),
            cookie_duration: options
                .get("cookie_duration")
                .and_then(Value::as_u64)
                .map(Duration::from_secs),
            cookie_domain: options
                .get("cookie_domain")
                .and_then(Value::as_str)
                .map(str::to_string),
            secure: options
                .get("is_secure")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            http_only: options
                .get("is_http_only")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            hooks: HookTable::empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Hookable for SimpleSessionEngine {
    fn hook_type(&self) -> HookType {
        HookType::Engine
    }

    fn candidate_name(&self) -> &str {
        "session"
    }

    fn hook_table(&self) -> &HookTable {
        &self.hooks
    }
}

impl SessionEngine for SimpleSessionEngine {
    fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn create(&self) -> Session {
        let session = Session::new(Uuid::new_v4().to_string());
        tracing::debug!(session = %session.id(), "Session created");
        session
    }

    fn retrieve(&self, id: &str) -> Option<Session> {
        self.store
            .get(id)
            .map(|data| Session::restore(id, data.value().clone()))
    }

    fn flush(&self, session: &Session) -> Result<()> {
        self.store
            .insert(session.id().to_string(), session.data().clone());
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<()> {
        self.store.remove(id);
        tracing::debug!(session = %id, "Session destroyed");
        Ok(())
    }

    fn cookie(&self, session: &Session) -> Cookie {
        let mut cookie = Cookie::new(&self.cookie_name, session.id())
            .secure(self.secure)
            .http_only(self.http_only);
        if let Some(duration) = self.cookie_duration {
            cookie = cookie.max_age(duration);
        }
        if let Some(domain) = &self.cookie_domain {
            cookie = cookie.domain(domain);
        }
        cookie
    }
}
