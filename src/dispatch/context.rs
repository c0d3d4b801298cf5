//! Per-request state and the dispatch-time API.
//!
//! # Responsibilities
//! - Own the request, the in-progress response, the session and request vars
//! - Raise control signals (`halt`, `redirect`, `pass`, `forward`)
//! - Front the engines for handlers: sessions, cookies, templates, logging, files
//!
//! # Design Decisions
//! - One Context per dispatch; forwards reuse it with a swapped request
//! - Sessions load lazily from the cookie and are only created on write
//! - Signals carry a snapshot of the response so the dispatcher can adopt it

use axum::body::Bytes;
use axum::http::{header, Method, StatusCode};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::app::App;
use crate::dispatch::error_page::render_error;
use crate::dispatch::{Dispatcher, Flow, Signal};
use crate::engine::{EngineKind, LogLevel, Session, SessionEngine, TemplateEngine};
use crate::error::{Error, Result};
use crate::handlers::file::SendFileOptions;
use crate::http::{Cookie, Params, Request, Response};
use crate::observability::metrics;

type ForwardKey = (Method, String, Params);

/// Everything one dispatch works on.
pub struct Context {
    app: Arc<App>,
    request: Request,
    response: Response,
    session: Option<Session>,
    session_loaded: bool,
    vars: Map<String, Value>,
    forward_chain: Vec<ForwardKey>,
}

impl Context {
    pub fn new(app: Arc<App>, request: Request) -> Self {
        let origin = forward_key(&request);
        Self {
            app,
            request,
            response: Response::new(),
            session: None,
            session_loaded: false,
            vars: Map::new(),
            forward_chain: vec![origin],
        }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn set_response(&mut self, response: Response) {
        self.response = response;
    }

    pub(crate) fn take_response(&mut self) -> Response {
        std::mem::take(&mut self.response)
    }

    // Parameters and vars

    pub fn params(&self) -> Params {
        self.request.params()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    pub fn splat(&self) -> &[String] {
        self.request.splat()
    }

    /// Request-scoped variable; survives `pass` and `forward`.
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    /// Request body decoded by the serializer engine, when one is configured
    /// and the content type matches.
    pub fn data(&self) -> Result<Option<Value>> {
        let Some(serializer) = self.app.serializer_engine()? else {
            return Ok(None);
        };
        match self.request.content_type() {
            Some(ct) if serializer.accepts(ct) && !self.request.body().is_empty() => {
                serializer.deserialize(self.request.body()).map(Some)
            }
            _ => Ok(None),
        }
    }

    // Response shaping

    pub fn status(&mut self, status: StatusCode) {
        self.response.set_status(status);
    }

    pub fn header(&mut self, name: &str, value: &str) -> Result<()> {
        self.response.set_header(name, value)
    }

    pub fn push_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.response.push_header(name, value)
    }

    /// Set the content type; short names (`json`, `css`) go through the mime table.
    pub fn content_type(&mut self, content_type: &str) -> Result<()> {
        let resolved = if content_type.contains('/') {
            content_type.to_string()
        } else {
            self.app
                .mime()
                .for_name(content_type)
                .unwrap_or(content_type)
                .to_string()
        };
        self.response.set_content_type(&resolved)
    }

    // Control flow

    /// Stop here and deliver the current response; remaining hooks skip.
    pub fn halt<T>(&mut self) -> Flow<T> {
        self.response.halt();
        Err(Signal::Halt(self.response.clone()).into())
    }

    /// Replace the body, then halt.
    pub fn halt_with<T>(&mut self, body: impl Into<Bytes>) -> Flow<T> {
        self.response.set_body(body);
        self.halt()
    }

    /// Let the next matching route handle this request.
    pub fn pass<T>(&self) -> Flow<T> {
        Err(Signal::Pass.into())
    }

    /// Redirect with `302 Found`.
    pub fn redirect<T>(&mut self, destination: &str) -> Flow<T> {
        self.redirect_with(destination, StatusCode::FOUND)
    }

    /// Redirect with an explicit status. Relative destinations resolve
    /// against the current request URL.
    pub fn redirect_with<T>(&mut self, destination: &str, status: StatusCode) -> Flow<T> {
        let location = if is_absolute_uri(destination) {
            destination.to_string()
        } else {
            self.request
                .base_url()?
                .join(destination)
                .map_err(Error::from)?
                .to_string()
        };
        tracing::debug!(location = %location, status = %status, "Redirecting");
        self.response.redirect(&location, status)?;
        Err(Signal::Redirect(self.response.clone()).into())
    }

    /// Re-dispatch internally to `path`, deliver the result and stop.
    ///
    /// `extra` parameters win over the current ones. The forwarded dispatch
    /// shares this Context (vars, session) and starts with a fresh response.
    pub fn forward<T>(&mut self, path: &str, extra: Params, method: Option<Method>) -> Flow<T> {
        let target = self.request.forward_to(path, extra, method);
        let key = forward_key(&target);

        if self.forward_chain.contains(&key) {
            return Err(Error::ForwardLoop {
                method: key.0,
                path: key.1,
            }
            .into());
        }
        let max = self.app.settings().max_forward_hops;
        if self.forward_chain.len() > max {
            return Err(Error::ForwardLimit {
                path: path.to_string(),
                max,
            }
            .into());
        }

        tracing::debug!(from = %self.request.path(), to = %path, "Forwarding");
        metrics::record_forward();

        self.forward_chain.push(key);
        let original = std::mem::replace(&mut self.request, target);
        let outer_response = std::mem::take(&mut self.response);
        let app = self.app.clone();
        let result = Dispatcher::run(&app, self);
        self.request = original;
        self.forward_chain.pop();

        let mut response = match result {
            Ok(response) => response,
            Err(err) => {
                self.response = outer_response;
                return Err(err.into());
            }
        };
        response.halt();
        self.response = response.clone();
        Err(Signal::Forward(response).into())
    }

    // Sessions

    fn session_engine(&self) -> Result<Arc<dyn SessionEngine>> {
        self.app
            .session_engine()?
            .ok_or(Error::MissingEngine(EngineKind::Session))
    }

    fn load_session(&mut self) -> Result<()> {
        if self.session.is_some() || self.session_loaded {
            return Ok(());
        }
        self.session_loaded = true;
        let Some(engine) = self.app.session_engine()? else {
            return Ok(());
        };
        if let Some(id) = engine.session_id(&self.request) {
            self.session = engine.retrieve(&id);
            if self.session.is_none() {
                tracing::debug!(session = %id, "Unknown session id presented");
            }
        }
        Ok(())
    }

    /// The current session, created if the client has none.
    pub fn session(&mut self) -> Result<&mut Session> {
        let engine = self.session_engine()?;
        self.load_session()?;
        Ok(self.session.get_or_insert_with(|| engine.create()))
    }

    /// Whether a session exists for this request (without creating one).
    pub fn has_session(&mut self) -> Result<bool> {
        self.load_session()?;
        Ok(self.session.is_some())
    }

    /// Read a session key. Never creates a session.
    pub fn session_get(&mut self, key: &str) -> Result<Option<Value>> {
        self.load_session()?;
        Ok(self.session.as_ref().and_then(|s| s.get(key).cloned()))
    }

    /// Write a session key; `Value::Null` deletes it.
    pub fn session_set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.session()?.set(key, value.into());
        Ok(())
    }

    pub fn session_remove(&mut self, key: &str) -> Result<Option<Value>> {
        self.load_session()?;
        Ok(self.session.as_mut().and_then(|s| s.remove(key)))
    }

    /// Drop the session from the store and expire its cookie.
    pub fn destroy_session(&mut self) -> Result<()> {
        let engine = self.session_engine()?;
        self.load_session()?;
        if let Some(session) = self.session.take() {
            engine.destroy(session.id())?;
        }
        self.response
            .add_cookie(&Cookie::expired(engine.cookie_name()))
    }

    /// Persist a dirty session and emit its cookie. Runs after the
    /// after-request hooks of every routed dispatch, halted or not.
    pub(crate) fn flush_session(&mut self) -> Result<()> {
        let Some(engine) = self.app.session_engine()? else {
            return Ok(());
        };
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.is_dirty() {
            engine.flush(session)?;
            session.mark_clean();
        }
        let cookie = engine.cookie(session);
        if !has_cookie(&self.response, cookie.name()) {
            self.response.add_cookie(&cookie)?;
        }
        Ok(())
    }

    // Cookies

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.request.cookie(name)
    }

    pub fn set_cookie(&mut self, cookie: &Cookie) -> Result<()> {
        self.response.add_cookie(cookie)
    }

    // Templates

    /// Render `view` with the engine's default layout.
    pub fn template(&mut self, view: &str, vars: Value) -> Flow<String> {
        let engine = self.template_engine()?;
        let layout = engine.layout().map(str::to_string);
        self.render(&engine, view, vars, layout.as_deref())
    }

    /// Render `view` with an explicit layout, or none.
    pub fn template_with_layout(&mut self, view: &str, vars: Value, layout: Option<&str>) -> Flow<String> {
        let engine = self.template_engine()?;
        self.render(&engine, view, vars, layout)
    }

    fn template_engine(&self) -> Result<Arc<dyn TemplateEngine>> {
        self.app
            .template_engine()?
            .ok_or(Error::MissingEngine(EngineKind::Template))
    }

    fn render(
        &mut self,
        engine: &Arc<dyn TemplateEngine>,
        view: &str,
        vars: Value,
        layout: Option<&str>,
    ) -> Flow<String> {
        let mut tokens = self.default_tokens()?;
        match vars {
            Value::Null => {}
            Value::Object(map) => tokens.extend(map),
            other => {
                return Err(Error::msg(format!(
                    "template tokens for `{view}` must be an object, got {other}"
                ))
                .into())
            }
        }
        engine.process(view, tokens, layout)
    }

    /// Tokens every template sees.
    fn default_tokens(&mut self) -> Result<Map<String, Value>> {
        self.load_session()?;
        let settings = self.app.settings();
        let mut settings_token: Map<String, Value> = settings
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        settings_token.insert("appname".into(), json!(settings.name));
        settings_token.insert("charset".into(), json!(settings.charset));

        let mut tokens = Map::new();
        tokens.insert(
            "request".into(),
            json!({
                "id": self.request.id(),
                "method": self.request.method().as_str(),
                "path": self.request.path(),
                "uri": self.request.uri().to_string(),
                "host": self.request.host(),
            }),
        );
        tokens.insert("params".into(), json!(self.request.params()));
        tokens.insert("vars".into(), Value::Object(self.vars.clone()));
        tokens.insert(
            "session".into(),
            self.session
                .as_ref()
                .map(|s| Value::Object(s.data().clone()))
                .unwrap_or(Value::Null),
        );
        tokens.insert("settings".into(), Value::Object(settings_token));
        Ok(tokens)
    }

    // Files, URLs, logging

    /// Serve a file and halt. Paths are relative to the public directory
    /// unless `options.system_path` is set.
    pub fn send_file<T>(&mut self, path: impl AsRef<Path>, options: SendFileOptions) -> Flow<T> {
        let handler = self.app.file_handler();
        let response = match handler.resolve(path.as_ref(), options.system_path) {
            Some(resolved) => handler.render(&resolved, self.app.mime(), &options)?,
            None => {
                tracing::debug!(path = %path.as_ref().display(), "send_file target not found");
                render_error(&self.app, StatusCode::NOT_FOUND, "Not Found")
            }
        };
        self.response = response;
        self.halt()
    }

    /// Absolute URL for `path` on this host, with optional query parameters.
    pub fn uri_for(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let mut url = self.request.base_url()?;
        url.set_path(path);
        url.set_query(None);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.to_string())
    }

    /// Log through the logger engine.
    pub fn log(&self, level: LogLevel, message: &str) -> Flow<()> {
        self.app.log(level, message)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("session", &self.session)
            .field("vars", &self.vars)
            .field("forward_depth", &(self.forward_chain.len() - 1))
            .finish()
    }
}

fn forward_key(request: &Request) -> ForwardKey {
    (
        request.method().clone(),
        request.path().to_string(),
        request.params(),
    )
}

fn has_cookie(response: &Response, name: &str) -> bool {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}

/// RFC 2396 scheme followed by `:`.
pub fn is_absolute_uri(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_uri_detection() {
        assert!(is_absolute_uri("http://h/x"));
        assert!(is_absolute_uri("mailto:a@b"));
        assert!(is_absolute_uri("svn+ssh://h"));
        assert!(!is_absolute_uri("/x"));
        assert!(!is_absolute_uri("x/y:z"));
        assert!(!is_absolute_uri("1http://h"));
        assert!(!is_absolute_uri(":nothing"));
    }

    #[test]
    fn test_redirect_resolves_relative() {
        let app = Arc::new(App::new("ctx"));
        let mut ctx = Context::new(app, Request::get("http://h/a/b").unwrap());
        let signal: Flow<()> = ctx.redirect("/x");
        match signal {
            Err(crate::dispatch::Interrupt::Signal(Signal::Redirect(response))) => {
                assert_eq!(response.location(), Some("http://h/x"));
                assert_eq!(response.status(), StatusCode::FOUND);
                assert!(!response.is_halted());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_session_requires_engine() {
        let app = Arc::new(App::new("ctx"));
        let mut ctx = Context::new(app, Request::get("/").unwrap());
        assert!(matches!(
            ctx.session(),
            Err(Error::MissingEngine(EngineKind::Session))
        ));
        assert_eq!(ctx.session_get("user").unwrap(), None);
    }

    #[test]
    fn test_vars() {
        let app = Arc::new(App::new("ctx"));
        let mut ctx = Context::new(app, Request::get("/").unwrap());
        ctx.set_var("user", "ann");
        assert_eq!(ctx.var("user"), Some(&json!("ann")));
    }

    #[test]
    fn test_uri_for() {
        let app = Arc::new(App::new("ctx"));
        let ctx = Context::new(app, Request::get("http://h:8080/a").unwrap());
        assert_eq!(
            ctx.uri_for("/search", &[("q", "rust lang")]).unwrap(),
            "http://h:8080/search?q=rust+lang"
        );
    }
}
