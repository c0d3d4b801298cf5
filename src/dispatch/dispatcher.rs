//! The dispatch loop.
//!
//! # Data Flow
//! ```text
//! Request
//!     → decode serializer body into body params
//!     → for each matching route, in registration order:
//!         core.app.before_request → handler → write content
//!         pass: restore response, try the next route
//!     → core.app.after_request, session flush
//!     → no route: public file (GET/HEAD) or 404 error page
//!     → failure: core.app.route_exception, 500 error page
//! ```
//!
//! # Design Decisions
//! - Matching is strictly ordered; the first route not passing wins
//! - `forward` re-enters [`Dispatcher::run`] with the same Context
//! - HEAD responses lose their body only at the very end

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::app::App;
use crate::dispatch::error_page::render_error;
use crate::dispatch::{Content, Context, Flow, Interrupt, Signal};
use crate::error::{Error, Result};
use crate::handlers::file::SendFileOptions;
use crate::hooks::{HookArgs, AFTER_REQUEST, BEFORE_REQUEST, ROUTE_EXCEPTION};
use crate::http::{Params, Request, Response};
use crate::observability::metrics;
use crate::routing::Route;

/// Runs requests against one finished App.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    app: Arc<App>,
}

impl Dispatcher {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Dispatch a request. Failures come back as errors after
    /// `core.app.route_exception` has seen them.
    pub fn dispatch(&self, mut request: Request) -> Result<Response> {
        let span = tracing::debug_span!(
            "dispatch",
            id = %request.id(),
            method = %request.method(),
            path = %request.path()
        );
        let _enter = span.enter();

        decode_body(&self.app, &mut request)?;
        let is_head = request.method() == Method::HEAD;
        let mut ctx = Context::new(self.app.clone(), request);

        match Self::run(&self.app, &mut ctx) {
            Ok(mut response) => {
                if is_head {
                    response.set_body(Bytes::new());
                }
                Ok(response)
            }
            Err(err) => {
                let mut args = HookArgs::Failure {
                    context: &mut ctx,
                    error: &err,
                };
                if let Err(interrupt) = self.app.hooks().run_own(ROUTE_EXCEPTION, &mut args) {
                    tracing::warn!(outcome = %interrupt, "Route exception hook did not complete");
                }
                Err(err)
            }
        }
    }

    /// Dispatch a request, turning failures into a 500 error page.
    pub fn handle(&self, request: Request) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let mut response = match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "Request failed");
                let message = if self.app.settings().show_errors {
                    err.to_string()
                } else {
                    "Internal Server Error".to_string()
                };
                render_error(&self.app, StatusCode::INTERNAL_SERVER_ERROR, &message)
            }
        };
        if method == Method::HEAD {
            response.set_body(Bytes::new());
        }
        metrics::record_dispatch(method.as_str(), response.status().as_u16(), start);
        response
    }

    /// The match loop, shared by top-level dispatch and `forward`.
    pub(crate) fn run(app: &App, ctx: &mut Context) -> Result<Response> {
        let mut from = 0;
        while let Some((index, route, found)) = app.routes().next_match(ctx.request(), from) {
            from = index + 1;
            ctx.request_mut().set_route_match(found.params, found.splat);
            let snapshot = ctx.response().clone();

            match Self::attempt(app, route, ctx) {
                Ok(()) => {}
                Err(Interrupt::Signal(Signal::Pass)) => {
                    tracing::debug!(route = %route, "Route passed");
                    metrics::record_pass();
                    ctx.set_response(snapshot);
                    continue;
                }
                Err(Interrupt::Signal(signal)) => {
                    tracing::debug!(route = %route, signal = signal.name(), "Route interrupted");
                    if let Some(response) = signal.into_response() {
                        ctx.set_response(response);
                    }
                }
                Err(Interrupt::Failure(err)) => return Err(err),
            }

            Self::after(app, ctx)?;
            return Ok(ctx.take_response());
        }

        ctx.request_mut().set_route_match(Params::new(), Vec::new());
        Self::unrouted(app, ctx)
    }

    fn attempt(app: &App, route: &Route, ctx: &mut Context) -> Flow<()> {
        app.hooks().run_own(BEFORE_REQUEST, &mut HookArgs::Context(ctx))?;
        if ctx.response().is_halted() {
            return Ok(());
        }

        let content = (route.handler())(ctx).map_err(|interrupt| match interrupt {
            Interrupt::Failure(source) => Interrupt::Failure(Error::Handler {
                route: route.to_string(),
                source: Box::new(source),
            }),
            signal => signal,
        })?;
        write_content(app, ctx, content)
    }

    fn after(app: &App, ctx: &mut Context) -> Result<()> {
        match app.hooks().run_own(AFTER_REQUEST, &mut HookArgs::Context(ctx)) {
            Ok(()) | Err(Interrupt::Signal(Signal::Pass)) => {}
            Err(Interrupt::Signal(signal)) => {
                if let Some(response) = signal.into_response() {
                    ctx.set_response(response);
                }
            }
            Err(Interrupt::Failure(err)) => return Err(err),
        }
        ctx.flush_session()
    }

    /// No route matched: try the public directory, else 404.
    fn unrouted(app: &App, ctx: &mut Context) -> Result<Response> {
        let method = ctx.request().method().clone();
        if method == Method::GET || method == Method::HEAD {
            let handler = app.file_handler();
            if let Some(path) = handler.resolve_public(ctx.request().path()) {
                match handler.render(&path, app.mime(), &SendFileOptions::default()) {
                    Ok(response) => return Ok(response),
                    Err(Interrupt::Failure(err)) => return Err(err),
                    Err(Interrupt::Signal(signal)) => {
                        if let Some(response) = signal.into_response() {
                            return Ok(response);
                        }
                    }
                }
            }
        }
        tracing::debug!(method = %method, path = %ctx.request().path(), "No route matched");
        Ok(render_error(app, StatusCode::NOT_FOUND, "Not Found"))
    }
}

/// Put a handler's return value on the response.
fn write_content(app: &App, ctx: &mut Context, content: Content) -> Flow<()> {
    let response = ctx.response_mut();
    let has_type = response.content_type().is_some();
    match content {
        Content::Empty => {}
        Content::Text(text) => {
            if !has_type {
                response.set_content_type(&app.text_content_type("text/html"))?;
            }
            response.set_body(text);
        }
        Content::Bytes(bytes) => {
            if !has_type {
                response.set_content_type(app.mime().default_type())?;
            }
            response.set_body(bytes);
        }
        Content::Data(data) => {
            let (body, content_type) = match app.serializer_engine()? {
                Some(serializer) => (
                    serializer.serialize(&data)?,
                    serializer.content_type().to_string(),
                ),
                None => (
                    serde_json::to_string(&data).map_err(Error::from)?,
                    "application/json".to_string(),
                ),
            };
            let response = ctx.response_mut();
            if !has_type {
                response.set_content_type(&content_type)?;
            }
            response.set_body(body);
        }
    }
    Ok(())
}

/// Serializer-encoded bodies become body parameters.
fn decode_body(app: &App, request: &mut Request) -> Result<()> {
    let Some(serializer) = app.serializer_engine()? else {
        return Ok(());
    };
    let accepted = request
        .content_type()
        .is_some_and(|ct| serializer.accepts(ct));
    if !accepted || request.body().is_empty() {
        return Ok(());
    }
    match serializer.deserialize(request.body()) {
        Ok(Value::Object(map)) => {
            let params = map
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(s) => (key, s),
                    other => (key, other.to_string()),
                })
                .collect();
            request.set_body_params(params);
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Request body could not be decoded"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher(app: App) -> Dispatcher {
        app.into_dispatcher()
    }

    #[test]
    fn test_first_match_wins() {
        let mut app = App::new("d");
        app.get("/a/:x", |_| Ok("first".into())).unwrap();
        app.get("/a/b", |_| Ok("second".into())).unwrap();
        let response = dispatcher(app).handle(Request::get("/a/b").unwrap());
        assert_eq!(response.text(), "first");
        assert_eq!(response.content_type(), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_pass_discards_response_changes() {
        let mut app = App::new("d");
        app.get("/p", |ctx| {
            ctx.header("X-First", "1")?;
            ctx.set_var("seen", true);
            ctx.pass()
        })
        .unwrap();
        app.get("/:any", |ctx| Ok(format!("seen={}", ctx.var("seen").is_some()).into()))
            .unwrap();
        let response = dispatcher(app).handle(Request::get("/p").unwrap());
        assert_eq!(response.text(), "seen=true");
        assert!(response.header("X-First").is_none());
    }

    #[test]
    fn test_not_found() {
        let app = App::new("d");
        let response = dispatcher(app).handle(Request::get("/missing").unwrap());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_data_defaults_to_json() {
        let mut app = App::new("d");
        app.get("/data", |_| Ok(json!({"ok": true}).into())).unwrap();
        let response = dispatcher(app).handle(Request::get("/data").unwrap());
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.text(), r#"{"ok":true}"#);
    }

    #[test]
    fn test_head_mirrors_get_without_body() {
        let mut app = App::new("d");
        app.get("/h", |_| Ok("body".into())).unwrap();
        let response = dispatcher(app).handle(Request::new(Method::HEAD, "/h").unwrap());
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_handler_failure_is_500() {
        let mut app = App::new("d");
        app.get("/boom", |_| Err(Error::msg("kaput").into())).unwrap();
        let dispatcher = dispatcher(app);
        let err = dispatcher.dispatch(Request::get("/boom").unwrap()).unwrap_err();
        assert!(matches!(err, Error::Handler { .. }));
        assert!(matches!(err.root(), Error::Message(m) if m == "kaput"));

        let response = dispatcher.handle(Request::get("/boom").unwrap());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.text().contains("kaput"));
    }
}
