//! Error responses.
//!
//! # Data Flow
//! ```text
//! status + message
//!     → core.error.init    (report may be rewritten)
//!     → core.error.before
//!     → content: `<status>` view if the template engine has one, else built-in page
//!     → core.error.after   (content may be rewritten)
//!     → Response
//! ```
//!
//! Hooks failing here are logged and ignored; an error page must always render.

use axum::http::StatusCode;
use serde_json::{json, Map, Value};

use crate::app::App;
use crate::hooks::{HookArgs, ERROR_AFTER, ERROR_BEFORE, ERROR_INIT};
use crate::http::Response;

/// The error being rendered, visible to `core.error.*` hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub title: String,
    pub message: String,
    /// Rendered body; filled before `core.error.after` runs.
    pub content: Option<String>,
}

impl ErrorReport {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            title: format!(
                "Error {}",
                status.canonical_reason().unwrap_or("Unknown")
            ),
            message: message.into(),
            content: None,
        }
    }
}

/// Render an error response through the error hooks.
pub fn render_error(app: &App, status: StatusCode, message: &str) -> Response {
    let mut report = ErrorReport::new(status, message);
    run_error_hook(app, ERROR_INIT, &mut report);
    run_error_hook(app, ERROR_BEFORE, &mut report);

    if report.content.is_none() {
        report.content = Some(error_view(app, &report).unwrap_or_else(|| default_page(&report)));
    }
    run_error_hook(app, ERROR_AFTER, &mut report);

    let mut response = Response::with_status(report.status);
    if let Err(e) = response.set_content_type(&app.text_content_type("text/html")) {
        tracing::warn!(error = %e, "Error page content type rejected");
    }
    response.set_body(report.content.unwrap_or_default());
    response
}

fn run_error_hook(app: &App, name: &str, report: &mut ErrorReport) {
    if let Err(interrupt) = app.hooks().run_own(name, &mut HookArgs::Error(report)) {
        tracing::warn!(hook = %name, outcome = %interrupt, "Error hook did not complete");
    }
}

/// `404.html` and friends, when the template engine provides them.
fn error_view(app: &App, report: &ErrorReport) -> Option<String> {
    let engine = app.template_engine().ok().flatten()?;
    let view = report.status.as_u16().to_string();
    if !engine.view_exists(&view) {
        return None;
    }
    let tokens: Map<String, Value> = match json!({
        "title": report.title,
        "message": report.message,
        "status": report.status.as_u16(),
    }) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    match engine.process(&view, tokens, engine.layout()) {
        Ok(content) => Some(content),
        Err(interrupt) => {
            tracing::warn!(view = %view, outcome = %interrupt, "Error view failed to render");
            None
        }
    }
}

fn default_page(report: &ErrorReport) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\n<body><h1>{title}</h1><p>{message}</p></body></html>\n",
        title = escape_html(&report.title),
        message = escape_html(&report.message),
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_default_error_page() {
        let app = App::new("errors");
        let response = render_error(&app, StatusCode::NOT_FOUND, "no <such> page");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.text().contains("Error Not Found"));
        assert!(response.text().contains("no &lt;such&gt; page"));
        assert_eq!(response.content_type(), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_error_hooks_rewrite_report() {
        let mut app = App::new("errors");
        app.hook("init_error", |args| {
            if let Some(report) = args.error_report() {
                report.status = StatusCode::GONE;
            }
            Ok(())
        })
        .unwrap();
        app.hook("after_error", |args| {
            if let Some(report) = args.error_report() {
                report.content = Some("gone".into());
            }
            Ok(())
        })
        .unwrap();
        let response = render_error(&app, StatusCode::NOT_FOUND, "x");
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(response.text(), "gone");
    }
}
