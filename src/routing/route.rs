//! A single method + pattern → handler binding.
//!
//! # Responsibilities
//! - Compile a route spec into an anchored regex at registration time
//! - Extract named parameters and splat values on match
//! - Evaluate extra match conditions
//!
//! # Pattern syntax
//! ```text
//! /users/:id          named parameter, one segment
//! /users/:id?         optional named parameter (slash included)
//! /files/*.*          `*` captures one segment (or part of one) into splat
//! /static/**          `**` captures any number of segments into splat
//! /:file.:ext         parameters may share a segment with literals
//! ```

use axum::http::Method;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::dispatch::{Content, Context, Flow};
use crate::error::{Error, Result};
use crate::http::{Params, Request};
use crate::routing::matcher::{AndMatcher, Matcher};

/// A route handler.
pub type HandlerFn = Arc<dyn Fn(&mut Context) -> Flow<Content> + Send + Sync>;

/// Parameters captured by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub params: Params,
    pub splat: Vec<String>,
}

/// An immutable, compiled route.
#[derive(Clone)]
pub struct Route {
    method: Method,
    spec: String,
    prefix: Option<String>,
    full_spec: String,
    regex: Regex,
    handler: HandlerFn,
    conditions: Arc<AndMatcher>,
}

impl Route {
    /// Compile a route. `full_spec` already carries the prefix.
    pub fn new(
        method: Method,
        spec: impl Into<String>,
        prefix: Option<String>,
        full_spec: impl Into<String>,
        handler: HandlerFn,
        conditions: Vec<Box<dyn Matcher>>,
    ) -> Result<Self> {
        let full_spec = full_spec.into();
        let regex = compile(&full_spec)?;
        Ok(Self {
            method,
            spec: spec.into(),
            prefix,
            full_spec,
            regex,
            handler,
            conditions: Arc::new(AndMatcher::new(conditions)),
        })
    }

    /// The same route bound to another method.
    pub fn with_method(&self, method: Method) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The spec as declared, without prefix.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The spec with the prefix applied; this is the route's identity.
    pub fn full_spec(&self) -> &str {
        &self.full_spec
    }

    /// The compiled matcher.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn handler(&self) -> &HandlerFn {
        &self.handler
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// Whether `other` would be a duplicate of this route.
    pub fn is_equivalent(&self, other: &Route) -> bool {
        self.method == other.method && self.full_spec == other.full_spec
    }

    /// Match a request's current path and conditions.
    pub fn matches(&self, req: &Request) -> Option<RouteMatch> {
        let caps = self.regex.captures(req.path())?;
        if !self.conditions.matches(req) {
            return None;
        }

        let mut found = RouteMatch::default();
        for (index, name) in self.regex.capture_names().enumerate().skip(1) {
            let Some(value) = caps.get(index) else {
                continue;
            };
            match name {
                Some(name) => {
                    found.params.insert(name.to_string(), value.as_str().to_string());
                }
                None => found
                    .splat
                    .push(value.as_str().trim_end_matches('/').to_string()),
            }
        }
        Some(found)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.full_spec)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("full_spec", &self.full_spec)
            .field("regex", &self.regex.as_str())
            .field("conditions", &self.conditions)
            .finish()
    }
}

/// Compile a spec into an anchored regex.
pub fn compile(spec: &str) -> Result<Regex> {
    if !spec.starts_with('/') {
        return Err(Error::InvalidRoutePattern {
            spec: spec.to_string(),
            reason: "must start with `/`".to_string(),
        });
    }

    let mut pattern = String::from("^");
    for segment in spec.split('/').skip(1) {
        if segment == "**" {
            pattern.push_str("/((?:[^/]+/?)+)");
        } else if let Some(name) = optional_param(segment) {
            pattern.push_str(&format!("(?:/(?P<{name}>[^/]+))?"));
        } else {
            pattern.push('/');
            compile_segment(segment, &mut pattern);
        }
    }
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| Error::InvalidRoutePattern {
        spec: spec.to_string(),
        reason: e.to_string(),
    })
}

fn optional_param(segment: &str) -> Option<&str> {
    let name = segment.strip_prefix(':')?.strip_suffix('?')?;
    (!name.is_empty() && name.chars().all(is_ident_char)).then_some(name)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn compile_segment(segment: &str, out: &mut String) {
    let mut literal = String::new();
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ':' if chars.peek().copied().is_some_and(is_ident_char) => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if !is_ident_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(&format!("(?P<{name}>[^/]+)"));
            }
            '*' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str("([^/]+)");
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
}
