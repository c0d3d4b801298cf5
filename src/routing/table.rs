//! Per-method ordered route storage.
//!
//! # Responsibilities
//! - Keep routes in insertion order for each method
//! - Reject duplicates (same method, same fully-prefixed spec)
//! - Yield candidate routes for a request in order
//!
//! # Design Decisions
//! - Mutated only while the App is being built; read-only once frozen
//! - First match wins; `pass` moves on to the next match

use axum::http::Method;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::http::Request;
use crate::routing::route::{Route, RouteMatch};

/// Methods a route can be registered for.
pub const METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
    Method::PATCH,
];

/// Routes grouped by method.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<Method, Vec<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route to its method's list.
    pub fn add(&mut self, route: Route) -> Result<()> {
        if self.route_exists(&route) {
            return Err(Error::DuplicateRoute {
                method: route.method().clone(),
                spec: route.full_spec().to_string(),
            });
        }
        tracing::debug!(method = %route.method(), spec = %route.full_spec(), "Route registered");
        self.routes
            .entry(route.method().clone())
            .or_default()
            .push(route);
        Ok(())
    }

    /// Whether an equivalent route is already registered.
    pub fn route_exists(&self, route: &Route) -> bool {
        self.exists(route.method(), route.full_spec())
    }

    /// Whether a route with this method and fully-prefixed spec exists.
    pub fn exists(&self, method: &Method, full_spec: &str) -> bool {
        self.routes_for(method)
            .iter()
            .any(|r| r.full_spec() == full_spec)
    }

    /// Ordered routes for a method.
    pub fn routes_for(&self, method: &Method) -> &[Route] {
        self.routes.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Routes matching `req`, starting at position `from` of its method's list.
    ///
    /// Returns the position alongside the match so a caller can resume after it.
    pub fn next_match(&self, req: &Request, from: usize) -> Option<(usize, &Route, RouteMatch)> {
        self.routes_for(req.method())
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(index, route)| route.matches(req).map(|m| (index, route, m)))
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
