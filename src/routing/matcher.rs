//! Route match conditions.
//!
//! # Responsibilities
//! - Match host (exact, case-insensitive)
//! - Match a request header or the user agent against a regex
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (per HTTP spec)
//! - A missing header never matches
//! - Empty condition list = always matches

use regex::Regex;

use crate::error::{Error, Result};
use crate::http::Request;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request) -> bool;
}

/// Matches the request host.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request) -> bool {
        req.host()
            .map(|h| h.to_lowercase() == self.expected_host)
            .unwrap_or(false)
    }
}

/// Matches one header value against a pattern.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: String,
    pattern: Regex,
}

impl HeaderMatcher {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| Error::InvalidRoutePattern {
            spec: format!("header {name}: {pattern}"),
            reason: e.to_string(),
        })?;
        Ok(Self { name, pattern })
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &Request) -> bool {
        req.header(&self.name)
            .map(|value| self.pattern.is_match(value))
            .unwrap_or(false)
    }
}

/// Matches the `User-Agent` header.
#[derive(Debug, Clone)]
pub struct UserAgentMatcher(HeaderMatcher);

impl UserAgentMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        HeaderMatcher::new("user-agent", pattern).map(Self)
    }
}

impl Matcher for UserAgentMatcher {
    fn matches(&self, req: &Request) -> bool {
        self.0.matches(req)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Request) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new("example.com");

        let req1 = Request::get("/").unwrap().with_header("Host", "example.com").unwrap();
        assert!(matcher.matches(&req1));

        let req2 = Request::get("http://EXAMPLE.COM/").unwrap();
        assert!(matcher.matches(&req2)); // Case insensitive

        let req3 = Request::get("/").unwrap().with_header("Host", "other.com").unwrap();
        assert!(!matcher.matches(&req3));
    }

    #[test]
    fn test_user_agent_matcher() {
        let matcher = UserAgentMatcher::new("(?i)curl").unwrap();
        let curl = Request::get("/").unwrap().with_header("User-Agent", "curl/8.1").unwrap();
        assert!(matcher.matches(&curl));
        assert!(!matcher.matches(&Request::get("/").unwrap()));
    }

    #[test]
    fn test_and_matcher() {
        let both = AndMatcher::new(vec![
            Box::new(HostMatcher::new("h")),
            Box::new(HeaderMatcher::new("x-api", "^v2$").unwrap()),
        ]);
        let req = Request::get("http://h/")
            .unwrap()
            .with_header("X-Api", "v2")
            .unwrap();
        assert!(both.matches(&req));
        assert!(!both.matches(&Request::get("http://h/").unwrap()));
        assert!(AndMatcher::default().matches(&req));
    }

    #[test]
    fn test_invalid_header_pattern() {
        assert!(HeaderMatcher::new("x", "(").is_err());
    }
}
