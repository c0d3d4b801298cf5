//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route declaration (build time):
//!     App::add_route(method, spec, handler)
//!     → prefix.rs (apply current prefix)
//!     → route.rs (compile spec to anchored regex)
//!     → table.rs (duplicate check, append to method list)
//!
//! Request (dispatch time):
//!     → table.rs (first route for the method whose pattern matches)
//!     → matcher.rs (evaluate extra conditions)
//!     → RouteMatch { params, splat }
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable afterwards
//! - First match wins; `pass` resumes the scan after the current route
//! - A route's identity is its method plus fully-prefixed spec

pub mod matcher;
pub mod prefix;
pub mod route;
pub mod table;

pub use matcher::{AndMatcher, HeaderMatcher, HostMatcher, Matcher, UserAgentMatcher};
pub use prefix::PrefixScope;
pub use route::{HandlerFn, Route, RouteMatch};
pub use table::{RouteTable, METHODS};
