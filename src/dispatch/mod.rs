//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! Request → Dispatcher (route match loop)
//!     → Context (per-request state, handler API)
//!     → Content (handler return) → Response
//! Signals (halt, redirect, forward, pass) travel on the error side of Flow.
//! ```

pub mod content;
pub mod context;
pub mod dispatcher;
pub mod error_page;
pub mod signal;

pub use content::Content;
pub use context::Context;
pub use dispatcher::Dispatcher;
pub use error_page::{escape_html, render_error, ErrorReport};
pub use signal::{Flow, Interrupt, Signal};
