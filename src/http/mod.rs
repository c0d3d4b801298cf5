//! HTTP types and the server adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum, body buffering, middleware)
//!     → request.rs (method, path, params, cookies)
//!     → Dispatcher
//!     → response.rs (status, headers, halted flag) → client
//! ```

pub mod cookie;
pub mod mime;
pub mod request;
pub mod response;
pub mod server;

pub use cookie::{Cookie, SameSite};
pub use mime::MimeTypes;
pub use request::{Params, Request, X_REQUEST_ID};
pub use response::Response;
pub use server::HttpServer;
