//! Hook-aware built-in route handlers.

pub mod file;

pub use file::{FileHandler, SendFileOptions};
