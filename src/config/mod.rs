//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, engine type resolution)
//!     → AppConfig (validated, immutable)
//!     → App::from_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once an App is built from it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AppConfig, AppSettings, EngineConfig, EnginesConfig, ListenerConfig, ObservabilityConfig};
pub use validation::{validate_config, ValidationError};
