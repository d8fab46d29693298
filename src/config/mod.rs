//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server registry swaps in the new server list
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the server list is hot-reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    AuthConfig, ForwardingMode, ListenerConfig, ObservabilityConfig, ProxyConfig, ProxySettings,
    ServerConfig, TimeoutConfig,
};
pub use validation::ValidationError;
