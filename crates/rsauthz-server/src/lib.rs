//! rsauthz-server: configuration, storage adapters and the service facade
//!
//! This crate connects the domain engine to storage:
//! - Layered configuration (defaults, YAML file, `RSAUTHZ_` environment)
//! - Logging initialisation
//! - `DataStore` adapters implementing the resolver's reader traits,
//!   with a compiled schema cache
//! - `AuthzService`, the engine-level API
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsauthz-server                 │
//! ├─────────────────────────────────────────────┤
//! │  config.rs        - ServerConfig loading    │
//! │  observability.rs - Logging setup           │
//! │  adapters.rs      - DataStore -> readers    │
//! │  service.rs       - AuthzService            │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod observability;
pub mod service;

pub use config::{ConfigLoadError, ServerConfig};
pub use observability::{init_logging, LoggingConfig};
pub use service::{AuthzService, ServiceError, ServiceResult};
