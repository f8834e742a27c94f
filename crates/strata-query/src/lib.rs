//! # strata-query
//!
//! Core abstractions shared by the Strata storage adapters.
//!
//! This crate provides the pieces every backend crate builds on:
//! - PostgreSQL (SQL) in `strata-query-postgres`
//! - Redis (Key-Value, Queue, Pub/Sub) in `strata-query-redis`
//! - MongoDB (Document) in `strata-query-mongodb`
//!
//! ## Architecture
//!
//! - **DataSource**: Core trait every adapter implements
//! - **KeyValueStore**: Key-based access shared by the document store and the cache
//! - **ConnectionConfig**: Immutable connection profile owned by one adapter
//! - **ConfigSource / ConfigManager**: Key lookup used by adapter factories
//! - **DataError**: Error taxonomy shared by all adapters
//!
//! Adapters share no state with each other. Each one owns its profile and opens
//! backend connections per operation.
//!
//! ## Example
//!
//! ```rust
//! use strata_query::{ConfigManager, ConfigSource, ConnectionConfig, Namespace};
//!
//! let config = ConnectionConfig::new("postgres")
//!     .with_host("localhost")
//!     .with_port(5432)
//!     .with_database("mydb");
//! assert_eq!(config.connection_string(), "postgres://localhost:5432/mydb");
//!
//! let manager = ConfigManager::with_defaults([("POSTGRES_PORT", "5432")]);
//! assert!(manager.get_value("POSTGRES_PORT").is_ok());
//!
//! let ns = Namespace::new().with_collection("events");
//! assert_eq!(ns.resolve("app", "items"), ("app", "events"));
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use config::{ConfigManager, ConfigSource};
pub use connection::ConnectionConfig;
pub use error::{BoxError, DataError, Result};
pub use traits::{DataSource, KeyValueStore};
pub use types::{float_cell, Capability, Namespace, Table};
