use crate::error::{DataError, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Connection profile for one backend.
///
/// Built once with the `with_*` setters and then handed to an adapter, which owns it
/// and never mutates it. Per-call variations (schema, namespace) are layered on top
/// by the adapter without touching the profile.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Backend type identifier (postgres, mongodb, redis)
    pub backend: String,
    /// Host or connection endpoint
    pub host: Option<String>,
    /// Port number
    pub port: Option<u16>,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Database name (Postgres, MongoDB) or database index (Redis)
    pub database: Option<String>,
    /// Default collection (MongoDB)
    pub collection: Option<String>,
    /// Default schema / search path (Postgres)
    pub schema: Option<String>,
    /// Additional backend options as key-value pairs
    pub options: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            collection: None,
            schema: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Host, defaulting to localhost
    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    /// Port, falling back to the backend's well-known port
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    /// Database name, required by backends that address a named database
    pub fn require_database(&self) -> Result<&str> {
        self.database.as_deref().ok_or_else(|| {
            DataError::invalid_configuration(format!(
                "{} connection requires a database",
                self.backend
            ))
        })
    }

    /// Get connection string for display purposes (without password)
    pub fn connection_string(&self) -> String {
        let mut parts = vec![format!("{}://", self.backend)];

        if let Some(username) = &self.username {
            parts.push(format!("{}@", username));
        }

        parts.push(self.host_or_default().to_string());

        if let Some(port) = self.port {
            parts.push(format!(":{}", port));
        }

        if let Some(database) = &self.database {
            parts.push(format!("/{}", database));
        }

        parts.join("")
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("schema", &self.schema)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_document_namespace() {
        let config = ConnectionConfig::new("mongodb")
            .with_host("mongo.internal")
            .with_port(27018)
            .with_database("events")
            .with_collection("clicks")
            .with_option("authSource", "admin");

        assert_eq!(config.host_or_default(), "mongo.internal");
        assert_eq!(config.port_or(27017), 27018);
        assert_eq!(config.collection.as_deref(), Some("clicks"));
        assert_eq!(config.options.get("authSource").map(String::as_str), Some("admin"));
    }

    #[test]
    fn test_connection_string_hides_password() {
        let config = ConnectionConfig::new("postgres")
            .with_host("db.internal")
            .with_port(5432)
            .with_username("felix")
            .with_password("hunter2")
            .with_database("mydb");

        assert_eq!(
            config.connection_string(),
            "postgres://felix@db.internal:5432/mydb"
        );
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_require_database() {
        let config = ConnectionConfig::new("mongodb");
        assert!(matches!(
            config.require_database(),
            Err(DataError::InvalidConfiguration(_))
        ));
        assert_eq!(config.with_database("app").require_database().unwrap(), "app");
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::new("redis");
        assert_eq!(config.host_or_default(), "localhost");
        assert_eq!(config.port_or(6379), 6379);
    }
}
