//! PostgreSQL adapter for strata-query
//!
//! Builds SELECT statements from [`QueryDescriptor`]s, runs raw statements and
//! performs paged bulk upserts with conflict resolution. Every operation opens its
//! own connection and closes it when done.

pub mod builder;
pub mod descriptor;
pub mod params;

pub use builder::{BulkUpsertOptions, OnConflict, Statement};
pub use descriptor::{
    Aggregation, ColumnSpec, Filter, FilterOperator, OrderBy, QueryDescriptor, SortDirection,
    TableJoin,
};

use async_trait::async_trait;
use strata_query::{
    Capability, ConfigSource, ConnectionConfig, DataError, DataSource, Result, Table,
};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

pub const DEFAULT_PORT: u16 = 5432;

/// Backslash-escape whitespace and backslashes for the startup `options` parameter
fn escape_option(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Result of [`PostgresStore::execute`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Table),
    Affected(u64),
}

impl QueryOutcome {
    pub fn into_table(self) -> Option<Table> {
        match self {
            QueryOutcome::Rows(table) => Some(table),
            QueryOutcome::Affected(_) => None,
        }
    }

    pub fn affected(&self) -> Option<u64> {
        match self {
            QueryOutcome::Affected(n) => Some(*n),
            QueryOutcome::Rows(_) => None,
        }
    }
}

/// Build a readable message from a driver error, including the server's
/// detail and hint when the error came from the database.
fn describe_pg_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db_error) => {
            let mut msg = db_error.message().to_string();

            if let Some(detail) = db_error.detail() {
                msg.push_str(&format!("; detail: {}", detail));
            }
            if let Some(hint) = db_error.hint() {
                msg.push_str(&format!("; hint: {}", hint));
            }
            if let Some(column) = db_error.column() {
                msg.push_str(&format!("; column: {}", column));
            }
            msg
        }
        None => e.to_string(),
    }
}

fn statement_error(sql: &str) -> impl FnOnce(tokio_postgres::Error) -> DataError + '_ {
    move |e| {
        error!("PostgreSQL statement failed: {}", describe_pg_error(&e));
        error!("Failed SQL: {}", sql);
        DataError::backend(format!("PostgreSQL statement failed: {}", sql), e)
    }
}

fn param_refs(params: &[params::SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

/// Relational store over one PostgreSQL database
#[derive(Debug, Clone)]
pub struct PostgresStore {
    config: ConnectionConfig,
}

impl PostgresStore {
    /// Wrap a connection profile. No connection is opened until the first call.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.require_database()?;
        Ok(Self { config })
    }

    /// Build a store from `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`,
    /// `POSTGRES_PASSWORD` and `POSTGRES_DB`
    pub fn from_config<C: ConfigSource>(source: &C) -> Result<Self> {
        let config = ConnectionConfig::new("postgres")
            .with_host(source.get_value("POSTGRES_HOST")?)
            .with_port(source.get_parsed::<u16>("POSTGRES_PORT")?)
            .with_username(source.get_value("POSTGRES_USER")?)
            .with_password(source.get_value("POSTGRES_PASSWORD")?)
            .with_database(source.get_value("POSTGRES_DB")?);

        let config = match source.get_optional("POSTGRES_SCHEMA") {
            Some(schema) => config.with_schema(schema),
            None => config,
        };

        Self::new(config)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Session options for one connection: the profile's extra options plus the
    /// search path of `schema`, falling back to the profile schema.
    ///
    /// A schema name is quoted as an identifier. The server splits the startup
    /// options on whitespace, so whitespace and backslashes are escaped and every
    /// entry stays a single `-c` setting.
    pub fn session_options(&self, schema: Option<&str>) -> Vec<String> {
        let mut options: Vec<String> = self
            .config
            .options
            .iter()
            .filter(|(key, _)| key.as_str() != "search_path")
            .map(|(key, value)| format!("-c {}={}", escape_option(key), escape_option(value)))
            .collect();

        let search_path = match schema.or(self.config.schema.as_deref()) {
            Some(schema) => Some(builder::quote_identifier(schema)),
            None => self.config.options.get("search_path").cloned(),
        };
        if let Some(search_path) = search_path {
            options.push(format!("-c search_path={}", escape_option(&search_path)));
        }

        options
    }

    fn pg_config(&self, schema: Option<&str>) -> Result<tokio_postgres::Config> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(self.config.host_or_default())
            .port(self.config.port_or(DEFAULT_PORT))
            .dbname(self.config.require_database()?)
            .application_name("strata");

        if let Some(user) = &self.config.username {
            pg.user(user);
        }
        if let Some(password) = &self.config.password {
            pg.password(password);
        }

        let options = self.session_options(schema);
        if !options.is_empty() {
            pg.options(&options.join(" "));
        }

        Ok(pg)
    }

    /// Open a scoped connection. The driver task ends when the client is dropped.
    async fn connect(&self, schema: Option<&str>) -> Result<Client> {
        let pg = self.pg_config(schema)?;

        debug!(
            "Connecting to PostgreSQL: {} (schema: {:?})",
            self.config.connection_string(),
            schema.or(self.config.schema.as_deref())
        );

        let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
            error!("PostgreSQL connection failed: {}", describe_pg_error(&e));
            DataError::backend(
                format!(
                    "Failed to connect to PostgreSQL at {}",
                    self.config.connection_string()
                ),
                e,
            )
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(client)
    }

    /// Run a descriptor and materialize the result set
    pub async fn query(&self, descriptor: &QueryDescriptor) -> Result<Table> {
        let statement = builder::build_select(descriptor)?;
        let outcome = self
            .execute(
                &statement.sql,
                &statement.params,
                true,
                descriptor.schema.as_deref(),
            )
            .await?;

        Ok(outcome.into_table().unwrap_or_else(Table::empty))
    }

    /// Run one statement on a fresh connection.
    ///
    /// With `fetch` the rows come back as a [`Table`] named from the statement's
    /// columns; otherwise the affected-row count is returned.
    pub async fn execute(
        &self,
        sql: &str,
        values: &[serde_json::Value],
        fetch: bool,
        schema: Option<&str>,
    ) -> Result<QueryOutcome> {
        let client = self.connect(schema).await?;

        debug!("Executing SQL: {} ({} params)", sql, values.len());

        let prepared = client.prepare(sql).await.map_err(statement_error(sql))?;
        let bound = params::bind_params(values, prepared.params())?;
        let refs = param_refs(&bound);

        if !fetch {
            let affected = client
                .execute(&prepared, &refs)
                .await
                .map_err(statement_error(sql))?;
            debug!("Statement affected {} rows", affected);
            return Ok(QueryOutcome::Affected(affected));
        }

        let rows = client
            .query(&prepared, &refs)
            .await
            .map_err(statement_error(sql))?;

        let mut table = Table::new(prepared.columns().iter().map(|c| c.name().to_string()));
        for row in &rows {
            table.push_row(params::row_values(row));
        }

        debug!("Query returned {} rows", table.len());
        Ok(QueryOutcome::Rows(table))
    }

    /// Insert `rows` in pages inside one transaction.
    ///
    /// All statements are built and validated before connecting. The transaction
    /// is committed only when `options.commit` is set.
    pub async fn bulk_upsert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<serde_json::Value>],
        options: &BulkUpsertOptions,
    ) -> Result<u64> {
        let statements = builder::build_bulk_upsert(table, columns, rows, options)?;
        if statements.is_empty() {
            debug!("Bulk upsert into {} skipped: no rows", table);
            return Ok(0);
        }

        let mut client = self.connect(options.schema.as_deref()).await?;
        let tx = client.transaction().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            DataError::backend("Failed to begin PostgreSQL transaction", e)
        })?;

        let mut affected = 0;
        for (page, statement) in statements.iter().enumerate() {
            debug!(
                "Bulk upsert page {}/{} into {} ({} params)",
                page + 1,
                statements.len(),
                table,
                statement.params.len()
            );

            let prepared = tx
                .prepare(&statement.sql)
                .await
                .map_err(statement_error(&statement.sql))?;
            let bound = params::bind_params(&statement.params, prepared.params())?;
            affected += tx
                .execute(&prepared, &param_refs(&bound))
                .await
                .map_err(statement_error(&statement.sql))?;
        }

        if options.commit {
            tx.commit().await.map_err(|e| {
                error!("Failed to commit bulk upsert into {}: {}", table, e);
                DataError::backend("Failed to commit PostgreSQL transaction", e)
            })?;
            info!("Bulk upsert into {} committed {} rows", table, affected);
        } else {
            tx.rollback().await.map_err(|e| {
                error!("Failed to roll back bulk upsert into {}: {}", table, e);
                DataError::backend("Failed to roll back PostgreSQL transaction", e)
            })?;
            debug!("Bulk upsert into {} rolled back ({} rows)", table, affected);
        }

        Ok(affected)
    }

    /// Bulk upsert every row of a [`Table`]
    pub async fn bulk_upsert_table(
        &self,
        table_name: &str,
        data: &Table,
        options: &BulkUpsertOptions,
    ) -> Result<u64> {
        self.bulk_upsert(table_name, &data.columns, &data.rows, options)
            .await
    }

    /// Column names of `table`, read from the description of a one-row probe
    pub async fn column_names(&self, table: &str, schema: Option<&str>) -> Result<Vec<String>> {
        let sql = builder::build_column_probe(table)?;
        let client = self.connect(schema).await?;

        debug!("Probing columns: {}", sql);
        let prepared = client.prepare(&sql).await.map_err(statement_error(&sql))?;

        Ok(prepared
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }
}

#[async_trait]
impl DataSource for PostgresStore {
    fn source_type(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Sql]
    }

    async fn close(&self) -> Result<()> {
        // Connections are scoped to each call
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_query::ConfigManager;

    fn store() -> PostgresStore {
        PostgresStore::new(
            ConnectionConfig::new("postgres")
                .with_host("localhost")
                .with_database("app")
                .with_schema("public")
                .with_option("statement_timeout", "5000"),
        )
        .unwrap()
    }

    #[test]
    fn test_session_options_are_rebuilt_per_call() {
        let store = store();

        assert_eq!(
            store.session_options(Some("analytics")),
            vec!["-c statement_timeout=5000", r#"-c search_path="analytics""#]
        );
        assert_eq!(
            store.session_options(None),
            vec!["-c statement_timeout=5000", r#"-c search_path="public""#]
        );
        assert_eq!(store.config().schema.as_deref(), Some("public"));
    }

    #[test]
    fn test_session_options_keep_schema_in_one_setting() {
        let store = store();

        assert_eq!(
            store.session_options(Some("my schema")),
            vec!["-c statement_timeout=5000", r#"-c search_path="my\ schema""#]
        );
        assert_eq!(
            store.session_options(Some("public -c statement_timeout=1")),
            vec![
                "-c statement_timeout=5000",
                r#"-c search_path="public\ -c\ statement_timeout=1""#
            ]
        );
        assert_eq!(
            store.session_options(Some(r"back\slash")),
            vec!["-c statement_timeout=5000", r#"-c search_path="back\\slash""#]
        );
    }

    #[test]
    fn test_profile_search_path_option_is_escaped() {
        let store = PostgresStore::new(
            ConnectionConfig::new("postgres")
                .with_database("app")
                .with_option("search_path", "tenant_a, public")
                .with_option("application_name", "nightly load"),
        )
        .unwrap();

        assert_eq!(
            store.session_options(None),
            vec![
                r"-c application_name=nightly\ load",
                r"-c search_path=tenant_a,\ public"
            ]
        );
    }

    #[test]
    fn test_requires_database() {
        let err = PostgresStore::new(ConnectionConfig::new("postgres")).unwrap_err();
        assert!(matches!(err, DataError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_from_config() {
        let source = ConfigManager::new()
            .with_override("POSTGRES_HOST", "db")
            .with_override("POSTGRES_PORT", "5433")
            .with_override("POSTGRES_USER", "app")
            .with_override("POSTGRES_PASSWORD", "secret")
            .with_override("POSTGRES_DB", "warehouse");

        let store = PostgresStore::from_config(&source).unwrap();
        assert_eq!(
            store.config().connection_string(),
            "postgres://app@db:5433/warehouse"
        );
    }

    #[test]
    fn test_from_config_errors() {
        let source = ConfigManager::new()
            .with_override("POSTGRES_HOST", "db")
            .with_override("POSTGRES_PORT", "not-a-port")
            .with_override("POSTGRES_USER", "app")
            .with_override("POSTGRES_PASSWORD", "secret")
            .with_override("POSTGRES_DB", "warehouse");
        assert!(matches!(
            PostgresStore::from_config(&source),
            Err(DataError::InvalidConfiguration(_))
        ));

        let source = ConfigManager::new().with_override("STRATA_PG_UNRELATED", "x");
        if std::env::var("POSTGRES_HOST").is_err() {
            assert!(matches!(
                PostgresStore::from_config(&source),
                Err(DataError::MissingConfigKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_validation_happens_before_connecting() {
        // Nothing listens on this port; a validation error proves no connection was tried
        let store = PostgresStore::new(
            ConnectionConfig::new("postgres")
                .with_host("127.0.0.1")
                .with_port(1)
                .with_database("app"),
        )
        .unwrap();

        let descriptor = QueryDescriptor::table("t").order_by(OrderBy::new("a", "sideways"));
        assert!(store.query(&descriptor).await.unwrap_err().is_validation());

        let options = BulkUpsertOptions {
            on_conflict: Some(OnConflict::DoUpdate),
            ..Default::default()
        };
        let err = store
            .bulk_upsert(
                "t",
                &["id".to_string()],
                &[vec![serde_json::json!(1)]],
                &options,
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_connection_failure_is_backend_error() {
        let store = PostgresStore::new(
            ConnectionConfig::new("postgres")
                .with_host("127.0.0.1")
                .with_port(1)
                .with_database("app"),
        )
        .unwrap();

        let err = store.column_names("t", None).await.unwrap_err();
        assert!(matches!(err, DataError::Backend { .. }));
    }
}
