use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Capabilities supported by a data source
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Capability {
    /// SQL-based queries (Postgres)
    Sql,
    /// Document-based (MongoDB)
    Document,
    /// Key-value pairs (Redis, MongoDB by identifier)
    KeyValue,
    /// FIFO task queues
    Queue,
    /// Publish/subscribe channels
    PubSub,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Sql => write!(f, "sql"),
            Capability::Document => write!(f, "document"),
            Capability::KeyValue => write!(f, "key-value"),
            Capability::Queue => write!(f, "queue"),
            Capability::PubSub => write!(f, "pub-sub"),
        }
    }
}

/// Per-call namespace override.
///
/// Each component is independent: overriding the collection keeps the adapter's
/// default database and vice versa.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub database: Option<String>,
    pub collection: Option<String>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Merge against defaults, override wins
    pub fn resolve<'a>(
        &'a self,
        default_database: &'a str,
        default_collection: &'a str,
    ) -> (&'a str, &'a str) {
        (
            self.database.as_deref().unwrap_or(default_database),
            self.collection.as_deref().unwrap_or(default_collection),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.database.is_none() && self.collection.is_none()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.database.as_deref().unwrap_or("<default>"),
            self.collection.as_deref().unwrap_or("<default>")
        )
    }
}

/// Tabular data: ordered column names plus positional rows.
///
/// Used both for relational query results and as bulk insert input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Table with neither columns nor rows
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, in row order. Short rows yield `Null`.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).unwrap_or(&Value::Null))
                .collect(),
        )
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(idx, name)| (name.clone(), row.get(idx).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }
}

/// Convert a float into a cell value. NaN and infinities become `Null`.
pub fn float_cell(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_namespace_override_is_independent() {
        let ns = Namespace::new().with_collection("events");
        assert_eq!(ns.resolve("app", "items"), ("app", "events"));

        let ns = Namespace::new().with_database("archive");
        assert_eq!(ns.resolve("app", "items"), ("archive", "items"));

        assert_eq!(Namespace::default().resolve("app", "items"), ("app", "items"));
    }

    #[test]
    fn test_table_column_access() {
        let table = Table::new(["region", "sum_amount"])
            .with_row(vec![json!("eu"), json!(10)])
            .with_row(vec![json!("us")]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "sum_amount"), Some(&json!(10)));
        assert_eq!(table.get(1, "sum_amount"), None);
        assert_eq!(
            table.column("sum_amount").unwrap(),
            vec![&json!(10), &Value::Null]
        );
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_table_records() {
        let table = Table::new(["id", "name"]).with_row(vec![json!(1), json!("a")]);
        let records = table.to_records();
        assert_eq!(records[0]["id"], json!(1));
        assert_eq!(records[0]["name"], json!("a"));
    }

    #[test]
    fn test_float_cell_normalizes_nan() {
        assert_eq!(float_cell(f64::NAN), Value::Null);
        assert_eq!(float_cell(f64::INFINITY), Value::Null);
        assert_eq!(float_cell(1.5), json!(1.5));
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::Sql.to_string(), "sql");
        assert_eq!(Capability::KeyValue.to_string(), "key-value");
        assert_eq!(Capability::PubSub.to_string(), "pub-sub");
    }
}
