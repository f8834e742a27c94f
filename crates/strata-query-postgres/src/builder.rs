//! SQL text generation.
//!
//! Every identifier is double-quoted and every value is a positional `$n`
//! parameter. Nothing here touches the network, so every validation error is
//! raised before a connection is opened.

use crate::descriptor::{ColumnSpec, FilterOperator, QueryDescriptor};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use strata_query::{DataError, Result};

/// Highest parameter index the PostgreSQL wire protocol can address
pub const MAX_BIND_PARAMS: usize = 65535;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// SQL text plus the values for its `$1..$n` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter and return its placeholder
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Translate a descriptor into a SELECT statement
pub fn build_select(descriptor: &QueryDescriptor) -> Result<Statement> {
    descriptor.validate()?;

    let mut statement = Statement::new(String::new());
    let select_list = select_list(descriptor);

    let mut sql = format!(
        "SELECT {} FROM {}",
        select_list,
        quote_identifier(&descriptor.table)
    );

    if !descriptor.filters.is_empty() {
        let mut conditions = Vec::with_capacity(descriptor.filters.len());
        for filter in &descriptor.filters {
            let op = filter.checked_operator()?;
            let column = quote_identifier(&filter.column);
            let condition = match (op, &filter.value) {
                (FilterOperator::Is | FilterOperator::IsNot, value) => {
                    let literal = match value {
                        Value::Bool(true) => "TRUE",
                        Value::Bool(false) => "FALSE",
                        _ => "NULL",
                    };
                    format!("{} {} {}", column, op, literal)
                }
                (FilterOperator::In | FilterOperator::NotIn, Value::Array(items)) => {
                    let placeholders = items
                        .iter()
                        .map(|item| statement.bind(item.clone()))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{} {} ({})", column, op, placeholders)
                }
                (_, value) => {
                    let placeholder = statement.bind(value.clone());
                    format!("{} {} {}", column, op, placeholder)
                }
            };
            conditions.push(condition);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    if let Some(group) = &descriptor.group_by {
        sql.push_str(" GROUP BY ");
        sql.push_str(&quote_list(group));
    }

    if !descriptor.order_by.is_empty() {
        let mut orders = Vec::with_capacity(descriptor.order_by.len());
        for order in &descriptor.order_by {
            orders.push(format!(
                "{} {}",
                quote_identifier(&order.column),
                order.direction()?.as_sql()
            ));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&orders.join(", "));
    }

    statement.sql = sql;
    Ok(statement)
}

fn select_list(descriptor: &QueryDescriptor) -> String {
    match (&descriptor.columns, &descriptor.group_by) {
        (None, None) => "*".to_string(),
        (None, Some(group)) => quote_list(group),
        (Some(columns), group) => {
            let mut items: Vec<String> = group
                .iter()
                .flatten()
                .map(|g| quote_identifier(g))
                .collect();
            for column in columns {
                items.push(match column {
                    ColumnSpec::Plain(name) => quote_identifier(name),
                    ColumnSpec::Aggregate(agg) => format!(
                        "{}({}) AS {}",
                        agg.function,
                        quote_identifier(&agg.column),
                        quote_identifier(&agg.output_name())
                    ),
                });
            }
            items.join(", ")
        }
    }
}

/// Zero-row probe used to read a table's column names
pub fn build_column_probe(table: &str) -> Result<String> {
    if table.is_empty() {
        return Err(DataError::validation("Empty table name"));
    }
    Ok(format!("SELECT * FROM {} LIMIT 1", quote_identifier(table)))
}

/// Conflict resolution for bulk inserts
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OnConflict {
    DoNothing,
    DoUpdate,
}

impl FromStr for OnConflict {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "do_nothing" | "nothing" => Ok(OnConflict::DoNothing),
            "do_update" | "update" => Ok(OnConflict::DoUpdate),
            _ => Err(DataError::validation(format!(
                "Unknown conflict action '{}', expected do_nothing or do_update",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkUpsertOptions {
    /// Rows per INSERT statement
    pub page_size: usize,
    /// Commit the transaction; when false every page is rolled back
    pub commit: bool,
    pub on_conflict: Option<OnConflict>,
    /// Conflict target
    pub id_columns: Vec<String>,
    /// Columns overwritten by `DoUpdate`, all row columns when unset
    pub update_columns: Option<Vec<String>>,
    /// Search path override for this call only
    pub schema: Option<String>,
}

impl Default for BulkUpsertOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            commit: true,
            on_conflict: None,
            id_columns: Vec::new(),
            update_columns: None,
            schema: None,
        }
    }
}

impl BulkUpsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn do_nothing(mut self) -> Self {
        self.on_conflict = Some(OnConflict::DoNothing);
        self
    }

    pub fn do_update<I, S>(mut self, id_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_conflict = Some(OnConflict::DoUpdate);
        self.id_columns = id_columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_id_columns<I, S>(mut self, id_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_columns = id_columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_update_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    fn conflict_clause(&self, columns: &[String]) -> Result<Option<String>> {
        match self.on_conflict {
            None => Ok(None),
            Some(OnConflict::DoNothing) if self.id_columns.is_empty() => {
                Ok(Some("ON CONFLICT DO NOTHING".to_string()))
            }
            Some(OnConflict::DoNothing) => Ok(Some(format!(
                "ON CONFLICT ({}) DO NOTHING",
                quote_list(&self.id_columns)
            ))),
            Some(OnConflict::DoUpdate) => {
                if self.id_columns.is_empty() {
                    return Err(DataError::validation(
                        "do_update requires at least one id column",
                    ));
                }

                let update_columns = self.update_columns.as_deref().unwrap_or(columns);
                let assignment = match update_columns {
                    [] => {
                        return Err(DataError::validation(
                            "do_update requires at least one update column",
                        ))
                    }
                    [single] => {
                        let quoted = quote_identifier(single);
                        format!("{} = EXCLUDED.{}", quoted, quoted)
                    }
                    many => format!(
                        "({}) = ({})",
                        quote_list(many),
                        many.iter()
                            .map(|c| format!("EXCLUDED.{}", quote_identifier(c)))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                };

                Ok(Some(format!(
                    "ON CONFLICT ({}) DO UPDATE SET {}",
                    quote_list(&self.id_columns),
                    assignment
                )))
            }
        }
    }
}

/// One multi-row INSERT per page of `options.page_size` rows.
///
/// Rows shorter than `columns` are padded with NULL; wider rows are rejected.
pub fn build_bulk_upsert(
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
    options: &BulkUpsertOptions,
) -> Result<Vec<Statement>> {
    if table.is_empty() {
        return Err(DataError::validation("Empty table name"));
    }
    if columns.is_empty() {
        return Err(DataError::validation("Bulk upsert requires a column list"));
    }
    if options.page_size == 0 {
        return Err(DataError::validation("page_size must be greater than zero"));
    }

    let conflict = options.conflict_clause(columns)?;

    let largest_page = options.page_size.min(rows.len());
    if largest_page * columns.len() > MAX_BIND_PARAMS {
        return Err(DataError::validation(format!(
            "{} rows of {} columns exceed the limit of {} parameters per statement, lower page_size",
            largest_page,
            columns.len(),
            MAX_BIND_PARAMS
        )));
    }

    if let Some((idx, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() > columns.len())
    {
        return Err(DataError::validation(format!(
            "Row {} has {} values but only {} columns were given",
            idx,
            row.len(),
            columns.len()
        )));
    }

    let prefix = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_identifier(table),
        quote_list(columns)
    );

    let mut statements = Vec::new();
    for page in rows.chunks(options.page_size) {
        let mut statement = Statement::new(String::new());
        let mut tuples = Vec::with_capacity(page.len());

        for row in page {
            let placeholders = (0..columns.len())
                .map(|i| statement.bind(row.get(i).cloned().unwrap_or(Value::Null)))
                .collect::<Vec<_>>()
                .join(", ");
            tuples.push(format!("({})", placeholders));
        }

        let mut sql = format!("{}{}", prefix, tuples.join(", "));
        if let Some(clause) = &conflict {
            sql.push(' ');
            sql.push_str(clause);
        }
        statement.sql = sql;
        statements.push(statement);
    }

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Aggregation, Filter, OrderBy, TableJoin};
    use serde_json::json;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_grouped_aggregate_select() {
        let desc = QueryDescriptor::from_json(json!({
            "table": "t",
            "group": ["region"],
            "columns": [{"column": "amount", "func": "sum"}]
        }))
        .unwrap();

        let statement = build_select(&desc).unwrap();
        assert_eq!(
            statement.sql,
            r#"SELECT "region", sum("amount") AS "sum_amount" FROM "t" GROUP BY "region""#
        );
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_select_star() {
        let statement = build_select(&QueryDescriptor::table("events")).unwrap();
        assert_eq!(statement.sql, r#"SELECT * FROM "events""#);
    }

    #[test]
    fn test_group_without_columns_selects_group() {
        let desc = QueryDescriptor::table("t").group_by(["region", "year"]);
        assert_eq!(
            build_select(&desc).unwrap().sql,
            r#"SELECT "region", "year" FROM "t" GROUP BY "region", "year""#
        );
    }

    #[test]
    fn test_filters_and_ordering() {
        let desc = QueryDescriptor::table("orders")
            .columns(["id", "status"])
            .filter(Filter::eq("status", json!("open")))
            .filter(Filter::is_in("region", vec![json!("eu"), json!("us")]))
            .filter(Filter::new("amount", ">=", json!(10)))
            .order_by(OrderBy::desc("id"))
            .order_by(OrderBy::new("status", "ASC"));

        let statement = build_select(&desc).unwrap();
        assert_eq!(
            statement.sql,
            r#"SELECT "id", "status" FROM "orders" WHERE "status" = $1 AND "region" IN ($2, $3) AND "amount" >= $4 ORDER BY "id" DESC, "status" ASC"#
        );
        assert_eq!(
            statement.params,
            vec![json!("open"), json!("eu"), json!("us"), json!(10)]
        );
    }

    #[test]
    fn test_is_null_is_rendered_literally() {
        let desc = QueryDescriptor::table("t")
            .filter(Filter::new("deleted_at", "is", Value::Null))
            .filter(Filter::new("active", "IS NOT", json!(false)));

        let statement = build_select(&desc).unwrap();
        assert_eq!(
            statement.sql,
            r#"SELECT * FROM "t" WHERE "deleted_at" IS NULL AND "active" IS NOT FALSE"#
        );
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_identifiers_are_quoted() {
        let desc = QueryDescriptor::table(r#"we"ird"#).columns(["select"]);
        assert_eq!(
            build_select(&desc).unwrap().sql,
            r#"SELECT "select" FROM "we""ird""#
        );
    }

    #[test]
    fn test_aliased_aggregates() {
        let desc = QueryDescriptor::table("sales").group_by(["region"]).columns(vec![
            Aggregation::new("sum", "amount").with_alias("total"),
            Aggregation::new("count", "id"),
        ]);
        assert_eq!(
            build_select(&desc).unwrap().sql,
            r#"SELECT "region", sum("amount") AS "total", count("id") AS "count_id" FROM "sales" GROUP BY "region""#
        );
    }

    #[test]
    fn test_select_rejects_joins() {
        let desc = QueryDescriptor::table("a").join(TableJoin {
            table: "b".to_string(),
            left_column: "b_id".to_string(),
            right_column: "id".to_string(),
        });
        assert!(matches!(
            build_select(&desc),
            Err(DataError::OperationNotSupported(_))
        ));
    }

    #[test]
    fn test_column_probe() {
        assert_eq!(
            build_column_probe("users").unwrap(),
            r#"SELECT * FROM "users" LIMIT 1"#
        );
    }

    #[test]
    fn test_bulk_insert_pages() {
        let rows = vec![
            vec![json!(1), json!("a")],
            vec![json!(2), json!("b")],
            vec![json!(3)],
        ];
        let options = BulkUpsertOptions::new().with_page_size(2);

        let statements =
            build_bulk_upsert("items", &cols(&["id", "name"]), &rows, &options).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].sql,
            r#"INSERT INTO "items" ("id", "name") VALUES ($1, $2), ($3, $4)"#
        );
        assert_eq!(
            statements[1].sql,
            r#"INSERT INTO "items" ("id", "name") VALUES ($1, $2)"#
        );
        assert_eq!(statements[1].params, vec![json!(3), Value::Null]);
    }

    #[test]
    fn test_bulk_do_nothing() {
        let rows = vec![vec![json!(1), json!("a")]];

        let options = BulkUpsertOptions::new().do_nothing();
        let statements =
            build_bulk_upsert("items", &cols(&["id", "name"]), &rows, &options).unwrap();
        assert!(statements[0].sql.ends_with("ON CONFLICT DO NOTHING"));

        let options = options.with_id_columns(["id"]);
        let statements =
            build_bulk_upsert("items", &cols(&["id", "name"]), &rows, &options).unwrap();
        assert!(statements[0].sql.ends_with(r#"ON CONFLICT ("id") DO NOTHING"#));
    }

    #[test]
    fn test_bulk_do_update() {
        let rows = vec![vec![json!(1), json!("a"), json!(2.5)]];
        let columns = cols(&["id", "name", "score"]);

        let options = BulkUpsertOptions::new()
            .do_update(["id"])
            .with_update_columns(["name", "score"]);
        let statements = build_bulk_upsert("items", &columns, &rows, &options).unwrap();
        assert!(statements[0].sql.ends_with(
            r#"ON CONFLICT ("id") DO UPDATE SET ("name", "score") = (EXCLUDED."name", EXCLUDED."score")"#
        ));

        let options = BulkUpsertOptions::new()
            .do_update(["id"])
            .with_update_columns(["name"]);
        let statements = build_bulk_upsert("items", &columns, &rows, &options).unwrap();
        assert!(statements[0]
            .sql
            .ends_with(r#"ON CONFLICT ("id") DO UPDATE SET "name" = EXCLUDED."name""#));
    }

    #[test]
    fn test_do_update_defaults_to_all_columns() {
        let rows = vec![vec![json!(1), json!("a")]];
        let options = BulkUpsertOptions::new().do_update(["id"]);
        let statements =
            build_bulk_upsert("items", &cols(&["id", "name"]), &rows, &options).unwrap();
        assert!(statements[0].sql.ends_with(
            r#"DO UPDATE SET ("id", "name") = (EXCLUDED."id", EXCLUDED."name")"#
        ));
    }

    #[test]
    fn test_do_update_requires_id_columns() {
        let rows = vec![vec![json!(1)]];
        let options = BulkUpsertOptions {
            on_conflict: Some(OnConflict::DoUpdate),
            ..Default::default()
        };
        let err = build_bulk_upsert("items", &cols(&["id"]), &rows, &options).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_bulk_validation() {
        let columns = cols(&["id"]);

        let wide = vec![vec![json!(1), json!(2)]];
        assert!(build_bulk_upsert("t", &columns, &wide, &BulkUpsertOptions::new())
            .unwrap_err()
            .is_validation());

        let rows = vec![vec![json!(1)]];
        let zero_page = BulkUpsertOptions::new().with_page_size(0);
        assert!(build_bulk_upsert("t", &columns, &rows, &zero_page)
            .unwrap_err()
            .is_validation());

        assert!(build_bulk_upsert("t", &[], &rows, &BulkUpsertOptions::new())
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_bulk_parameter_limit() {
        let columns: Vec<String> = (0..100).map(|i| format!("c{}", i)).collect();
        let rows = vec![vec![Value::Null; 100]; 1000];

        let err =
            build_bulk_upsert("wide", &columns, &rows, &BulkUpsertOptions::new()).unwrap_err();
        assert!(err.is_validation());

        let options = BulkUpsertOptions::new().with_page_size(500);
        let statements = build_bulk_upsert("wide", &columns, &rows, &options).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].params.len(), 50_000);
    }

    #[test]
    fn test_empty_rows_produce_no_statements() {
        let statements =
            build_bulk_upsert("t", &cols(&["id"]), &[], &BulkUpsertOptions::new()).unwrap();
        assert!(statements.is_empty());
    }

    #[test]
    fn test_on_conflict_parse() {
        assert_eq!("do_nothing".parse::<OnConflict>().unwrap(), OnConflict::DoNothing);
        assert_eq!("DO_UPDATE".parse::<OnConflict>().unwrap(), OnConflict::DoUpdate);
        assert!("merge".parse::<OnConflict>().is_err());
    }
}
