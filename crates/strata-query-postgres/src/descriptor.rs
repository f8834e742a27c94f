//! In-memory description of a SELECT, translated to SQL by [`crate::builder`].
//!
//! Descriptors can be assembled with the builder methods or deserialized from JSON
//! (`{"table": "t", "group": ["region"], "columns": [{"column": "amount", "func": "sum"}]}`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use strata_query::{DataError, Result};

/// One entry of the SELECT list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    Plain(String),
    Aggregate(Aggregation),
}

impl From<&str> for ColumnSpec {
    fn from(name: &str) -> Self {
        ColumnSpec::Plain(name.to_string())
    }
}

impl From<String> for ColumnSpec {
    fn from(name: String) -> Self {
        ColumnSpec::Plain(name)
    }
}

impl From<Aggregation> for ColumnSpec {
    fn from(aggregation: Aggregation) -> Self {
        ColumnSpec::Aggregate(aggregation)
    }
}

/// `<function>(<column>) AS <alias>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Aggregation {
    pub column: String,
    #[serde(rename = "func", alias = "function")]
    pub function: String,
    #[serde(default, alias = "new_name", skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Aggregation {
    pub fn new(function: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            function: function.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Output column name, `<function>_<column>` unless aliased
    pub fn output_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.function, self.column))
    }
}

/// Comparison operators accepted in filter conditions
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FilterOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    Is,
    IsNot,
}

impl FilterOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "<>",
            FilterOperator::Lt => "<",
            FilterOperator::LtEq => "<=",
            FilterOperator::Gt => ">",
            FilterOperator::GtEq => ">=",
            FilterOperator::Like => "LIKE",
            FilterOperator::NotLike => "NOT LIKE",
            FilterOperator::ILike => "ILIKE",
            FilterOperator::NotILike => "NOT ILIKE",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
            FilterOperator::Is => "IS",
            FilterOperator::IsNot => "IS NOT",
        }
    }

    /// Operators whose value is a sequence
    pub fn takes_sequence(&self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::NotIn)
    }
}

impl FromStr for FilterOperator {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let op = match normalized.as_str() {
            "=" | "==" => FilterOperator::Eq,
            "!=" | "<>" => FilterOperator::NotEq,
            "<" => FilterOperator::Lt,
            "<=" => FilterOperator::LtEq,
            ">" => FilterOperator::Gt,
            ">=" => FilterOperator::GtEq,
            "like" => FilterOperator::Like,
            "not like" => FilterOperator::NotLike,
            "ilike" => FilterOperator::ILike,
            "not ilike" => FilterOperator::NotILike,
            "in" => FilterOperator::In,
            "not in" => FilterOperator::NotIn,
            "is" => FilterOperator::Is,
            "is not" => FilterOperator::IsNot,
            _ => {
                return Err(DataError::validation(format!(
                    "Unsupported filter operator '{}'",
                    s
                )))
            }
        };
        Ok(op)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// `<column> <operator> <value>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    pub column: String,
    #[serde(alias = "condition")]
    pub operator: String,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, "=", value)
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(column, "IN", Value::Array(values))
    }

    /// Parsed operator, with the sequence requirement of IN checked
    pub fn checked_operator(&self) -> Result<FilterOperator> {
        let op: FilterOperator = self.operator.parse()?;

        if op.takes_sequence() {
            match &self.value {
                Value::Array(items) if !items.is_empty() => {}
                Value::Array(_) => {
                    return Err(DataError::validation(format!(
                        "Filter on '{}': value for '{}' must not be empty",
                        self.column, op
                    )))
                }
                _ => {
                    return Err(DataError::validation(format!(
                        "Filter on '{}': if condition '{}' is used, the value must be a list",
                        self.column, op
                    )))
                }
            }
        }

        if matches!(op, FilterOperator::Is | FilterOperator::IsNot)
            && !matches!(self.value, Value::Null | Value::Bool(_))
        {
            return Err(DataError::validation(format!(
                "Filter on '{}': '{}' only compares against null, true or false",
                self.column, op
            )));
        }

        Ok(op)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(DataError::validation(format!(
                "Order method '{}' is not one of asc, desc",
                s
            ))),
        }
    }
}

/// `ORDER BY <column> <method>`; only these two keys are accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderBy {
    pub column: String,
    pub method: String,
}

impl OrderBy {
    pub fn new(column: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            method: method.into(),
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, "asc")
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, "desc")
    }

    pub fn direction(&self) -> Result<SortDirection> {
        self.method.parse()
    }
}

/// Join request. Accepted in descriptors but rejected at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableJoin {
    pub table: String,
    pub left_column: String,
    pub right_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDescriptor {
    pub table: String,
    #[serde(default)]
    pub columns: Option<Vec<ColumnSpec>>,
    #[serde(default, alias = "group")]
    pub group_by: Option<Vec<String>>,
    #[serde(default, alias = "where", alias = "where_condition")]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default, alias = "table_joins")]
    pub joins: Vec<TableJoin>,
    /// Search path override for this query only
    #[serde(default)]
    pub schema: Option<String>,
}

impl QueryDescriptor {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: None,
            group_by: None,
            filters: Vec::new(),
            order_by: Vec::new(),
            joins: Vec::new(),
            schema: None,
        }
    }

    /// Parse a JSON descriptor; shape errors surface as validation errors
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| DataError::validation(format!("Malformed query descriptor: {}", e)))
    }

    pub fn columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnSpec>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn join(mut self, join: TableJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Check the descriptor without building SQL.
    ///
    /// Grouped queries take aggregation specs only, ungrouped queries plain names
    /// only. Order methods must be asc/desc and IN values sequences.
    pub fn validate(&self) -> Result<()> {
        validate_identifier_name("table", &self.table)?;

        if let Some(group) = &self.group_by {
            if group.is_empty() {
                return Err(DataError::validation("Group by list must not be empty"));
            }
            for column in group {
                validate_identifier_name("group by column", column)?;
            }
        }

        if let Some(columns) = &self.columns {
            if columns.is_empty() {
                return Err(DataError::validation("Column list must not be empty"));
            }

            let grouped = self.group_by.is_some();
            for column in columns {
                match (column, grouped) {
                    (ColumnSpec::Plain(name), false) => {
                        validate_identifier_name("column", name)?;
                    }
                    (ColumnSpec::Aggregate(agg), true) => {
                        validate_identifier_name("column", &agg.column)?;
                        validate_function_name(&agg.function)?;
                        if let Some(alias) = &agg.alias {
                            validate_identifier_name("alias", alias)?;
                        }
                    }
                    (ColumnSpec::Plain(name), true) => {
                        return Err(DataError::validation(format!(
                            "Column '{}' must be an aggregation when grouping",
                            name
                        )))
                    }
                    (ColumnSpec::Aggregate(agg), false) => {
                        return Err(DataError::validation(format!(
                            "Aggregation on '{}' requires a group by list",
                            agg.column
                        )))
                    }
                }
            }
        }

        for order in &self.order_by {
            validate_identifier_name("order by column", &order.column)?;
            order.direction()?;
        }

        for filter in &self.filters {
            validate_identifier_name("filter column", &filter.column)?;
            filter.checked_operator()?;
        }

        if !self.joins.is_empty() {
            return Err(DataError::operation_not_supported(
                "Table joins are not implemented",
            ));
        }

        Ok(())
    }
}

fn validate_identifier_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DataError::validation(format!("Empty {} name", kind)));
    }
    if name.contains('\0') {
        return Err(DataError::validation(format!(
            "Invalid {} name '{}': contains NUL",
            kind,
            name.escape_debug()
        )));
    }
    Ok(())
}

/// Aggregate functions are emitted verbatim, so they must be bare SQL identifiers
fn validate_function_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DataError::validation(format!(
            "Invalid aggregate function '{}'",
            name
        )));
    }
    Ok(())
}
