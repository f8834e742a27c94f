//! Conversion between JSON values and PostgreSQL wire types.
//!
//! Parameters are converted against the types the server inferred when the
//! statement was prepared, so `{"id": 1}` binds as `int4`, `int8` or `numeric`
//! depending on the target column.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use std::error::Error;
use std::str::FromStr;
use strata_query::{DataError, Result};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::Row;

pub type SqlParam = Box<dyn ToSql + Sync + Send>;

/// NULL for any parameter type
#[derive(Debug)]
struct SqlNull;

impl ToSql for SqlNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn boxed<T: ToSql + Sync + Send + 'static>(value: T) -> SqlParam {
    Box::new(value)
}

/// Convert every value against the statement's parameter types
pub fn bind_params(values: &[Value], types: &[Type]) -> Result<Vec<SqlParam>> {
    if values.len() != types.len() {
        return Err(DataError::validation(format!(
            "Statement expects {} parameters but {} values were given",
            types.len(),
            values.len()
        )));
    }

    values
        .iter()
        .zip(types)
        .map(|(value, ty)| to_sql_param(value, ty))
        .collect()
}

pub fn to_sql_param(value: &Value, ty: &Type) -> Result<SqlParam> {
    if value.is_null() {
        return Ok(boxed(SqlNull));
    }

    let mismatch = || {
        DataError::Serialization(format!(
            "Cannot bind {} to a parameter of type {}",
            value,
            ty.name()
        ))
    };

    let param = match *ty {
        Type::BOOL => boxed(value.as_bool().ok_or_else(mismatch)?),
        Type::INT2 => boxed(
            as_integer(value)
                .and_then(|i| i16::try_from(i).ok())
                .ok_or_else(mismatch)?,
        ),
        Type::INT4 => boxed(
            as_integer(value)
                .and_then(|i| i32::try_from(i).ok())
                .ok_or_else(mismatch)?,
        ),
        Type::INT8 => boxed(as_integer(value).ok_or_else(mismatch)?),
        Type::FLOAT4 => boxed(value.as_f64().ok_or_else(mismatch)? as f32),
        Type::FLOAT8 => boxed(value.as_f64().ok_or_else(mismatch)?),
        Type::NUMERIC => boxed(as_decimal(value).ok_or_else(mismatch)?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => boxed(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        Type::JSON | Type::JSONB => boxed(value.clone()),
        Type::UUID => boxed(
            value
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .ok_or_else(mismatch)?,
        ),
        Type::TIMESTAMP => boxed(
            value
                .as_str()
                .and_then(parse_naive_datetime)
                .ok_or_else(mismatch)?,
        ),
        Type::TIMESTAMPTZ => boxed(
            value
                .as_str()
                .and_then(parse_utc_datetime)
                .ok_or_else(mismatch)?,
        ),
        Type::DATE => boxed(
            value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .ok_or_else(mismatch)?,
        ),
        _ => {
            return Err(DataError::Serialization(format!(
                "Parameters of type {} are not supported",
                ty.name()
            )))
        }
    };

    Ok(param)
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        },
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn parse_utc_datetime(s: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => parse_naive_datetime(s).map(|naive| naive.and_utc()),
    }
}

/// Materialize one row in column order
pub fn row_values(row: &Row) -> Vec<Value> {
    (0..row.columns().len())
        .map(|idx| extract_value(row, idx))
        .collect()
}

/// Read one cell as JSON. NULL and unreadable cells become `Value::Null`.
pub fn extract_value(row: &Row, idx: usize) -> Value {
    let column = &row.columns()[idx];

    match *column.type_() {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),

        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),

        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .unwrap_or(Value::Null),

        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .and_then(|v| Number::from_f64(v as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null),

        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),

        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)
            .ok()
            .flatten()
            .map(decimal_value)
            .unwrap_or(Value::Null),

        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_rfc3339()))
            .unwrap_or(Value::Null),

        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<Value>>(idx)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),

        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        // text, varchar, bpchar, name and anything else readable as a string
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Integral decimals become integers, the rest floats; out of range as text
fn decimal_value(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Value::Number(i.into());
        }
    }
    d.to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(d.to_string()))
}
