//! Encoding and decoding between [`TorrentRecord`]s and SQLite rows, plus the
//! builders for the parameterised statements the store issues.
//!
//! Column names are interpolated into SQL text, so every name coming from a
//! record or a filter is checked against the table's declared columns first
//! and then quoted.

use qtc_core::{
  record::{FieldValue, TorrentRecord},
  store::{Filter, Table},
};
use rusqlite::types::{Value, ValueRef};

use crate::{Error, Result};

// ─── Identifiers ─────────────────────────────────────────────────────────────

pub fn quote_ident(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

fn check_column(table: Table, column: &str) -> Result<()> {
  if table.has_column(column) {
    Ok(())
  } else {
    Err(Error::UnknownColumn { table: table.name(), column: column.to_owned() })
  }
}

// ─── Values ──────────────────────────────────────────────────────────────────

pub fn encode_value(v: &FieldValue) -> Value {
  match v {
    FieldValue::Null => Value::Null,
    FieldValue::Integer(i) => Value::Integer(*i),
    FieldValue::Real(r) => Value::Real(*r),
    FieldValue::Text(s) => Value::Text(s.clone()),
  }
}

pub fn decode_value(v: ValueRef<'_>) -> FieldValue {
  match v {
    ValueRef::Null => FieldValue::Null,
    ValueRef::Integer(i) => FieldValue::Integer(i),
    ValueRef::Real(r) => FieldValue::Real(r),
    ValueRef::Text(t) | ValueRef::Blob(t) => {
      FieldValue::Text(String::from_utf8_lossy(t).into_owned())
    }
  }
}

/// Read every column of `row` into a record, `NULL`s included.
pub fn decode_row(row: &rusqlite::Row<'_>, names: &[String]) -> rusqlite::Result<TorrentRecord> {
  names
    .iter()
    .enumerate()
    .map(|(i, name)| Ok((name.clone(), decode_value(row.get_ref(i)?))))
    .collect()
}

// ─── Statements ──────────────────────────────────────────────────────────────

/// A statement and its positional parameters, ready to move into a
/// connection closure.
#[derive(Debug, Clone)]
pub struct Statement {
  pub sql:    String,
  pub params: Vec<Value>,
}

pub fn insert(table: Table, row: &TorrentRecord) -> Result<Statement> {
  if row.is_empty() {
    return Err(Error::EmptyRow(table.name()));
  }

  let mut columns = Vec::with_capacity(row.len());
  let mut params = Vec::with_capacity(row.len());
  for (name, value) in row.iter() {
    check_column(table, name)?;
    columns.push(quote_ident(name));
    params.push(encode_value(value));
  }

  let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
  Ok(Statement {
    sql: format!(
      "INSERT INTO {} ({}) VALUES ({})",
      quote_ident(table.name()),
      columns.join(", "),
      placeholders.join(", ")
    ),
    params,
  })
}

/// `WHERE` clause for `filter`; empty when the filter has no terms.
pub fn where_clause(table: Table, filter: &Filter) -> Result<(String, Vec<Value>)> {
  if filter.is_empty() {
    return Ok((String::new(), Vec::new()));
  }

  let mut terms = Vec::with_capacity(filter.terms().len());
  let mut params = Vec::with_capacity(filter.terms().len());
  for (i, (name, value)) in filter.terms().iter().enumerate() {
    check_column(table, name)?;
    terms.push(format!("{} = ?{}", quote_ident(name), i + 1));
    params.push(encode_value(value));
  }
  Ok((format!(" WHERE {}", terms.join(" AND ")), params))
}

pub fn select(table: Table, filter: &Filter) -> Result<Statement> {
  let (clause, params) = where_clause(table, filter)?;
  Ok(Statement {
    sql: format!("SELECT * FROM {}{clause} ORDER BY rowid", quote_ident(table.name())),
    params,
  })
}

pub fn delete(table: Table, filter: &Filter) -> Result<Statement> {
  if filter.is_empty() {
    return Err(Error::EmptyFilter(table.name()));
  }
  let (clause, params) = where_clause(table, filter)?;
  Ok(Statement { sql: format!("DELETE FROM {}{clause}", quote_ident(table.name())), params })
}

pub fn exists(table: Table, filter: &Filter) -> Result<Statement> {
  let (clause, params) = where_clause(table, filter)?;
  Ok(Statement {
    sql: format!("SELECT EXISTS (SELECT 1 FROM {}{clause})", quote_ident(table.name())),
    params,
  })
}
