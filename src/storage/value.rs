//! Engine-neutral SQL parameters and result rows.

use rusqlite::types::{Type, ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};

use crate::error::Result;

/// A single SQL parameter or column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    fn type_name(&self) -> Type {
        match self {
            SqlValue::Null => Type::Null,
            SqlValue::Integer(_) => Type::Integer,
            SqlValue::Real(_) => Type::Real,
            SqlValue::Text(_) => Type::Text,
            SqlValue::Blob(_) => Type::Blob,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Build a `Vec<SqlValue>` from heterogeneous values.
///
/// ```
/// use scriptorium::sql_params;
/// use scriptorium::storage::SqlValue;
///
/// let params = sql_params!["abc", 3_i64, None::<String>];
/// assert_eq!(params[2], SqlValue::Null);
/// ```
#[macro_export]
macro_rules! sql_params {
    () => { Vec::<$crate::storage::SqlValue>::new() };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::storage::SqlValue::from($value)),+]
    };
}

/// One statement of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// A result row with named columns in select order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.columns.iter().map(|(_, v)| v)
    }

    fn require(&self, name: &str) -> Result<&SqlValue> {
        self.get(name)
            .ok_or_else(|| rusqlite::Error::InvalidColumnName(name.to_string()).into())
    }

    fn mismatch(&self, name: &str, value: &SqlValue) -> crate::Error {
        let idx = self.columns.iter().position(|(c, _)| c == name).unwrap_or(0);
        rusqlite::Error::InvalidColumnType(idx, name.to_string(), value.type_name()).into()
    }

    pub fn text(&self, name: &str) -> Result<String> {
        match self.require(name)? {
            SqlValue::Text(s) => Ok(s.clone()),
            other => Err(self.mismatch(name, other)),
        }
    }

    pub fn opt_text(&self, name: &str) -> Result<Option<String>> {
        match self.require(name)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            other => Err(self.mismatch(name, other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            SqlValue::Integer(i) => Ok(*i),
            other => Err(self.mismatch(name, other)),
        }
    }

    pub fn opt_int(&self, name: &str) -> Result<Option<i64>> {
        match self.require(name)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(i) => Ok(Some(*i)),
            other => Err(self.mismatch(name, other)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        Ok(self.int(name)? != 0)
    }
}

/// Maps a result row onto an entity.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

// ============================================================================
// Shared engine helpers (both adapters run on the same embedded engine)
// ============================================================================

pub(crate) fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

pub(crate) fn run_execute(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<u64> {
    let changed = conn.execute(sql, params_from_iter(params.iter()))?;
    Ok(changed as u64)
}

pub(crate) fn run_batch(conn: &mut Connection, statements: &[Statement]) -> Result<u64> {
    let tx = conn.transaction()?;
    let mut changed = 0u64;
    for stmt in statements {
        changed += tx.execute(&stmt.sql, params_from_iter(stmt.params.iter()))? as u64;
    }
    tx.commit()?;
    Ok(changed)
}

pub(crate) fn run_select(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut columns = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            columns.push((name.clone(), SqlValue::from(row.get_ref(i)?)));
        }
        out.push(Row::new(columns));
    }
    Ok(out)
}
