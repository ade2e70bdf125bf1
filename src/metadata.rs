//! Query surface for the dictionary views the planner reads.
//!
//! Every catalog lookup is a parameterised query returning a small,
//! fully materialised result. Parameters are positional (`?`).

use duckdb::types::Value;
use duckdb::Connection;
use log::trace;

use crate::error::{SplitError, SplitResult};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::Int(i64::from(v))
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

/// Anything that can answer a dictionary query.
pub trait MetadataSource {
    fn fetch(&self, sql: &str, params: &[SqlParam]) -> SplitResult<MetadataRows>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
}

impl MetadataValue {
    fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Bool(b) => Some(*b as i64),
            MetadataValue::Int(i) => Some(*i),
            MetadataValue::Double(f) => Some(*f as i64),
            MetadataValue::Text(s) => s.trim().parse().ok(),
            MetadataValue::Null => None,
        }
    }

    fn as_string(&self) -> Option<String> {
        match self {
            MetadataValue::Null => None,
            MetadataValue::Bool(b) => Some(b.to_string()),
            MetadataValue::Int(i) => Some(i.to_string()),
            MetadataValue::Double(f) => Some(f.to_string()),
            MetadataValue::Text(s) => Some(s.clone()),
        }
    }
}

/// A materialised query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRows {
    columns: Vec<String>,
    rows: Vec<Vec<MetadataValue>>,
}

impl MetadataRows {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = MetadataRow<'_>> {
        self.rows.iter().map(move |values| MetadataRow {
            columns: &self.columns,
            values,
        })
    }
}

/// One row of a [`MetadataRows`]; columns are looked up by name,
/// ignoring case.
#[derive(Debug, Clone, Copy)]
pub struct MetadataRow<'a> {
    columns: &'a [String],
    values: &'a [MetadataValue],
}

impl<'a> MetadataRow<'a> {
    fn value(&self, column: &str) -> SplitResult<&'a MetadataValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| {
                SplitError::discovery(
                    format!("Column \"{}\" is missing from the result (columns: {})", column, self.columns.join(", ")),
                    "",
                )
            })
    }

    pub fn is_null(&self, column: &str) -> SplitResult<bool> {
        Ok(matches!(self.value(column)?, MetadataValue::Null))
    }

    pub fn get_i64(&self, column: &str) -> SplitResult<i64> {
        let value = self.value(column)?;
        value.as_i64().ok_or_else(|| {
            SplitError::discovery(format!("Column \"{}\" holds {:?}, not an integer", column, value), "")
        })
    }

    pub fn get_i32(&self, column: &str) -> SplitResult<i32> {
        let value = self.get_i64(column)?;
        i32::try_from(value).map_err(|_| {
            SplitError::discovery(format!("Column \"{}\" value {} is out of range", column, value), "")
        })
    }

    pub fn get_string(&self, column: &str) -> SplitResult<String> {
        self.get_opt_string(column)?
            .ok_or_else(|| SplitError::discovery(format!("Column \"{}\" is NULL", column), ""))
    }

    /// NULL and the empty string both read as `None`.
    pub fn get_opt_string(&self, column: &str) -> SplitResult<Option<String>> {
        Ok(self.value(column)?.as_string().filter(|s| !s.is_empty()))
    }
}

impl MetadataSource for Connection {
    fn fetch(&self, sql: &str, params: &[SqlParam]) -> SplitResult<MetadataRows> {
        trace!("metadata query: {} params={:?}", sql, params);
        let fail = |e: duckdb::Error| SplitError::discovery(e.to_string(), sql);

        let mut stmt = self.prepare(sql).map_err(fail)?;
        let bound: Vec<Value> = params
            .iter()
            .map(|p| match p {
                SqlParam::Int(i) => Value::BigInt(*i),
                SqlParam::Text(s) => Value::Text(s.clone()),
            })
            .collect();
        let mut rows_iter = stmt.query(duckdb::params_from_iter(bound)).map_err(fail)?;

        // Column info is only available once the statement has executed.
        let (column_count, columns) = match rows_iter.as_ref() {
            Some(s) => (s.column_count(), s.column_names()),
            None => (0, Vec::new()),
        };

        let mut rows = Vec::new();
        while let Some(row) = rows_iter.next().map_err(fail)? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row.get_ref(i).map(|v| v.to_owned()).unwrap_or(Value::Null);
                values.push(convert_value(value));
            }
            rows.push(values);
        }

        Ok(MetadataRows { columns, rows })
    }
}

fn convert_value(v: Value) -> MetadataValue {
    match v {
        Value::Null => MetadataValue::Null,
        Value::Boolean(b) => MetadataValue::Bool(b),
        Value::TinyInt(i) => MetadataValue::Int(i64::from(i)),
        Value::SmallInt(i) => MetadataValue::Int(i64::from(i)),
        Value::Int(i) => MetadataValue::Int(i64::from(i)),
        Value::BigInt(i) => MetadataValue::Int(i),
        Value::HugeInt(i) => match i64::try_from(i) {
            Ok(i) => MetadataValue::Int(i),
            Err(_) => MetadataValue::Text(i.to_string()),
        },
        Value::UTinyInt(i) => MetadataValue::Int(i64::from(i)),
        Value::USmallInt(i) => MetadataValue::Int(i64::from(i)),
        Value::UInt(i) => MetadataValue::Int(i64::from(i)),
        Value::UBigInt(i) => match i64::try_from(i) {
            Ok(i) => MetadataValue::Int(i),
            Err(_) => MetadataValue::Text(i.to_string()),
        },
        Value::Float(f) => MetadataValue::Double(f64::from(f)),
        Value::Double(f) => MetadataValue::Double(f),
        Value::Decimal(d) => {
            let text = d.to_string();
            match text.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 => MetadataValue::Int(f as i64),
                Ok(f) => MetadataValue::Double(f),
                Err(_) => MetadataValue::Text(text),
            }
        }
        Value::Text(s) => MetadataValue::Text(s),
        other => MetadataValue::Text(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duckdb_query_by_name() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER, name VARCHAR, note VARCHAR)").unwrap();
        conn.execute_batch("INSERT INTO t VALUES (1, 'hello', NULL), (2, 'world', '')").unwrap();

        let result = conn
            .fetch("SELECT id, name, note FROM t WHERE id >= ? ORDER BY id", &[SqlParam::Int(1)])
            .unwrap();
        assert_eq!(result.column_count(), 3);
        assert_eq!(result.len(), 2);

        let rows: Vec<MetadataRow<'_>> = result.rows().collect();
        assert_eq!(rows[0].get_i64("ID").unwrap(), 1);
        assert_eq!(rows[0].get_string("name").unwrap(), "hello");
        assert!(rows[0].is_null("note").unwrap());
        assert_eq!(rows[1].get_opt_string("note").unwrap(), None);
    }

    #[test]
    fn test_text_params() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (owner VARCHAR, n INTEGER)").unwrap();
        conn.execute_batch("INSERT INTO t VALUES ('SCOTT', 3), ('HR', 4)").unwrap();
        let result = conn
            .fetch("SELECT SUM(n) AS total FROM t WHERE owner = ?", &[SqlParam::from("SCOTT")])
            .unwrap();
        let row = result.rows().next().unwrap();
        assert_eq!(row.get_i64("total").unwrap(), 3);
    }

    #[test]
    fn test_missing_column_and_bad_sql() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.fetch("SELECT 1 AS a", &[]).unwrap();
        let row = result.rows().next().unwrap();
        assert!(row.get_i64("b").is_err());

        let err = conn.fetch("SELECT * FROM no_such_table", &[]).unwrap_err();
        assert!(matches!(err, SplitError::Discovery { .. }));
        assert!(err.to_string().contains("no_such_table"));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(convert_value(Value::HugeInt(42)), MetadataValue::Int(42));
        assert_eq!(convert_value(Value::Double(3.0)), MetadataValue::Double(3.0));
        assert_eq!(MetadataValue::Double(3.0).as_i64(), Some(3));
        assert_eq!(MetadataValue::Text(" 7 ".into()).as_i64(), Some(7));
        assert_eq!(MetadataValue::Null.as_string(), None);
    }
}
