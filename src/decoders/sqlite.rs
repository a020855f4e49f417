//! SQLite database decoder.
//!
//! The database bytes are copied to a private temporary file and opened
//! read-only, so the artifact itself is never touched and a live `-wal`
//! sidecar next to it is never replayed. The result maps each table name (in
//! name order) to its rows, each row a mapping of column name to value.

use std::io::Write;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use super::DecodeOptions;
use crate::core::errors::{Result, ScanError};
use crate::core::value::{Mapping, Value};
use crate::scanner::sniff::ContentType;

pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<Value> {
    let mut copy = tempfile::Builder::new()
        .prefix("artiscan-")
        .suffix(".sqlite")
        .tempfile()
        .map_err(|e| ScanError::decode("", ContentType::Sqlite, format!("temporary copy: {e}")))?;
    copy.write_all(bytes)
        .and_then(|()| copy.flush())
        .map_err(|e| ScanError::decode("", ContentType::Sqlite, format!("temporary copy: {e}")))?;

    let conn = Connection::open_with_flags(
        copy.path(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let value = decode_connection(&conn, options);
    drop(conn);
    value
}

fn decode_connection(conn: &Connection, options: &DecodeOptions) -> Result<Value> {
    let mut out = Mapping::new();
    for table in table_names(conn)? {
        if let Some(wanted) = &options.sqlite_tables
            && !wanted.iter().any(|w| w == &table)
        {
            continue;
        }
        let rows = table_rows(conn, &table, options.sqlite_row_limit)?;
        out.insert(table, Value::Sequence(rows));
    }
    Ok(Value::Mapping(out))
}

fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn table_rows(conn: &Connection, table: &str, limit: Option<usize>) -> Result<Vec<Value>> {
    let mut sql = format!("SELECT * FROM {}", quote_identifier(table));
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Mapping::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), convert(row.get_ref(idx)?));
        }
        out.push(Value::Mapping(record));
    }
    Ok(out)
}

fn convert(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::Bytes(blob.to_vec()),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
