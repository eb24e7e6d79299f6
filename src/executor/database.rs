//! SQLite destination for one-sheet combine.

use std::collections::HashSet;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::error::{ExcelMgrError, ExcelMgrResult};
use crate::plan::{DatabaseDestination, DbWriteMode};
use crate::types::{CellValue, Table};

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(cell: &CellValue) -> Value {
    match cell {
        CellValue::Text(s) => Value::Text(s.clone()),
        CellValue::Number(n) => Value::Real(*n),
        CellValue::Boolean(b) => Value::Integer(i64::from(*b)),
        CellValue::Date(_) => Value::Text(cell.to_string()),
        CellValue::Empty => Value::Null,
    }
}

fn existing_columns(conn: &Connection, table: &str) -> ExcelMgrResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// SQLite column names compare case-insensitively, so headers that differ only
/// in case get `.1`, `.2`, ... suffixes.
fn sql_columns(columns: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    columns
        .iter()
        .map(|column| {
            let mut name = column.clone();
            let mut counter = 0;
            while taken.contains(&name.to_lowercase()) {
                counter += 1;
                name = format!("{column}.{counter}");
            }
            taken.insert(name.to_lowercase());
            name
        })
        .collect()
}

fn join_quoted(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Write `table` to the destination in one transaction. Returns the rows inserted.
///
/// Replacing a table that already exists needs `overwrite_confirmed`.
pub fn write_table(
    dest: &DatabaseDestination,
    table: &Table,
    overwrite_confirmed: bool,
) -> ExcelMgrResult<usize> {
    if let Some(parent) = dest.uri.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(&dest.uri)?;
    let tx = conn.transaction()?;
    let name = quote_ident(&dest.table);

    let mut present = existing_columns(&tx, &dest.table)?;
    if dest.mode == DbWriteMode::Replace && !present.is_empty() {
        if !overwrite_confirmed {
            return Err(ExcelMgrError::ConfirmationRequired(dest.uri.clone()));
        }
        tx.execute(&format!("DROP TABLE {name}"), [])?;
        present.clear();
    }

    let columns = sql_columns(&table.columns);
    if columns.is_empty() {
        // Nothing to create or widen
    } else if present.is_empty() {
        tx.execute(&format!("CREATE TABLE {name} ({})", join_quoted(&columns)), [])?;
    } else {
        // Appending a table with new headers widens the existing one
        let known: HashSet<String> = present.iter().map(|c| c.to_lowercase()).collect();
        for column in columns.iter().filter(|c| !known.contains(&c.to_lowercase())) {
            tx.execute(
                &format!("ALTER TABLE {name} ADD COLUMN {}", quote_ident(column)),
                [],
            )?;
        }
    }

    if !columns.is_empty() {
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {name} ({}) VALUES ({placeholders})",
            join_quoted(&columns)
        ))?;
        for row in &table.rows {
            stmt.execute(params_from_iter(row.iter().map(to_sql)))?;
        }
    }

    tx.commit()?;
    Ok(table.row_count())
}
