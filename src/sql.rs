//! SQLite helpers shared by the intermediate database, the pointing loader and the
//! SQLite sink.
use rusqlite::{Connection, Params};

use crate::{
    surveyjoin_errors::SurveyJoinError,
    table::{Row, Table, Value},
};

/// Quote an identifier for use in generated SQL (`u-r` → `"u-r"`).
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Comma separated, quoted column list.
pub(crate) fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `?1, ?2, …, ?n`
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// Column names of `table`, empty when the table does not exist.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, SurveyJoinError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>("name"))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Run a query and collect its result set into a [`Table`].
pub(crate) fn query_table<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Table, SurveyJoinError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut table = Table::new(columns);
    let mut rows = stmt.query(params)?;
    while let Some(r) = rows.next()? {
        let row = (0..width)
            .map(|i| r.get::<_, Value>(i))
            .collect::<Result<Row, _>>()?;
        table.push_row(row);
    }
    Ok(table)
}

#[cfg(test)]
mod sql_test {
    use super::*;

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_ident("u-r"), "\"u-r\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(placeholders(3), "?1, ?2, ?3");
    }

    #[test]
    fn test_query_table_reads_all_storage_classes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (a, b, c, d); INSERT INTO t VALUES (1, 2.5, 'x', NULL);",
        )
        .unwrap();

        let table = query_table(&conn, "SELECT * FROM t", []).unwrap();
        assert_eq!(table.columns(), ["a", "b", "c", "d"]);
        assert_eq!(
            table.rows()[0],
            vec![Value::Int(1), Value::Float(2.5), Value::from("x"), Value::Null]
        );
        assert_eq!(table_columns(&conn, "t").unwrap().len(), 4);
        assert!(table_columns(&conn, "missing").unwrap().is_empty());
    }
}
