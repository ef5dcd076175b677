use std::path::Path;

use rusqlite::Connection;

use super::DatabaseError;

/// Open a SQLite connection to an existing source database
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    tracing::debug!(path = %path.display(), "Opened source database");
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;"
    )?;
    Ok(())
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<(), DatabaseError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(DatabaseError::InvalidIdentifier(name.to_string()))
    }
}

/// Column names of a table, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, DatabaseError> {
    validate_identifier(table)?;
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Err(DatabaseError::TableNotFound(table.to_string()));
    }
    Ok(columns)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_database_starts_empty() {
        let conn = open_memory_database().unwrap();
        assert_eq!(count_tables(&conn).unwrap(), 0);
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn file_database_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.db");
        let conn = open_database(&path).unwrap();
        conn.execute_batch("CREATE TABLE visits (entity_id INTEGER, timestamp TEXT);")
            .unwrap();
        assert_eq!(count_tables(&conn).unwrap(), 1);
    }

    #[test]
    fn table_columns_in_order() {
        let conn = open_memory_database().unwrap();
        conn.execute_batch("CREATE TABLE labs (entity_id INTEGER, timestamp TEXT, value REAL);")
            .unwrap();
        assert_eq!(
            table_columns(&conn, "labs").unwrap(),
            vec!["entity_id", "timestamp", "value"]
        );
    }

    #[test]
    fn unknown_table_is_not_found() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            table_columns(&conn, "missing"),
            Err(DatabaseError::TableNotFound(_))
        ));
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(validate_identifier("lab_results_2020").is_ok());
        assert!(validate_identifier("_tmp").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("labs; DROP TABLE x").is_err());
    }
}
