//! SQLite-backed loaders producing the uniform source shape.
//!
//! Event tables: `entity_id`, optional `timestamp`, optional `source`,
//! `value`, optional `source_subtype` and `name`. A table without a
//! `timestamp` column is a static-feature table. When `source` is absent the
//! table name is used.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};

use super::sqlite::table_columns;
use super::DatabaseError;
use crate::models::{EntityId, EntityTimestamps, EventValue};
use crate::unpack::{SourceRow, SourceTable};

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Anything that can produce a source table.
pub trait EventSource {
    fn name(&self) -> &str;

    fn load(&self) -> Result<SourceTable, DatabaseError>;
}

/// Reads one table of a SQLite database.
pub struct SqliteEventSource<'c> {
    conn: &'c Connection,
    table: String,
}

impl<'c> SqliteEventSource<'c> {
    pub fn new(conn: &'c Connection, table: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
        }
    }
}

impl EventSource for SqliteEventSource<'_> {
    fn name(&self) -> &str {
        &self.table
    }

    fn load(&self) -> Result<SourceTable, DatabaseError> {
        let columns = table_columns(self.conn, &self.table)?;
        let has = |name: &str| columns.iter().any(|c| c == name);

        for required in ["entity_id", "value"] {
            if !has(required) {
                return Err(DatabaseError::MissingColumn {
                    table: self.table.clone(),
                    column: required.to_string(),
                });
            }
        }

        let selected: Vec<&str> = ["entity_id", "timestamp", "source", "value", "source_subtype", "name"]
            .into_iter()
            .filter(|c| has(*c))
            .collect();
        let index_of = |name: &str| selected.iter().position(|c| *c == name);

        let sql = format!("SELECT {} FROM {}", selected.join(", "), self.table);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut table = if has("timestamp") {
            SourceTable::temporal(&self.table)
        } else {
            SourceTable::static_features(&self.table)
        };

        let mut row_index = 0;
        while let Some(row) = rows.next()? {
            let invalid = |column: &str, reason: String| DatabaseError::InvalidValue {
                table: self.table.clone(),
                column: column.to_string(),
                row_index,
                reason,
            };
            let read = |column: &str| column_ref(row, index_of(column));

            let entity_id = match read("entity_id")? {
                Some(v) => entity_id_from(v).map_err(|r| invalid("entity_id", r))?,
                None => None,
            };
            let timestamp = match read("timestamp")? {
                Some(v) => timestamp_from(v).map_err(|r| invalid("timestamp", r))?,
                None => None,
            };
            let source = match read("source")? {
                Some(v) => text_from(v).map_err(|r| invalid("source", r))?,
                None => None,
            };
            let value = match read("value")? {
                Some(v) => event_value_from(v).map_err(|r| invalid("value", r))?,
                None => None,
            };
            let source_subtype = match read("source_subtype")? {
                Some(v) => text_from(v).map_err(|r| invalid("source_subtype", r))?,
                None => None,
            };
            let name = match read("name")? {
                Some(v) => text_from(v).map_err(|r| invalid("name", r))?,
                None => None,
            };

            table.push(SourceRow {
                entity_id,
                timestamp,
                source: source.unwrap_or_else(|| self.table.clone()),
                source_subtype,
                value,
                name,
            });
            row_index += 1;
        }

        tracing::info!(table = %self.table, rows = table.len(), "Loaded source table");
        Ok(table)
    }
}

/// Loads every source, failing on the first error.
pub fn load_sources(sources: &[&dyn EventSource]) -> Result<Vec<SourceTable>, DatabaseError> {
    sources.iter().map(|source| source.load()).collect()
}

/// Loads (`entity_id`, `timestamp`) rows, e.g. quarantine or outcome events.
/// Nulls in either column are errors.
pub fn load_entity_timestamps(conn: &Connection, table: &str) -> Result<EntityTimestamps, DatabaseError> {
    let columns = table_columns(conn, table)?;
    for required in ["entity_id", "timestamp"] {
        if !columns.iter().any(|c| c == required) {
            return Err(DatabaseError::MissingColumn {
                table: table.to_string(),
                column: required.to_string(),
            });
        }
    }

    let mut stmt = conn.prepare(&format!("SELECT entity_id, timestamp FROM {table}"))?;
    let mut rows = stmt.query([])?;
    let mut loaded = Vec::new();

    let mut row_index = 0;
    while let Some(row) = rows.next()? {
        let invalid = |column: &str, reason: String| DatabaseError::InvalidValue {
            table: table.to_string(),
            column: column.to_string(),
            row_index,
            reason,
        };
        let entity_id = entity_id_from(row.get_ref(0)?)
            .map_err(|r| invalid("entity_id", r))?
            .ok_or_else(|| invalid("entity_id", "null".into()))?;
        let timestamp = timestamp_from(row.get_ref(1)?)
            .map_err(|r| invalid("timestamp", r))?
            .ok_or_else(|| invalid("timestamp", "null".into()))?;

        loaded.push((entity_id, timestamp));
        row_index += 1;
    }
    let timestamps = EntityTimestamps::from_rows(loaded);

    tracing::info!(table, rows = timestamps.len(), entities = timestamps.n_entities(), "Loaded entity timestamps");
    Ok(timestamps)
}

/// Loads (`entity_id`, `date_of_birth`) rows for age-based steps.
pub fn load_birthdates(conn: &Connection, table: &str) -> Result<HashMap<EntityId, NaiveDate>, DatabaseError> {
    let columns = table_columns(conn, table)?;
    for required in ["entity_id", "date_of_birth"] {
        if !columns.iter().any(|c| c == required) {
            return Err(DatabaseError::MissingColumn {
                table: table.to_string(),
                column: required.to_string(),
            });
        }
    }

    let mut stmt = conn.prepare(&format!("SELECT entity_id, date_of_birth FROM {table}"))?;
    let mut rows = stmt.query([])?;
    let mut birthdates = HashMap::new();

    let mut row_index = 0;
    while let Some(row) = rows.next()? {
        let invalid = |column: &str, reason: String| DatabaseError::InvalidValue {
            table: table.to_string(),
            column: column.to_string(),
            row_index,
            reason,
        };
        let entity_id = entity_id_from(row.get_ref(0)?)
            .map_err(|r| invalid("entity_id", r))?
            .ok_or_else(|| invalid("entity_id", "null".into()))?;
        let date_of_birth = timestamp_from(row.get_ref(1)?)
            .map_err(|r| invalid("date_of_birth", r))?
            .ok_or_else(|| invalid("date_of_birth", "null".into()))?
            .date();

        birthdates.insert(entity_id, date_of_birth);
        row_index += 1;
    }

    Ok(birthdates)
}

fn column_ref<'r>(row: &'r Row<'_>, index: Option<usize>) -> Result<Option<ValueRef<'r>>, DatabaseError> {
    match index {
        Some(i) => Ok(Some(row.get_ref(i)?)),
        None => Ok(None),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|e| e.to_string())
}

fn entity_id_from(value: ValueRef<'_>) -> Result<Option<EntityId>, String> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(EntityId::Int(i))),
        ValueRef::Real(f) if f.fract() == 0.0 => Ok(Some(EntityId::Int(f as i64))),
        ValueRef::Real(f) => Err(format!("non-integer numeric id {f}")),
        ValueRef::Text(t) => Ok(Some(EntityId::Str(utf8(t)?.to_string()))),
        ValueRef::Blob(_) => Err("blob is not a valid id".into()),
    }
}

/// Parses the timestamp layouts loaders emit; bare dates map to midnight.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn timestamp_from(value: ValueRef<'_>) -> Result<Option<NaiveDateTime>, String> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Text(t) => {
            let text = utf8(t)?;
            parse_timestamp(text)
                .map(Some)
                .ok_or_else(|| format!("unparseable timestamp '{text}'"))
        }
        // Unix seconds.
        ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0)
            .map(|dt| Some(dt.naive_utc()))
            .ok_or_else(|| format!("timestamp {secs} out of range")),
        ValueRef::Real(_) | ValueRef::Blob(_) => Err("unsupported timestamp type".into()),
    }
}

fn event_value_from(value: ValueRef<'_>) -> Result<Option<EventValue>, String> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(EventValue::Integer(i))),
        ValueRef::Real(f) => Ok(Some(EventValue::Numeric(f))),
        ValueRef::Text(t) => Ok(Some(EventValue::Categorical(utf8(t)?.to_string()))),
        ValueRef::Blob(_) => Err("blob values are not supported".into()),
    }
}

fn text_from(value: ValueRef<'_>) -> Result<Option<String>, String> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Text(t) => Ok(Some(utf8(t)?.to_string())),
        ValueRef::Integer(i) => Ok(Some(i.to_string())),
        ValueRef::Real(f) => Ok(Some(f.to_string())),
        ValueRef::Blob(_) => Err("blob is not text".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::unpack::unpack_patients;

    fn setup_db() -> Connection {
        let conn = open_memory_database().expect("Failed to open test DB");
        conn.execute_batch(
            "CREATE TABLE lab_results (entity_id INTEGER, timestamp TEXT, source TEXT, value REAL);
             INSERT INTO lab_results VALUES (1, '2020-01-01 00:00:00', 'hba1c', 48.0);
             INSERT INTO lab_results VALUES (1, '2020-01-10', 'hba1c', 52.5);
             INSERT INTO lab_results VALUES (2, '2021-03-04T10:00:00', 'hba1c', 40.0);

             CREATE TABLE demographics (entity_id INTEGER, value TEXT);
             INSERT INTO demographics VALUES (1, 'female');

             CREATE TABLE transfers (entity_id INTEGER, timestamp TEXT);
             INSERT INTO transfers VALUES (1, '2021-01-01 00:00:01');
             INSERT INTO transfers VALUES (1, '2020-01-01 00:00:01');

             CREATE TABLE birthdays (entity_id INTEGER, date_of_birth TEXT);
             INSERT INTO birthdays VALUES (1, '1990-05-17');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn loads_temporal_table() {
        let conn = setup_db();
        let table = SqliteEventSource::new(&conn, "lab_results").load().unwrap();

        assert!(table.has_timestamp_column);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[1].timestamp, parse_timestamp("2020-01-10 00:00:00"));
        assert_eq!(table.rows[1].value, Some(EventValue::Numeric(52.5)));
        assert_eq!(table.rows[2].source, "hba1c");
    }

    #[test]
    fn table_without_timestamp_is_static_and_named_by_table() {
        let conn = setup_db();
        let table = SqliteEventSource::new(&conn, "demographics").load().unwrap();

        assert!(!table.has_timestamp_column);
        assert_eq!(table.rows[0].source, "demographics");
        assert_eq!(table.rows[0].value, Some(EventValue::from("female")));
    }

    #[test]
    fn loaded_sources_unpack_into_patients() {
        let conn = setup_db();
        let labs = SqliteEventSource::new(&conn, "lab_results");
        let demographics = SqliteEventSource::new(&conn, "demographics");

        let tables = load_sources(&[&labs, &demographics]).unwrap();
        let patients = unpack_patients(&tables).unwrap();

        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].temporal_events().len(), 2);
        assert_eq!(patients[0].static_events().len(), 1);
        assert!(patients[1].static_events().is_empty());
    }

    #[test]
    fn integer_values_load_exactly() {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(
            "CREATE TABLE diagnoses (entity_id INTEGER, timestamp TEXT, value INTEGER);
             INSERT INTO diagnoses VALUES (1, '2020-01-01', 9007199254740993);",
        )
        .unwrap();

        let table = SqliteEventSource::new(&conn, "diagnoses").load().unwrap();
        assert_eq!(table.rows[0].value, Some(EventValue::Integer(9_007_199_254_740_993)));
    }

    #[test]
    fn missing_value_column_is_reported() {
        let conn = setup_db();
        let err = SqliteEventSource::new(&conn, "transfers").load().unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::MissingColumn { ref column, .. } if column == "value"
        ));
    }

    #[test]
    fn bad_timestamp_is_reported_with_location() {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(
            "CREATE TABLE labs (entity_id INTEGER, timestamp TEXT, value REAL);
             INSERT INTO labs VALUES (1, 'yesterday', 1.0);",
        )
        .unwrap();

        let err = SqliteEventSource::new(&conn, "labs").load().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("labs.timestamp"));
        assert!(message.contains("row 0"));
    }

    #[test]
    fn loads_quarantine_timestamps() {
        let conn = setup_db();
        let transfers = load_entity_timestamps(&conn, "transfers").unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(
            transfers.get(&EntityId::from(1))[0],
            parse_timestamp("2020-01-01 00:00:01").unwrap()
        );
    }

    #[test]
    fn loads_birthdates() {
        let conn = setup_db();
        let birthdates = load_birthdates(&conn, "birthdays").unwrap();
        assert_eq!(
            birthdates.get(&EntityId::from(1)),
            NaiveDate::from_ymd_opt(1990, 5, 17).as_ref()
        );
    }

    #[test]
    fn unix_seconds_and_fractional_timestamps_parse() {
        assert_eq!(
            timestamp_from(ValueRef::Integer(0)).unwrap(),
            parse_timestamp("1970-01-01 00:00:00")
        );
        assert!(parse_timestamp("2020-01-01 12:30:00.250").is_some());
        assert!(parse_timestamp("01/02/2020").is_none());
    }
}
