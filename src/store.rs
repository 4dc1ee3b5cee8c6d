//! Graph store backed by SQLite.
//!
//! Every node and edge table is keyed by its content-addressed `ID`. Merging a
//! row whose id already exists never creates a duplicate: nodes keep their
//! immutable columns and fold mutable ones per [`MergePolicy`], edges are left
//! as they are. Each batch runs in its own `BEGIN IMMEDIATE` transaction, so a
//! failed batch leaves nothing behind and can simply be run again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{Null, ToSqlOutput};
use rusqlite::{
    Connection, OptionalExtension, ToSql, Transaction, TransactionBehavior, ffi, params_from_iter,
};
use tracing::debug;

use crate::config::StoreConfig;
use crate::encoding::{from_json, to_json};
use crate::error::{EncodingError, IngestError};
use crate::staging::{Cell, ColumnDef, ColumnKind, MergePolicy, StagedTable, TableRole, TableSchema};
use crate::staging::{EDGE_TABLES, NODE_TABLES};

/// Row counts produced by merging one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct BatchOutcome {
    pub(crate) inserted: usize,
    pub(crate) refreshed: usize,
}

impl BatchOutcome {
    pub(crate) fn add(&mut self, other: BatchOutcome) {
        self.inserted += other.inserted;
        self.refreshed += other.refreshed;
    }
}

/// Destination of the bulk merge.
pub(crate) trait GraphStore: Send + Sync {
    /// Merge node rows by id. With `refresh`, mutable columns of existing rows
    /// are folded with the incoming values.
    fn merge_nodes(
        &self,
        schema: &'static TableSchema,
        rows: &[Vec<Cell>],
        refresh: bool,
    ) -> Result<BatchOutcome, IngestError>;

    /// Merge edge rows by id. Both endpoints must already be stored.
    fn merge_edges(
        &self,
        schema: &'static TableSchema,
        rows: &[Vec<Cell>],
    ) -> Result<BatchOutcome, IngestError>;

    fn count(&self, schema: &'static TableSchema) -> Result<usize, IngestError>;
}

pub(crate) struct SqliteGraphStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteGraphStore {
    /// Open (or create) the database at `path` and make sure every table exists.
    pub(crate) fn open(path: &Path, config: &StoreConfig) -> Result<Self, IngestError> {
        let store = SqliteGraphStore {
            path: path.to_path_buf(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        };
        let conn = store.connect().map_err(|source| store_error("*", source))?;
        for schema in NODE_TABLES.iter().chain(EDGE_TABLES.iter()) {
            conn.execute_batch(&create_table_sql(schema))
                .map_err(|source| store_error(schema.name, source))?;
        }
        Ok(store)
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        Ok(conn)
    }

    /// Run `work` inside a `BEGIN IMMEDIATE` transaction on a fresh connection.
    fn with_batch<T>(
        &self,
        schema: &TableSchema,
        work: impl FnOnce(&Transaction<'_>) -> Result<T, IngestError>,
    ) -> Result<T, IngestError> {
        let mut conn = self
            .connect()
            .map_err(|source| store_error(schema.name, source))?;
        // Dropping the transaction without commit rolls the batch back.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|source| store_error(schema.name, source))?;
        let result = work(&tx)?;
        tx.commit()
            .map_err(|source| store_error(schema.name, source))?;
        Ok(result)
    }

    /// Load one stored row by id, typed by the table schema.
    #[cfg(test)]
    pub(crate) fn fetch(
        &self,
        schema: &'static TableSchema,
        id: &str,
    ) -> Result<Option<Vec<Cell>>, IngestError> {
        let conn = self
            .connect()
            .map_err(|source| store_error(schema.name, source))?;
        fetch_row(&conn, schema, id).map_err(|source| store_error(schema.name, source))
    }
}

impl GraphStore for SqliteGraphStore {
    fn merge_nodes(
        &self,
        schema: &'static TableSchema,
        rows: &[Vec<Cell>],
        refresh: bool,
    ) -> Result<BatchOutcome, IngestError> {
        let insert = upsert_node_sql(schema);
        let update = refresh_sql(schema);
        let outcome = self.with_batch(schema, |tx| {
            let mut outcome = BatchOutcome::default();
            let mut statement = tx
                .prepare_cached(&insert)
                .map_err(|source| store_error(schema.name, source))?;
            for row in rows {
                let changed = statement
                    .execute(params_from_iter(row.iter()))
                    .map_err(|source| store_error(schema.name, source))?;
                if changed > 0 {
                    outcome.inserted += changed;
                    continue;
                }
                if !refresh {
                    continue;
                }
                let Some(update) = update.as_deref() else {
                    continue;
                };
                let id = StagedTable::row_id(row);
                let existing = fetch_row(tx, schema, id)
                    .map_err(|source| store_error(schema.name, source))?;
                let Some(existing) = existing else {
                    continue;
                };
                if is_placeholder_over_initialized(schema, &existing, row) {
                    continue;
                }
                let mut values = Vec::new();
                for (index, column) in schema.columns.iter().enumerate() {
                    if column.merge == MergePolicy::Keep {
                        continue;
                    }
                    let merged = merge_cell(column, &existing[index], &row[index])
                        .map_err(|error| schema_error(schema, column, error))?;
                    values.push(merged);
                }
                values.push(Cell::Text(id.to_string()));
                tx.prepare_cached(update)
                    .and_then(|mut statement| statement.execute(params_from_iter(values.iter())))
                    .map_err(|source| store_error(schema.name, source))?;
                outcome.refreshed += 1;
            }
            Ok(outcome)
        })?;
        debug!(
            table = schema.name,
            rows = rows.len(),
            inserted = outcome.inserted,
            refreshed = outcome.refreshed,
            "merged node batch"
        );
        Ok(outcome)
    }

    fn merge_edges(
        &self,
        schema: &'static TableSchema,
        rows: &[Vec<Cell>],
    ) -> Result<BatchOutcome, IngestError> {
        let insert = insert_edge_sql(schema);
        let outcome = self.with_batch(schema, |tx| {
            let mut outcome = BatchOutcome::default();
            let mut statement = tx
                .prepare_cached(&insert)
                .map_err(|source| store_error(schema.name, source))?;
            for row in rows {
                outcome.inserted += statement
                    .execute(params_from_iter(row.iter()))
                    .map_err(|source| edge_error(schema, StagedTable::row_id(row), source))?;
            }
            Ok(outcome)
        })?;
        debug!(
            table = schema.name,
            rows = rows.len(),
            inserted = outcome.inserted,
            "merged edge batch"
        );
        Ok(outcome)
    }

    fn count(&self, schema: &'static TableSchema) -> Result<usize, IngestError> {
        let conn = self
            .connect()
            .map_err(|source| store_error(schema.name, source))?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", schema.name), [], |row| {
                row.get(0)
            })
            .map_err(|source| store_error(schema.name, source))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Boolean(value) => ToSqlOutput::from(*value),
            Cell::Integer(value) => ToSqlOutput::from(*value),
            Cell::Text(value) => ToSqlOutput::from(value.as_str()),
            Cell::Null => ToSqlOutput::from(Null),
        })
    }
}

/// Fold an incoming mutable value into the stored one.
pub(crate) fn merge_cell(
    column: &ColumnDef,
    existing: &Cell,
    incoming: &Cell,
) -> Result<Cell, EncodingError> {
    let merged = match (column.merge, existing, incoming) {
        (MergePolicy::Keep, _, _) => existing.clone(),
        (MergePolicy::Overwrite, _, Cell::Null) => existing.clone(),
        (MergePolicy::Overwrite, _, _) => incoming.clone(),
        (MergePolicy::Or, Cell::Boolean(stored), Cell::Boolean(newer)) => {
            Cell::Boolean(*stored || *newer)
        }
        (MergePolicy::MergeMap, Cell::Text(stored), Cell::Text(newer)) => {
            let mut map: BTreeMap<String, String> = from_json(stored)?;
            map.extend(from_json::<BTreeMap<String, String>>(newer)?);
            Cell::Text(to_json(&map)?)
        }
        (MergePolicy::UnionList, Cell::Text(stored), Cell::Text(newer)) => {
            // Stored order first, unseen incoming items appended.
            let mut items: Vec<i64> = from_json(stored)?;
            for item in from_json::<Vec<i64>>(newer)? {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            Cell::Text(to_json(&items)?)
        }
        (_, _, Cell::Null) => existing.clone(),
        (_, Cell::Null, _) => incoming.clone(),
        _ => {
            return Err(EncodingError::malformed(
                column.name,
                "stored and incoming values have different kinds",
            ));
        }
    };
    Ok(merged)
}

/// A placeholder row never refreshes the mutable columns of an initialized one.
fn is_placeholder_over_initialized(
    schema: &TableSchema,
    existing: &[Cell],
    incoming: &[Cell],
) -> bool {
    let Some(index) = schema
        .columns
        .iter()
        .position(|column| column.name == "IS_INITIALIZED")
    else {
        return false;
    };
    matches!(
        (&existing[index], &incoming[index]),
        (Cell::Boolean(true), Cell::Boolean(false))
    )
}

fn fetch_row(
    conn: &Connection,
    schema: &TableSchema,
    id: &str,
) -> rusqlite::Result<Option<Vec<Cell>>> {
    let names: Vec<&str> = schema.columns.iter().map(|column| column.name).collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE ID = ?1",
        names.join(", "),
        schema.name
    );
    conn.query_row(&sql, [id], |row| {
        schema
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| read_cell(row, index, column))
            .collect()
    })
    .optional()
}

fn read_cell(row: &rusqlite::Row<'_>, index: usize, column: &ColumnDef) -> rusqlite::Result<Cell> {
    Ok(match column.kind {
        ColumnKind::Boolean => row
            .get::<_, Option<bool>>(index)?
            .map_or(Cell::Null, Cell::Boolean),
        ColumnKind::Integer => row
            .get::<_, Option<i64>>(index)?
            .map_or(Cell::Null, Cell::Integer),
        ColumnKind::Text => row
            .get::<_, Option<String>>(index)?
            .map_or(Cell::Null, Cell::Text),
    })
}

fn sql_type(column: &ColumnDef) -> &'static str {
    match column.kind {
        ColumnKind::Boolean | ColumnKind::Integer => "INTEGER",
        ColumnKind::Text => "TEXT",
    }
}

pub(crate) fn create_table_sql(schema: &TableSchema) -> String {
    let mut lines: Vec<String> = schema
        .columns
        .iter()
        .map(|column| {
            let constraint = if column.nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", column.name, sql_type(column), constraint)
        })
        .collect();
    lines.push("PRIMARY KEY (ID)".to_string());
    if let TableRole::Edge {
        source,
        target,
        single_valued,
    } = schema.role
    {
        lines.push(format!("FOREIGN KEY (SOURCE) REFERENCES {source} (ID)"));
        lines.push(format!("FOREIGN KEY (TARGET) REFERENCES {target} (ID)"));
        if single_valued {
            lines.push("UNIQUE (SOURCE)".to_string());
        }
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        schema.name,
        lines.join(",\n    ")
    )
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_list(schema: &TableSchema) -> String {
    schema
        .columns
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Insert a node; a stored placeholder (`IS_INITIALIZED = 0`) is replaced
/// wholesale by an initialized row, anything else is left for the refresh step.
fn upsert_node_sql(schema: &TableSchema) -> String {
    let assignments = schema
        .columns
        .iter()
        .skip(1)
        .map(|column| format!("{0} = excluded.{0}", column.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({columns}) VALUES ({values})
         ON CONFLICT (ID) DO UPDATE SET {assignments}
         WHERE {table}.IS_INITIALIZED = 0 AND excluded.IS_INITIALIZED = 1",
        table = schema.name,
        columns = column_list(schema),
        values = placeholders(schema.columns.len()),
    )
}

fn refresh_sql(schema: &TableSchema) -> Option<String> {
    let mutable: Vec<&str> = schema
        .columns
        .iter()
        .filter(|column| column.merge != MergePolicy::Keep)
        .map(|column| column.name)
        .collect();
    if mutable.is_empty() {
        return None;
    }
    let assignments = mutable
        .iter()
        .enumerate()
        .map(|(index, name)| format!("{name} = ?{}", index + 1))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "UPDATE {} SET {assignments} WHERE ID = ?{}",
        schema.name,
        mutable.len() + 1
    ))
}

fn insert_edge_sql(schema: &TableSchema) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (ID) DO NOTHING",
        schema.name,
        column_list(schema),
        placeholders(schema.columns.len())
    )
}

fn store_error(table: &str, source: rusqlite::Error) -> IngestError {
    IngestError::Store {
        table: table.to_string(),
        source,
    }
}

fn schema_error(schema: &TableSchema, column: &ColumnDef, error: EncodingError) -> IngestError {
    IngestError::Schema {
        table: schema.name.to_string(),
        column: column.name.to_string(),
        reason: error.to_string(),
    }
}

fn edge_error(schema: &TableSchema, edge_id: &str, source: rusqlite::Error) -> IngestError {
    let extended_code = match &source {
        rusqlite::Error::SqliteFailure(error, _) => Some(error.extended_code),
        _ => None,
    };
    match extended_code {
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => IngestError::MissingEndpoint {
            table: schema.name.to_string(),
            edge_id: edge_id.to_string(),
        },
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => IngestError::Integrity {
            table: schema.name.to_string(),
            edge_id: edge_id.to_string(),
        },
        _ => store_error(schema.name, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{CLASSES, EXTEND_EDGES, METHODS};

    fn open_store(dir: &tempfile::TempDir) -> SqliteGraphStore {
        SqliteGraphStore::open(&dir.path().join("graph.db"), &StoreConfig::default())
            .expect("open store")
    }

    fn class_row(id: &str, initialized: bool) -> Vec<Cell> {
        vec![
            Cell::Text(id.to_string()),
            Cell::Text(format!("name-{id}")),
            Cell::Null,
            Cell::Text("[]".to_string()),
            Cell::Text("[]".to_string()),
            Cell::Text("[]".to_string()),
            Cell::Boolean(!initialized),
            Cell::Boolean(false),
            Cell::Boolean(false),
            Cell::Boolean(false),
            Cell::Boolean(initialized),
            Cell::Boolean(false),
            Cell::Boolean(false),
        ]
    }

    fn method_row(id: &str, actions: &str, polluted: &str, vul: Option<&str>) -> Vec<Cell> {
        METHODS
            .columns
            .iter()
            .map(|column| match column.name {
                "ID" => Cell::Text(id.to_string()),
                "VUL" => vul.map_or(Cell::Null, |vul| Cell::Text(vul.to_string())),
                "SIGNATURE" => Cell::Null,
                "ACTIONS" => Cell::Text(actions.to_string()),
                "POLLUTED_POSITION" => Cell::Text(polluted.to_string()),
                "IS_INITIALIZED" | "ACTION_INITIALIZED" => Cell::Boolean(true),
                _ => match column.kind {
                    ColumnKind::Boolean => Cell::Boolean(false),
                    ColumnKind::Integer => Cell::Integer(0),
                    ColumnKind::Text => Cell::Text(String::new()),
                },
            })
            .collect()
    }

    fn column_index(schema: &TableSchema, name: &str) -> usize {
        schema
            .columns
            .iter()
            .position(|column| column.name == name)
            .expect("column exists")
    }

    #[test]
    fn repeated_node_merge_inserts_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = open_store(&dir);
        let rows = vec![class_row("a", true), class_row("b", true)];

        let first = store.merge_nodes(&CLASSES, &rows, true).expect("first merge");
        let second = store.merge_nodes(&CLASSES, &rows, true).expect("second merge");

        assert_eq!(2, first.inserted);
        assert_eq!(0, second.inserted);
        assert_eq!(2, store.count(&CLASSES).expect("count"));
    }

    #[test]
    fn placeholder_node_is_replaced_by_initialized_row() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = open_store(&dir);

        store
            .merge_nodes(&CLASSES, &[class_row("a", false)], true)
            .expect("phantom");
        store
            .merge_nodes(&CLASSES, &[class_row("a", true)], true)
            .expect("real");
        store
            .merge_nodes(&CLASSES, &[class_row("a", false)], true)
            .expect("phantom again");

        let row = store.fetch(&CLASSES, "a").expect("fetch").expect("row");
        assert_eq!(Cell::Boolean(false), row[column_index(&CLASSES, "IS_PHANTOM")]);
        assert_eq!(1, store.count(&CLASSES).expect("count"));
    }

    #[test]
    fn refresh_folds_mutable_method_columns() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = open_store(&dir);
        store
            .merge_nodes(
                &METHODS,
                &[method_row("m", r#"{"return":"param-0"}"#, "[0]", Some("EXEC"))],
                true,
            )
            .expect("first");

        let outcome = store
            .merge_nodes(
                &METHODS,
                &[method_row("m", r#"{"this":"param-1"}"#, "[1]", None)],
                true,
            )
            .expect("refresh");

        let row = store.fetch(&METHODS, "m").expect("fetch").expect("row");
        assert_eq!(1, outcome.refreshed);
        assert_eq!(
            Cell::Text(r#"{"return":"param-0","this":"param-1"}"#.to_string()),
            row[column_index(&METHODS, "ACTIONS")]
        );
        assert_eq!(
            Cell::Text("[0,1]".to_string()),
            row[column_index(&METHODS, "POLLUTED_POSITION")]
        );
        assert_eq!(
            Cell::Text("EXEC".to_string()),
            row[column_index(&METHODS, "VUL")]
        );
    }

    #[test]
    fn refresh_disabled_keeps_stored_values() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = open_store(&dir);
        store
            .merge_nodes(&METHODS, &[method_row("m", "{}", "[]", None)], false)
            .expect("first");
        store
            .merge_nodes(&METHODS, &[method_row("m", r#"{"this":"param-0"}"#, "[]", None)], false)
            .expect("second");

        let row = store.fetch(&METHODS, "m").expect("fetch").expect("row");
        assert_eq!(
            Cell::Text("{}".to_string()),
            row[column_index(&METHODS, "ACTIONS")]
        );
    }

    #[test]
    fn placeholder_refresh_keeps_initialized_sink_flags() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = open_store(&dir);
        let mut initialized = method_row("m", "{}", "[]", Some("EXEC"));
        initialized[column_index(&METHODS, "IS_SINK")] = Cell::Boolean(true);
        initialized[column_index(&METHODS, "IS_SOURCE")] = Cell::Boolean(true);
        let mut placeholder = method_row("m", "{}", "[]", None);
        placeholder[column_index(&METHODS, "IS_INITIALIZED")] = Cell::Boolean(false);
        placeholder[column_index(&METHODS, "ACTION_INITIALIZED")] = Cell::Boolean(false);

        store
            .merge_nodes(&METHODS, &[initialized], true)
            .expect("initialized");
        let outcome = store
            .merge_nodes(&METHODS, &[placeholder], true)
            .expect("placeholder");

        let row = store.fetch(&METHODS, "m").expect("fetch").expect("row");
        assert_eq!(0, outcome.refreshed);
        assert_eq!(Cell::Boolean(true), row[column_index(&METHODS, "IS_SINK")]);
        assert_eq!(Cell::Boolean(true), row[column_index(&METHODS, "IS_SOURCE")]);
        assert_eq!(Cell::Boolean(true), row[column_index(&METHODS, "IS_INITIALIZED")]);
    }

    #[test]
    fn union_list_keeps_first_seen_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = open_store(&dir);
        let rows = vec![method_row("m", "{}", "[1,0]", None)];

        store.merge_nodes(&METHODS, &rows, true).expect("first");
        store.merge_nodes(&METHODS, &rows, true).expect("second");
        store
            .merge_nodes(&METHODS, &[method_row("m", "{}", "[2,0]", None)], true)
            .expect("third");

        let row = store.fetch(&METHODS, "m").expect("fetch").expect("row");
        assert_eq!(
            Cell::Text("[1,0,2]".to_string()),
            row[column_index(&METHODS, "POLLUTED_POSITION")]
        );
    }

    #[test]
    fn edge_without_endpoint_is_rejected_and_rolled_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = open_store(&dir);
        store
            .merge_nodes(&CLASSES, &[class_row("a", true), class_row("b", true)], true)
            .expect("nodes");
        let rows = vec![
            vec![
                Cell::Text("e1".to_string()),
                Cell::Text("a".to_string()),
                Cell::Text("b".to_string()),
            ],
            vec![
                Cell::Text("e2".to_string()),
                Cell::Text("b".to_string()),
                Cell::Text("missing".to_string()),
            ],
        ];

        let error = store.merge_edges(&EXTEND_EDGES, &rows).expect_err("missing endpoint");

        assert!(matches!(error, IngestError::MissingEndpoint { ref edge_id, .. } if edge_id == "e2"));
        assert_eq!(0, store.count(&EXTEND_EDGES).expect("count"));
    }

    #[test]
    fn second_superclass_is_an_integrity_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = open_store(&dir);
        let nodes = vec![class_row("a", true), class_row("b", true), class_row("c", true)];
        store.merge_nodes(&CLASSES, &nodes, true).expect("nodes");
        let edge = |id: &str, target: &str| {
            vec![
                Cell::Text(id.to_string()),
                Cell::Text("a".to_string()),
                Cell::Text(target.to_string()),
            ]
        };

        store
            .merge_edges(&EXTEND_EDGES, &[edge("e1", "b")])
            .expect("first superclass");
        store
            .merge_edges(&EXTEND_EDGES, &[edge("e1", "b")])
            .expect("same edge again");
        let error = store
            .merge_edges(&EXTEND_EDGES, &[edge("e2", "c")])
            .expect_err("second superclass");

        assert!(matches!(error, IngestError::Integrity { .. }));
        assert!(!error.is_retryable());
        assert_eq!(1, store.count(&EXTEND_EDGES).expect("count"));
    }

    #[test]
    fn merge_cell_policies() {
        let flag = ColumnDef {
            name: "IS_POLLUTED",
            kind: ColumnKind::Boolean,
            nullable: false,
            merge: MergePolicy::Or,
        };
        let merged = merge_cell(&flag, &Cell::Boolean(true), &Cell::Boolean(false)).expect("or");
        assert_eq!(Cell::Boolean(true), merged);

        let mismatched = merge_cell(&flag, &Cell::Boolean(true), &Cell::Integer(1));
        assert!(mismatched.is_err());
    }

    #[test]
    fn edge_tables_declare_foreign_keys() {
        let sql = create_table_sql(&EXTEND_EDGES);

        assert!(sql.contains("FOREIGN KEY (SOURCE) REFERENCES classes (ID)"));
        assert!(sql.contains("UNIQUE (SOURCE)"));
        assert!(!create_table_sql(&CLASSES).contains("FOREIGN KEY"));
    }
}
