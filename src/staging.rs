//! Flat, typed staging tables: one row per node or edge instance.
//!
//! Every column carries an explicit kind, so the merge step binds booleans and
//! integers directly instead of inferring them from text.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::action::ActionSet;
use crate::encoding::{Canonical, FieldInfo, ParameterAnnotations, PositionedType, from_json, to_json};
use crate::error::{EncodingError, IngestError};
use crate::extract::GraphBatch;
use crate::reference::{ClassReference, MethodReference};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ColumnKind {
    Boolean,
    Integer,
    Text,
}

impl ColumnKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "boolean" => Some(ColumnKind::Boolean),
            "integer" => Some(ColumnKind::Integer),
            "text" => Some(ColumnKind::Text),
            _ => None,
        }
    }
}

/// How a column of an existing node is treated when the same id is merged again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MergePolicy {
    /// Immutable; the first stored value stays.
    Keep,
    /// The incoming value replaces the stored one.
    Overwrite,
    /// Boolean that once true stays true.
    Or,
    /// JSON object; incoming keys replace stored keys.
    MergeMap,
    /// JSON array; incoming items not yet stored are appended.
    UnionList,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ColumnDef {
    pub(crate) name: &'static str,
    pub(crate) kind: ColumnKind,
    pub(crate) nullable: bool,
    pub(crate) merge: MergePolicy,
}

const fn column(name: &'static str, kind: ColumnKind) -> ColumnDef {
    ColumnDef {
        name,
        kind,
        nullable: false,
        merge: MergePolicy::Keep,
    }
}

const fn nullable(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        kind: ColumnKind::Text,
        nullable: true,
        merge: MergePolicy::Keep,
    }
}

const fn mutable(def: ColumnDef, merge: MergePolicy) -> ColumnDef {
    ColumnDef {
        name: def.name,
        kind: def.kind,
        nullable: def.nullable,
        merge,
    }
}

use ColumnKind::{Boolean, Integer, Text};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TableRole {
    Node,
    Edge {
        source: &'static str,
        target: &'static str,
        /// At most one edge per source node.
        single_valued: bool,
    },
}

/// Fixed column layout of one staged table. The first column is always `ID`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct TableSchema {
    pub(crate) name: &'static str,
    pub(crate) role: TableRole,
    pub(crate) columns: &'static [ColumnDef],
}

impl TableSchema {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }
}

pub(crate) static CLASSES: TableSchema = TableSchema {
    name: "classes",
    role: TableRole::Node,
    columns: &[
        column("ID", Text),
        column("NAME", Text),
        nullable("SUPER_CLASS"),
        column("INTERFACES", Text),
        column("FIELDS", Text),
        column("ANNOTATIONS", Text),
        column("IS_PHANTOM", Boolean),
        column("IS_INTERFACE", Boolean),
        column("HAS_SUPER_CLASS", Boolean),
        column("HAS_INTERFACES", Boolean),
        column("IS_INITIALIZED", Boolean),
        column("IS_SERIALIZABLE", Boolean),
        column("HAS_ANNOTATIONS", Boolean),
    ],
};

pub(crate) static METHODS: TableSchema = TableSchema {
    name: "methods",
    role: TableRole::Node,
    columns: &[
        column("ID", Text),
        column("NAME", Text),
        nullable("SIGNATURE"),
        column("SUB_SIGNATURE", Text),
        column("CLASSNAME", Text),
        column("RETURN_TYPE", Text),
        column("MODIFIERS", Integer),
        column("PARAMETER_SIZE", Integer),
        column("METHOD_ANNOTATION_SIZE", Integer),
        column("PARAM_ANNOTATION_SIZE", Integer),
        mutable(nullable("VUL"), MergePolicy::Overwrite),
        column("PARAMETERS", Text),
        column("METHOD_ANNOTATIONS", Text),
        column("PARAM_ANNOTATIONS", Text),
        mutable(column("IS_SINK", Boolean), MergePolicy::Overwrite),
        mutable(column("IS_SOURCE", Boolean), MergePolicy::Overwrite),
        column("IS_STATIC", Boolean),
        mutable(column("IS_POLLUTED", Boolean), MergePolicy::Or),
        column("HAS_PARAMETERS", Boolean),
        column("IS_INITIALIZED", Boolean),
        mutable(column("ACTION_INITIALIZED", Boolean), MergePolicy::Or),
        column("IS_IGNORE", Boolean),
        column("IS_SERIALIZABLE", Boolean),
        column("HAS_METHOD_ANNOTATIONS", Boolean),
        column("HAS_PARAM_ANNOTATIONS", Boolean),
        mutable(column("ACTIONS", Text), MergePolicy::MergeMap),
        mutable(column("POLLUTED_POSITION", Text), MergePolicy::UnionList),
    ],
};

const ENDPOINT_COLUMNS: &[ColumnDef] = &[
    column("ID", Text),
    column("SOURCE", Text),
    column("TARGET", Text),
];

pub(crate) static EXTEND_EDGES: TableSchema = TableSchema {
    name: "extend_edges",
    role: TableRole::Edge {
        source: "classes",
        target: "classes",
        single_valued: true,
    },
    columns: ENDPOINT_COLUMNS,
};

pub(crate) static INTERFACES_EDGES: TableSchema = TableSchema {
    name: "interfaces_edges",
    role: TableRole::Edge {
        source: "classes",
        target: "classes",
        single_valued: false,
    },
    columns: ENDPOINT_COLUMNS,
};

pub(crate) static HAS_EDGES: TableSchema = TableSchema {
    name: "has_edges",
    role: TableRole::Edge {
        source: "classes",
        target: "methods",
        single_valued: false,
    },
    columns: ENDPOINT_COLUMNS,
};

pub(crate) static CALL_EDGES: TableSchema = TableSchema {
    name: "call_edges",
    role: TableRole::Edge {
        source: "methods",
        target: "methods",
        single_valued: false,
    },
    columns: &[
        column("ID", Text),
        column("SOURCE", Text),
        column("TARGET", Text),
        column("LINE_NUM", Integer),
        column("INVOKER_TYPE", Text),
        column("POLLUTED_POSITION", Text),
        column("REAL_CALL_TYPE", Text),
    ],
};

pub(crate) static ALIAS_EDGES: TableSchema = TableSchema {
    name: "alias_edges",
    role: TableRole::Edge {
        source: "methods",
        target: "methods",
        single_valued: false,
    },
    columns: ENDPOINT_COLUMNS,
};

pub(crate) static NODE_TABLES: [&TableSchema; 2] = [&CLASSES, &METHODS];

pub(crate) static EDGE_TABLES: [&TableSchema; 5] = [
    &EXTEND_EDGES,
    &INTERFACES_EDGES,
    &HAS_EDGES,
    &CALL_EDGES,
    &ALIAS_EDGES,
];

pub(crate) fn schema_by_name(name: &str) -> Option<&'static TableSchema> {
    NODE_TABLES
        .iter()
        .chain(EDGE_TABLES.iter())
        .find(|schema| schema.name == name)
        .copied()
}

/// Typed cell value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub(crate) enum Cell {
    Boolean(bool),
    Integer(i64),
    Text(String),
    Null,
}

impl Cell {
    fn text(value: &str) -> Self {
        Cell::Text(value.to_string())
    }

    fn optional(value: Option<&str>) -> Self {
        value.map_or(Cell::Null, Cell::text)
    }

    fn count(value: usize) -> Self {
        Cell::Integer(value as i64)
    }

    fn json<T: Serialize>(value: &T) -> Result<Self, EncodingError> {
        Ok(Cell::Text(to_json(value)?))
    }

    /// Read a JSON cell according to its declared column, without guessing.
    fn from_json(value: Value, column: &ColumnDef) -> Option<Self> {
        match (value, column.kind) {
            (Value::Null, _) if column.nullable => Some(Cell::Null),
            (Value::Bool(value), ColumnKind::Boolean) => Some(Cell::Boolean(value)),
            (Value::Number(value), ColumnKind::Integer) => value.as_i64().map(Cell::Integer),
            (Value::String(value), ColumnKind::Text) => Some(Cell::Text(value)),
            _ => None,
        }
    }

    pub(crate) fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// Rows of one table laid out by its schema.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StagedTable {
    pub(crate) schema: &'static TableSchema,
    pub(crate) rows: Vec<Vec<Cell>>,
}

#[derive(Serialize)]
struct StagedColumn<'a> {
    name: &'a str,
    kind: ColumnKind,
}

#[derive(Serialize)]
struct StagedDocument<'a> {
    table: &'a str,
    columns: Vec<StagedColumn<'a>>,
    rows: &'a [Vec<Cell>],
}

impl StagedTable {
    fn new(schema: &'static TableSchema) -> Self {
        StagedTable {
            schema,
            rows: Vec::new(),
        }
    }

    pub(crate) fn row_id(row: &[Cell]) -> &str {
        row.first().and_then(Cell::as_text).unwrap_or_default()
    }

    fn to_document(&self) -> StagedDocument<'_> {
        StagedDocument {
            table: self.schema.name,
            columns: self
                .schema
                .columns
                .iter()
                .map(|column| StagedColumn {
                    name: column.name,
                    kind: column.kind,
                })
                .collect(),
            rows: &self.rows,
        }
    }

    /// Parse a staged document, checking its declared columns against the schema.
    pub(crate) fn from_value(value: Value) -> Result<Self, IngestError> {
        let schema_error = |table: &str, column: &str, reason: &str| IngestError::Schema {
            table: table.to_string(),
            column: column.to_string(),
            reason: reason.to_string(),
        };
        let table = value
            .get("table")
            .and_then(Value::as_str)
            .ok_or_else(|| schema_error("?", "table", "missing table name"))?;
        let schema =
            schema_by_name(table).ok_or_else(|| schema_error(table, "table", "unknown table"))?;

        let columns = value
            .get("columns")
            .and_then(Value::as_array)
            .ok_or_else(|| schema_error(table, "columns", "missing column list"))?;
        if columns.len() != schema.columns.len() {
            return Err(schema_error(table, "columns", "column count differs from schema"));
        }
        for (declared, expected) in columns.iter().zip(schema.columns) {
            let name = declared.get("name").and_then(Value::as_str).unwrap_or_default();
            let kind = declared
                .get("kind")
                .and_then(Value::as_str)
                .and_then(ColumnKind::parse);
            if name != expected.name || kind != Some(expected.kind) {
                return Err(schema_error(table, name, "column does not match schema"));
            }
        }

        let rows = match value.get("rows") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => return Err(schema_error(table, "rows", "missing row list")),
        };
        let mut staged = StagedTable::new(schema);
        for row in rows {
            let Value::Array(cells) = row else {
                return Err(schema_error(table, "rows", "row is not an array"));
            };
            if cells.len() != schema.columns.len() {
                return Err(schema_error(table, "rows", "row width differs from schema"));
            }
            let mut typed = Vec::with_capacity(cells.len());
            for (cell, column) in cells.into_iter().zip(schema.columns) {
                let cell = Cell::from_json(cell, column)
                    .ok_or_else(|| schema_error(table, column.name, "cell has the wrong type"))?;
                typed.push(cell);
            }
            check_encoded(schema, &typed)?;
            staged.rows.push(typed);
        }
        Ok(staged)
    }
}

/// Check that tuple-encoded text columns decode with their canonical codecs.
fn check_encoded(schema: &'static TableSchema, row: &[Cell]) -> Result<(), IngestError> {
    if schema == &CLASSES {
        decode_each::<FieldInfo>(schema, row, "FIELDS")?;
        decode_each::<PositionedType>(schema, row, "ANNOTATIONS")?;
    } else if schema == &METHODS {
        decode_each::<PositionedType>(schema, row, "PARAMETERS")?;
        decode_each::<PositionedType>(schema, row, "METHOD_ANNOTATIONS")?;
        decode_each::<ParameterAnnotations>(schema, row, "PARAM_ANNOTATIONS")?;
        if let Some(raw) = text_cell(schema, row, "ACTIONS") {
            let map: BTreeMap<String, String> =
                from_json(raw).map_err(|error| encoded_error(schema, "ACTIONS", error))?;
            ActionSet::from_text_map(&map).map_err(|error| IngestError::Schema {
                table: schema.name.to_string(),
                column: "ACTIONS".to_string(),
                reason: error.to_string(),
            })?;
        }
    }
    Ok(())
}

fn text_cell<'r>(schema: &TableSchema, row: &'r [Cell], column: &str) -> Option<&'r str> {
    schema
        .column_index(column)
        .and_then(|index| row.get(index))
        .and_then(Cell::as_text)
}

fn decode_each<T: Canonical>(
    schema: &TableSchema,
    row: &[Cell],
    column: &'static str,
) -> Result<(), IngestError> {
    let Some(raw) = text_cell(schema, row, column) else {
        return Ok(());
    };
    let items: Vec<String> = from_json(raw).map_err(|error| encoded_error(schema, column, error))?;
    for item in items {
        T::decode(&item).map_err(|error| encoded_error(schema, column, error))?;
    }
    Ok(())
}

fn encoded_error(schema: &TableSchema, column: &str, error: EncodingError) -> IngestError {
    IngestError::Schema {
        table: schema.name.to_string(),
        column: column.to_string(),
        reason: error.to_string(),
    }
}

/// All staged tables of one batch: node tables first, then edge tables.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StagedBatch {
    pub(crate) tables: Vec<StagedTable>,
}

impl StagedBatch {
    pub(crate) fn table(&self, schema: &TableSchema) -> Option<&StagedTable> {
        self.tables.iter().find(|table| table.schema == schema)
    }

    pub(crate) fn row_count(&self) -> usize {
        self.tables.iter().map(|table| table.rows.len()).sum()
    }

    /// Write one `<table>.json` document per table into `dir`.
    pub(crate) fn write_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        for table in &self.tables {
            let path = dir.join(format!("{}.json", table.schema.name));
            let text = serde_json::to_string_pretty(&table.to_document())
                .with_context(|| format!("failed to serialize {}", table.schema.name))?;
            fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(())
    }

    /// Read every known table back from `dir`. All tables must be present.
    pub(crate) fn read_from(dir: &Path) -> Result<Self> {
        let mut tables = Vec::new();
        for schema in NODE_TABLES.iter().chain(EDGE_TABLES.iter()) {
            let path = dir.join(format!("{}.json", schema.name));
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let value: Value = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            let table = StagedTable::from_value(value)
                .with_context(|| format!("invalid staged table {}", path.display()))?;
            tables.push(table);
        }
        Ok(StagedBatch { tables })
    }
}

/// Serialize a graph batch into its staged tables. Rows are ordered by id.
pub(crate) fn stage(batch: &GraphBatch) -> Result<StagedBatch, EncodingError> {
    let mut classes = StagedTable::new(&CLASSES);
    for class in batch.classes.values() {
        classes.rows.push(class_row(class)?);
    }

    let mut methods = StagedTable::new(&METHODS);
    for method in batch.methods.values() {
        methods.rows.push(method_row(method)?);
    }

    let mut extends = StagedTable::new(&EXTEND_EDGES);
    for edge in batch.extends.values() {
        extends.rows.push(endpoint_row(&edge.id, &edge.source, &edge.target));
    }

    let mut interfaces = StagedTable::new(&INTERFACES_EDGES);
    for edge in batch.interfaces.values() {
        interfaces
            .rows
            .push(endpoint_row(&edge.id, &edge.source, &edge.target));
    }

    let mut has = StagedTable::new(&HAS_EDGES);
    for edge in batch.has.values() {
        has.rows.push(endpoint_row(&edge.id, &edge.source, &edge.target));
    }

    let mut calls = StagedTable::new(&CALL_EDGES);
    for edge in batch.calls.values() {
        calls.rows.push(vec![
            Cell::text(&edge.id),
            Cell::text(&edge.source),
            Cell::text(&edge.target),
            Cell::Integer(edge.line_number),
            Cell::text(&edge.invoker_type),
            Cell::json(&edge.polluted_position)?,
            Cell::text(edge.dispatch.as_str()),
        ]);
    }

    let mut aliases = StagedTable::new(&ALIAS_EDGES);
    for edge in batch.aliases.values() {
        aliases
            .rows
            .push(endpoint_row(&edge.id, &edge.source, &edge.target));
    }

    Ok(StagedBatch {
        tables: vec![classes, methods, extends, interfaces, has, calls, aliases],
    })
}

fn endpoint_row(id: &str, source: &str, target: &str) -> Vec<Cell> {
    vec![Cell::text(id), Cell::text(source), Cell::text(target)]
}

fn class_row(class: &ClassReference) -> Result<Vec<Cell>, EncodingError> {
    Ok(vec![
        Cell::text(&class.id),
        Cell::text(&class.name),
        Cell::optional(class.super_class.as_deref()),
        Cell::json(&class.interfaces)?,
        Cell::json(&class.fields)?,
        Cell::json(&class.annotations)?,
        Cell::Boolean(class.is_phantom),
        Cell::Boolean(class.is_interface),
        Cell::Boolean(class.has_super_class),
        Cell::Boolean(class.has_interfaces),
        Cell::Boolean(class.is_initialized),
        Cell::Boolean(class.is_serializable),
        Cell::Boolean(class.has_annotations),
    ])
}

fn method_row(method: &MethodReference) -> Result<Vec<Cell>, EncodingError> {
    Ok(vec![
        Cell::text(&method.id),
        Cell::text(&method.name),
        Cell::optional(method.signature.as_deref()),
        Cell::text(&method.sub_signature),
        Cell::text(&method.classname),
        Cell::text(&method.return_type),
        Cell::Integer(i64::from(method.modifiers)),
        Cell::count(method.parameter_size),
        Cell::count(method.method_annotation_size),
        Cell::count(method.param_annotation_size),
        Cell::optional(method.vul.as_deref()),
        Cell::json(&method.parameters)?,
        Cell::json(&method.method_annotations)?,
        Cell::json(&method.param_annotations)?,
        Cell::Boolean(method.is_sink),
        Cell::Boolean(method.is_source),
        Cell::Boolean(method.is_static),
        Cell::Boolean(method.is_polluted),
        Cell::Boolean(method.has_parameters),
        Cell::Boolean(method.is_initialized),
        Cell::Boolean(method.action_initialized),
        Cell::Boolean(method.is_ignore),
        Cell::Boolean(method.is_serializable),
        Cell::Boolean(method.has_method_annotations),
        Cell::Boolean(method.has_param_annotations),
        Cell::json(&method.actions.to_text_map())?,
        Cell::json(&method.polluted_position.as_slice())?,
    ])
}
