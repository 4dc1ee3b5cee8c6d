//! Two-phase bulk merge of staged tables into a [`GraphStore`].
//!
//! Node tables are merged first. Their completion is witnessed by a
//! [`NodeCommit`] receipt, and the edge phase can only be started with one, so an
//! edge batch never runs before the node tables it points at are stored.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::staging::{
    ALIAS_EDGES, CALL_EDGES, CLASSES, Cell, METHODS, StagedBatch, StagedTable, TableRole,
    TableSchema,
};
use crate::store::{BatchOutcome, GraphStore};

/// Proof that the listed node tables were fully merged.
#[derive(Debug)]
pub(crate) struct NodeCommit {
    tables: Vec<&'static str>,
}

impl NodeCommit {
    fn covers(&self, table: &str) -> bool {
        self.tables.iter().any(|name| *name == table)
    }
}

/// Per-table outcome of one ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct IngestReport {
    pub(crate) tables: BTreeMap<&'static str, BatchOutcome>,
}

impl IngestReport {
    fn record(&mut self, table: &'static str, outcome: BatchOutcome) {
        self.tables.entry(table).or_default().add(outcome);
    }

    #[cfg(test)]
    pub(crate) fn inserted(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |outcome| outcome.inserted)
    }

    pub(crate) fn total_inserted(&self) -> usize {
        self.tables.values().map(|outcome| outcome.inserted).sum()
    }
}

fn batch_size(schema: &TableSchema, config: &IngestConfig) -> usize {
    let size = if schema == &CLASSES {
        config.class_batch_size
    } else if schema == &METHODS {
        config.method_batch_size
    } else if schema == &ALIAS_EDGES {
        config.alias_batch_size
    } else {
        config.edge_batch_size
    };
    size.max(1)
}

/// Merge every node table of `staged`. Classes and methods merge concurrently.
pub(crate) fn merge_nodes(
    store: &dyn GraphStore,
    staged: &StagedBatch,
    config: &IngestConfig,
) -> Result<(NodeCommit, IngestReport), IngestError> {
    let node_tables: Vec<&StagedTable> = staged
        .tables
        .iter()
        .filter(|table| table.schema.role == TableRole::Node)
        .collect();

    let results: Vec<Result<BatchOutcome, IngestError>> = node_tables
        .par_iter()
        .map(|table| merge_node_table(store, table, config))
        .collect();

    let mut report = IngestReport::default();
    let mut committed = Vec::new();
    for (table, result) in node_tables.iter().zip(results) {
        report.record(table.schema.name, result?);
        committed.push(table.schema.name);
    }
    info!(tables = ?committed, "node phase committed");
    Ok((NodeCommit { tables: committed }, report))
}

fn merge_node_table(
    store: &dyn GraphStore,
    table: &StagedTable,
    config: &IngestConfig,
) -> Result<BatchOutcome, IngestError> {
    let chunks: Vec<&[Vec<Cell>]> = table
        .rows
        .chunks(batch_size(table.schema, config))
        .collect();
    let merge = |rows: &&[Vec<Cell>]| store.merge_nodes(table.schema, rows, config.refresh_mutable);

    let outcomes: Vec<BatchOutcome> = if config.parallel_nodes {
        chunks
            .par_iter()
            .map(merge)
            .collect::<Result<_, IngestError>>()?
    } else {
        chunks.iter().map(merge).collect::<Result<_, IngestError>>()?
    };
    let mut total = BatchOutcome::default();
    for outcome in outcomes {
        total.add(outcome);
    }
    Ok(total)
}

/// Merge every edge table of `staged`. Edge types run concurrently; batches of
/// one type run one after another.
pub(crate) fn merge_edges(
    store: &dyn GraphStore,
    staged: &StagedBatch,
    commit: &NodeCommit,
    config: &IngestConfig,
) -> Result<IngestReport, IngestError> {
    let edge_tables: Vec<&StagedTable> = staged
        .tables
        .iter()
        .filter(|table| matches!(table.schema.role, TableRole::Edge { .. }))
        .collect();
    for table in &edge_tables {
        check_barrier(table.schema, commit)?;
    }

    let results: Vec<Result<BatchOutcome, IngestError>> = edge_tables
        .par_iter()
        .map(|table| merge_edge_table(store, table, config))
        .collect();

    let mut report = IngestReport::default();
    for (table, result) in edge_tables.iter().zip(results) {
        report.record(table.schema.name, result?);
    }
    Ok(report)
}

fn check_barrier(schema: &TableSchema, commit: &NodeCommit) -> Result<(), IngestError> {
    let TableRole::Edge { source, target, .. } = schema.role else {
        return Ok(());
    };
    for node_table in [source, target] {
        if !commit.covers(node_table) {
            return Err(IngestError::Barrier {
                table: schema.name.to_string(),
                node_table: node_table.to_string(),
            });
        }
    }
    Ok(())
}

fn merge_edge_table(
    store: &dyn GraphStore,
    table: &StagedTable,
    config: &IngestConfig,
) -> Result<BatchOutcome, IngestError> {
    let mut total = BatchOutcome::default();
    for rows in table.rows.chunks(batch_size(table.schema, config)) {
        total.add(store.merge_edges(table.schema, rows)?);
    }
    if table.schema == &CALL_EDGES && total.inserted < table.rows.len() {
        warn!(
            staged = table.rows.len(),
            inserted = total.inserted,
            "some call edges were already stored"
        );
    }
    Ok(total)
}

/// Run both phases. Re-running the same staged batch is a no-op on the graph.
pub(crate) fn ingest(
    store: &dyn GraphStore,
    staged: &StagedBatch,
    config: &IngestConfig,
) -> Result<IngestReport, IngestError> {
    let (commit, mut report) = merge_nodes(store, staged, config)?;
    let edges = merge_edges(store, staged, &commit, config)?;
    for (table, outcome) in edges.tables {
        report.record(table, outcome);
    }
    for (table, outcome) in &report.tables {
        info!(
            table,
            inserted = outcome.inserted,
            refreshed = outcome.refreshed,
            "table merged"
        );
    }
    Ok(report)
}
