use thiserror::Error;

/// Rejection of a taint action outside the position grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ActionError {
    #[error("invalid taint position `{value}`")]
    InvalidPosition { value: String },
    #[error("taint position `{value}` exceeds parameter count {parameter_count}")]
    ParamOutOfRange { value: String, parameter_count: usize },
    #[error("taint position `{value}` refers to the receiver of a static method")]
    NoReceiver { value: String },
}

/// Malformed canonical tuple or converter payload.
#[derive(Debug, Error)]
pub(crate) enum EncodingError {
    #[error("malformed encoded value `{value}`: {reason}")]
    Malformed { value: String, reason: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EncodingError {
    pub(crate) fn malformed(value: &str, reason: impl Into<String>) -> Self {
        EncodingError::Malformed {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Same node id seen with conflicting immutable attributes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("node {id} has conflicting `{attribute}`: `{existing}` vs `{incoming}`")]
pub(crate) struct IntegrityError {
    pub(crate) id: String,
    pub(crate) attribute: &'static str,
    pub(crate) existing: String,
    pub(crate) incoming: String,
}

/// Failure while merging a staged batch into the graph store.
#[derive(Debug, Error)]
pub(crate) enum IngestError {
    #[error("store failure on `{table}`: {source}")]
    Store {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("edge {edge_id} in `{table}` references a node that is not committed")]
    MissingEndpoint { table: String, edge_id: String },
    #[error("edge table `{table}` merged before node table `{node_table}` committed")]
    Barrier { table: String, node_table: String },
    #[error("single-valued edge conflict in `{table}` for {edge_id}")]
    Integrity { table: String, edge_id: String },
    #[error("staged table `{table}` column `{column}`: {reason}")]
    Schema {
        table: String,
        column: String,
        reason: String,
    },
}

impl IngestError {
    /// Whether re-running the same batch is a valid recovery.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Store { .. })
    }
}
