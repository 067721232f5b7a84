use std::path::PathBuf;

use crate::record::RecordId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("store lookup failed during {stage}: {source}")]
    Lookup {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("could not count records: {source}")]
    Count {
        #[source]
        source: Box<Error>,
    },

    #[error("failed to persist record {id}: {reason}")]
    Persist { id: RecordId, reason: String },
}

impl Error {
    /// Wrap a store error as a failed lookup in the given stage.
    pub fn lookup(stage: &'static str, source: Error) -> Self {
        Self::Lookup {
            stage,
            source: Box::new(source),
        }
    }
}
