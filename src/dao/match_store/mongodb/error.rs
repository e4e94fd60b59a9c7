use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to {action} in collection `{collection}`")]
    Query {
        collection: &'static str,
        action: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("document `{id}` in collection `{collection}` is malformed: {reason}")]
    Malformed {
        collection: &'static str,
        id: String,
        reason: String,
    },
    #[error("duplicate key: {what}")]
    DuplicateKey { what: String },
    #[error("conversation `{id}` vanished while being written")]
    MissingConversation { id: Uuid },
}

impl MongoDaoError {
    pub fn query(collection: &'static str, action: &'static str) -> impl FnOnce(MongoError) -> Self {
        move |source| MongoDaoError::Query {
            collection,
            action,
            source,
        }
    }
}

/// Whether the server rejected a write because of a unique index.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}
