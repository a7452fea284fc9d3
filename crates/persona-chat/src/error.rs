//! Error taxonomy for the memory subsystem and the game loop

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("no short-term buffer record exists for character '{character}'")]
    RecordNotFound { character: String },

    #[error("malformed persisted state in {}: {source}", .path.display())]
    MalformedPersistedState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("entry id {entry_id} already exists in collection '{collection}'")]
    IdentifierCollision { collection: String, entry_id: i64 },

    #[error("cannot pair {roles} roles with {contents} messages")]
    LengthMismatch { roles: usize, contents: usize },

    #[error("unknown character '{0}'")]
    UnknownCharacter(String),

    #[error("inference backend failed: {0:#}")]
    Backend(anyhow::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("conversation worker has stopped")]
    WorkerStopped,

    #[error(transparent)]
    Game(#[from] GameError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("embedding encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

pub type MemoryResult<T> = Result<T, MemoryError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("unrecognized action '{0}'")]
    UnrecognizedAction(String),

    #[error("agent step is missing '{0}'")]
    MissingField(&'static str),

    #[error("cell {0} is not available")]
    IllegalMove(usize),

    #[error("the round is already decided")]
    GameOver,

    #[error("no game is in progress")]
    NoActiveGame,
}
