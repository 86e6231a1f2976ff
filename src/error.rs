use thiserror::Error;

/// Errors surfaced by the management path (create/update/delete) and by
/// store implementations. The evaluation path never returns these; it
/// degrades to the disabled default instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid flag definition: {0}")]
    Validation(String),

    #[error("flag not found: {0}")]
    NotFound(String),

    #[error("flag already exists: {0}")]
    AlreadyExists(String),

    #[error("store is read-only")]
    ReadOnlyStore,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
