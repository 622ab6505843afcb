/// Storage-level errors
/// These represent failures of the record store and the offset index.
///
/// Bounds conditions (`IndexFull`, `EndOfIndex`) are kept apart from
/// `Io` so an owner can tell "roll over / stop reading" from a real
/// storage failure.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index full: {size} bytes used, capacity {capacity} bytes")]
    IndexFull { size: u64, capacity: u64 },

    #[error("end of index: requested entry {requested}, index holds {entries}")]
    EndOfIndex { requested: i64, entries: u64 },

    #[error("corrupted index file: {0}")]
    CorruptedIndex(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("store closed")]
    Closed,

    #[error("lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// True for both index bounds conditions, false for I/O and everything else.
    pub fn is_bounds_exceeded(&self) -> bool {
        matches!(
            self,
            StorageError::IndexFull { .. } | StorageError::EndOfIndex { .. }
        )
    }

    /// True only when the index ran out of capacity and the owner must
    /// start a new segment.
    pub fn needs_rollover(&self) -> bool {
        matches!(self, StorageError::IndexFull { .. })
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
