//! Error taxonomy for a reconciliation run.
//!
//! Errors split into two classes:
//!
//! | Variant | Class | Effect |
//! |---------|-------|--------|
//! | [`SyncError::SourceFetch`] | fatal | run aborts before any write |
//! | [`SyncError::StoreRead`] | fatal | run aborts before any write |
//! | [`SyncError::Embedding`] | item-local | item counted as failed, run continues |
//! | [`SyncError::StoreWrite`] | item-local | item counted as failed, run continues |
//!
//! Store clients may report a failure either as a non-success response
//! (soft error in a result envelope) or as a transport failure (hard error).
//! Both collapse into the same variant since they retry identically: the
//! key is simply picked up again by the next run's diff.

/// Failure modes of the sync pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The upstream page query did not succeed.
    #[error("source fetch failed: {0}")]
    SourceFetch(String),

    /// A page of the sink snapshot could not be read.
    #[error("store read failed at offset {offset}: {message}")]
    StoreRead {
        /// Offset of the page that failed.
        offset: usize,
        /// Underlying failure.
        message: String,
    },

    /// An upsert or delete was rejected by the store.
    #[error("store write failed for {key}: {message}")]
    StoreWrite {
        /// Key of the row being written.
        key: String,
        /// Underlying failure.
        message: String,
    },

    /// The embedding generator could not produce a vector.
    #[error("embedding failed: {0}")]
    Embedding(String),
}

impl SyncError {
    /// Fatal errors abort the run before any mutation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::SourceFetch(_) | SyncError::StoreRead { .. })
    }

    pub(crate) fn store_write(key: &str, message: impl std::fmt::Display) -> Self {
        SyncError::StoreWrite {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn store_read(offset: usize, message: impl std::fmt::Display) -> Self {
        SyncError::StoreRead {
            offset,
            message: message.to_string(),
        }
    }
}
