//! Error types for the pool.

/// Errors that can occur when checking objects out of a pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Every slot is checked out.
    ///
    /// This is a resource condition, not a bug: the caller should back
    /// off and retry once packets have been released.
    #[error("pool `{name}` exhausted ({capacity} slots checked out)")]
    Exhausted {
        /// The pool's name, for logs.
        name: &'static str,
        /// The pool's fixed capacity.
        capacity: usize,
    },
}
