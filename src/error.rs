use thiserror::Error;

/// Errors surfaced by store reads, writes and snapshot handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A link points at an entity key that is absent from the store.
    ///
    /// Surfaced instead of silently returning partial data, since a dangling
    /// reference usually means an entity was evicted without collecting the
    /// fields still pointing at it.
    #[error("dangling reference: no entity in the store for key \"{key}\"")]
    DanglingReference {
        /// The missing entity key.
        key: String
    },

    /// A selected field has never been written for this entity.
    ///
    /// Distinct from an explicitly cached `null`, which is a valid value.
    #[error("missing field: \"{field}\" was never written for entity \"{key}\"")]
    MissingField {
        /// The entity the field was read from.
        key: String,
        /// The store field name that was requested.
        field: String
    },

    /// Two structurally different objects in the same write normalized to
    /// the same entity key.
    ///
    /// This is a key configuration error on the caller's side (usually a
    /// wrong `custom_keys` mapping), so it fails the whole write rather than
    /// silently merging unrelated entities.
    #[error(
        "ambiguous key: \"{key}\" was produced for both typename \"{existing}\" and \"{conflicting}\" in a single write"
    )]
    AmbiguousKey {
        /// The colliding entity key.
        key: String,
        /// Typename of the object that claimed the key first.
        existing: String,
        /// Typename of the object that collided with it.
        conflicting: String
    },

    /// A payload passed to `write_query` could not be normalized.
    #[error("invalid payload: {reason}")]
    InvalidPayload {
        /// What was wrong with the payload value.
        reason: String
    },

    /// A snapshot passed to `restore` is not a flat entity map.
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot {
        /// What was wrong with the snapshot value.
        reason: String
    }
}

impl StoreError {
    /// True for [`StoreError::MissingField`], the one read error that callers
    /// commonly branch on (cache miss vs. cache corruption).
    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::MissingField { .. })
    }
}
