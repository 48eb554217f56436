//! Session store errors.

use pulse_core::SessionId;
use thiserror::Error;

/// Errors returned by [`SessionStore`](crate::SessionStore) mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record exists for the session.
    #[error("session not found: {session_id}")]
    NotFound {
        /// The unknown session.
        session_id: SessionId,
    },
}

impl StoreError {
    pub(crate) fn not_found(session_id: &str) -> Self {
        Self::NotFound {
            session_id: SessionId::from(session_id),
        }
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
