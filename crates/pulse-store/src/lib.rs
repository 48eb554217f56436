//! # pulse-store
//!
//! Authoritative in-memory store of per-session behavioral state.
//!
//! A single coarse [`parking_lot::RwLock`] guards the whole map: reads
//! (snapshots, activity checks) share the lock, every mutation takes it
//! exclusively. Callers only ever receive clones of [`SessionRecord`]s.
//!
//! [`SessionRecord`]: pulse_core::SessionRecord

#![deny(unsafe_code)]

pub mod errors;
pub mod store;

pub use errors::{Result, StoreError};
pub use store::{DEFAULT_HISTORY_WINDOW, SessionStore};
