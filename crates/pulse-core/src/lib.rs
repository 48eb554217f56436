//! # pulse-core
//!
//! Foundation types shared by every pulse crate.
//!
//! - Branded ID newtypes ([`SessionId`], [`ConnectionId`])
//! - The behavioral state machine ([`BehaviorState`])
//! - The per-session record with its bounded history window ([`SessionRecord`])
//! - Analysis request/result envelopes exchanged with the pipeline
//! - An injectable [`Clock`] so inactivity sweeps are testable
//! - `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod analysis;
pub mod clock;
pub mod ids;
pub mod logging;
pub mod session;
pub mod state;

pub use analysis::{AnalysisRequest, AnalysisResult, Classification, Urgency};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{ConnectionId, SessionId};
pub use session::{DerivedUserState, HistoryEntry, SessionExport, SessionRecord};
pub use state::BehaviorState;
