//! # pulse-llm
//!
//! The classification capability consumed by the analysis pipeline.
//!
//! - [`Classifier`]: async trait every backend implements
//! - [`RawClassification`]: wire payload with structural validation into a
//!   [`pulse_core::Classification`]
//! - [`ChatCompletionClassifier`]: OpenAI-compatible `/chat/completions` backend
//!
//! The natural-language content of prompts and replies is opaque here; only
//! the structural fields (`message`, `state_change`, `new_state`, `urgency`)
//! are enforced.

#![deny(unsafe_code)]

pub mod chat;
pub mod classifier;
pub mod errors;
pub mod payload;
pub mod prompt;

pub use chat::{ChatCompletionClassifier, ChatConfig};
pub use classifier::Classifier;
pub use errors::{ClassifierError, Result};
pub use payload::{MAX_MESSAGE_CHARS, RawClassification};
