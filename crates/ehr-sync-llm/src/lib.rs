//! Diagnosis code suggestions from a chat-completion service.
//!
//! This crate turns a free-text description of a condition into an ICD-10
//! code followed by its name, using a hosted language model.

pub mod completion;
pub mod config;
pub mod prompts;
pub mod suggestion;

pub use completion::*;
pub use config::*;
pub use prompts::*;
pub use suggestion::*;
