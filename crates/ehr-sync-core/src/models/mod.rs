//! Domain models for the record client.

mod diagnosis;
mod ids;
mod patient;

pub use diagnosis::*;
pub use ids::*;
pub use patient::*;
