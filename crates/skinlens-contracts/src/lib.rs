//! Data contracts shared by the skinlens engine and CLI: the validated
//! analysis shape, the model registry and the session event log.

pub mod analysis;
pub mod events;
pub mod models;
