//! Domain model module declarations.

pub mod mission;

pub use mission::{Mission, MissionFilter, MissionPaths};
