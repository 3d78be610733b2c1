//! Identity resolution for detected image regions.
//!
//! Markers (detected regions in one file) are deduplicated on ingest,
//! matched against persistent face clusters by embedding distance, and
//! linked to named subjects. Manual edits always outrank automatic guesses.

pub mod faces;
pub mod markers;
pub mod pipeline;
pub mod resolution;
pub mod shared;
pub mod subjects;
