use std::sync::Arc;

use crate::markers::domain::detection::FileDetections;
use crate::pipeline::ingest_detections_use_case::{IngestDetectionsUseCase, IngestSummary};
use crate::pipeline::ingest_logger::IngestLogger;

/// Abstracts how a batch of files is fed through ingestion.
///
/// Implementations must hand all detections of one file to the same
/// worker so near-duplicates are seen in submission order.
pub trait IngestExecutor: Send {
    fn execute(
        &self,
        use_case: Arc<IngestDetectionsUseCase>,
        files: Vec<FileDetections>,
        logger: &mut dyn IngestLogger,
    ) -> Result<IngestSummary, Box<dyn std::error::Error>>;
}
