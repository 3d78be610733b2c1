use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::markers::domain::detection::FileDetections;
use crate::markers::domain::marker::Marker;
use crate::pipeline::ingest_logger::IngestLogger;
use crate::resolution::marker_resolver::MarkerResolver;
use crate::shared::error::ResolveError;

/// Counts for one ingest run or one file of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub files: usize,
    pub detections: usize,
    /// Distinct markers the detections ended up in.
    pub markers: usize,
    /// Detections folded into a marker another detection already produced.
    pub merged: usize,
    /// Markers newly linked to a face.
    pub matched: usize,
    /// Detections dropped for invalid geometry.
    pub rejected: usize,
}

impl IngestSummary {
    pub fn merge(&mut self, other: &IngestSummary) {
        self.files += other.files;
        self.detections += other.detections;
        self.markers += other.markers;
        self.merged += other.merged;
        self.matched += other.matched;
        self.rejected += other.rejected;
    }
}

/// Turns detector output into markers: dedupe on the file, then match
/// faceless markers against known faces.
pub struct IngestDetectionsUseCase {
    resolver: Arc<MarkerResolver>,
}

impl IngestDetectionsUseCase {
    pub fn new(resolver: Arc<MarkerResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &MarkerResolver {
        &self.resolver
    }

    /// Ingests every detection of one file.
    ///
    /// Detections with an invalid position are skipped and counted; any
    /// other failure aborts the file.
    pub fn ingest_file(&self, file: &FileDetections) -> Result<IngestSummary, ResolveError> {
        let mut summary = IngestSummary {
            files: 1,
            detections: file.detections.len(),
            ..IngestSummary::default()
        };
        let mut ids = HashSet::new();

        for detection in &file.detections {
            let candidate = Marker::from_detection(detection, file.file_id, None);
            let mut marker = match self.resolver.update_or_create_marker(candidate) {
                Ok(m) => m,
                Err(e @ ResolveError::InvalidGeometry { .. }) => {
                    log::warn!("faces: skipped detection in file {}: {e}", file.file_id);
                    summary.rejected += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            ids.insert(marker.id);

            if self.resolver.match_faces(&mut marker)? {
                summary.matched += 1;
            }
        }

        summary.markers = ids.len();
        summary.merged = summary.detections - summary.rejected - summary.markers;
        Ok(summary)
    }

    /// Ingests files one after another on the calling thread.
    pub fn execute(
        &self,
        files: &[FileDetections],
        logger: &mut dyn IngestLogger,
    ) -> Result<IngestSummary, ResolveError> {
        let mut total = IngestSummary::default();
        for (i, file) in files.iter().enumerate() {
            let started = Instant::now();
            let summary = self.ingest_file(file)?;
            logger.file_ingested(file.file_id, &summary, started.elapsed().as_secs_f64() * 1000.0);
            logger.progress(i + 1, files.len());
            total.merge(&summary);
        }
        logger.summary();
        Ok(total)
    }
}
