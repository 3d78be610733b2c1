use std::time::Instant;

use crate::pipeline::ingest_detections_use_case::IngestSummary;

/// Observer for ingest runs.
///
/// Executors report each finished file through this port so the CLI can
/// print progress while tests stay silent.
pub trait IngestLogger: Send {
    /// Report file-level progress.
    fn progress(&mut self, current: usize, total: usize);

    /// Record the counts of one ingested file and how long it took.
    fn file_ingested(&mut self, file_id: u64, summary: &IngestSummary, elapsed_ms: f64);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Logger that discards all events.
pub struct NullIngestLogger;

impl IngestLogger for NullIngestLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn file_ingested(&mut self, _file_id: u64, _summary: &IngestSummary, _elapsed_ms: f64) {}
}

/// CLI logger that totals marker counts across files and prints them,
/// with the slowest file, when the run completes.
///
/// Progress output is throttled to every `throttle_files` files.
pub struct StdoutIngestLogger {
    throttle_files: usize,
    start_time: Instant,
    totals: IngestSummary,
    busy_ms: f64,
    slowest: Option<(u64, f64)>,
}

impl StdoutIngestLogger {
    pub fn new(throttle_files: usize) -> Self {
        Self {
            throttle_files: throttle_files.max(1),
            start_time: Instant::now(),
            totals: IngestSummary::default(),
            busy_ms: 0.0,
            slowest: None,
        }
    }

    pub fn totals(&self) -> &IngestSummary {
        &self.totals
    }

    /// File id and elapsed milliseconds of the slowest file so far.
    pub fn slowest(&self) -> Option<(u64, f64)> {
        self.slowest
    }

    /// Returns the formatted summary, or `None` if no file was ingested.
    pub fn summary_string(&self) -> Option<String> {
        let t = &self.totals;
        if t.files == 0 {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![
            format!("Ingest summary ({} files, {elapsed_s:.1}s total):", t.files),
            format!("  detections: {}", t.detections),
            format!(
                "  markers:    {} ({} merged, {} rejected)",
                t.markers, t.merged, t.rejected
            ),
            format!("  matched:    {}", t.matched),
            format!(
                "  per file:   avg {:.1}ms",
                self.busy_ms / t.files as f64
            ),
        ];
        if let Some((file_id, ms)) = self.slowest {
            lines.push(format!("  slowest:    file {file_id} ({ms:.1}ms)"));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StdoutIngestLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl IngestLogger for StdoutIngestLogger {
    fn progress(&mut self, current: usize, total: usize) {
        if total > 0 && (current % self.throttle_files == 0 || current == total) {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Ingesting: {current}/{total} files ({pct:.1}%)");
        }
    }

    fn file_ingested(&mut self, file_id: u64, summary: &IngestSummary, elapsed_ms: f64) {
        self.totals.merge(summary);
        self.busy_ms += elapsed_ms;
        if self.slowest.map_or(true, |(_, ms)| elapsed_ms > ms) {
            self.slowest = Some((file_id, elapsed_ms));
        }
        if summary.rejected > 0 {
            log::debug!("faces: file {file_id} had {} rejected detections", summary.rejected);
        }
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn file(markers: usize, merged: usize, rejected: usize) -> IngestSummary {
        IngestSummary {
            files: 1,
            detections: markers + merged + rejected,
            markers,
            merged,
            matched: 0,
            rejected,
        }
    }

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullIngestLogger;
        logger.progress(1, 10);
        logger.file_ingested(1, &file(1, 0, 0), 5.0);
        logger.summary();
    }

    #[test]
    fn test_totals_accumulate_per_file() {
        let mut logger = StdoutIngestLogger::new(10);
        logger.file_ingested(1, &file(2, 1, 0), 20.0);
        logger.file_ingested(2, &file(1, 0, 1), 30.0);

        let t = logger.totals();
        assert_eq!(t.files, 2);
        assert_eq!(t.detections, 5);
        assert_eq!(t.markers, 3);
        assert_eq!(t.merged, 1);
        assert_eq!(t.rejected, 1);
    }

    #[test]
    fn test_tracks_slowest_file() {
        let mut logger = StdoutIngestLogger::new(10);
        logger.file_ingested(4, &file(1, 0, 0), 12.0);
        logger.file_ingested(9, &file(1, 0, 0), 48.5);
        logger.file_ingested(2, &file(1, 0, 0), 3.0);

        let (file_id, ms) = logger.slowest().unwrap();
        assert_eq!(file_id, 9);
        assert_relative_eq!(ms, 48.5);
    }

    #[test]
    fn test_summary_reports_marker_counts() {
        let mut logger = StdoutIngestLogger::new(10);
        logger.file_ingested(1, &file(2, 1, 0), 10.0);
        logger.file_ingested(2, &file(3, 0, 2), 30.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Ingest summary (2 files"));
        assert!(summary.contains("detections: 8"));
        assert!(summary.contains("markers:    5 (1 merged, 2 rejected)"));
        assert!(summary.contains("avg 20.0ms"));
        assert!(summary.contains("slowest:    file 2 (30.0ms)"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        let mut logger = StdoutIngestLogger::default();
        logger.progress(0, 0);
        assert!(logger.summary_string().is_none());
    }

    #[test]
    fn test_throttle_is_at_least_one() {
        let logger = StdoutIngestLogger::new(0);
        assert_eq!(logger.throttle_files, 1);
    }
}
