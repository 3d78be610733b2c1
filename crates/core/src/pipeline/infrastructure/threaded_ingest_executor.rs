use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::markers::domain::detection::FileDetections;
use crate::pipeline::ingest_detections_use_case::{IngestDetectionsUseCase, IngestSummary};
use crate::pipeline::ingest_executor::IngestExecutor;
use crate::pipeline::ingest_logger::IngestLogger;
use crate::shared::error::ResolveError;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

struct FileOutcome {
    file_id: u64,
    elapsed_ms: f64,
    result: Result<IngestSummary, ResolveError>,
}

/// Ingests files on a fixed pool of worker threads.
///
/// Layout: `dispatcher → worker[file_id % n] → main [progress/summary]`
///
/// Files are sharded by id, so one file is never split across workers.
/// The first failing file cancels the rest of the run.
pub struct ThreadedIngestExecutor {
    workers: usize,
    channel_capacity: usize,
}

impl ThreadedIngestExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for ThreadedIngestExecutor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IngestExecutor for ThreadedIngestExecutor {
    fn execute(
        &self,
        use_case: Arc<IngestDetectionsUseCase>,
        files: Vec<FileDetections>,
        logger: &mut dyn IngestLogger,
    ) -> Result<IngestSummary, Box<dyn std::error::Error>> {
        let total = files.len();
        let workers = self.workers.min(total.max(1));
        let cap = self.channel_capacity;
        let cancelled = Arc::new(AtomicBool::new(false));

        let (outcome_tx, outcome_rx) = crossbeam_channel::bounded::<FileOutcome>(cap);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (file_tx, file_rx) = crossbeam_channel::bounded::<FileDetections>(cap);
            senders.push(file_tx);
            handles.push(spawn_worker(
                use_case.clone(),
                file_rx,
                outcome_tx.clone(),
                cancelled.clone(),
            ));
        }
        drop(outcome_tx);

        let dispatcher = spawn_dispatcher(files, senders, cancelled.clone());
        let result = collect_outcomes(outcome_rx, total, logger, &cancelled);

        join_threads(dispatcher, handles, result)
    }
}

fn spawn_dispatcher(
    files: Vec<FileDetections>,
    senders: Vec<Sender<FileDetections>>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let shards = senders.len() as u64;
        for file in files {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let shard = (file.file_id % shards) as usize;
            if senders[shard].send(file).is_err() {
                break;
            }
        }
    })
}

fn spawn_worker(
    use_case: Arc<IngestDetectionsUseCase>,
    file_rx: Receiver<FileDetections>,
    outcome_tx: Sender<FileOutcome>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for file in file_rx {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let started = Instant::now();
            let result = use_case.ingest_file(&file);
            let outcome = FileOutcome {
                file_id: file.file_id,
                elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                result,
            };
            if outcome_tx.send(outcome).is_err() {
                break;
            }
        }
    })
}

/// Drains worker outcomes until every worker has exited, keeping the first
/// error and cancelling outstanding work once one occurs.
fn collect_outcomes(
    outcome_rx: Receiver<FileOutcome>,
    total: usize,
    logger: &mut dyn IngestLogger,
    cancelled: &AtomicBool,
) -> Result<IngestSummary, ResolveError> {
    let mut summary = IngestSummary::default();
    let mut first_error = None;
    let mut done = 0;

    for outcome in outcome_rx {
        done += 1;
        match outcome.result {
            Ok(file_summary) => {
                logger.file_ingested(outcome.file_id, &file_summary, outcome.elapsed_ms);
                summary.merge(&file_summary);
            }
            Err(e) => {
                log::error!("faces: failed ingesting file {}: {e}", outcome.file_id);
                cancelled.store(true, Ordering::Relaxed);
                first_error.get_or_insert(e);
            }
        }
        logger.progress(done, total);
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            logger.summary();
            Ok(summary)
        }
    }
}

fn join_threads(
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    result: Result<IngestSummary, ResolveError>,
) -> Result<IngestSummary, Box<dyn std::error::Error>> {
    let mut first_error: Option<Box<dyn std::error::Error>> = None;

    if dispatcher.join().is_err() {
        first_error = Some("Dispatcher thread panicked".into());
    }
    for handle in workers {
        if handle.join().is_err() && first_error.is_none() {
            first_error = Some("Ingest worker panicked".into());
        }
    }

    match (result, first_error) {
        (Err(e), _) => Err(Box::new(e)),
        (Ok(_), Some(e)) => Err(e),
        (Ok(summary), None) => Ok(summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::domain::detection::Detection;
    use crate::markers::domain::marker_filter::MarkerFilter;
    use crate::pipeline::ingest_logger::{NullIngestLogger, StdoutIngestLogger};
    use crate::resolution::marker_resolver::MarkerResolver;
    use crate::resolution::resolver_config::ResolverConfig;
    use crate::shared::embedding::Embeddings;
    use rstest::rstest;

    fn detection(x: f32, y: f32) -> Detection {
        Detection {
            x,
            y,
            w: 0.1,
            h: 0.1,
            embeddings: Embeddings::from(vec![vec![x as f64, y as f64]]),
            landmarks: serde_json::Value::Null,
            size: 120,
            score: 40,
        }
    }

    fn files(count: u64) -> Vec<FileDetections> {
        (1..=count)
            .map(|file_id| FileDetections {
                file_id,
                detections: vec![detection(0.2, 0.2), detection(0.21, 0.2), detection(0.8, 0.8)],
            })
            .collect()
    }

    fn use_case() -> Arc<IngestDetectionsUseCase> {
        Arc::new(IngestDetectionsUseCase::new(Arc::new(MarkerResolver::in_memory(
            ResolverConfig::default(),
        ))))
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(16)]
    fn test_ingests_all_files(#[case] workers: usize) {
        let uc = use_case();
        let executor = ThreadedIngestExecutor::new(workers);

        let summary = executor
            .execute(uc.clone(), files(10), &mut NullIngestLogger)
            .unwrap();

        assert_eq!(summary.files, 10);
        assert_eq!(summary.detections, 30);
        assert_eq!(summary.markers, 20);
        assert_eq!(summary.merged, 10);

        let stored = uc.resolver().markers().query(&MarkerFilter::default()).unwrap();
        assert_eq!(stored.len(), 20);
    }

    #[test]
    fn test_reports_progress_per_file() {
        let mut logger = StdoutIngestLogger::new(1);
        let summary = ThreadedIngestExecutor::new(2)
            .execute(use_case(), files(4), &mut logger)
            .unwrap();
        assert_eq!(logger.totals(), &summary);
        assert_eq!(logger.totals().files, 4);
        assert_eq!(logger.totals().markers, 8);
    }

    #[test]
    fn test_empty_batch() {
        let summary = ThreadedIngestExecutor::default()
            .execute(use_case(), Vec::new(), &mut NullIngestLogger)
            .unwrap();
        assert_eq!(summary, IngestSummary::default());
    }

    #[test]
    fn test_zero_workers_clamped() {
        let summary = ThreadedIngestExecutor::new(0)
            .execute(use_case(), files(2), &mut NullIngestLogger)
            .unwrap();
        assert_eq!(summary.files, 2);
    }
}
