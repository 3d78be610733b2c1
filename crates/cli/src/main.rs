use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use serde::{Deserialize, Serialize};

use face_resolver_core::faces::domain::face::Face;
use face_resolver_core::faces::domain::face_repository::FaceRepository;
use face_resolver_core::faces::infrastructure::in_memory_face_repository::InMemoryFaceRepository;
use face_resolver_core::faces::infrastructure::radius_collision_reporter::RadiusCollisionReporter;
use face_resolver_core::markers::domain::detection::FileDetections;
use face_resolver_core::markers::domain::marker::Marker;
use face_resolver_core::markers::domain::marker_filter::MarkerFilter;
use face_resolver_core::markers::infrastructure::in_memory_marker_repository::InMemoryMarkerRepository;
use face_resolver_core::pipeline::infrastructure::threaded_ingest_executor::ThreadedIngestExecutor;
use face_resolver_core::pipeline::ingest_detections_use_case::{
    IngestDetectionsUseCase, IngestSummary,
};
use face_resolver_core::pipeline::ingest_executor::IngestExecutor;
use face_resolver_core::pipeline::ingest_logger::{IngestLogger, StdoutIngestLogger};
use face_resolver_core::resolution::marker_resolver::MarkerResolver;
use face_resolver_core::resolution::resolver_config::ResolverConfig;
use face_resolver_core::subjects::domain::subject::Subject;
use face_resolver_core::subjects::infrastructure::in_memory_subject_store::InMemorySubjectStore;

/// Deduplicates face detections and links them to known faces and people.
#[derive(Parser)]
#[command(name = "face-resolver")]
struct Cli {
    /// Input JSON: detections per file, optionally with known subjects,
    /// faces and markers from an earlier snapshot.
    input: PathBuf,

    /// Write the snapshot here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads (default from config).
    #[arg(long)]
    workers: Option<usize>,

    /// Config file (default: user config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum embedding distance for a face match.
    #[arg(long)]
    match_dist: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Input {
    #[serde(default)]
    subjects: Vec<Subject>,
    #[serde(default)]
    faces: Vec<Face>,
    #[serde(default)]
    markers: Vec<Marker>,
    #[serde(default)]
    files: Vec<FileDetections>,
}

/// Resolver state after ingestion. Can be fed back in as input.
#[derive(Debug, Serialize)]
struct Snapshot {
    summary: IngestSummary,
    subjects: Vec<Subject>,
    faces: Vec<Face>,
    markers: Vec<Marker>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let mut config = ResolverConfig::load(cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(dist) = cli.match_dist {
        config.match_dist = dist;
    }

    let input: Input = serde_json::from_slice(&fs::read(&cli.input)?)?;
    let mut logger = StdoutIngestLogger::default();
    let snapshot = ingest(input, config, &mut logger)?;

    write_snapshot(&snapshot, cli.output.as_deref())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if cli.workers == Some(0) {
        return Err("--workers must be at least 1".into());
    }
    if let Some(dist) = cli.match_dist {
        if !dist.is_finite() || dist <= 0.0 {
            return Err(format!("--match-dist must be a positive number, got {dist}").into());
        }
    }
    Ok(())
}

/// Seeds in-memory stores from `input`, ingests its files and returns the
/// resulting state.
fn ingest(
    input: Input,
    config: ResolverConfig,
    logger: &mut dyn IngestLogger,
) -> Result<Snapshot, Box<dyn std::error::Error>> {
    let workers = config.workers;
    let resolver = Arc::new(build_resolver(input.subjects, input.faces, config));

    log::info!(
        "Seeded {} subjects, {} faces",
        resolver.subjects().all()?.len(),
        resolver.faces().all()?.len()
    );

    for mut marker in input.markers {
        resolver.create(&mut marker)?;
    }

    let use_case = Arc::new(IngestDetectionsUseCase::new(resolver.clone()));
    let summary = ThreadedIngestExecutor::new(workers).execute(use_case, input.files, logger)?;

    Ok(Snapshot {
        summary,
        subjects: resolver.subjects().all()?,
        faces: resolver.faces().all()?,
        markers: resolver.markers().query(&MarkerFilter::default())?,
    })
}

fn build_resolver(subjects: Vec<Subject>, faces: Vec<Face>, config: ResolverConfig) -> MarkerResolver {
    let faces: Arc<dyn FaceRepository> = Arc::new(InMemoryFaceRepository::with_faces(faces));
    MarkerResolver::new(
        Arc::new(InMemoryMarkerRepository::new()),
        faces.clone(),
        Arc::new(InMemorySubjectStore::with_subjects(subjects)),
        Arc::new(RadiusCollisionReporter::new(faces)),
        config,
    )
}

fn write_snapshot(snapshot: &Snapshot, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(snapshot)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            log::info!("Wrote snapshot to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
