pub mod infrastructure;
pub mod ingest_detections_use_case;
pub mod ingest_executor;
pub mod ingest_logger;
