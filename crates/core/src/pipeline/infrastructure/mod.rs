pub mod threaded_ingest_executor;
