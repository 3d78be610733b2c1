pub mod in_memory_marker_repository;
