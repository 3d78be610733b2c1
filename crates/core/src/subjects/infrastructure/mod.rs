pub mod in_memory_subject_store;
