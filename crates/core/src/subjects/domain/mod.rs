pub mod subject;
pub mod subject_store;
