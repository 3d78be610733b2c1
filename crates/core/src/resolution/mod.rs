pub mod file_locks;
pub mod marker_resolver;
pub mod resolver_config;
