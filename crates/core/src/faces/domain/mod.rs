pub mod collision_reporter;
pub mod face;
pub mod face_repository;
