pub mod in_memory_face_repository;
pub mod radius_collision_reporter;
