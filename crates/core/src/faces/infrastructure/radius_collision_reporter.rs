use std::sync::Arc;

use crate::faces::domain::collision_reporter::CollisionReporter;
use crate::faces::domain::face::Face;
use crate::faces::domain::face_repository::FaceRepository;
use crate::shared::embedding::Embeddings;
use crate::shared::error::CollaboratorError;

/// Shrinks a face's collision radius and persists the updated log.
///
/// The stored face is re-read before recording so concurrent reports
/// against the same face build on each other.
pub struct RadiusCollisionReporter {
    faces: Arc<dyn FaceRepository>,
}

impl RadiusCollisionReporter {
    pub fn new(faces: Arc<dyn FaceRepository>) -> Self {
        Self { faces }
    }
}

impl CollisionReporter for RadiusCollisionReporter {
    fn report_collision(
        &self,
        face: &Face,
        embeddings: &Embeddings,
    ) -> Result<bool, CollaboratorError> {
        let mut current = self.faces.find(&face.id)?.unwrap_or_else(|| face.clone());
        if !current.record_collision(embeddings) {
            return Ok(false);
        }
        self.faces.save_collisions(&current)?;
        log::debug!(
            "faces: recorded collision {} for {}, radius {:.4}",
            current.collisions,
            current.id,
            current.collision_radius
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::infrastructure::in_memory_face_repository::InMemoryFaceRepository;
    use crate::shared::source::Source;

    #[test]
    fn test_reported_collision_is_persisted() {
        let repo = Arc::new(InMemoryFaceRepository::new());
        let face = repo
            .first_or_create(
                Face::new(None, Source::Manual, &Embeddings::from(vec![vec![0.0, 0.0]])).unwrap(),
            )
            .unwrap();
        let reporter = RadiusCollisionReporter::new(repo.clone());

        let reported = reporter
            .report_collision(&face, &Embeddings::from(vec![vec![0.3, 0.4]]))
            .unwrap();

        assert!(reported);
        let stored = repo.find(&face.id).unwrap().unwrap();
        assert_eq!(stored.collisions, 1);
        assert!((stored.collision_radius - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unchanged_log_is_not_reported() {
        let repo = Arc::new(InMemoryFaceRepository::new());
        let face = repo
            .first_or_create(
                Face::new(None, Source::Manual, &Embeddings::from(vec![vec![0.0, 0.0]])).unwrap(),
            )
            .unwrap();
        let reporter = RadiusCollisionReporter::new(repo.clone());

        assert!(!reporter.report_collision(&face, &Embeddings::default()).unwrap());
        assert_eq!(repo.find(&face.id).unwrap().unwrap().collisions, 0);
    }

    #[test]
    fn test_unknown_face_surfaces_storage_error() {
        let repo = Arc::new(InMemoryFaceRepository::new());
        let face = Face::new(None, Source::Manual, &Embeddings::from(vec![vec![0.0, 0.0]])).unwrap();
        let reporter = RadiusCollisionReporter::new(repo);

        let err = reporter
            .report_collision(&face, &Embeddings::from(vec![vec![0.3, 0.4]]))
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Storage(_)));
    }
}
