use crate::faces::domain::face::Face;
use crate::shared::embedding::Embeddings;
use crate::shared::error::CollaboratorError;

/// Records that a set of embeddings disagrees with a face's identity.
pub trait CollisionReporter: Send + Sync {
    /// Returns true if a collision was newly recorded.
    fn report_collision(
        &self,
        face: &Face,
        embeddings: &Embeddings,
    ) -> Result<bool, CollaboratorError>;
}
