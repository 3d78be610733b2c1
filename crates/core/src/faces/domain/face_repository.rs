use crate::faces::domain::face::Face;
use crate::shared::error::StorageError;

/// Persistence port for face clusters.
///
/// Faces are shared by many markers, so callers always go through the
/// repository by id instead of holding on to a single in-memory owner.
pub trait FaceRepository: Send + Sync {
    fn find(&self, id: &str) -> Result<Option<Face>, StorageError>;

    /// Inserts the face, or returns the stored one if the id already exists.
    fn first_or_create(&self, face: Face) -> Result<Face, StorageError>;

    /// Binds `subject_uid` only if the face has no subject yet.
    /// Returns true if the row changed.
    fn assign_subject_if_empty(&self, id: &str, subject_uid: &str) -> Result<bool, StorageError>;

    /// Replaces the stored collision log with the one on `face`.
    fn save_collisions(&self, face: &Face) -> Result<(), StorageError>;

    fn all(&self) -> Result<Vec<Face>, StorageError>;
}
