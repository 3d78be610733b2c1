use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::faces::domain::face::Face;
use crate::faces::domain::face_repository::FaceRepository;
use crate::shared::error::StorageError;

/// Face repository backed by a mutex-guarded map.
///
/// Every method holds the lock for the whole read-modify-write, so each
/// call is atomic with respect to concurrent workers.
#[derive(Default)]
pub struct InMemoryFaceRepository {
    faces: Mutex<HashMap<String, Face>>,
}

impl InMemoryFaceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faces(faces: impl IntoIterator<Item = Face>) -> Self {
        Self {
            faces: Mutex::new(faces.into_iter().map(|f| (f.id.clone(), f)).collect()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Face>>, StorageError> {
        self.faces.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl FaceRepository for InMemoryFaceRepository {
    fn find(&self, id: &str) -> Result<Option<Face>, StorageError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn first_or_create(&self, face: Face) -> Result<Face, StorageError> {
        let mut faces = self.lock()?;
        Ok(faces.entry(face.id.clone()).or_insert(face).clone())
    }

    fn assign_subject_if_empty(&self, id: &str, subject_uid: &str) -> Result<bool, StorageError> {
        let mut faces = self.lock()?;
        match faces.get_mut(id) {
            Some(face) if face.subject_uid.is_none() => {
                face.subject_uid = Some(subject_uid.to_string());
                face.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn save_collisions(&self, face: &Face) -> Result<(), StorageError> {
        let mut faces = self.lock()?;
        let stored = faces.get_mut(&face.id).ok_or_else(|| StorageError::NotFound {
            entity: "face",
            id: face.id.clone(),
        })?;
        stored.collisions = face.collisions;
        stored.collision_radius = face.collision_radius;
        stored.matched_at = face.matched_at;
        stored.updated_at = face.updated_at;
        Ok(())
    }

    fn all(&self) -> Result<Vec<Face>, StorageError> {
        let mut faces: Vec<Face> = self.lock()?.values().cloned().collect();
        faces.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(faces)
    }
}
