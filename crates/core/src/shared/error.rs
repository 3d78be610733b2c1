use thiserror::Error;

/// Failure reported by a persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} {id} already exists")]
    Conflict { entity: &'static str, id: String },
    #[error("storage lock poisoned")]
    Poisoned,
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Failure reported by the subject store or a face's collision reporter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("invalid subject name {0:?}")]
    InvalidName(String),
    #[error("collision rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors returned by marker resolution operations.
///
/// Validation variants are returned before anything is written.
/// `Storage` and `Collaborator` name the sub-step that failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("marker: invalid position ({x}, {y})")]
    InvalidGeometry { x: f32, y: f32 },
    #[error("marker {0} is not a face marker")]
    NotAFaceMarker(u64),
    #[error("face is nil")]
    NilFace,
    #[error("{step}: {source}")]
    Storage {
        step: &'static str,
        #[source]
        source: StorageError,
    },
    #[error("{step}: {source}")]
    Collaborator {
        step: &'static str,
        #[source]
        source: CollaboratorError,
    },
}

impl ResolveError {
    pub fn storage(step: &'static str) -> impl FnOnce(StorageError) -> Self {
        move |source| ResolveError::Storage { step, source }
    }

    pub fn collaborator(step: &'static str) -> impl FnOnce(CollaboratorError) -> Self {
        move |source| ResolveError::Collaborator { step, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_carries_step() {
        let err = ResolveError::storage("update related markers")(StorageError::Poisoned);
        assert_eq!(err.to_string(), "update related markers: storage lock poisoned");
    }

    #[test]
    fn test_collaborator_wraps_storage_error() {
        let err: CollaboratorError = StorageError::Backend("disk full".into()).into();
        let err = ResolveError::collaborator("report collision")(err);
        assert_eq!(err.to_string(), "report collision: storage backend: disk full");
    }

    #[test]
    fn test_invalid_geometry_message() {
        let err = ResolveError::InvalidGeometry { x: 0.0, y: 0.5 };
        assert!(err.to_string().contains("invalid position"));
    }
}
