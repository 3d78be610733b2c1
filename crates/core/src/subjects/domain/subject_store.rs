use crate::shared::error::CollaboratorError;
use crate::shared::source::Source;
use crate::subjects::domain::subject::{Subject, SubjectKind};

/// Domain interface for looking up and maintaining named subjects.
///
/// Implementations must be safe to share between ingest workers.
pub trait SubjectStore: Send + Sync {
    /// Returns the subject with this name, creating it if none exists.
    fn first_or_create(
        &self,
        name: &str,
        kind: SubjectKind,
        src: Source,
    ) -> Result<Subject, CollaboratorError>;

    fn find(&self, uid: &str) -> Result<Option<Subject>, CollaboratorError>;

    fn find_by_name(&self, name: &str) -> Result<Option<Subject>, CollaboratorError>;

    /// Renames the subject and returns the updated record.
    fn rename(&self, uid: &str, name: &str) -> Result<Subject, CollaboratorError>;

    fn all(&self) -> Result<Vec<Subject>, CollaboratorError>;
}
