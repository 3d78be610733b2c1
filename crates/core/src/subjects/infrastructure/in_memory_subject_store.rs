use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::shared::error::{CollaboratorError, StorageError};
use crate::shared::source::Source;
use crate::shared::text;
use crate::subjects::domain::subject::{Subject, SubjectKind};
use crate::subjects::domain::subject_store::SubjectStore;

/// Subject store held entirely in memory, keyed by uid with a name index.
#[derive(Default)]
pub struct InMemorySubjectStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    by_uid: HashMap<String, Subject>,
    by_slug: HashMap<String, String>,
}

impl Inner {
    fn insert(&mut self, subject: Subject) {
        self.by_slug.insert(subject.slug(), subject.uid.clone());
        self.by_uid.insert(subject.uid.clone(), subject);
    }
}

impl InMemorySubjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with existing subjects, e.g. from a snapshot.
    pub fn with_subjects(subjects: impl IntoIterator<Item = Subject>) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            for s in subjects {
                inner.insert(s);
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, CollaboratorError> {
        self.inner
            .lock()
            .map_err(|_| CollaboratorError::Storage(StorageError::Poisoned))
    }
}

impl SubjectStore for InMemorySubjectStore {
    fn first_or_create(
        &self,
        name: &str,
        kind: SubjectKind,
        src: Source,
    ) -> Result<Subject, CollaboratorError> {
        let candidate = Subject::new(name, kind, src)
            .ok_or_else(|| CollaboratorError::InvalidName(name.to_string()))?;
        let mut inner = self.lock()?;
        if let Some(existing) = inner
            .by_slug
            .get(&candidate.slug())
            .and_then(|uid| inner.by_uid.get(uid))
        {
            return Ok(existing.clone());
        }
        log::debug!("subject: created {} ({})", candidate.name, candidate.uid);
        inner.insert(candidate.clone());
        Ok(candidate)
    }

    fn find(&self, uid: &str) -> Result<Option<Subject>, CollaboratorError> {
        Ok(self.lock()?.by_uid.get(uid).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Subject>, CollaboratorError> {
        let inner = self.lock()?;
        Ok(inner
            .by_slug
            .get(&text::slug(name))
            .and_then(|uid| inner.by_uid.get(uid))
            .cloned())
    }

    fn rename(&self, uid: &str, name: &str) -> Result<Subject, CollaboratorError> {
        let name = text::normalize_marker_name(name);
        if name.is_empty() {
            return Err(CollaboratorError::InvalidName(name));
        }
        let mut inner = self.lock()?;
        let mut subject = inner.by_uid.get(uid).cloned().ok_or_else(|| {
            CollaboratorError::Storage(StorageError::NotFound {
                entity: "subject",
                id: uid.to_string(),
            })
        })?;
        let old_slug = subject.slug();
        subject.name = name;
        if inner.by_slug.get(&old_slug).is_some_and(|u| u == uid) {
            inner.by_slug.remove(&old_slug);
        }
        log::debug!("subject: renamed {} to {}", subject.uid, subject.name);
        inner.insert(subject.clone());
        Ok(subject)
    }

    fn all(&self) -> Result<Vec<Subject>, CollaboratorError> {
        let mut subjects: Vec<Subject> = self.lock()?.by_uid.values().cloned().collect();
        subjects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_or_create_returns_same_subject_for_same_name() {
        let store = InMemorySubjectStore::new();
        let a = store.first_or_create("jane doe", SubjectKind::Person, Source::Manual).unwrap();
        let b = store.first_or_create("Jane Doe", SubjectKind::Person, Source::Manual).unwrap();
        assert_eq!(a.uid, b.uid);
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[test]
    fn test_first_or_create_rejects_blank_name() {
        let store = InMemorySubjectStore::new();
        let err = store.first_or_create("  ", SubjectKind::Person, Source::Manual);
        assert!(matches!(err, Err(CollaboratorError::InvalidName(_))));
    }

    #[test]
    fn test_find_by_uid_and_name() {
        let store = InMemorySubjectStore::new();
        let s = store.first_or_create("Ada", SubjectKind::Person, Source::Manual).unwrap();
        assert_eq!(store.find(&s.uid).unwrap().unwrap().name, "Ada");
        assert_eq!(store.find_by_name("ada").unwrap().unwrap().uid, s.uid);
        assert!(store.find("missing").unwrap().is_none());
    }

    #[test]
    fn test_rename_updates_name_index() {
        let store = InMemorySubjectStore::new();
        let s = store.first_or_create("Ada", SubjectKind::Person, Source::Manual).unwrap();
        let renamed = store.rename(&s.uid, "ada lovelace").unwrap();
        assert_eq!(renamed.name, "Ada Lovelace");
        assert!(store.find_by_name("Ada").unwrap().is_none());
        assert_eq!(store.find_by_name("Ada Lovelace").unwrap().unwrap().uid, s.uid);
    }

    #[test]
    fn test_rename_unknown_uid_fails() {
        let store = InMemorySubjectStore::new();
        assert!(store.rename("nope", "Bob").is_err());
    }
}
