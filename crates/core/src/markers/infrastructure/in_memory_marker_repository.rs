use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::markers::domain::marker::Marker;
use crate::markers::domain::marker_filter::{MarkerFilter, MarkerUpdate};
use crate::markers::domain::marker_repository::MarkerRepository;
use crate::shared::error::StorageError;

/// Marker storage held in memory, ordered by id.
///
/// One mutex covers all rows, so bulk conditional updates and single-row
/// updates never interleave.
#[derive(Default)]
pub struct InMemoryMarkerRepository {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<u64, Marker>,
    next_id: u64,
}

impl InMemoryMarkerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn not_found(id: u64) -> StorageError {
    StorageError::NotFound {
        entity: "marker",
        id: id.to_string(),
    }
}

impl MarkerRepository for InMemoryMarkerRepository {
    fn find(&self, id: u64) -> Result<Option<Marker>, StorageError> {
        Ok(self.lock()?.rows.get(&id).cloned())
    }

    fn first(&self, filter: &MarkerFilter) -> Result<Option<Marker>, StorageError> {
        Ok(self.lock()?.rows.values().find(|m| filter.matches(m)).cloned())
    }

    fn query(&self, filter: &MarkerFilter) -> Result<Vec<Marker>, StorageError> {
        Ok(self
            .lock()?
            .rows
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    fn create(&self, marker: &mut Marker) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if marker.id != 0 && inner.rows.contains_key(&marker.id) {
            return Err(StorageError::Conflict {
                entity: "marker",
                id: marker.id.to_string(),
            });
        }
        if marker.id == 0 {
            inner.next_id += 1;
            marker.id = inner.next_id;
        } else {
            inner.next_id = inner.next_id.max(marker.id);
        }
        inner.rows.insert(marker.id, marker.detached());
        Ok(())
    }

    fn save(&self, marker: &Marker) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let row = inner.rows.get_mut(&marker.id).ok_or_else(|| not_found(marker.id))?;
        *row = marker.detached();
        Ok(())
    }

    fn update(&self, id: u64, update: &MarkerUpdate) -> Result<Marker, StorageError> {
        let mut inner = self.lock()?;
        let row = inner.rows.get_mut(&id).ok_or_else(|| not_found(id))?;
        update.apply(row);
        Ok(row.clone())
    }

    fn update_where(
        &self,
        filter: &MarkerFilter,
        update: &MarkerUpdate,
    ) -> Result<usize, StorageError> {
        let mut inner = self.lock()?;
        let mut changed = 0;
        for row in inner.rows.values_mut().filter(|m| filter.matches(m)) {
            update.apply(row);
            changed += 1;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::domain::marker::MarkerType;
    use crate::shared::source::Source;

    fn marker(file_id: u64, x: f32, y: f32) -> Marker {
        Marker::new(file_id, None, Source::Image, MarkerType::Face, x, y, 0.1, 0.1)
    }

    #[test]
    fn test_create_assigns_increasing_ids() {
        let repo = InMemoryMarkerRepository::new();
        let mut a = marker(1, 0.1, 0.1);
        let mut b = marker(1, 0.5, 0.5);
        repo.create(&mut a).unwrap();
        repo.create(&mut b).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_create_rejects_duplicate_id() {
        let repo = InMemoryMarkerRepository::new();
        let mut a = marker(1, 0.1, 0.1);
        repo.create(&mut a).unwrap();
        let mut dup = a.clone();
        assert!(matches!(repo.create(&mut dup), Err(StorageError::Conflict { .. })));
    }

    #[test]
    fn test_first_returns_lowest_id_match() {
        let repo = InMemoryMarkerRepository::new();
        let mut a = marker(1, 0.5, 0.5);
        let mut b = marker(1, 0.52, 0.5);
        repo.create(&mut a).unwrap();
        repo.create(&mut b).unwrap();
        let found = repo.first(&MarkerFilter::near(1, 0.51, 0.5, 0.07)).unwrap().unwrap();
        assert_eq!(found.id, a.id);
        assert!(repo.first(&MarkerFilter::near(2, 0.5, 0.5, 0.07)).unwrap().is_none());
    }

    #[test]
    fn test_save_unknown_row_fails() {
        let repo = InMemoryMarkerRepository::new();
        let mut m = marker(1, 0.5, 0.5);
        m.id = 99;
        assert!(matches!(repo.save(&m), Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn test_update_where_counts_changed_rows() {
        let repo = InMemoryMarkerRepository::new();
        for x in [0.1, 0.2, 0.3] {
            let mut m = marker(1, x, 0.5);
            m.face_id = Some("F".into());
            m.subject_src = Source::Auto;
            repo.create(&mut m).unwrap();
        }
        let update = MarkerUpdate {
            subject_uid: Some(Some("jsA".into())),
            ..MarkerUpdate::default()
        };
        let changed = repo
            .update_where(&MarkerFilter::auto_siblings("F", 1, "jsA"), &update)
            .unwrap();
        assert_eq!(changed, 2);
        assert!(repo.find(1).unwrap().unwrap().subject_uid.is_none());
        assert_eq!(repo.find(3).unwrap().unwrap().subject_uid.as_deref(), Some("jsA"));
    }
}
