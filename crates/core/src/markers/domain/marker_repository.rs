use crate::markers::domain::marker::Marker;
use crate::markers::domain::marker_filter::{MarkerFilter, MarkerUpdate};
use crate::shared::error::StorageError;

/// Persistence port for markers.
///
/// Every call either applies completely or fails with an error; there
/// are no partial writes. Implementations must be safe to share between
/// ingest workers.
pub trait MarkerRepository: Send + Sync {
    fn find(&self, id: u64) -> Result<Option<Marker>, StorageError>;

    /// Lowest-id marker matching the filter.
    fn first(&self, filter: &MarkerFilter) -> Result<Option<Marker>, StorageError>;

    /// All matching markers in id order.
    fn query(&self, filter: &MarkerFilter) -> Result<Vec<Marker>, StorageError>;

    /// Inserts a new row and assigns its id.
    fn create(&self, marker: &mut Marker) -> Result<(), StorageError>;

    /// Writes every column of an existing row.
    fn save(&self, marker: &Marker) -> Result<(), StorageError>;

    /// Applies `update` to one row and returns the stored result.
    fn update(&self, id: u64, update: &MarkerUpdate) -> Result<Marker, StorageError>;

    /// Applies `update` to every matching row; returns the number changed.
    fn update_where(&self, filter: &MarkerFilter, update: &MarkerUpdate)
        -> Result<usize, StorageError>;
}
