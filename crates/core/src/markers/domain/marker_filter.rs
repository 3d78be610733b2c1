//! Predicates and partial-column updates understood by marker storage.

use chrono::{DateTime, Utc};

use crate::markers::domain::marker::{Marker, MarkerType};
use crate::shared::source::Source;

/// Conjunction of equality and range conditions on marker columns.
///
/// Unset fields do not constrain the result. Ranges are exclusive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerFilter {
    pub file_id: Option<u64>,
    pub exclude_id: Option<u64>,
    pub marker_type: Option<MarkerType>,
    pub face_id: Option<String>,
    pub faceless: bool,
    pub valid_only: bool,
    pub subject_src: Option<Source>,
    pub subject_uid_ne: Option<String>,
    pub x_range: Option<(f32, f32)>,
    pub y_range: Option<(f32, f32)>,
}

impl MarkerFilter {
    /// Markers on `file_id` whose center lies within `tolerance` of (x, y).
    pub fn near(file_id: u64, x: f32, y: f32, tolerance: f32) -> Self {
        Self {
            file_id: Some(file_id),
            x_range: Some((x - tolerance, x + tolerance)),
            y_range: Some((y - tolerance, y + tolerance)),
            ..Self::default()
        }
    }

    /// Valid face markers that are not linked to any face yet.
    pub fn faceless() -> Self {
        Self {
            marker_type: Some(MarkerType::Face),
            faceless: true,
            valid_only: true,
            ..Self::default()
        }
    }

    /// Other markers sharing `face_id` whose subject was set automatically
    /// and differs from `subject_uid`.
    pub fn auto_siblings(face_id: &str, exclude_id: u64, subject_uid: &str) -> Self {
        Self {
            exclude_id: Some(exclude_id),
            face_id: Some(face_id.to_string()),
            subject_src: Some(Source::Auto),
            subject_uid_ne: Some(subject_uid.to_string()),
            ..Self::default()
        }
    }

    pub fn exclude(mut self, id: u64) -> Self {
        self.exclude_id = Some(id);
        self
    }

    pub fn matches(&self, m: &Marker) -> bool {
        let within = |range: Option<(f32, f32)>, v: f32| range.map_or(true, |(lo, hi)| v > lo && v < hi);

        self.file_id.map_or(true, |id| m.file_id == id)
            && self.exclude_id.map_or(true, |id| m.id != id)
            && self.marker_type.map_or(true, |t| m.marker_type == t)
            && self
                .face_id
                .as_deref()
                .map_or(true, |id| m.face_id.as_deref() == Some(id))
            && (!self.faceless || m.face_id.is_none())
            && (!self.valid_only || !m.invalid)
            && self.subject_src.map_or(true, |src| m.subject_src == src)
            && self
                .subject_uid_ne
                .as_deref()
                .map_or(true, |uid| m.subject_uid.as_deref() != Some(uid))
            && within(self.x_range, m.x)
            && within(self.y_range, m.y)
    }
}

/// Columns to overwrite in one atomic write.
///
/// `None` leaves a column untouched; for nullable columns `Some(None)`
/// clears it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerUpdate {
    pub marker_src: Option<Source>,
    pub name: Option<String>,
    pub subject_uid: Option<Option<String>>,
    pub subject_src: Option<Source>,
    pub face_id: Option<Option<String>>,
    pub face_dist: Option<f64>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub w: Option<f32>,
    pub h: Option<f32>,
    pub size: Option<i32>,
    pub score: Option<i32>,
    pub landmarks_json: Option<String>,
    pub embeddings_json: Option<String>,
    pub matched_at: Option<Option<DateTime<Utc>>>,
}

impl MarkerUpdate {
    pub fn matched(at: DateTime<Utc>) -> Self {
        Self {
            matched_at: Some(Some(at)),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, m: &mut Marker) {
        if let Some(src) = self.marker_src {
            m.marker_src = src;
        }
        if let Some(name) = &self.name {
            m.name = name.clone();
        }
        if let Some(uid) = &self.subject_uid {
            m.subject_uid = uid.clone();
            m.subject = None;
        }
        if let Some(src) = self.subject_src {
            m.subject_src = src;
        }
        if let Some(face_id) = &self.face_id {
            m.face_id = face_id.clone();
            m.face = None;
        }
        if let Some(dist) = self.face_dist {
            m.face_dist = dist;
        }
        if let Some(x) = self.x {
            m.x = x;
        }
        if let Some(y) = self.y {
            m.y = y;
        }
        if let Some(w) = self.w {
            m.w = w;
        }
        if let Some(h) = self.h {
            m.h = h;
        }
        if let Some(size) = self.size {
            m.size = size;
        }
        if let Some(score) = self.score {
            m.score = score;
        }
        if let Some(landmarks) = &self.landmarks_json {
            m.landmarks_json = landmarks.clone();
        }
        if let Some(payload) = &self.embeddings_json {
            m.set_embeddings_json(payload.clone());
        }
        if let Some(at) = self.matched_at {
            m.matched_at = at;
        }
        m.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: u64, x: f32, y: f32) -> Marker {
        let mut m = Marker::new(1, None, Source::Image, MarkerType::Face, x, y, 0.1, 0.1);
        m.id = id;
        m
    }

    #[test]
    fn test_near_uses_exclusive_window() {
        let filter = MarkerFilter::near(1, 0.5, 0.5, 0.07);
        assert!(filter.matches(&marker(1, 0.55, 0.45)));
        assert!(!filter.matches(&marker(1, 0.58, 0.5)));
        assert!(!filter.matches(&marker(1, 0.5, 0.42)));

        let mut other_file = marker(2, 0.5, 0.5);
        other_file.file_id = 2;
        assert!(!filter.matches(&other_file));
    }

    #[test]
    fn test_faceless_excludes_invalid_and_linked() {
        let filter = MarkerFilter::faceless();
        let mut m = marker(1, 0.5, 0.5);
        assert!(filter.matches(&m));

        m.invalid = true;
        assert!(!filter.matches(&m));

        m.invalid = false;
        m.face_id = Some("F".into());
        assert!(!filter.matches(&m));

        m.face_id = None;
        m.marker_type = MarkerType::Label;
        assert!(!filter.matches(&m));
    }

    #[test]
    fn test_auto_siblings() {
        let filter = MarkerFilter::auto_siblings("F", 1, "jsA");
        let mut m = marker(2, 0.5, 0.5);
        m.face_id = Some("F".into());
        m.subject_src = Source::Auto;
        m.subject_uid = Some("jsB".into());
        assert!(filter.matches(&m));

        m.subject_uid = None;
        assert!(filter.matches(&m));

        m.subject_uid = Some("jsA".into());
        assert!(!filter.matches(&m));

        m.subject_uid = Some("jsB".into());
        m.subject_src = Source::Manual;
        assert!(!filter.matches(&m));

        m.subject_src = Source::Auto;
        m.id = 1;
        assert!(!filter.matches(&m));
    }

    #[test]
    fn test_update_touches_only_set_columns() {
        let mut m = marker(1, 0.5, 0.5);
        m.name = "Ada".into();
        m.face_id = Some("F".into());
        m.face_dist = 0.3;

        MarkerUpdate {
            face_id: Some(None),
            face_dist: Some(-1.0),
            ..MarkerUpdate::default()
        }
        .apply(&mut m);

        assert!(m.face_id.is_none());
        assert_eq!(m.face_dist, -1.0);
        assert_eq!(m.name, "Ada");
        assert_eq!(m.x, 0.5);
    }

    #[test]
    fn test_update_resets_embeddings_cache() {
        let mut m = marker(1, 0.5, 0.5);
        m.set_embeddings_json("[[1.0]]".into());
        assert_eq!(m.embeddings().len(), 1);

        MarkerUpdate {
            embeddings_json: Some("[[1.0],[2.0]]".into()),
            ..MarkerUpdate::default()
        }
        .apply(&mut m);

        assert_eq!(m.embeddings().len(), 2);
    }

    #[test]
    fn test_empty_update() {
        assert!(MarkerUpdate::default().is_empty());
        assert!(!MarkerUpdate::matched(Utc::now()).is_empty());
    }
}
