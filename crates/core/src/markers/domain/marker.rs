//! A single detected region in one file and its identity links.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::faces::domain::face::Face;
use crate::markers::domain::detection::Detection;
use crate::shared::constants::{UNKNOWN_DIST, UNKNOWN_SIZE};
use crate::shared::embedding::Embeddings;
use crate::shared::error::ResolveError;
use crate::shared::source::Source;
use crate::subjects::domain::subject::Subject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerType {
    #[default]
    Unknown,
    Face,
    Label,
}

impl fmt::Display for MarkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerType::Unknown => write!(f, "unknown"),
            MarkerType::Face => write!(f, "face"),
            MarkerType::Label => write!(f, "label"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Marker {
    #[serde(default)]
    pub id: u64,
    pub file_id: u64,
    #[serde(default)]
    pub marker_type: MarkerType,
    #[serde(default)]
    pub marker_src: Source,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject_uid: Option<String>,
    #[serde(default)]
    pub subject_src: Source,
    #[serde(default)]
    pub face_id: Option<String>,
    #[serde(default = "unknown_dist")]
    pub face_dist: f64,
    #[serde(default)]
    embeddings_json: String,
    #[serde(skip)]
    embeddings: OnceLock<Embeddings>,
    #[serde(default)]
    pub landmarks_json: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub w: f32,
    #[serde(default)]
    pub h: f32,
    #[serde(default = "unknown_size")]
    pub size: i32,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub matched_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) subject: Option<Subject>,
    #[serde(skip)]
    pub(crate) face: Option<Face>,
}

fn unknown_dist() -> f64 {
    UNKNOWN_DIST
}

fn unknown_size() -> i32 {
    UNKNOWN_SIZE
}

impl Marker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_id: u64,
        subject_uid: Option<String>,
        marker_src: Source,
        marker_type: MarkerType,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            file_id,
            marker_type,
            marker_src,
            name: String::new(),
            subject_uid,
            subject_src: Source::Default,
            face_id: None,
            face_dist: UNKNOWN_DIST,
            embeddings_json: String::new(),
            embeddings: OnceLock::new(),
            landmarks_json: String::new(),
            x,
            y,
            w,
            h,
            size: UNKNOWN_SIZE,
            score: 0,
            invalid: false,
            matched_at: None,
            created_at: now,
            updated_at: now,
            subject: None,
            face: None,
        }
    }

    /// Placeholder for markers of unknown type and origin.
    pub fn unknown() -> Self {
        Self::new(0, None, Source::Default, MarkerType::Unknown, 0.0, 0.0, 0.0, 0.0)
    }

    /// Builds an unsaved face marker from detector output.
    pub fn from_detection(detection: &Detection, file_id: u64, subject_uid: Option<String>) -> Self {
        let mut m = Self::new(
            file_id,
            subject_uid,
            Source::Image,
            MarkerType::Face,
            detection.x,
            detection.y,
            detection.w,
            detection.h,
        );
        m.set_embeddings(&detection.embeddings);
        m.landmarks_json = detection.landmarks_json();
        m.size = detection.size;
        m.score = detection.score;
        m
    }

    pub fn is_face(&self) -> bool {
        self.marker_type == MarkerType::Face
    }

    /// Parsed embeddings, decoded from the payload on first access.
    ///
    /// A malformed payload is logged and treated as empty.
    pub fn embeddings(&self) -> &Embeddings {
        self.embeddings.get_or_init(|| {
            Embeddings::from_json(self.embeddings_json.as_bytes()).unwrap_or_else(|e| {
                log::error!("marker {}: failed parsing embeddings json: {e}", self.id);
                Embeddings::default()
            })
        })
    }

    pub fn embeddings_json(&self) -> &str {
        &self.embeddings_json
    }

    /// Replaces the serialized payload and drops any parsed copy.
    pub fn set_embeddings_json(&mut self, payload: String) {
        self.embeddings_json = payload;
        self.embeddings = OnceLock::new();
    }

    pub fn set_embeddings(&mut self, embeddings: &Embeddings) {
        let payload = String::from_utf8(embeddings.to_json()).unwrap_or_default();
        self.set_embeddings_json(payload);
    }

    /// Rejects centers outside [-1, 1] or exactly on an axis.
    pub fn validate_geometry(&self) -> Result<(), ResolveError> {
        let valid_axis = |v: f32| v.is_finite() && v != 0.0 && (-1.0..=1.0).contains(&v);
        if valid_axis(self.x) && valid_axis(self.y) {
            Ok(())
        } else {
            Err(ResolveError::InvalidGeometry {
                x: self.x,
                y: self.y,
            })
        }
    }

    /// Tests if the marker already has the best matching face.
    pub fn has_face(&self, face: Option<&Face>, dist: f64) -> bool {
        let Some(face_id) = self.face_id.as_deref() else {
            return false;
        };
        match face {
            None => true,
            Some(f) if f.id == face_id => true,
            Some(_) if self.face_dist < 0.0 => false,
            Some(_) if dist < 0.0 => true,
            Some(_) => self.face_dist <= dist,
        }
    }

    /// Smallest distance between the marker embeddings and the face,
    /// or [`UNKNOWN_DIST`] if no embedding has a matching dimension.
    pub fn distance_to(&self, face: &Face) -> f64 {
        face.distance(self.embeddings()).unwrap_or(UNKNOWN_DIST)
    }

    pub fn cached_subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn cached_face(&self) -> Option<&Face> {
        self.face.as_ref()
    }

    /// Copy without cached face and subject snapshots, as stored.
    pub(crate) fn detached(&self) -> Marker {
        let mut m = self.clone();
        m.subject = None;
        m.face = None;
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn face_marker(x: f32, y: f32) -> Marker {
        Marker::new(1, None, Source::Image, MarkerType::Face, x, y, 0.1, 0.1)
    }

    fn face(v: Vec<f64>) -> Face {
        Face::new(None, Source::Manual, &Embeddings::from(vec![v])).unwrap()
    }

    #[test]
    fn test_new_uses_unknown_sentinels() {
        let m = face_marker(0.5, 0.5);
        assert_eq!(m.face_dist, UNKNOWN_DIST);
        assert_eq!(m.size, UNKNOWN_SIZE);
        assert!(m.matched_at.is_none());
        assert!(m.face_id.is_none());
    }

    #[test]
    fn test_unknown_marker() {
        let m = Marker::unknown();
        assert_eq!(m.marker_type, MarkerType::Unknown);
        assert_eq!(m.marker_src, Source::Default);
        assert!(m.validate_geometry().is_err());
    }

    #[rstest]
    #[case(0.5, 0.5, true)]
    #[case(-1.0, 1.0, true)]
    #[case(0.0, 0.5, false)]
    #[case(0.5, 0.0, false)]
    #[case(1.01, 0.5, false)]
    #[case(0.5, -1.01, false)]
    #[case(f32::NAN, 0.5, false)]
    fn test_validate_geometry(#[case] x: f32, #[case] y: f32, #[case] ok: bool) {
        assert_eq!(face_marker(x, y).validate_geometry().is_ok(), ok);
    }

    #[test]
    fn test_from_detection() {
        let d: Detection = serde_json::from_str(
            r#"{"x":0.2,"y":0.3,"w":0.1,"h":0.1,"embeddings":[[0.1,0.2]],"size":120,"score":42}"#,
        )
        .unwrap();
        let m = Marker::from_detection(&d, 7, None);
        assert_eq!(m.file_id, 7);
        assert_eq!(m.marker_type, MarkerType::Face);
        assert_eq!(m.marker_src, Source::Image);
        assert_eq!(m.size, 120);
        assert_eq!(m.score, 42);
        assert_eq!(m.embeddings().len(), 1);
        assert_eq!(m.face_dist, UNKNOWN_DIST);
    }

    #[test]
    fn test_embeddings_are_memoized_until_payload_changes() {
        let mut m = face_marker(0.5, 0.5);
        m.set_embeddings_json("[[1.0,2.0]]".into());
        assert_eq!(m.embeddings().len(), 1);
        assert_eq!(m.embeddings().len(), 1);

        m.set_embeddings_json("[[1.0,2.0],[3.0,4.0]]".into());
        assert_eq!(m.embeddings().len(), 2);
    }

    #[test]
    fn test_malformed_embeddings_are_empty() {
        let mut m = face_marker(0.5, 0.5);
        m.set_embeddings_json("[[1.0,".into());
        assert!(m.embeddings().is_empty());
    }

    #[test]
    fn test_has_face() {
        let f = face(vec![0.1, 0.2]);
        let other = face(vec![0.9, 0.9]);
        let mut m = face_marker(0.5, 0.5);
        assert!(!m.has_face(Some(&f), 0.3));

        m.face_id = Some(f.id.clone());
        assert!(m.has_face(None, 0.3));
        assert!(m.has_face(Some(&f), 0.3));
        assert!(!m.has_face(Some(&other), 0.3));

        m.face_dist = 0.2;
        assert!(m.has_face(Some(&other), 0.3));
        assert!(!m.has_face(Some(&other), 0.1));
        assert!(m.has_face(Some(&other), UNKNOWN_DIST));
    }

    #[test]
    fn test_distance_to_skips_mismatched_dimensions() {
        let f = face(vec![0.0, 0.0]);
        let mut m = face_marker(0.5, 0.5);
        m.set_embeddings(&Embeddings::from(vec![vec![1.0, 1.0, 1.0], vec![0.3, 0.4]]));
        assert_relative_eq!(m.distance_to(&f), 0.5);

        m.set_embeddings(&Embeddings::from(vec![vec![1.0, 1.0, 1.0]]));
        assert_eq!(m.distance_to(&f), UNKNOWN_DIST);
    }

    #[test]
    fn test_serde_skips_caches() {
        let mut m = face_marker(0.5, 0.5);
        m.set_embeddings(&Embeddings::from(vec![vec![0.5, 0.5]]));
        let json = serde_json::to_string(&m).unwrap();
        let back: Marker = serde_json::from_str(&json).unwrap();
        assert_eq!(back.embeddings_json(), m.embeddings_json());
        assert_eq!(back.embeddings().len(), 1);
        assert!(back.cached_face().is_none());
    }
}
