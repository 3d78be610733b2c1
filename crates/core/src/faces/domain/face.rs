//! Persistent face cluster anchor shared by many markers.
//!
//! A face is identified by a hash of its reference embedding, so creating
//! the same cluster twice yields the same id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::constants::MIN_COLLISION_DIST;
use crate::shared::embedding::{Embedding, Embeddings};
use crate::shared::source::Source;

const FACE_ID_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub id: String,
    pub face_src: Source,
    pub subject_uid: Option<String>,
    embedding: Embedding,
    pub samples: usize,
    /// Largest distance of a seed sample from the reference embedding.
    pub sample_radius: f64,
    pub collisions: u32,
    /// Distance of the closest embedding reported as a different identity.
    /// Zero while no collision has been recorded.
    pub collision_radius: f64,
    pub matched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Face {
    /// Builds a face whose reference embedding is the mean of `embeddings`.
    ///
    /// Returns `None` when there is nothing to average.
    pub fn new(subject_uid: Option<String>, src: Source, embeddings: &Embeddings) -> Option<Self> {
        let embedding = embeddings.mean()?;
        if embedding.is_empty() {
            return None;
        }
        let sample_radius = embeddings
            .iter()
            .filter_map(|e| e.distance(&embedding))
            .fold(0.0, f64::max);
        let now = Utc::now();
        Some(Self {
            id: face_id(&embedding),
            face_src: src,
            subject_uid,
            samples: embeddings.len(),
            sample_radius,
            embedding,
            collisions: 0,
            collision_radius: 0.0,
            matched_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reference embedding used for distance lookups.
    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    /// Smallest distance between any of `embeddings` and the reference.
    pub fn distance(&self, embeddings: &Embeddings) -> Option<f64> {
        embeddings.min_distance(&self.embedding)
    }

    /// Distance if `embeddings` fall within `match_dist` and inside the
    /// collision radius, otherwise `None`.
    pub fn match_distance(&self, embeddings: &Embeddings, match_dist: f64) -> Option<f64> {
        let dist = self.distance(embeddings)?;
        if dist > match_dist {
            return None;
        }
        if self.collision_radius > 0.0 && dist >= self.collision_radius {
            return None;
        }
        Some(dist)
    }

    /// Records that `embeddings` belong to a different identity.
    ///
    /// Returns true if the collision log changed: the first collision, or
    /// one closer than any seen so far. Near-identical samples and
    /// embeddings without a comparable dimension are ignored.
    pub fn record_collision(&mut self, embeddings: &Embeddings) -> bool {
        let Some(dist) = self.distance(embeddings) else {
            return false;
        };
        if dist < MIN_COLLISION_DIST {
            return false;
        }
        if self.collision_radius > 0.0 && dist >= self.collision_radius {
            return false;
        }
        self.collisions += 1;
        self.collision_radius = dist;
        self.matched_at = None;
        self.updated_at = Utc::now();
        true
    }
}

fn face_id(embedding: &Embedding) -> String {
    let hash = blake3::hash(&embedding.to_le_bytes());
    hash.to_hex()[..FACE_ID_LEN].to_uppercase()
}
