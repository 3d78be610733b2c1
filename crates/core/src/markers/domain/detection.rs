use serde::{Deserialize, Serialize};

use crate::shared::constants::UNKNOWN_SIZE;
use crate::shared::embedding::Embeddings;

/// One region reported by a face detector, treated as opaque input.
///
/// Coordinates are the normalized center and size of the region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(default)]
    pub embeddings: Embeddings,
    #[serde(default)]
    pub landmarks: serde_json::Value,
    #[serde(default = "unknown_size")]
    pub size: i32,
    #[serde(default)]
    pub score: i32,
}

fn unknown_size() -> i32 {
    UNKNOWN_SIZE
}

impl Detection {
    /// Landmarks serialized for storage; empty when the detector sent none.
    pub fn landmarks_json(&self) -> String {
        if self.landmarks.is_null() {
            return String::new();
        }
        self.landmarks.to_string()
    }
}

/// All detections found in one file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileDetections {
    pub file_id: u64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}
