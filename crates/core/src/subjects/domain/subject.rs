use serde::{Deserialize, Serialize};

use crate::shared::source::Source;
use crate::shared::text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    #[default]
    Person,
    Pet,
    Other,
}

/// A named identity, independent of any single detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub uid: String,
    pub name: String,
    pub kind: SubjectKind,
    pub src: Source,
}

impl Subject {
    /// Builds a subject with a fresh uid. Returns `None` for blank names.
    pub fn new(name: &str, kind: SubjectKind, src: Source) -> Option<Self> {
        let name = text::normalize_marker_name(name);
        if name.is_empty() {
            return None;
        }
        Some(Self {
            uid: new_uid(),
            name,
            kind,
            src,
        })
    }

    /// Case-insensitive lookup key derived from the display name.
    pub fn slug(&self) -> String {
        text::slug(&self.name)
    }
}

fn new_uid() -> String {
    format!("js{}", &uuid::Uuid::new_v4().simple().to_string()[..14])
}
