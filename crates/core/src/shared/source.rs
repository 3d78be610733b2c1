//! Provenance tags attached to marker geometry and identity links.
//!
//! Priority is looked up in an explicit table rather than derived from
//! declaration order, so reordering the enum never changes arbitration.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Default,
    Auto,
    Image,
    Manual,
}

/// Total order used for arbitration, lowest confidence first.
pub const SOURCE_PRIORITY: [(Source, u8); 4] = [
    (Source::Default, 0),
    (Source::Auto, 1),
    (Source::Image, 2),
    (Source::Manual, 3),
];

impl Source {
    pub const ALL: &[Source] = &[Source::Default, Source::Auto, Source::Image, Source::Manual];

    pub fn priority(self) -> u8 {
        SOURCE_PRIORITY
            .iter()
            .find(|(src, _)| *src == self)
            .map(|(_, p)| *p)
            .unwrap_or(0)
    }

    /// True if `self` is strictly more trusted than `other`.
    pub fn outranks(self, other: Source) -> bool {
        self.priority() > other.priority()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Default => "",
            Source::Auto => "auto",
            Source::Image => "image",
            Source::Manual => "manual",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Default => write!(f, "default"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
