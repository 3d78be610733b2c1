use serde::{Deserialize, Serialize};

use crate::shared::source::Source;

/// Manual edit submitted for one marker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerForm {
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub subject_src: Source,
    #[serde(default)]
    pub name: String,
}
