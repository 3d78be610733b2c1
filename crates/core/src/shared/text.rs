//! Normalization of user-supplied names.

use crate::shared::constants::NAME_MAX_LEN;

/// Trims, clips to `max_len` characters and title-cases each word.
pub fn normalize_name(name: &str, max_len: usize) -> String {
    let clipped: String = name.trim().chars().take(max_len).collect();
    title(clipped.trim())
}

pub fn normalize_marker_name(name: &str) -> String {
    normalize_name(name, NAME_MAX_LEN)
}

/// Upper-cases the first letter of every whitespace separated word.
pub fn title(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case, dash separated key for case-insensitive name lookups.
pub fn slug(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}
