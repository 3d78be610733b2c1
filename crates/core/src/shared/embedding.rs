//! Embedding vectors and the Euclidean distance used to compare them.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f64>);

impl Embedding {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance, or `None` when the dimensions differ.
    pub fn distance(&self, other: &Embedding) -> Option<f64> {
        if self.len() != other.len() {
            return None;
        }
        Some(euclidean_distance(&self.0, &other.0))
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}

impl From<Vec<f64>> for Embedding {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// A set of embeddings taken from one detection or one cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embeddings(Vec<Embedding>);

impl Embeddings {
    pub fn new(items: Vec<Embedding>) -> Self {
        Self(items)
    }

    /// Parses a serialized payload. Empty input yields an empty set.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        if payload.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(payload)
    }

    pub fn to_json(&self) -> Vec<u8> {
        if self.0.is_empty() {
            return Vec::new();
        }
        serde_json::to_vec(&self.0).unwrap_or_default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Embedding> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Smallest distance from any member to `reference`.
    ///
    /// Members whose dimension differs from the reference are skipped.
    pub fn min_distance(&self, reference: &Embedding) -> Option<f64> {
        self.0
            .iter()
            .filter_map(|e| e.distance(reference))
            .fold(None, |best, d| match best {
                Some(b) if b <= d => Some(b),
                _ => Some(d),
            })
    }

    /// Element-wise mean of all members sharing the first member's dimension.
    pub fn mean(&self) -> Option<Embedding> {
        let dim = self.0.first()?.len();
        let members: Vec<&Embedding> = self.0.iter().filter(|e| e.len() == dim).collect();
        let mut sum = ndarray::Array1::<f64>::zeros(dim);
        for e in &members {
            sum += &ArrayView1::from(e.as_slice());
        }
        sum /= members.len() as f64;
        Some(Embedding(sum.to_vec()))
    }
}

impl From<Vec<Vec<f64>>> for Embeddings {
    fn from(items: Vec<Vec<f64>>) -> Self {
        Self(items.into_iter().map(Embedding).collect())
    }
}

impl<'a> IntoIterator for &'a Embeddings {
    type Item = &'a Embedding;
    type IntoIter = std::slice::Iter<'a, Embedding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Euclidean distance between two equally sized vectors.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    let diff = &ArrayView1::from(a) - &ArrayView1::from(b);
    diff.dot(&diff).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance_3_4_5() {
        assert_relative_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
    }

    #[test]
    fn test_distance_identical_is_zero() {
        let e = Embedding::new(vec![0.1, 0.2, 0.3]);
        assert_relative_eq!(e.distance(&e).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_dimension_mismatch_is_none() {
        let a = Embedding::new(vec![1.0, 2.0]);
        let b = Embedding::new(vec![1.0, 2.0, 3.0]);
        assert!(a.distance(&b).is_none());
    }

    #[test]
    fn test_min_distance_skips_mismatched_dimensions() {
        let reference = Embedding::new(vec![0.0, 0.0]);
        let set = Embeddings::from(vec![vec![9.0, 9.0, 9.0], vec![3.0, 4.0], vec![6.0, 8.0]]);
        assert_relative_eq!(set.min_distance(&reference).unwrap(), 5.0);
    }

    #[test]
    fn test_min_distance_none_when_nothing_comparable() {
        let reference = Embedding::new(vec![0.0, 0.0]);
        let set = Embeddings::from(vec![vec![1.0], vec![1.0, 2.0, 3.0]]);
        assert!(set.min_distance(&reference).is_none());
        assert!(Embeddings::default().min_distance(&reference).is_none());
    }

    #[test]
    fn test_mean_of_members() {
        let set = Embeddings::from(vec![vec![0.0, 2.0], vec![2.0, 4.0]]);
        assert_eq!(set.mean().unwrap(), Embedding::new(vec![1.0, 3.0]));
    }

    #[test]
    fn test_mean_ignores_other_dimensions() {
        let set = Embeddings::from(vec![vec![1.0, 1.0], vec![5.0], vec![3.0, 3.0]]);
        assert_eq!(set.mean().unwrap(), Embedding::new(vec![2.0, 2.0]));
    }

    #[test]
    fn test_mean_of_empty_is_none() {
        assert!(Embeddings::default().mean().is_none());
    }

    #[test]
    fn test_json_payload_parses_nested_arrays() {
        let set = Embeddings::from_json(b"[[0.5,0.25],[1.0,0.0]]").unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().unwrap().as_slice(), &[0.5, 0.25]);
    }

    #[test]
    fn test_json_empty_payload_is_empty_set() {
        assert!(Embeddings::from_json(b"").unwrap().is_empty());
        assert!(Embeddings::default().to_json().is_empty());
    }

    #[test]
    fn test_json_malformed_payload_is_error() {
        assert!(Embeddings::from_json(b"{not json").is_err());
    }
}
