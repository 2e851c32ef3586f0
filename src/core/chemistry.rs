use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Multiset of species labels (label -> count).
///
/// Swaps only permute labels, so two occupations of the same system must always
/// report equal compositions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    counts: BTreeMap<String, usize>,
}

impl Composition {
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut counts = BTreeMap::new();
        for label in labels {
            *counts.entry(label.as_ref().to_string()).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Number of distinct labels.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Number of atoms.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Reduced formula string, e.g. `Ga27Sb19`.
    pub fn formula(&self) -> String {
        self.counts
            .iter()
            .map(|(label, &n)| {
                if n == 1 {
                    label.clone()
                } else {
                    format!("{label}{n}")
                }
            })
            .collect()
    }
}
