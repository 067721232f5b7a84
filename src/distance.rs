//! String distance functions used to compare query tokens with stored
//! keyword terms.
//!
//! A distance function reports which way its numbers point through
//! [`DistanceSemantic`]. The relevance threshold is applied to the raw value
//! either way, so an edit distance and a similarity mean very different
//! things under the same threshold.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How to read the values produced by a [`Distance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceSemantic {
    /// Higher is more similar; identical strings score highest.
    Similarity,
    /// Number of edits; identical strings score 0.
    EditDistance,
}

/// Symmetric comparison of two tokens.
pub trait Distance: Send + Sync {
    fn distance(&self, a: &str, b: &str) -> f64;

    fn semantic(&self) -> DistanceSemantic;

    /// Name for logging.
    fn name(&self) -> &'static str;
}

/// Distance function selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceKind {
    #[default]
    JaroWinkler,
    Dice,
    Levenshtein,
}

impl DistanceKind {
    pub fn build(self) -> Arc<dyn Distance> {
        match self {
            Self::JaroWinkler => Arc::new(JaroWinkler),
            Self::Dice => Arc::new(DiceCoefficient),
            Self::Levenshtein => Arc::new(Levenshtein),
        }
    }
}

/// Jaro-Winkler similarity in `[0, 1]`, with the standard prefix scale of
/// 0.1 over at most 4 leading characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

const WINKLER_PREFIX_SCALE: f64 = 0.1;
const WINKLER_MAX_PREFIX: usize = 4;

impl Distance for JaroWinkler {
    fn distance(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let jaro = jaro(&a, &b);

        let prefix = a
            .iter()
            .zip(&b)
            .take(WINKLER_MAX_PREFIX)
            .take_while(|(x, y)| x == y)
            .count();

        jaro + prefix as f64 * WINKLER_PREFIX_SCALE * (1.0 - jaro)
    }

    fn semantic(&self) -> DistanceSemantic {
        DistanceSemantic::Similarity
    }

    fn name(&self) -> &'static str {
        "jaro-winkler"
    }
}

fn jaro(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, ca) in a.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(b.len());
        for j in start..end {
            if !b_matched[j] && b[j] == *ca {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let a_seq = a.iter().zip(&a_matched).filter(|(_, m)| **m);
    let b_seq = b.iter().zip(&b_matched).filter(|(_, m)| **m);
    let half_transpositions =
        a_seq.zip(b_seq).filter(|((x, _), (y, _))| x != y).count();

    let m = matches as f64;
    let t = half_transpositions as f64 / 2.0;
    (m / a.len() as f64 + m / b.len() as f64 + (m - t) / m) / 3.0
}

/// Sørensen-Dice coefficient over character bigrams, in `[0, 1]`.
///
/// Tokens shorter than two characters have no bigrams; they score 1 when
/// equal and 0 otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiceCoefficient;

impl Distance for DiceCoefficient {
    fn distance(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let a = bigrams(a);
        let mut b = bigrams(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let total = (a.len() + b.len()) as f64;
        let mut shared = 0usize;
        for pair in &a {
            if let Some(pos) = b.iter().position(|p| p == pair) {
                b.swap_remove(pos);
                shared += 1;
            }
        }
        2.0 * shared as f64 / total
    }

    fn semantic(&self) -> DistanceSemantic {
        DistanceSemantic::Similarity
    }

    fn name(&self) -> &'static str {
        "dice"
    }
}

fn bigrams(s: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Levenshtein edit distance (insertions, deletions, substitutions).
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl Distance for Levenshtein {
    fn distance(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        if a.is_empty() || b.is_empty() {
            return a.len().max(b.len()) as f64;
        }

        let mut prev: Vec<usize> = (0..=b.len()).collect();
        let mut curr = vec![0usize; b.len() + 1];
        for (i, ca) in a.iter().enumerate() {
            curr[0] = i + 1;
            for (j, cb) in b.iter().enumerate() {
                let substitution = prev[j] + usize::from(ca != cb);
                curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
            }
            std::mem::swap(&mut prev, &mut curr);
        }
        prev[b.len()] as f64
    }

    fn semantic(&self) -> DistanceSemantic {
        DistanceSemantic::EditDistance
    }

    fn name(&self) -> &'static str {
        "levenshtein"
    }
}
