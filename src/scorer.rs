use std::sync::Arc;

use crate::{distance::Distance, keyword::KeywordList};

/// Pairs at or below this distance contribute nothing to a score.
pub const RELEVANCE_THRESHOLD: f64 = 0.5;

/// Computes a record's relevance to a set of query tokens.
#[derive(Clone)]
pub struct RelevanceScorer {
    distance: Arc<dyn Distance>,
}

impl RelevanceScorer {
    pub fn new(distance: Arc<dyn Distance>) -> Self {
        Self { distance }
    }

    pub fn distance(&self) -> &dyn Distance {
        self.distance.as_ref()
    }

    /// Sum of `distance * weight` over every (token, keyword) pair whose
    /// distance is strictly above [`RELEVANCE_THRESHOLD`].
    ///
    /// One token may match, and accumulate from, several keywords.
    pub fn score<S: AsRef<str>>(
        &self,
        tokens: &[S],
        keywords: &KeywordList,
    ) -> f64 {
        let mut total = 0.0;
        for token in tokens {
            for keyword in keywords {
                let d = self.distance.distance(token.as_ref(), &keyword.term);
                if d > RELEVANCE_THRESHOLD {
                    total += d * keyword.weight;
                }
            }
        }
        total
    }
}
