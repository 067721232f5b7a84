use std::{cmp::Ordering, collections::HashMap};

use tracing::debug;

use crate::{
    error::{Error, Result},
    record::{Record, RecordId},
    scorer::RelevanceScorer,
    store::{
        Condition,
        Filter,
        FindOptions,
        Populate,
        Projection,
        RecordStore,
        SortKey,
    },
    tokenizer::{Tokenizer, unique_tokens},
};

/// A parsed free-text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    /// Stems of `text`, deduplicated, in first-occurrence order.
    pub tokens: Vec<String>,
}

impl Query {
    pub fn parse(text: &str, tokenizer: &dyn Tokenizer) -> Self {
        Self {
            text: text.to_string(),
            tokens: unique_tokens(tokenizer.tokenize_and_stem(text)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Optional search parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    /// Extra conditions applied in both lookup phases.
    pub conditions: Vec<Condition>,
    /// Store ordering to use instead of relevance.
    pub sort: Option<Vec<SortKey>>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub populate: Vec<Populate>,
}

impl SearchOptions {
    pub fn page(skip: usize, limit: usize) -> Self {
        Self {
            skip: Some(skip),
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    fn store_sort(&self) -> Vec<SortKey> {
        self.sort.clone().unwrap_or_default()
    }
}

/// The requested page of ranked records and the number of candidates.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub results: Vec<Record>,
    pub total_count: usize,
}

/// Run a two-phase search.
///
/// 1. Candidates: records sharing at least one keyword with the query,
///    fetched with identity and keywords only
/// 2. Score every candidate and rank by descending relevance (unless a
///    sort was given, in which case the store's order is kept)
/// 3. Cut the requested page out of the ranked ids
/// 4. Fetch the full records of that page and re-attach the scores
pub fn execute_search(
    store: &dyn RecordStore,
    scorer: &RelevanceScorer,
    query: &Query,
    projection: &Projection,
    options: &SearchOptions,
) -> Result<SearchResults> {
    debug!(query = %query.text, tokens = ?query.tokens, "searching");

    // Phase 1: candidates
    let filter = Filter::keywords_any(query.tokens.clone())
        .with_conditions(&options.conditions);
    let candidate_options = FindOptions {
        sort: options.store_sort(),
        ..FindOptions::default()
    };
    let mut candidates = store
        .find(&filter, &Projection::keywords_only(), &candidate_options)
        .map_err(|e| Error::lookup("candidates", e))?;
    let total_count = candidates.len();
    debug!(candidates = total_count, "phase 1 complete");

    if candidates.is_empty() {
        return Ok(SearchResults::default());
    }

    for candidate in &mut candidates {
        let score = scorer.score(&query.tokens, candidate.keywords());
        candidate.set_relevance(score);
    }
    if options.sort.is_none() {
        rank_by_relevance(&mut candidates);
    }

    let skip = options.skip.unwrap_or(0);
    let limit = options.limit.unwrap_or(usize::MAX);
    let window: Vec<&Record> =
        candidates.iter().skip(skip).take(limit).collect();
    if window.is_empty() {
        debug!(skip, limit = ?options.limit, "page is past the candidates");
        return Ok(SearchResults {
            results: Vec::new(),
            total_count,
        });
    }

    let scores: HashMap<RecordId, f64> = window
        .iter()
        .map(|r| (r.id(), r.relevance().unwrap_or(0.0)))
        .collect();
    let ids: Vec<RecordId> = window.iter().map(|r| r.id()).collect();

    // Phase 2: full records for the page
    let filter = Filter::ids(ids).with_conditions(&options.conditions);
    let fetch_options = FindOptions {
        sort: options.store_sort(),
        populate: options.populate.clone(),
        ..FindOptions::default()
    };
    let fetched = store
        .find(&filter, projection, &fetch_options)
        .map_err(|e| Error::lookup("fetch", e))?;

    let mut results: Vec<Record> = fetched
        .into_iter()
        .filter_map(|mut record| {
            let score = *scores.get(&record.id())?;
            record.set_relevance(score);
            Some(record)
        })
        .collect();
    if options.sort.is_none() {
        rank_by_relevance(&mut results);
    }
    debug!(results = results.len(), total_count, "phase 2 complete");

    Ok(SearchResults {
        results,
        total_count,
    })
}

/// Stable sort by descending relevance.
fn rank_by_relevance(records: &mut [Record]) {
    records.sort_by(|a, b| {
        let a = a.relevance().unwrap_or(0.0);
        let b = b.relevance().unwrap_or(0.0);
        b.partial_cmp(&a).unwrap_or(Ordering::Equal)
    });
}
