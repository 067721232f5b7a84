use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    config::{FieldSpec, IndexConfig},
    distance::{Distance, DistanceSemantic},
    error::Result,
    extractor::KeywordExtractor,
    keyword::{KeywordBinding, KeywordList},
    record::Record,
    reindex::{self, ReindexReport},
    scorer::RelevanceScorer,
    search::{self, Query, SearchOptions, SearchResults},
    store::{PreCommitHook, Projection, RecordStore},
    tokenizer::{StemmingTokenizer, Tokenizer},
};

/// Keyword indexing and relevance search for one kind of record.
///
/// The indexer holds no record state of its own and can be shared across
/// threads. Register it as a [`PreCommitHook`] on a store to keep keywords
/// current on every save.
#[derive(Clone)]
pub struct Indexer {
    config: IndexConfig,
    binding: KeywordBinding,
    tokenizer: Arc<dyn Tokenizer>,
    extractor: KeywordExtractor,
    scorer: RelevanceScorer,
}

impl Indexer {
    /// Build an indexer from a validated configuration.
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let tokenizer: Arc<dyn Tokenizer> =
            Arc::new(StemmingTokenizer::new(config.stemmer));
        let distance = config.distance.build();
        Ok(Self::assemble(config, tokenizer, distance))
    }

    /// Build an indexer around a custom tokenizer or distance function.
    pub fn with_components(
        fields: Vec<FieldSpec>,
        tokenizer: Arc<dyn Tokenizer>,
        distance: Arc<dyn Distance>,
        binding: KeywordBinding,
    ) -> Result<Self> {
        let mut config = IndexConfig::new(fields);
        config.keywords_field = binding.keywords_field().to_string();
        config.relevance_field = binding.relevance_field().to_string();
        config.validate()?;
        Ok(Self::assemble(config, tokenizer, distance))
    }

    fn assemble(
        config: IndexConfig,
        tokenizer: Arc<dyn Tokenizer>,
        distance: Arc<dyn Distance>,
    ) -> Self {
        if distance.semantic() == DistanceSemantic::EditDistance {
            warn!(
                distance = distance.name(),
                "edit distance configured: exact matches score zero and \
                 every differing pair scores above the threshold"
            );
        }
        Self {
            binding: config.binding(),
            extractor: KeywordExtractor::new(
                tokenizer.clone(),
                config.fields.clone(),
            ),
            scorer: RelevanceScorer::new(distance),
            tokenizer,
            config,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn binding(&self) -> &KeywordBinding {
        &self.binding
    }

    pub fn fields(&self) -> &[FieldSpec] {
        self.extractor.fields()
    }

    /// Keywords for `record`'s configured fields. Does not modify it.
    pub fn extract_keywords(&self, record: &Record) -> KeywordList {
        self.extractor.extract(record)
    }

    /// Recompute and replace the record's keywords in memory.
    pub fn update_keywords(&self, record: &mut Record) {
        let keywords = self.extractor.extract(record);
        debug!(id = %record.id(), keywords = keywords.len(), "keywords updated");
        record.set_keywords(keywords);
    }

    pub fn parse_query(&self, text: &str) -> Query {
        Query::parse(text, self.tokenizer.as_ref())
    }

    /// Rank the records of `store` against `query`.
    pub fn search(
        &self,
        store: &dyn RecordStore,
        query: &str,
        projection: &Projection,
        options: &SearchOptions,
    ) -> Result<SearchResults> {
        let query = self.parse_query(query);
        search::execute_search(store, &self.scorer, &query, projection, options)
    }

    /// Recompute keywords for every record in `store`.
    pub fn reindex_all(
        &self,
        store: &dyn RecordStore,
        batch_size: usize,
    ) -> Result<ReindexReport> {
        self.reindex_all_with_progress(store, batch_size, |_, _| {})
    }

    pub fn reindex_all_with_progress<F>(
        &self,
        store: &dyn RecordStore,
        batch_size: usize,
        progress: F,
    ) -> Result<ReindexReport>
    where
        F: Fn(usize, usize) + Sync,
    {
        reindex::reindex_all(store, &self.extractor, batch_size, progress)
    }

    /// Whether saving `record` needs fresh keywords.
    pub fn needs_update(&self, record: &Record) -> bool {
        record.is_new()
            || self
                .config
                .fields
                .iter()
                .any(|field| record.is_modified(&field.name))
    }
}

impl PreCommitHook for Indexer {
    fn before_commit(&self, record: &mut Record) {
        if self.needs_update(record) {
            self.update_keywords(record);
        }
    }
}
