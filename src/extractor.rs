use std::sync::Arc;

use crate::{
    config::FieldSpec,
    keyword::KeywordList,
    record::Record,
    tokenizer::{Tokenizer, unique_tokens},
};

/// Turns the configured fields of a record into a weighted keyword list.
#[derive(Clone)]
pub struct KeywordExtractor {
    tokenizer: Arc<dyn Tokenizer>,
    fields: Vec<FieldSpec>,
}

impl KeywordExtractor {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, fields: Vec<FieldSpec>) -> Self {
        Self { tokenizer, fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Extract keywords from every configured field of `record`.
    ///
    /// A stem contributes its field's weight once per field no matter how
    /// often it occurs there; stems found in several fields sum the weights
    /// of those fields. Missing or non-text fields contribute nothing.
    pub fn extract(&self, record: &Record) -> KeywordList {
        let mut keywords = KeywordList::new();
        for field in &self.fields {
            let text = record.field_value(&field.name).into_text();
            if text.is_empty() {
                continue;
            }
            for term in unique_tokens(self.tokenizer.tokenize_and_stem(&text)) {
                keywords.add(&term, field.weight);
            }
        }
        keywords
    }
}
