//! Weighted keywords and the way they are bound onto a record document.
//!
//! A record's [`KeywordList`] is persisted next to the record's own fields
//! under a configurable attribute name (`_keywords` by default). The
//! per-search relevance score is rendered under a second name
//! (`_relevance` by default) but never stored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    record::{ID_FIELD, Record, RecordId},
};

pub const DEFAULT_KEYWORDS_FIELD: &str = "_keywords";
pub const DEFAULT_RELEVANCE_FIELD: &str = "_relevance";

fn default_weight() -> f64 {
    1.0
}

/// A stemmed term and its accumulated weight for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    #[serde(rename = "keyword", alias = "term")]
    pub term: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl Keyword {
    pub fn new(term: impl Into<String>, weight: f64) -> Self {
        Self {
            term: term.into(),
            weight,
        }
    }
}

/// Keyword entries of one record, unique by term.
///
/// Entries keep the order in which their terms were first added. Adding a
/// term that is already present accumulates its weight instead of creating
/// a second entry, which also applies when a list is deserialized.
///
/// # Examples
///
/// ```
/// use keyrank::keyword::KeywordList;
///
/// let mut list = KeywordList::new();
/// list.add("red", 100.0);
/// list.add("car", 100.0);
/// list.add("red", 10.0);
///
/// assert_eq!(list.len(), 2);
/// assert_eq!(list.weight("red"), Some(110.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Keyword>", into = "Vec<Keyword>")]
pub struct KeywordList {
    entries: Vec<Keyword>,
    positions: HashMap<String, usize>,
}

impl KeywordList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` to `term`, inserting it when it is not present yet.
    pub fn add(&mut self, term: &str, weight: f64) {
        match self.positions.get(term) {
            Some(&idx) => self.entries[idx].weight += weight,
            None => {
                self.positions.insert(term.to_string(), self.entries.len());
                self.entries.push(Keyword::new(term, weight));
            }
        }
    }

    pub fn weight(&self, term: &str) -> Option<f64> {
        self.positions.get(term).map(|&idx| self.entries[idx].weight)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.positions.contains_key(term)
    }

    /// Whether at least one of `terms` is a keyword of this list.
    pub fn contains_any<S: AsRef<str>>(&self, terms: &[S]) -> bool {
        terms.iter().any(|t| self.contains(t.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Keyword> {
        self.entries.iter()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|k| k.term.as_str())
    }
}

impl From<Vec<Keyword>> for KeywordList {
    fn from(keywords: Vec<Keyword>) -> Self {
        let mut list = Self::new();
        for keyword in keywords {
            list.add(&keyword.term, keyword.weight);
        }
        list
    }
}

impl From<KeywordList> for Vec<Keyword> {
    fn from(list: KeywordList) -> Self {
        list.entries
    }
}

impl FromIterator<Keyword> for KeywordList {
    fn from_iter<I: IntoIterator<Item = Keyword>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<'a> IntoIterator for &'a KeywordList {
    type Item = &'a Keyword;
    type IntoIter = std::slice::Iter<'a, Keyword>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Attribute names under which keywords and relevance appear in a record
/// document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordBinding {
    keywords_field: String,
    relevance_field: String,
}

impl Default for KeywordBinding {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS_FIELD, DEFAULT_RELEVANCE_FIELD)
    }
}

impl KeywordBinding {
    pub fn new(
        keywords_field: impl Into<String>,
        relevance_field: impl Into<String>,
    ) -> Self {
        Self {
            keywords_field: keywords_field.into(),
            relevance_field: relevance_field.into(),
        }
    }

    pub fn keywords_field(&self) -> &str {
        &self.keywords_field
    }

    pub fn relevance_field(&self) -> &str {
        &self.relevance_field
    }

    /// Whether `name` is one of the system-managed attribute names.
    pub fn is_reserved(&self, name: &str) -> bool {
        name == ID_FIELD
            || name == self.keywords_field
            || name == self.relevance_field
    }

    /// Render the persisted form of a record: id, fields and keywords.
    pub fn to_stored(&self, record: &Record) -> Result<Value> {
        let mut doc = self.base_document(record);
        doc.insert(
            self.keywords_field.clone(),
            serde_json::to_value(record.keywords())?,
        );
        Ok(Value::Object(doc))
    }

    /// Render a record for callers: id, fields, the relevance score when
    /// one is attached, and keywords when they were loaded.
    pub fn to_output(&self, record: &Record) -> Result<Value> {
        let mut doc = self.base_document(record);
        if !record.keywords().is_empty() {
            doc.insert(
                self.keywords_field.clone(),
                serde_json::to_value(record.keywords())?,
            );
        }
        if let Some(relevance) = record.relevance() {
            doc.insert(self.relevance_field.clone(), Value::from(relevance));
        }
        Ok(Value::Object(doc))
    }

    /// Parse a document previously produced by [`Self::to_stored`].
    pub fn from_stored(&self, doc: Value) -> Result<Record> {
        let Value::Object(mut fields) = doc else {
            return Err(Error::Config(
                "stored record is not a JSON object".into(),
            ));
        };

        let id = fields
            .remove(ID_FIELD)
            .and_then(|v| v.as_u64())
            .map(RecordId::new)
            .ok_or_else(|| {
                Error::Config(format!("stored record has no numeric {ID_FIELD}"))
            })?;

        let keywords = match fields.remove(&self.keywords_field) {
            Some(value) => serde_json::from_value(value)?,
            None => KeywordList::new(),
        };
        fields.remove(&self.relevance_field);

        Ok(Record::loaded(id, fields, keywords))
    }

    /// Build a new, uncommitted record from a caller-supplied JSON object.
    ///
    /// The identity comes from `_id` (a number) when present, otherwise from
    /// `id` (a number, or a string key hashed into an id). Keyword and
    /// relevance attributes in the input are ignored.
    pub fn new_record(&self, doc: Value) -> Result<Record> {
        let Value::Object(mut fields) = doc else {
            return Err(Error::Config("record is not a JSON object".into()));
        };

        let id = match fields.remove(ID_FIELD) {
            Some(value) => value.as_u64().map(RecordId::new),
            None => match fields.get("id") {
                Some(Value::Number(n)) => n.as_u64().map(RecordId::new),
                Some(Value::String(key)) => Some(RecordId::from_key(key)),
                _ => None,
            },
        }
        .ok_or_else(|| {
            Error::Config(
                "record needs a numeric `_id` or an `id` number/string".into(),
            )
        })?;

        fields.remove(&self.keywords_field);
        fields.remove(&self.relevance_field);

        let mut record = Record::new(id);
        for (name, value) in fields {
            record.set(name, value);
        }
        Ok(record)
    }

    fn base_document(&self, record: &Record) -> Map<String, Value> {
        let mut doc = Map::with_capacity(record.fields().len() + 2);
        doc.insert(ID_FIELD.to_string(), Value::from(record.id().value()));
        for (name, value) in record.fields() {
            doc.insert(name.clone(), value.clone());
        }
        doc
    }
}
