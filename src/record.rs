use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{keyword::KeywordList, store::Projection};

/// Name of the identity attribute in rendered record documents.
pub const ID_FIELD: &str = "_id";

/// A stable record identifier.
///
/// Displayed as `#` followed by the full 16-digit hex value so that the
/// rendered form can be parsed back.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Derive an id from a natural key (e.g. a slug or external id).
    pub fn from_key(key: &str) -> Self {
        let hash = blake3::hash(key.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        Self(u64::from_le_bytes(bytes))
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// The leading `len` hex digits, clamped to 6..=16.
    pub fn short(self, len: usize) -> String {
        let len = len.clamp(6, 16);
        let full = format!("{:016x}", self.0);
        full[..len].to_string()
    }

    /// Parse `#<hex>` or a plain decimal number.
    pub fn parse(s: &str) -> Option<Self> {
        match s.strip_prefix('#') {
            Some(hex) => u64::from_str_radix(hex, 16).ok().map(Self),
            None => s.parse().ok().map(Self),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:016x}", self.0)
    }
}

/// A raw field value resolved for tokenization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    TextSequence(Vec<String>),
    Empty,
}

impl FieldValue {
    /// Strings are text, arrays are sequences of their string elements,
    /// everything else is empty.
    pub fn resolve(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => Self::Text(s.clone()),
            Some(Value::Array(items)) => Self::TextSequence(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            _ => Self::Empty,
        }
    }

    /// The text to tokenize; sequences are joined with a single space.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::TextSequence(items) => items.join(" "),
            Self::Empty => String::new(),
        }
    }
}

/// Look up a possibly dotted path (`author.name`) in a JSON object.
pub fn lookup_path<'a>(
    fields: &'a Map<String, Value>,
    path: &str,
) -> Option<&'a Value> {
    if let Some(value) = fields.get(path) {
        return Some(value);
    }
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// A record as seen by the indexer.
///
/// Fields are an arbitrary JSON object owned by the application. The
/// keyword list and relevance score are system-managed attributes. The
/// record also tracks whether it has been committed and which fields were
/// changed since, which drives keyword recomputation before a save.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    fields: Map<String, Value>,
    keywords: KeywordList,
    relevance: Option<f64>,
    is_new: bool,
    modified: BTreeSet<String>,
}

impl Record {
    /// A new record that has never been committed.
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            fields: Map::new(),
            keywords: KeywordList::new(),
            relevance: None,
            is_new: true,
            modified: BTreeSet::new(),
        }
    }

    /// A record as loaded from a store: committed and unmodified.
    pub fn loaded(
        id: RecordId,
        fields: Map<String, Value>,
        keywords: KeywordList,
    ) -> Self {
        Self {
            id,
            fields,
            keywords,
            relevance: None,
            is_new: false,
            modified: BTreeSet::new(),
        }
    }

    /// Builder: set a field.
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.set(name, value);
        self
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Field value by name or dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.fields, path)
    }

    pub fn field_value(&self, path: &str) -> FieldValue {
        FieldValue::resolve(self.get(path))
    }

    /// Set a field and mark it modified.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        self.fields.insert(name.clone(), value.into());
        self.modified.insert(name);
    }

    /// Remove a field, marking it modified when it existed.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.fields.remove(name);
        if removed.is_some() {
            self.modified.insert(name.to_string());
        }
        removed
    }

    /// Replace a field value without marking it modified. Used by stores
    /// when expanding relations on a result.
    pub(crate) fn replace_unmodified(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn keywords(&self) -> &KeywordList {
        &self.keywords
    }

    pub fn set_keywords(&mut self, keywords: KeywordList) {
        self.keywords = keywords;
    }

    pub fn relevance(&self) -> Option<f64> {
        self.relevance
    }

    pub fn set_relevance(&mut self, relevance: f64) {
        self.relevance = Some(relevance);
    }

    pub fn clear_relevance(&mut self) {
        self.relevance = None;
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Whether `path` (or the top-level field it lives in) changed since
    /// the record was loaded or last committed.
    pub fn is_modified(&self, path: &str) -> bool {
        if self.modified.contains(path) {
            return true;
        }
        let root = path.split('.').next().unwrap_or(path);
        self.modified.contains(root)
    }

    /// Clear the new/modified state after a successful commit.
    pub fn mark_committed(&mut self) {
        self.is_new = false;
        self.modified.clear();
    }

    /// A copy restricted to the given projection.
    pub fn project(&self, projection: &Projection) -> Self {
        let fields = match projection.fields_list() {
            None => self.fields.clone(),
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    self.fields
                        .get(name)
                        .map(|value| (name.clone(), value.clone()))
                })
                .collect(),
        };
        let keywords = if projection.includes_keywords() {
            self.keywords.clone()
        } else {
            KeywordList::new()
        };

        Self {
            id: self.id,
            fields,
            keywords,
            relevance: self.relevance,
            is_new: self.is_new,
            modified: self.modified.clone(),
        }
    }
}
