//! The record store contract the indexer runs against.
//!
//! A store owns persistence. The indexer only needs filtered lookups with
//! projection and pagination, counting, and saving with a pre-commit hook.
//! [`crate::MemoryStore`] and [`crate::RecordDb`] implement it; both share
//! the filtering, sorting and relation helpers defined here.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    record::{ID_FIELD, Record, RecordId},
};

/// Persistence operations consumed by search and reindexing.
pub trait RecordStore: Send + Sync {
    /// Records matching `filter`, ordered by `options.sort` (natural store
    /// order otherwise), paginated and projected.
    fn find(
        &self,
        filter: &Filter,
        projection: &Projection,
        options: &FindOptions,
    ) -> Result<Vec<Record>>;

    /// Number of records matching `filter`.
    fn count(&self, filter: &Filter) -> Result<usize>;

    /// Run the pre-commit hooks, then create or replace the record.
    ///
    /// On success the record's new/modified state is cleared.
    fn save(&self, record: &mut Record) -> Result<()>;
}

/// Invoked by stores on every record right before it is committed.
pub trait PreCommitHook: Send + Sync {
    fn before_commit(&self, record: &mut Record);
}

/// A single field predicate. Conditions in a [`Filter`] are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Equal, or contained when the field holds an array.
    Eq(Value),
    /// Negation of [`Predicate::Eq`].
    Ne(Value),
    /// Matches [`Predicate::Eq`] for any of the values.
    In(Vec<Value>),
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            predicate: Predicate::Eq(value.into()),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            predicate: Predicate::Ne(value.into()),
        }
    }

    pub fn one_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            predicate: Predicate::In(values),
        }
    }

    /// Parse `field=value` or `field!=value`. The value is read as JSON
    /// when it parses, otherwise as a plain string.
    ///
    /// # Examples
    ///
    /// ```
    /// use keyrank::store::Condition;
    /// use serde_json::json;
    ///
    /// assert_eq!(Condition::parse("year=2020").unwrap(),
    ///            Condition::eq("year", json!(2020)));
    /// assert_eq!(Condition::parse("color!=red").unwrap(),
    ///            Condition::ne("color", json!("red")));
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let (field, value, negate) = if let Some((f, v)) = s.split_once("!=")
        {
            (f, v, true)
        } else if let Some((f, v)) = s.split_once('=') {
            (f, v, false)
        } else {
            return Err(Error::Config(format!(
                "expected field=value or field!=value, got '{s}'"
            )));
        };

        let field = field.trim();
        if field.is_empty() {
            return Err(Error::Config(format!("missing field name in '{s}'")));
        }
        let value = serde_json::from_str(value.trim())
            .unwrap_or_else(|_| Value::String(value.trim().to_string()));

        Ok(if negate {
            Self::ne(field, value)
        } else {
            Self::eq(field, value)
        })
    }

    pub fn matches(&self, record: &Record) -> bool {
        let value = record.get(&self.field);
        match &self.predicate {
            Predicate::Eq(expected) => value_matches(value, expected),
            Predicate::Ne(expected) => !value_matches(value, expected),
            Predicate::In(options) => {
                options.iter().any(|expected| value_matches(value, expected))
            }
        }
    }
}

fn value_matches(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.contains(expected)
        }
        Some(value) => value == expected,
    }
}

/// Record selection for [`RecordStore::find`] and [`RecordStore::count`].
///
/// `ids` and `keywords_any` restrict to a set; an empty set matches
/// nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub ids: Option<Vec<RecordId>>,
    pub keywords_any: Option<Vec<String>>,
    pub conditions: Vec<Condition>,
}

impl Filter {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids(ids: Vec<RecordId>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn keywords_any(terms: Vec<String>) -> Self {
        Self {
            keywords_any: Some(terms),
            ..Self::default()
        }
    }

    /// Builder: AND extra conditions into the filter.
    pub fn with_conditions(mut self, conditions: &[Condition]) -> Self {
        self.conditions.extend_from_slice(conditions);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(ids) = &self.ids
            && !ids.contains(&record.id())
        {
            return false;
        }
        if let Some(terms) = &self.keywords_any
            && !record.keywords().contains_any(terms)
        {
            return false;
        }
        self.conditions.iter().all(|c| c.matches(record))
    }
}

/// Which parts of a record to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    fields: Option<Vec<String>>,
    keywords: bool,
}

impl Projection {
    /// Every field and the keyword list.
    pub fn all() -> Self {
        Self {
            fields: None,
            keywords: true,
        }
    }

    /// Every field, without the keyword list.
    pub fn all_fields() -> Self {
        Self {
            fields: None,
            keywords: false,
        }
    }

    /// Identity and keyword list only.
    pub fn keywords_only() -> Self {
        Self {
            fields: Some(Vec::new()),
            keywords: true,
        }
    }

    /// Identity and the named fields.
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: Some(names.into_iter().map(Into::into).collect()),
            keywords: false,
        }
    }

    /// Builder: also return the keyword list.
    pub fn with_keywords(mut self) -> Self {
        self.keywords = true;
        self
    }

    /// `None` means all fields.
    pub fn fields_list(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    pub fn includes_keywords(&self) -> bool {
        self.keywords
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::all()
    }
}

/// One sort criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Parse `field`, `field:asc` or `field:desc`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.rsplit_once(':') {
            Some((field, "desc")) => Ok(Self::desc(field)),
            Some((field, "asc")) => Ok(Self::asc(field)),
            Some((_, order)) => Err(Error::Config(format!(
                "unknown sort order '{order}' (expected asc or desc)"
            ))),
            None => Ok(Self::asc(s)),
        }
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ord = if self.field == ID_FIELD {
            a.id().cmp(&b.id())
        } else {
            compare_values(a.get(&self.field), b.get(&self.field))
        };
        if self.descending { ord.reverse() } else { ord }
    }
}

/// Relation expansion: replace the record id stored at `path` with the
/// related record, projected to `fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Populate {
    pub path: String,
    pub fields: Option<Vec<String>>,
}

impl Populate {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fields: None,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub populate: Vec<Populate>,
}

impl FindOptions {
    pub fn page(skip: usize, limit: usize) -> Self {
        Self {
            skip: Some(skip),
            limit: Some(limit),
            ..Self::default()
        }
    }
}

/// Order of JSON values when sorting: missing and null first, then
/// booleans, numbers, strings, arrays and objects.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Filter, sort, paginate and project records given in natural order.
///
/// Shared by the bundled stores. Sorting is stable so records that compare
/// equal keep their natural order.
pub fn select<'a, I>(
    records: I,
    filter: &Filter,
    projection: &Projection,
    options: &FindOptions,
) -> Vec<Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut matched: Vec<&Record> =
        records.into_iter().filter(|r| filter.matches(r)).collect();

    if !options.sort.is_empty() {
        matched.sort_by(|a, b| {
            options
                .sort
                .iter()
                .map(|key| key.compare(a, b))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        });
    }

    let skip = options.skip.unwrap_or(0);
    let limit = options.limit.unwrap_or(usize::MAX);
    matched
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|r| r.project(projection))
        .collect()
}

/// Render a record as `{_id, ...fields}`.
pub fn render_fields(record: &Record) -> Value {
    let mut doc = Map::with_capacity(record.fields().len() + 1);
    doc.insert(ID_FIELD.to_string(), Value::from(record.id().value()));
    for (name, value) in record.fields() {
        doc.insert(name.clone(), value.clone());
    }
    Value::Object(doc)
}

/// Related stores keyed by the field path that references them.
#[derive(Clone, Default)]
pub struct Relations {
    stores: HashMap<String, Arc<dyn RecordStore>>,
}

impl Relations {
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        store: Arc<dyn RecordStore>,
    ) {
        self.stores.insert(path.into(), store);
    }

    /// Expand every directive on `records`.
    ///
    /// A referenced id may be a single number or an array of numbers. Ids
    /// that resolve to nothing become `null` (single) or are dropped
    /// (array).
    pub fn populate(
        &self,
        records: &mut [Record],
        directives: &[Populate],
    ) -> Result<()> {
        for directive in directives {
            let store = self.stores.get(&directive.path).ok_or_else(|| {
                Error::NotFound {
                    kind: "relation",
                    name: directive.path.clone(),
                }
            })?;

            let mut ids: Vec<RecordId> = records
                .iter()
                .flat_map(|r| referenced_ids(r.fields().get(&directive.path)))
                .collect();
            ids.sort_unstable();
            ids.dedup();
            if ids.is_empty() {
                continue;
            }

            let projection = match &directive.fields {
                Some(fields) => Projection::fields(fields.iter().cloned()),
                None => Projection::all_fields(),
            };

            let related: HashMap<RecordId, Value> = store
                .find(&Filter::ids(ids), &projection, &FindOptions::default())?
                .iter()
                .map(|r| (r.id(), render_fields(r)))
                .collect();

            for record in records.iter_mut() {
                let Some(current) = record.fields().get(&directive.path) else {
                    continue;
                };
                let expanded = match current {
                    Value::Array(items) => Value::Array(
                        items
                            .iter()
                            .filter_map(|v| v.as_u64().map(RecordId::new))
                            .filter_map(|id| related.get(&id).cloned())
                            .collect(),
                    ),
                    other => other
                        .as_u64()
                        .map(RecordId::new)
                        .and_then(|id| related.get(&id).cloned())
                        .unwrap_or(Value::Null),
                };
                record.replace_unmodified(&directive.path, expanded);
            }
        }
        Ok(())
    }
}

fn referenced_ids(value: Option<&Value>) -> Vec<RecordId> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_u64().map(RecordId::new))
            .collect(),
        Some(v) => v.as_u64().map(RecordId::new).into_iter().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::keyword::KeywordList;

    fn record(id: u64, fields: Value) -> Record {
        let Value::Object(fields) = fields else {
            panic!("fields must be an object");
        };
        Record::loaded(RecordId::new(id), fields, KeywordList::new())
    }

    #[test]
    fn eq_matches_scalars_and_array_members() {
        let r = record(1, json!({"color": "red", "tags": ["a", "b"]}));
        assert!(Condition::eq("color", "red").matches(&r));
        assert!(!Condition::eq("color", "blue").matches(&r));
        assert!(Condition::eq("tags", "b").matches(&r));
        assert!(Condition::eq("tags", json!(["a", "b"])).matches(&r));
        assert!(Condition::ne("color", "blue").matches(&r));
        assert!(Condition::eq("missing", Value::Null).matches(&r));
    }

    #[test]
    fn one_of_matches_any_value() {
        let r = record(1, json!({"year": 2020}));
        assert!(Condition::one_of("year", vec![json!(2019), json!(2020)])
            .matches(&r));
        assert!(!Condition::one_of("year", vec![]).matches(&r));
    }

    #[test]
    fn filter_empty_sets_match_nothing() {
        let r = record(1, json!({}));
        assert!(Filter::all().matches(&r));
        assert!(!Filter::ids(vec![]).matches(&r));
        assert!(!Filter::keywords_any(vec![]).matches(&r));
    }

    #[test]
    fn filter_keywords_any() {
        let mut keywords = KeywordList::new();
        keywords.add("red", 1.0);
        let r = Record::loaded(RecordId::new(1), Map::new(), keywords);
        assert!(Filter::keywords_any(vec!["red".into()]).matches(&r));
        assert!(!Filter::keywords_any(vec!["blue".into()]).matches(&r));
    }

    #[test]
    fn parse_condition_values() {
        assert_eq!(
            Condition::parse("name=Ada").unwrap(),
            Condition::eq("name", "Ada")
        );
        assert_eq!(
            Condition::parse("flag=true").unwrap(),
            Condition::eq("flag", true)
        );
        assert!(Condition::parse("=x").is_err());
        assert!(Condition::parse("nothing").is_err());
    }

    #[test]
    fn parse_sort_keys() {
        assert_eq!(SortKey::parse("year:desc").unwrap(), SortKey::desc("year"));
        assert_eq!(SortKey::parse("year").unwrap(), SortKey::asc("year"));
        assert!(SortKey::parse("year:sideways").is_err());
    }

    #[test]
    fn value_ordering() {
        assert_eq!(
            compare_values(None, Some(&json!(false))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!(2)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(Some(&json!(99)), Some(&json!("a"))),
            Ordering::Less
        );
    }

    #[test]
    fn select_sorts_stably_and_paginates() {
        let records = vec![
            record(1, json!({"year": 2020})),
            record(2, json!({"year": 2019})),
            record(3, json!({"year": 2020})),
            record(4, json!({})),
        ];
        let options = FindOptions {
            sort: vec![SortKey::desc("year")],
            ..FindOptions::default()
        };
        let ids: Vec<u64> =
            select(&records, &Filter::all(), &Projection::all(), &options)
                .iter()
                .map(|r| r.id().value())
                .collect();
        assert_eq!(ids, vec![1, 3, 2, 4]);

        let page = select(
            &records,
            &Filter::all(),
            &Projection::all(),
            &FindOptions::page(1, 2),
        );
        let ids: Vec<u64> = page.iter().map(|r| r.id().value()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn select_sorts_by_id() {
        let records = vec![record(3, json!({})), record(1, json!({}))];
        let options = FindOptions {
            sort: vec![SortKey::asc("_id")],
            ..FindOptions::default()
        };
        let ids: Vec<u64> =
            select(&records, &Filter::all(), &Projection::all(), &options)
                .iter()
                .map(|r| r.id().value())
                .collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
