use std::{
    collections::HashSet,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use keyrank::{
    Error,
    FieldSpec,
    IndexConfig,
    Indexer,
    KeywordList,
    MemoryStore,
    PreCommitHook,
    Projection,
    Record,
    RecordDb,
    RecordId,
    RecordStore,
    SearchOptions,
    store::{Condition, Filter, FindOptions, Populate, SortKey},
};
use proptest::prelude::*;
use serde_json::json;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn car_config() -> IndexConfig {
    IndexConfig::new(vec![
        FieldSpec::new("title", 100.0),
        FieldSpec::new("description", 10.0),
        FieldSpec::new("tags", 1.0),
    ])
}

fn red_car(id: u64) -> Record {
    Record::new(RecordId::new(id))
        .with_field("title", "Red Car")
        .with_field("description", "A fast red car")
        .with_field("tags", json!(["vehicle"]))
}

/// A store with `n` records whose only keyword is "car", weighted by id.
fn weighted_store(n: u64) -> MemoryStore {
    let store = MemoryStore::new();
    for id in 1..=n {
        let mut keywords = KeywordList::new();
        keywords.add("car", id as f64);
        let mut record =
            Record::new(RecordId::new(id)).with_field("year", 2000 + id);
        record.set_keywords(keywords);
        store.save(&mut record).unwrap();
    }
    store
}

fn ids(records: &[Record]) -> Vec<u64> {
    records.iter().map(|r| r.id().value()).collect()
}

/// Counts saves and forwards everything else to an inner store, failing
/// on request.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    finds: AtomicUsize,
    saves: AtomicUsize,
    fail_find_at: Option<usize>,
    fail_count: bool,
    fail_save: HashSet<RecordId>,
}

impl RecordStore for FlakyStore {
    fn find(
        &self,
        filter: &Filter,
        projection: &Projection,
        options: &FindOptions,
    ) -> keyrank::Result<Vec<Record>> {
        let call = self.finds.fetch_add(1, Ordering::SeqCst);
        if self.fail_find_at == Some(call) {
            return Err(Error::Config(format!("find #{call} refused")));
        }
        self.inner.find(filter, projection, options)
    }

    fn count(&self, filter: &Filter) -> keyrank::Result<usize> {
        if self.fail_count {
            return Err(Error::Config("count refused".into()));
        }
        self.inner.count(filter)
    }

    fn save(&self, record: &mut Record) -> keyrank::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.contains(&record.id()) {
            return Err(Error::Config("disk full".into()));
        }
        self.inner.save(record)
    }
}

#[test]
fn red_car_ranks_first() -> TestResult {
    let indexer = Arc::new(Indexer::new(car_config())?);
    let store = MemoryStore::new().with_hook(indexer.clone());

    store.save(&mut red_car(1))?;
    store.save(
        &mut Record::new(RecordId::new(2))
            .with_field("title", "Blue Bicycle")
            .with_field("description", "Has a red bell"),
    )?;
    store.save(
        &mut Record::new(RecordId::new(3)).with_field("title", "Green Boat"),
    )?;

    let stored = store.get(RecordId::new(1)).ok_or("record 1 missing")?;
    assert_eq!(stored.keywords().weight("red"), Some(110.0));
    assert_eq!(stored.keywords().weight("car"), Some(110.0));
    assert_eq!(stored.keywords().weight("fast"), Some(10.0));
    assert_eq!(stored.keywords().weight("vehicl"), Some(1.0));

    let found = indexer.search(
        &store,
        "red",
        &Projection::all(),
        &SearchOptions {
            limit: Some(1),
            ..SearchOptions::default()
        },
    )?;
    assert_eq!(found.total_count, 2);
    assert_eq!(ids(&found.results), vec![1]);
    assert!(found.results[0].relevance().unwrap_or(0.0) >= 110.0);
    Ok(())
}

#[test]
fn relevance_attribute_is_rendered_with_binding_names() -> TestResult {
    let mut config = car_config();
    config.keywords_field = "kw".into();
    config.relevance_field = "score".into();
    let indexer = Arc::new(Indexer::new(config)?);
    let store = MemoryStore::new().with_hook(indexer.clone());
    store.save(&mut red_car(1))?;

    let found = indexer.search(
        &store,
        "car",
        &Projection::all(),
        &SearchOptions::default(),
    )?;
    let doc = indexer.binding().to_output(&found.results[0])?;
    assert!(doc.get("score").and_then(|v| v.as_f64()).is_some());
    assert!(doc.get("kw").and_then(|v| v.as_array()).is_some());
    assert!(doc.get("_relevance").is_none());

    let stored = indexer.binding().to_stored(&found.results[0])?;
    assert!(stored.get("score").is_none());
    Ok(())
}

proptest! {
    #[test]
    fn pagination_returns_the_ranked_window(skip in 0usize..30, limit in 0usize..30) {
        let n = 20;
        let store = weighted_store(n as u64);
        let indexer = Indexer::new(car_config()).unwrap();

        let found = indexer
            .search(&store, "car", &Projection::all(), &SearchOptions::page(skip, limit))
            .unwrap();

        let expected: Vec<u64> =
            (1..=n as u64).rev().skip(skip).take(limit).collect();
        prop_assert_eq!(found.total_count, n);
        prop_assert_eq!(found.results.len(), limit.min(n.saturating_sub(skip)));
        prop_assert_eq!(ids(&found.results), expected);
    }
}

#[test]
fn sort_replaces_relevance_ordering() -> TestResult {
    let store = weighted_store(5);
    let indexer = Indexer::new(car_config())?;

    let options = SearchOptions::page(1, 3).with_sort(vec![SortKey::asc("year")]);
    let found =
        indexer.search(&store, "car", &Projection::all(), &options)?;

    assert_eq!(found.total_count, 5);
    assert_eq!(ids(&found.results), vec![2, 3, 4]);
    Ok(())
}

#[test]
fn conditions_narrow_both_phases() -> TestResult {
    let store = weighted_store(6);
    let indexer = Indexer::new(car_config())?;

    let options = SearchOptions::default().with_conditions(vec![
        Condition::one_of("year", vec![json!(2002), json!(2004), json!(2006)]),
    ]);
    let found =
        indexer.search(&store, "car", &Projection::all(), &options)?;
    assert_eq!(found.total_count, 3);
    assert_eq!(ids(&found.results), vec![6, 4, 2]);
    Ok(())
}

#[test]
fn unmatched_query_skips_the_fetch() -> TestResult {
    let store = FlakyStore {
        inner: weighted_store(3),
        ..FlakyStore::default()
    };
    let indexer = Indexer::new(car_config())?;

    let found = indexer.search(
        &store,
        "submarine",
        &Projection::all(),
        &SearchOptions::default(),
    )?;
    assert!(found.results.is_empty());
    assert_eq!(found.total_count, 0);
    assert_eq!(store.finds.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn lookup_failures_abort_the_search() -> TestResult {
    let indexer = Indexer::new(car_config())?;

    for (call, stage) in [(0, "candidates"), (1, "fetch")] {
        let store = FlakyStore {
            inner: weighted_store(3),
            fail_find_at: Some(call),
            ..FlakyStore::default()
        };
        let err = indexer
            .search(&store, "car", &Projection::all(), &SearchOptions::default())
            .unwrap_err();
        match err {
            Error::Lookup { stage: got, .. } => assert_eq!(got, stage),
            other => panic!("expected lookup error, got {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn search_populates_relations() -> TestResult {
    let makers = Arc::new(MemoryStore::new());
    makers.save(
        &mut Record::new(RecordId::new(100))
            .with_field("name", "Acme")
            .with_field("country", "NZ"),
    )?;

    let indexer = Arc::new(Indexer::new(car_config())?);
    let store = MemoryStore::new()
        .with_hook(indexer.clone())
        .with_relation("maker", makers);
    store.save(&mut red_car(1).with_field("maker", 100))?;

    let options = SearchOptions {
        populate: vec![Populate::new("maker").with_fields(["name"])],
        ..SearchOptions::default()
    };
    let found = indexer.search(&store, "car", &Projection::all(), &options)?;
    assert_eq!(
        found.results[0].get("maker"),
        Some(&json!({"_id": 100, "name": "Acme"}))
    );
    Ok(())
}

#[test]
fn reindex_250_records_in_batches_of_100() -> TestResult {
    struct Tally(AtomicUsize);
    impl PreCommitHook for Tally {
        fn before_commit(&self, _record: &mut Record) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let dir = tempfile::tempdir()?;
    let indexer = Indexer::new(car_config())?;
    let tally = Arc::new(Tally(AtomicUsize::new(0)));
    let db = RecordDb::open(&dir.path().join("records.redb"), indexer.binding().clone())?
        .with_hook(tally.clone());

    for id in 0..250 {
        let mut record = Record::new(RecordId::new(id))
            .with_field("title", format!("car {id}"));
        db.save(&mut record)?;
    }
    assert_eq!(tally.0.swap(0, Ordering::SeqCst), 250);
    assert_eq!(db.count(&Filter::keywords_any(vec!["car".into()]))?, 0);

    let progress = Mutex::new(Vec::new());
    let report = indexer.reindex_all_with_progress(&db, 100, |done, total| {
        progress.lock().unwrap().push((done, total));
    })?;

    assert_eq!(report.total, 250);
    assert_eq!(report.acknowledged, 250);
    assert!(report.is_clean());
    assert_eq!(tally.0.load(Ordering::SeqCst), 250);

    let mut progress = progress.into_inner().unwrap();
    progress.sort();
    assert_eq!(progress.len(), 250);
    assert_eq!(progress.first(), Some(&(1, 250)));
    assert_eq!(progress.last(), Some(&(250, 250)));

    assert_eq!(db.count(&Filter::keywords_any(vec!["car".into()]))?, 250);
    Ok(())
}

#[test]
fn reindex_collects_persist_failures() -> TestResult {
    let store = FlakyStore {
        inner: weighted_store(10),
        fail_save: [RecordId::new(3), RecordId::new(7)].into_iter().collect(),
        ..FlakyStore::default()
    };
    let indexer = Indexer::new(car_config())?;

    let report = indexer.reindex_all(&store, 4)?;

    assert_eq!(report.total, 10);
    assert_eq!(report.acknowledged, 10);
    assert_eq!(report.saved(), 8);
    let mut failed: Vec<u64> =
        report.failures.iter().map(|f| f.id.value()).collect();
    failed.sort();
    assert_eq!(failed, vec![3, 7]);
    assert!(report.failures[0].reason.contains("disk full"));
    Ok(())
}

#[test]
fn reindex_count_failure_aborts() -> TestResult {
    let store = FlakyStore {
        inner: weighted_store(2),
        fail_count: true,
        ..FlakyStore::default()
    };
    let indexer = Indexer::new(car_config())?;

    let err = indexer.reindex_all(&store, 10).unwrap_err();
    assert!(matches!(err, Error::Count { .. }));
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn reindex_batch_lookup_failure_aborts() -> TestResult {
    let store = FlakyStore {
        inner: weighted_store(5),
        fail_find_at: Some(1),
        ..FlakyStore::default()
    };
    let indexer = Indexer::new(car_config())?;

    let err = indexer.reindex_all(&store, 2).unwrap_err();
    assert!(matches!(err, Error::Lookup { stage: "reindex", .. }));
    assert_eq!(store.saves.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn keywords_survive_reopening_the_database() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("records.redb");
    let indexer = Arc::new(Indexer::new(car_config())?);

    {
        let db = RecordDb::open(&path, indexer.binding().clone())?
            .with_hook(indexer.clone());
        db.save(&mut red_car(1))?;

        let mut loaded = db.get(RecordId::new(1))?.ok_or("missing")?;
        loaded.set("title", "Yellow Truck");
        db.save(&mut loaded)?;
    }

    let db = RecordDb::open(&path, indexer.binding().clone())?;
    let found =
        indexer.search(&db, "truck", &Projection::all(), &SearchOptions::default())?;
    assert_eq!(ids(&found.results), vec![1]);
    assert_eq!(
        found.results[0].keywords().weight("truck"),
        Some(100.0)
    );
    assert!(found.results[0].keywords().weight("red").is_some());
    Ok(())
}
