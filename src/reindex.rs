use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    extractor::KeywordExtractor,
    record::{Record, RecordId},
    store::{Filter, FindOptions, Projection, RecordStore},
};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A record that could not be saved during a reindex pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistFailure {
    pub id: RecordId,
    pub reason: String,
}

impl From<PersistFailure> for Error {
    fn from(failure: PersistFailure) -> Self {
        Error::Persist {
            id: failure.id,
            reason: failure.reason,
        }
    }
}

/// Outcome of a completed reindex pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexReport {
    /// Records counted when the pass started.
    pub total: usize,
    /// Saves attempted, successful or not.
    pub acknowledged: usize,
    pub failures: Vec<PersistFailure>,
}

impl ReindexReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn saved(&self) -> usize {
        self.acknowledged - self.failures.len()
    }
}

/// Recompute and save the keywords of every record in `store`.
///
/// Batches of `batch_size` are fetched one after another; the records of a
/// batch are saved in parallel. `progress` is called with
/// `(acknowledged, total)` after every save. Returns once every save of
/// the pass has been acknowledged.
pub fn reindex_all<F>(
    store: &dyn RecordStore,
    extractor: &KeywordExtractor,
    batch_size: usize,
    progress: F,
) -> Result<ReindexReport>
where
    F: Fn(usize, usize) + Sync,
{
    if batch_size == 0 {
        return Err(Error::Config("batch size must be at least 1".into()));
    }

    let total = store.count(&Filter::all()).map_err(|e| Error::Count {
        source: Box::new(e),
    })?;
    if total == 0 {
        info!("no records to reindex");
        return Ok(ReindexReport::default());
    }
    info!(total, batch_size, "reindexing records");

    let acknowledged = AtomicUsize::new(0);
    let mut failures = Vec::new();
    let mut offset = 0;

    while offset < total {
        let batch = store
            .find(
                &Filter::all(),
                &Projection::all(),
                &FindOptions::page(offset, batch_size),
            )
            .map_err(|e| Error::lookup("reindex", e))?;
        if batch.is_empty() {
            warn!(offset, total, "store shrank during reindex");
            break;
        }

        let batch_failures: Vec<PersistFailure> = batch
            .into_par_iter()
            .filter_map(|mut record| {
                let outcome = reindex_one(store, extractor, &mut record);
                let done = acknowledged.fetch_add(1, Ordering::SeqCst) + 1;
                progress(done, total);
                outcome.err()
            })
            .collect();

        for failure in &batch_failures {
            warn!(id = %failure.id, reason = %failure.reason, "failed to persist record");
        }
        failures.extend(batch_failures);

        offset += batch_size;
        info!(
            done = acknowledged.load(Ordering::SeqCst),
            total,
            "batch reindexed"
        );
    }

    Ok(ReindexReport {
        total,
        acknowledged: acknowledged.into_inner(),
        failures,
    })
}

fn reindex_one(
    store: &dyn RecordStore,
    extractor: &KeywordExtractor,
    record: &mut Record,
) -> std::result::Result<(), PersistFailure> {
    record.set_keywords(extractor.extract(record));
    store.save(record).map_err(|e| PersistFailure {
        id: record.id(),
        reason: e.to_string(),
    })
}
