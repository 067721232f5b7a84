use std::sync::{Arc, PoisonError, RwLock};

use crate::{
    error::Result,
    record::{Record, RecordId},
    store::{
        self,
        Filter,
        FindOptions,
        PreCommitHook,
        Projection,
        RecordStore,
        Relations,
    },
};

/// An in-process record store keeping records in insertion order.
///
/// Useful for tests and for applications that keep their records in
/// memory anyway. Saving an existing id replaces the record in place, so
/// the natural order does not change on update.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Record>>,
    hooks: Vec<Arc<dyn PreCommitHook>>,
    relations: Relations,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: run `hook` before every commit.
    pub fn with_hook(mut self, hook: Arc<dyn PreCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Builder: resolve ids stored at `path` against `store` on populate.
    pub fn with_relation(
        mut self,
        path: impl Into<String>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        self.relations.insert(path, store);
        self
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    pub fn remove(&self, id: RecordId) -> bool {
        let mut records =
            self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|r| r.id() != id);
        records.len() != before
    }
}

impl RecordStore for MemoryStore {
    fn find(
        &self,
        filter: &Filter,
        projection: &Projection,
        options: &FindOptions,
    ) -> Result<Vec<Record>> {
        let mut found = {
            let records =
                self.records.read().unwrap_or_else(PoisonError::into_inner);
            store::select(records.iter(), filter, projection, options)
        };
        self.relations.populate(&mut found, &options.populate)?;
        Ok(found)
    }

    fn count(&self, filter: &Filter) -> Result<usize> {
        let records =
            self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.iter().filter(|r| filter.matches(r)).count())
    }

    fn save(&self, record: &mut Record) -> Result<()> {
        for hook in &self.hooks {
            hook.before_commit(record);
        }

        let mut stored = record.clone();
        stored.mark_committed();
        stored.clear_relevance();

        {
            let mut records =
                self.records.write().unwrap_or_else(PoisonError::into_inner);
            match records.iter_mut().find(|r| r.id() == stored.id()) {
                Some(existing) => *existing = stored,
                None => records.push(stored),
            }
        }

        record.mark_committed();
        Ok(())
    }
}
