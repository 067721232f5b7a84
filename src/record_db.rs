use std::{path::Path, sync::Arc};

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    error::Result,
    keyword::KeywordBinding,
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

const RECORDS: TableDefinition<u64, &str> = TableDefinition::new("records");

/// A record store persisted in a redb database.
///
/// Each record is one JSON document keyed by its id, so the natural order
/// of the store is ascending id order.
pub struct RecordDb {
    db: Database,
    binding: KeywordBinding,
    hooks: Vec<Arc<dyn PreCommitHook>>,
    relations: Relations,
}

impl RecordDb {
    pub fn open(path: &Path, binding: KeywordBinding) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(RECORDS)?;
        txn.commit()?;

        Ok(Self {
            db,
            binding,
            hooks: Vec::new(),
            relations: Relations::default(),
        })
    }

    pub fn with_hook(mut self, hook: Arc<dyn PreCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_relation(
        mut self,
        path: impl Into<String>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        self.relations.insert(path, store);
        self
    }

    pub fn get(&self, id: RecordId) -> Result<Option<Record>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;
        match table.get(id.value())? {
            Some(doc) => Ok(Some(self.decode(doc.value())?)),
            None => Ok(None),
        }
    }

    pub fn remove(&self, id: RecordId) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(RECORDS)?;
            table.remove(id.value())?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;
        Ok(table.len()? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn decode(&self, doc: &str) -> Result<Record> {
        let doc = serde_json::from_str(doc)?;
        self.binding.from_stored(doc)
    }

    /// Load the records a filter can possibly match, in id order.
    fn candidates(&self, filter: &Filter) -> Result<Vec<Record>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;

        let mut records = Vec::new();
        if let Some(ids) = &filter.ids {
            let mut ids = ids.clone();
            ids.sort_unstable();
            ids.dedup();
            for id in ids {
                if let Some(doc) = table.get(id.value())? {
                    records.push(self.decode(doc.value())?);
                }
            }
        } else {
            for entry in table.iter()? {
                let (_, doc) = entry?;
                records.push(self.decode(doc.value())?);
            }
        }
        Ok(records)
    }

    /// Load one page of the table in id order, decoding only the records
    /// inside the page.
    fn window(&self, skip: usize, limit: usize) -> Result<Vec<Record>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECORDS)?;

        let mut records = Vec::with_capacity(limit.min(1024));
        for entry in table.iter()?.skip(skip).take(limit) {
            let (_, doc) = entry?;
            records.push(self.decode(doc.value())?);
        }
        Ok(records)
    }
}

impl RecordStore for RecordDb {
    fn find(
        &self,
        filter: &Filter,
        projection: &Projection,
        options: &FindOptions,
    ) -> Result<Vec<Record>> {
        let mut found = if *filter == Filter::all() && options.sort.is_empty()
        {
            self.window(
                options.skip.unwrap_or(0),
                options.limit.unwrap_or(usize::MAX),
            )?
            .iter()
            .map(|r| r.project(projection))
            .collect()
        } else {
            let candidates = self.candidates(filter)?;
            store::select(&candidates, filter, projection, options)
        };
        self.relations.populate(&mut found, &options.populate)?;
        Ok(found)
    }

    fn count(&self, filter: &Filter) -> Result<usize> {
        if *filter == Filter::all() {
            return self.len();
        }
        Ok(self
            .candidates(filter)?
            .iter()
            .filter(|r| filter.matches(r))
            .count())
    }

    fn save(&self, record: &mut Record) -> Result<()> {
        for hook in &self.hooks {
            hook.before_commit(record);
        }

        let doc = serde_json::to_string(&self.binding.to_stored(record)?)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(RECORDS)?;
            table.insert(record.id().value(), doc.as_str())?;
        }
        txn.commit()?;

        record.mark_committed();
        Ok(())
    }
}
