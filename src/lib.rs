//! keyrank - weighted keyword indexing and relevance search for records.
//!
//! keyrank attaches to a record store that already owns persistence. On
//! every save it extracts stemmed keywords from the configured fields of a
//! record, weighting each keyword by the fields it occurs in, and stores
//! them next to the record. Free-text queries are answered in two store
//! round-trips: candidates sharing a keyword with the query are scored with
//! a string-distance function, ranked, paginated, and then fetched in full.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use keyrank::{
//!     FieldSpec, IndexConfig, Indexer, MemoryStore, Projection, Record,
//!     RecordId, RecordStore, SearchOptions,
//! };
//!
//! let config = IndexConfig::new(vec![
//!     FieldSpec::new("title", 100.0),
//!     FieldSpec::new("description", 10.0),
//! ]);
//! let indexer = Arc::new(Indexer::new(config).unwrap());
//! let store = MemoryStore::new().with_hook(indexer.clone());
//!
//! let mut record = Record::new(RecordId::new(1))
//!     .with_field("title", "Red Car")
//!     .with_field("description", "A fast red car");
//! store.save(&mut record).unwrap();
//!
//! let found = indexer
//!     .search(&store, "red", &Projection::all(), &SearchOptions::default())
//!     .unwrap();
//! assert_eq!(found.total_count, 1);
//! assert_eq!(found.results[0].id(), RecordId::new(1));
//! ```

pub mod config;
pub mod data_dir;
pub mod distance;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod keyword;
pub mod memory_store;
pub mod record;
pub mod record_db;
pub mod reindex;
pub mod scorer;
pub mod search;
pub mod store;
pub mod tokenizer;

pub use config::{FieldSpec, IndexConfig};
pub use data_dir::DataDir;
pub use distance::{Distance, DistanceKind, DistanceSemantic};
pub use error::{Error, Result};
pub use indexer::Indexer;
pub use keyword::{Keyword, KeywordBinding, KeywordList};
pub use memory_store::MemoryStore;
pub use record::{Record, RecordId};
pub use record_db::RecordDb;
pub use reindex::{DEFAULT_BATCH_SIZE, PersistFailure, ReindexReport};
pub use search::{Query, SearchOptions, SearchResults};
pub use store::{PreCommitHook, Projection, RecordStore};
pub use tokenizer::{StemmerKind, StemmingTokenizer, Tokenizer};
