// src/memory/mod.rs — SQLite persistence for stats and session archives

pub mod schema;
pub mod store;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::infra::errors::GoodQuestionError;

pub use store::Store;

/// Shared handle. All readers and writers go through the one lock.
pub type StoreRef = Arc<Mutex<Store>>;

/// Open (or create) the database at the given path.
pub fn open(path: &Path) -> Result<StoreRef, GoodQuestionError> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    schema::run_migrations(&conn)?;
    Ok(Arc::new(Mutex::new(Store::new(conn))))
}

/// In-memory database, for tests and throwaway runs.
pub fn in_memory() -> Result<StoreRef, GoodQuestionError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    schema::run_migrations(&conn)?;
    Ok(Arc::new(Mutex::new(Store::new(conn))))
}

pub fn lock(store: &StoreRef) -> Result<MutexGuard<'_, Store>, GoodQuestionError> {
    store
        .lock()
        .map_err(|_| GoodQuestionError::Other(anyhow::anyhow!("store lock poisoned")))
}
