//! Company and transaction store contracts.
//!
//! Both stores follow whole-collection semantics: callers load the entire
//! collection, apply one change, and save the entire collection back. A
//! failed save must surface as a [`StorageError`]; implementations never
//! swallow write failures.

pub mod json;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::db::Database;
use crate::errors::StorageError;
use crate::models::{Company, Transaction};

pub use json::JsonFileStore;

/// File name of the SQLite database inside the data directory.
pub const DATABASE_FILE: &str = "giftledger.db";

/// Persistent collection of companies, in storage order.
pub trait CompanyStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Company>, StorageError>;

    fn save_all(&self, companies: &[Company]) -> Result<(), StorageError>;
}

/// Append-only ledger of transactions, in insertion order.
pub trait TransactionStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Transaction>, StorageError>;

    fn save_all(&self, transactions: &[Transaction]) -> Result<(), StorageError>;

    /// Look up a single transaction by id.
    fn find_by_id(&self, id: &str) -> Result<Option<Transaction>, StorageError> {
        Ok(self.load_all()?.into_iter().find(|t| t.id == id))
    }

    /// All transactions of a company, newest first.
    fn list_by_company(&self, company_id: &str) -> Result<Vec<Transaction>, StorageError> {
        let mut matching: Vec<Transaction> = self
            .load_all()?
            .into_iter()
            .filter(|t| t.company_id == company_id)
            .collect();
        matching.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(matching)
    }
}

/// The pair of stores the ledger operates on.
#[derive(Clone)]
pub struct StoreHandles {
    pub companies: Arc<dyn CompanyStore>,
    pub transactions: Arc<dyn TransactionStore>,
}

impl StoreHandles {
    /// Use one value for both stores.
    pub fn shared<S>(store: S) -> Self
    where
        S: CompanyStore + TransactionStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            companies: store.clone(),
            transactions: store,
        }
    }
}

/// Open the stores selected by `config` inside `data_dir`.
pub fn open(config: &StorageConfig, data_dir: &Path) -> Result<StoreHandles, StorageError> {
    std::fs::create_dir_all(data_dir)?;
    match config.backend {
        StorageBackend::Sqlite => {
            let db = Database::new(data_dir.join(DATABASE_FILE))?;
            db.initialize()?;
            info!(path = %data_dir.join(DATABASE_FILE).display(), "using sqlite store");
            Ok(StoreHandles::shared(db))
        }
        StorageBackend::Json => {
            let store = JsonFileStore::new(data_dir);
            info!(dir = %data_dir.display(), "using json file store");
            Ok(StoreHandles::shared(store))
        }
    }
}
