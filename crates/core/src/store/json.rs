//! JSON file store in the legacy on-disk layout.
//!
//! Companies live in `creditDB.json` and transactions in
//! `transactions.json`, each a pretty-printed JSON array. Writes go to a
//! temporary file in the same directory which is then renamed over the
//! target, so readers never observe a half-written collection.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{CompanyStore, TransactionStore};
use crate::errors::StorageError;
use crate::models::{Company, Transaction};

pub const COMPANIES_FILE: &str = "creditDB.json";
pub const TRANSACTIONS_FILE: &str = "transactions.json";

/// Company and transaction store backed by two JSON files.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    companies_path: PathBuf,
    transactions_path: PathBuf,
}

impl JsonFileStore {
    /// Use the default file names inside `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self::with_paths(dir.join(COMPANIES_FILE), dir.join(TRANSACTIONS_FILE))
    }

    pub fn with_paths(companies_path: PathBuf, transactions_path: PathBuf) -> Self {
        Self {
            companies_path,
            transactions_path,
        }
    }

    pub fn companies_path(&self) -> &Path {
        &self.companies_path
    }

    pub fn transactions_path(&self) -> &Path {
        &self.transactions_path
    }
}

impl CompanyStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<Company>, StorageError> {
        read_collection(&self.companies_path)
    }

    fn save_all(&self, companies: &[Company]) -> Result<(), StorageError> {
        write_collection(&self.companies_path, companies)
    }
}

impl TransactionStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<Transaction>, StorageError> {
        read_collection(&self.transactions_path)
    }

    fn save_all(&self, transactions: &[Transaction]) -> Result<(), StorageError> {
        write_collection(&self.transactions_path, transactions)
    }
}

/// Read a JSON array from `path`. A missing file is an empty collection.
pub fn read_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    if !path.exists() {
        debug!(path = %path.display(), "store file missing, treating as empty");
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&contents).map_err(|e| StorageError::Json {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}

fn write_collection<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StorageError> {
    let encoded = serde_json::to_string_pretty(items).map_err(|e| StorageError::Json {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(encoded.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::IoError(e.error))?;

    debug!(path = %path.display(), count = items.len(), "wrote store file");
    Ok(())
}
