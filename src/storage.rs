// src/storage.rs
use crate::ledger::TransactionLedger;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StorageError(String);

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StorageError {}

impl From<String> for StorageError {
    fn from(s: String) -> Self {
        StorageError(s)
    }
}

impl From<&str> for StorageError {
    fn from(s: &str) -> Self {
        StorageError(s.to_string())
    }
}

const LEDGER_FILE: &str = "transactions.json";
#[cfg(feature = "web")]
const LEDGER_KEY: &str = "transactions";

// Get the storage directory for the current platform
fn get_storage_dir() -> PathBuf {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home_dir).join(".staker_dashboard")
}

pub fn save_ledger_to(dir: &Path, ledger: &TransactionLedger) -> Result<(), StorageError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create storage directory {}: {}", dir.display(), e))?;

    let path = dir.join(LEDGER_FILE);
    let serialized = serde_json::to_string_pretty(ledger)
        .map_err(|e| format!("Failed to serialize transactions: {}", e))?;
    std::fs::write(&path, serialized)
        .map_err(|e| format!("Failed to write transactions to {}: {}", path.display(), e))?;

    log::info!("Transactions saved to: {}", path.display());
    Ok(())
}

/// A missing file is an empty ledger
pub fn load_ledger_from(dir: &Path) -> Result<TransactionLedger, StorageError> {
    let path = dir.join(LEDGER_FILE);
    match std::fs::read_to_string(&path) {
        Ok(data) => serde_json::from_str(&data)
            .map_err(|e| StorageError::from(format!("Failed to parse transactions from {}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("Transactions file doesn't exist yet: {}", path.display());
            Ok(TransactionLedger::new())
        }
        Err(e) => Err(StorageError::from(format!("Failed to read transactions from {}: {}", path.display(), e))),
    }
}

pub fn save_ledger(ledger: &TransactionLedger) -> Result<(), StorageError> {
    #[cfg(feature = "web")]
    {
        let storage = web_sys::window()
            .and_then(|window| window.local_storage().ok().flatten())
            .ok_or_else(|| StorageError::from("localStorage is unavailable"))?;
        let serialized = serde_json::to_string(ledger)
            .map_err(|e| format!("Failed to serialize transactions: {}", e))?;
        storage
            .set_item(LEDGER_KEY, &serialized)
            .map_err(|e| StorageError::from(format!("Failed to write localStorage: {:?}", e)))?;
        log::info!("Transactions saved to web storage");
        Ok(())
    }

    #[cfg(not(feature = "web"))]
    {
        save_ledger_to(&get_storage_dir(), ledger)
    }
}

pub fn load_ledger() -> Result<TransactionLedger, StorageError> {
    #[cfg(feature = "web")]
    {
        let storage = web_sys::window()
            .and_then(|window| window.local_storage().ok().flatten())
            .ok_or_else(|| StorageError::from("localStorage is unavailable"))?;
        match storage.get_item(LEDGER_KEY) {
            Ok(Some(data)) => serde_json::from_str(&data)
                .map_err(|e| StorageError::from(format!("Failed to parse stored transactions: {}", e))),
            Ok(None) => Ok(TransactionLedger::new()),
            Err(e) => Err(StorageError::from(format!("Failed to read localStorage: {:?}", e))),
        }
    }

    #[cfg(not(feature = "web"))]
    {
        load_ledger_from(&get_storage_dir())
    }
}
