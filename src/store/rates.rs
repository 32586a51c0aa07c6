//! Persistence of the latest rate table and its history log.

use super::{read_json, write_json_atomic};
use crate::core::error::StoreError;
use crate::core::rate::{RateHistoryRecord, RateTable};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CACHE_FILE: &str = "rates.json";
pub const HISTORY_FILE: &str = "exchange_rates.jsonl";

/// Owns the rate cache file (latest table) and the append-only history file.
#[derive(Debug, Clone)]
pub struct RateStore {
    cache_path: PathBuf,
    history_path: PathBuf,
}

impl RateStore {
    pub fn new(cache_path: impl Into<PathBuf>, history_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            history_path: history_path.into(),
        }
    }

    /// Store using the default file names under `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(CACHE_FILE), data_dir.join(HISTORY_FILE))
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// The latest committed table; empty when nothing was committed yet.
    pub fn read_cache(&self) -> Result<RateTable, StoreError> {
        Ok(read_json(&self.cache_path)?.unwrap_or_default())
    }

    /// All history records in append order. Malformed lines are skipped.
    pub fn read_history(&self) -> Result<Vec<RateHistoryRecord>, StoreError> {
        let file = match std::fs::File::open(&self.history_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::ReadFailed {
                    path: self.history_path.clone(),
                    source,
                });
            }
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| StoreError::ReadFailed {
                path: self.history_path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RateHistoryRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping malformed history record at {}:{}: {}",
                    self.history_path.display(),
                    index + 1,
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Replaces the cache with `table` and appends one history record.
    ///
    /// Empty tables are rejected without touching either file. The two writes
    /// are independent: a failed one does not undo or skip the other, and the
    /// first failure is returned.
    pub fn commit(&self, table: &RateTable) -> Result<(), StoreError> {
        if table.is_empty() {
            return Err(StoreError::EmptyTable);
        }

        let cache_result = write_json_atomic(&self.cache_path, table);
        if let Err(e) = &cache_result {
            warn!("Rate cache write failed: {}", e);
        }

        // Not truncated: records committed within one second must stay distinct
        let record = RateHistoryRecord {
            fetched_at: Utc::now(),
            rates: table.clone(),
        };
        let history_result = self.append_history(&record);
        if let Err(e) = &history_result {
            warn!("Rate history append failed: {}", e);
        }

        if cache_result.is_ok() && history_result.is_ok() {
            info!(
                "Committed {} rates to {}",
                table.len(),
                self.cache_path.display()
            );
        }
        cache_result.and(history_result)
    }

    fn append_history(&self, record: &RateHistoryRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let write_failed = |source| StoreError::WriteFailed {
            path: self.history_path.clone(),
            source,
        };
        if let Some(dir) = self.history_path.parent() {
            std::fs::create_dir_all(dir).map_err(write_failed)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .map_err(write_failed)?;
        file.write_all(&line).map_err(write_failed)?;
        debug!("Appended history record {}", record.fetched_at);
        Ok(())
    }
}
