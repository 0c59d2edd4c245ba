//! # Persistence Module
//!
//! ## Why This Module Exists
//! Every accepted message ends up in durable storage: the raw message always,
//! plus one decoded row for room readings, RF transmissions and probe
//! sightings. The dashboard reads these tables; the hub only appends.
//!
//! ## Key Abstractions
//! - **PersistenceSink**: the four append operations the message loop depends on
//! - **Row types**: one plain struct per table, timestamped by the caller
//! - **Backends**: [`SqliteSink`] for deployments, [`MemorySink`] for dry runs and tests
//!
//! ## Error Handling Strategy
//! Each call is its own write and can fail on its own with a
//! [`PersistenceError`]. The loop logs the failure and continues; rows are
//! not retried, so a redelivered message may be stored twice.

pub mod error;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::info;

pub use error::PersistenceError;
pub use memory::MemorySink;
pub use sqlite::SqliteSink;

use crate::config::{StorageBackend, StorageConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RawMessageRow {
    pub time: NaiveDateTime,
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomReadingRow {
    pub time: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub brightness: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfTransmissionRow {
    pub time: NaiveDateTime,
    pub decimal: u64,
    pub bits: u32,
    pub binary: String,
    pub pulse_length: u32,
    pub protocol: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSightingRow {
    pub time: NaiveDateTime,
    pub mac: String,
    pub vendor: String,
    pub ssid: String,
    pub ssid_uppercase: String,
    pub rssi: i64,
}

/// Append-only storage the message loop writes to.
///
/// Calls are awaited one at a time by the loop; each stores exactly one row.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn append_raw_message(&self, row: RawMessageRow) -> Result<(), PersistenceError>;
    async fn append_room_reading(&self, row: RoomReadingRow) -> Result<(), PersistenceError>;
    async fn append_rf_transmission(
        &self,
        row: RfTransmissionRow,
    ) -> Result<(), PersistenceError>;
    async fn append_probe_sighting(&self, row: ProbeSightingRow)
        -> Result<(), PersistenceError>;
}

/// Opens the configured backend, creating tables where needed
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn PersistenceSink>, PersistenceError> {
    match config.backend {
        StorageBackend::Sqlite => {
            let sink = SqliteSink::new(&config.path).await?;
            sink.initialize().await?;
            info!("Persisting to SQLite database {}", config.path);
            Ok(Arc::new(sink))
        }
        StorageBackend::Memory => {
            info!("Persisting to memory only; rows are lost on exit");
            Ok(Arc::new(MemorySink::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_builds_each_backend() {
        let memory = StorageConfig {
            backend: StorageBackend::Memory,
            path: String::new(),
        };
        assert!(open(&memory).await.is_ok());

        let sqlite = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: ":memory:".to_string(),
        };
        let sink = open(&sqlite).await.unwrap();
        sink.append_raw_message(RawMessageRow {
            time: chrono::Local::now().naive_local(),
            topic: "room/data".to_string(),
            payload: "{}".to_string(),
        })
        .await
        .unwrap();
    }
}
