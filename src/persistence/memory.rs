//! In-memory sink

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    PersistenceError, PersistenceSink, ProbeSightingRow, RawMessageRow, RfTransmissionRow,
    RoomReadingRow,
};

#[derive(Debug, Default)]
struct Tables {
    raw: Vec<RawMessageRow>,
    room: Vec<RoomReadingRow>,
    rf: Vec<RfTransmissionRow>,
    probes: Vec<ProbeSightingRow>,
}

/// Keeps rows in process memory. Can be switched to reject every write.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<Tables>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PersistenceError::Unavailable(
                "memory sink set to fail".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub async fn raw_messages(&self) -> Vec<RawMessageRow> {
        self.tables.lock().await.raw.clone()
    }

    pub async fn room_readings(&self) -> Vec<RoomReadingRow> {
        self.tables.lock().await.room.clone()
    }

    pub async fn rf_transmissions(&self) -> Vec<RfTransmissionRow> {
        self.tables.lock().await.rf.clone()
    }

    pub async fn probe_sightings(&self) -> Vec<ProbeSightingRow> {
        self.tables.lock().await.probes.clone()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn append_raw_message(&self, row: RawMessageRow) -> Result<(), PersistenceError> {
        self.check()?;
        self.tables.lock().await.raw.push(row);
        Ok(())
    }

    async fn append_room_reading(&self, row: RoomReadingRow) -> Result<(), PersistenceError> {
        self.check()?;
        self.tables.lock().await.room.push(row);
        Ok(())
    }

    async fn append_rf_transmission(
        &self,
        row: RfTransmissionRow,
    ) -> Result<(), PersistenceError> {
        self.check()?;
        self.tables.lock().await.rf.push(row);
        Ok(())
    }

    async fn append_probe_sighting(
        &self,
        row: ProbeSightingRow,
    ) -> Result<(), PersistenceError> {
        self.check()?;
        self.tables.lock().await.probes.push(row);
        Ok(())
    }
}
