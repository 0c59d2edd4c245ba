//! SQLite sink using sqlx
//!
//! Table layout matches the dashboard's existing database: `mqtt_messages`,
//! `"room-data"`, `rf_data` and `probe_requests`, each keyed by a local
//! `datetime` column.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::{
    PersistenceError, PersistenceSink, ProbeSightingRow, RawMessageRow, RfTransmissionRow,
    RoomReadingRow,
};

const SCHEMA: [(&str, &str); 4] = [
    (
        "mqtt_messages",
        r#"CREATE TABLE IF NOT EXISTS mqtt_messages (
            datetime TEXT NOT NULL,
            topic TEXT NOT NULL,
            payload TEXT NOT NULL
        )"#,
    ),
    (
        "room-data",
        r#"CREATE TABLE IF NOT EXISTS "room-data" (
            datetime TEXT NOT NULL,
            temperature REAL NOT NULL,
            humidity REAL NOT NULL,
            brightness REAL NOT NULL,
            pressure REAL NOT NULL
        )"#,
    ),
    (
        "rf_data",
        r#"CREATE TABLE IF NOT EXISTS rf_data (
            datetime TEXT NOT NULL,
            decimal INTEGER NOT NULL,
            bits INTEGER NOT NULL,
            binary TEXT NOT NULL,
            pulse_length INTEGER NOT NULL,
            protocol INTEGER NOT NULL
        )"#,
    ),
    (
        "probe_requests",
        r#"CREATE TABLE IF NOT EXISTS probe_requests (
            datetime TEXT NOT NULL,
            macaddress TEXT NOT NULL,
            make TEXT NOT NULL,
            ssid TEXT NOT NULL,
            ssid_upper TEXT NOT NULL,
            rssi INTEGER NOT NULL
        )"#,
    ),
];

#[derive(Debug)]
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Opens `path`, or a private in-memory database for `:memory:`
    pub async fn new(path: &str) -> Result<Self, PersistenceError> {
        let in_memory = path == ":memory:";
        let options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| PersistenceError::connection("invalid SQLite URL", e))?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        }
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

        // every connection to :memory: is a fresh database, so keep exactly one alive
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(2)
                .idle_timeout(Duration::from_secs(600))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| PersistenceError::connection("failed to open SQLite database", e))?;

        Ok(Self { pool })
    }

    /// Creates the tables if they do not exist yet
    pub async fn initialize(&self) -> Result<(), PersistenceError> {
        for (table, statement) in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| PersistenceError::schema(format!("failed to create {}", table), e))?;
        }
        debug!("SQLite schema ready");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PersistenceSink for SqliteSink {
    async fn append_raw_message(&self, row: RawMessageRow) -> Result<(), PersistenceError> {
        sqlx::query("INSERT INTO mqtt_messages (datetime, topic, payload) VALUES (?, ?, ?)")
            .bind(row.time)
            .bind(row.topic)
            .bind(row.payload)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::write("failed to insert into mqtt_messages", e))?;
        Ok(())
    }

    async fn append_room_reading(&self, row: RoomReadingRow) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"INSERT INTO "room-data" (datetime, temperature, humidity, brightness, pressure)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(row.time)
        .bind(row.temperature)
        .bind(row.humidity)
        .bind(row.brightness)
        .bind(row.pressure)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::write("failed to insert into room-data", e))?;
        Ok(())
    }

    async fn append_rf_transmission(
        &self,
        row: RfTransmissionRow,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"INSERT INTO rf_data (datetime, decimal, bits, binary, pulse_length, protocol)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(row.time)
        .bind(row.decimal as i64)
        .bind(row.bits)
        .bind(row.binary)
        .bind(row.pulse_length)
        .bind(row.protocol)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::write("failed to insert into rf_data", e))?;
        Ok(())
    }

    async fn append_probe_sighting(
        &self,
        row: ProbeSightingRow,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"INSERT INTO probe_requests (datetime, macaddress, make, ssid, ssid_upper, rssi)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(row.time)
        .bind(row.mac)
        .bind(row.vendor)
        .bind(row.ssid)
        .bind(row.ssid_uppercase)
        .bind(row.rssi)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::write("failed to insert into probe_requests", e))?;
        Ok(())
    }
}
