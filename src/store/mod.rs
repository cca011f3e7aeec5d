//! Persistence boundary for the roster and the telemetry time series.
//!
//! The engine talks to storage only through [`TelemetryStore`], which covers
//! the four operations it consumes from the surrounding application: roster
//! query, latest-sample query, batch insert, and age-based delete.

use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::appliances::{Appliance, TelemetrySample};
use crate::error::Result;

mod seed;

pub use seed::{SeedSummary, seed_roster};

/// Storage operations consumed by the simulation engine.
pub trait TelemetryStore: Send {
    /// All appliances with `active = true`, ordered by user then appliance id.
    fn active_appliances(&self) -> Result<Vec<Appliance>>;

    /// Most recent sample for `appliance_id`, if any.
    fn latest_sample(&self, appliance_id: i64) -> Result<Option<TelemetrySample>>;

    /// Inserts a batch as one atomic unit and returns the number of rows written.
    fn insert_samples(&mut self, samples: &[TelemetrySample]) -> Result<usize>;

    /// Deletes every sample with `timestamp < cutoff` and returns the count removed.
    fn delete_samples_before(&mut self, cutoff: NaiveDateTime) -> Result<usize>;
}

/// SQLite-backed store sharing the web application's database file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and ensures the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // `users` belongs to the account layer and may not exist in this file.
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn })
    }

    /// Registers an appliance the way the account CRUD surface does.
    pub fn insert_appliance(
        &self,
        user_id: i64,
        name: &str,
        type_tag: &str,
        power_rating: Option<f64>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO appliances (user_id, name, type, power_rating, is_active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![user_id, name, type_tag, power_rating],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Soft-deletes or restores an appliance.
    pub fn set_appliance_active(&self, appliance_id: i64, active: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE appliances SET is_active = ?1 WHERE id = ?2",
            params![active, appliance_id],
        )?;
        Ok(())
    }

    /// Newest-first samples for one appliance.
    pub fn recent_samples(&self, appliance_id: i64, limit: u32) -> Result<Vec<TelemetrySample>> {
        let mut stmt = self.conn.prepare(
            "SELECT appliance_id, user_id, is_on, temperature, power_consumption, timestamp
             FROM appliance_data WHERE appliance_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![appliance_id, limit], Self::map_sample)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Highest user id present in the roster, active or not.
    pub fn max_user_id(&self) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row("SELECT MAX(user_id) FROM appliances", [], |row| row.get(0))?;
        Ok(id)
    }

    /// Total number of stored samples.
    pub fn sample_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM appliance_data", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn map_sample(row: &Row<'_>) -> rusqlite::Result<TelemetrySample> {
        Ok(TelemetrySample {
            appliance_id: row.get(0)?,
            user_id: row.get(1)?,
            is_on: row.get(2)?,
            temperature: row.get(3)?,
            power_consumption: row.get(4)?,
            timestamp: row.get(5)?,
        })
    }
}

impl TelemetryStore for SqliteStore {
    fn active_appliances(&self) -> Result<Vec<Appliance>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, type, power_rating
             FROM appliances WHERE is_active = 1
             ORDER BY user_id, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Appliance {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                type_tag: row.get(3)?,
                power_rating: row.get(4)?,
                active: true,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn latest_sample(&self, appliance_id: i64) -> Result<Option<TelemetrySample>> {
        let sample = self
            .conn
            .query_row(
                "SELECT appliance_id, user_id, is_on, temperature, power_consumption, timestamp
                 FROM appliance_data WHERE appliance_id = ?1
                 ORDER BY timestamp DESC, id DESC LIMIT 1",
                params![appliance_id],
                Self::map_sample,
            )
            .optional()?;
        Ok(sample)
    }

    fn insert_samples(&mut self, samples: &[TelemetrySample]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO appliance_data
                 (appliance_id, user_id, is_on, temperature, power_consumption, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for s in samples {
                stmt.execute(params![
                    s.appliance_id,
                    s.user_id,
                    s.is_on,
                    s.temperature,
                    s.power_consumption,
                    s.timestamp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(samples.len())
    }

    fn delete_samples_before(&mut self, cutoff: NaiveDateTime) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM appliance_data WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }
}
