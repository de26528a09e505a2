use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use crate::macro_cycle::TargetSource;
use crate::models::{
    DATE_FORMAT, DatedTargets, DayTargets, MacroCycleConfig, MacroOverride, NewWeightEntry,
    PatternType, WeightEntry, validate_cycle_config, validate_day_targets,
};
use crate::trend;

const SCHEMA_VERSION: i64 = 2;

const WEIGHT_COLUMNS: &str =
    "id, uuid, date, weight_kg, trend_weight_kg, source, notes, created_at, updated_at";

const OVERRIDE_COLUMNS: &str = "id, uuid, date, calories, protein, carbs, fat, created_at";

const CYCLE_COLUMNS: &str =
    "enabled, pattern_type, marked_days, day_targets, locked_days, redistribution_start_day";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS weight_entries (
                    id INTEGER PRIMARY KEY,
                    uuid TEXT NOT NULL,
                    date TEXT NOT NULL UNIQUE,
                    weight_kg REAL NOT NULL,
                    trend_weight_kg REAL,
                    source TEXT NOT NULL DEFAULT 'manual',
                    notes TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS macro_cycle_config (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    enabled INTEGER NOT NULL DEFAULT 0,
                    pattern_type TEXT NOT NULL DEFAULT 'training_rest',
                    marked_days TEXT NOT NULL DEFAULT '[]',
                    day_targets TEXT NOT NULL DEFAULT '{}',
                    locked_days TEXT NOT NULL DEFAULT '[]',
                    redistribution_start_day INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS macro_cycle_overrides (
                    id INTEGER PRIMARY KEY,
                    uuid TEXT NOT NULL,
                    date TEXT NOT NULL UNIQUE,
                    calories INTEGER NOT NULL CHECK (calories >= 0),
                    protein REAL NOT NULL CHECK (protein >= 0),
                    carbs REAL NOT NULL CHECK (carbs >= 0),
                    fat REAL NOT NULL CHECK (fat >= 0),
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 2;",
            )?;
        }

        if version < SCHEMA_VERSION {
            info!(from = version, to = SCHEMA_VERSION, "migrated database schema");
        }
        Ok(())
    }

    // --- Row mapping helpers ---

    fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let raw: String = row.get(idx)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn weight_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightEntry> {
        Ok(WeightEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            date: Self::date_column(row, 2)?,
            weight_kg: row.get(3)?,
            trend_weight_kg: row.get(4)?,
            source: row.get(5)?,
            notes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn override_from_row(row: &rusqlite::Row) -> rusqlite::Result<MacroOverride> {
        Ok(MacroOverride {
            id: row.get(0)?,
            uuid: row.get(1)?,
            date: Self::date_column(row, 2)?,
            calories: row.get(3)?,
            protein: row.get(4)?,
            carbs: row.get(5)?,
            fat: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn cycle_config_from_row(row: &rusqlite::Row) -> rusqlite::Result<MacroCycleConfig> {
        let pattern: String = row.get(1)?;
        Ok(MacroCycleConfig {
            enabled: row.get(0)?,
            pattern_type: PatternType::from(pattern),
            marked_days: Self::json_column(row, 2)?,
            day_targets: Self::json_column(row, 3)?,
            locked_days: Self::json_column(row, 4)?,
            redistribution_start_day: row.get(5)?,
        })
    }

    // --- Weight Entries ---

    fn write_weight(conn: &Connection, entry: &NewWeightEntry) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let date_str = entry.date.format(DATE_FORMAT).to_string();
        conn.execute(
            "INSERT INTO weight_entries (uuid, date, weight_kg, source, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(date) DO UPDATE SET
                weight_kg = excluded.weight_kg,
                source = excluded.source,
                notes = excluded.notes,
                updated_at = excluded.updated_at",
            params![uuid, date_str, entry.weight_kg, entry.source, entry.notes, now, now],
        )?;
        Ok(())
    }

    fn query_weights(
        conn: &Connection,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<WeightEntry>> {
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {WEIGHT_COLUMNS} FROM weight_entries {clause}"))?;
        let entries = stmt
            .query_map(params, Self::weight_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Refold trend values from `from` (or the whole history) and write back
    /// the rewritten rows. Only the entry immediately before `from` is read as
    /// the seed unless it has no stored trend, in which case the whole history
    /// is loaded and refolded.
    fn refresh_trends(conn: &Connection, from: Option<NaiveDate>) -> Result<usize> {
        let full = || Self::query_weights(conn, "ORDER BY date ASC", params![]);

        let (entries, rewritten) = match from {
            None => {
                let mut entries = full()?;
                trend::compute_trend(&mut entries);
                let n = entries.len();
                (entries, n)
            }
            Some(start) => {
                let start_str = start.format(DATE_FORMAT).to_string();
                let seed = Self::query_weights(
                    conn,
                    "WHERE date < ?1 ORDER BY date DESC LIMIT 1",
                    params![start_str],
                )?
                .pop();
                let mut entries = match seed {
                    Some(prev) if prev.trend_weight_kg.is_none() => full()?,
                    seed => {
                        let mut window: Vec<WeightEntry> = seed.into_iter().collect();
                        window.extend(Self::query_weights(
                            conn,
                            "WHERE date >= ?1 ORDER BY date ASC",
                            params![start_str],
                        )?);
                        window
                    }
                };
                let n = trend::recompute_from(&mut entries, start);
                (entries, n)
            }
        };

        let mut stmt =
            conn.prepare_cached("UPDATE weight_entries SET trend_weight_kg = ?1 WHERE id = ?2")?;
        let skip = entries.len() - rewritten;
        for entry in entries.iter().skip(skip) {
            stmt.execute(params![entry.trend_weight_kg, entry.id])?;
        }
        debug!(?from, rewritten, "refreshed trend weights");
        Ok(rewritten)
    }

    /// Insert or replace the weigh-in for `entry.date` and refold the trend
    /// for that date and everything after it.
    pub fn upsert_weight(&self, entry: &NewWeightEntry) -> Result<WeightEntry> {
        let tx = self.conn.unchecked_transaction()?;
        Self::write_weight(&tx, entry)?;
        Self::refresh_trends(&tx, Some(entry.date))?;
        tx.commit()?;
        self.get_weight(entry.date)?
            .context("Weight entry not found after upsert")
    }

    /// Upsert a batch of weigh-ins and refold trends from the earliest date,
    /// all in one transaction. Returns the number of rows written.
    pub fn upsert_weights(&self, entries: &[NewWeightEntry]) -> Result<usize> {
        let Some(earliest) = entries.iter().map(|e| e.date).min() else {
            return Ok(0);
        };
        let tx = self.conn.unchecked_transaction()?;
        for entry in entries {
            Self::write_weight(&tx, entry)
                .with_context(|| format!("Failed to write weight for {}", entry.date))?;
        }
        Self::refresh_trends(&tx, Some(earliest))?;
        tx.commit()?;
        Ok(entries.len())
    }

    pub fn get_weight(&self, date: NaiveDate) -> Result<Option<WeightEntry>> {
        let date_str = date.format(DATE_FORMAT).to_string();
        Ok(Self::query_weights(&self.conn, "WHERE date = ?1", params![date_str])?
            .into_iter()
            .next())
    }

    pub fn get_weight_by_id(&self, id: i64) -> Result<Option<WeightEntry>> {
        Ok(Self::query_weights(&self.conn, "WHERE id = ?1", params![id])?
            .into_iter()
            .next())
    }

    /// Most recent first. `days` limits the number of entries returned.
    pub fn get_weight_history(&self, days: Option<i64>) -> Result<Vec<WeightEntry>> {
        Self::query_weights(
            &self.conn,
            "ORDER BY date DESC LIMIT ?1",
            params![days.unwrap_or(-1)],
        )
    }

    pub fn delete_weight(&self, id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let date = Self::query_weights(&tx, "WHERE id = ?1", params![id])?
            .pop()
            .map(|e| e.date);
        let Some(date) = date else {
            bail!("Weight entry not found");
        };
        tx.execute("DELETE FROM weight_entries WHERE id = ?1", params![id])?;
        Self::refresh_trends(&tx, Some(date))?;
        tx.commit()?;
        Ok(())
    }

    /// Recompute stored trend values, from `from` onward or for the whole
    /// history, as one atomic unit. Returns the number of entries rewritten.
    pub fn recompute_trends(&self, from: Option<NaiveDate>) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let rewritten = Self::refresh_trends(&tx, from)?;
        tx.commit()?;
        info!(?from, rewritten, "recomputed trend weights");
        Ok(rewritten)
    }

    // --- Macro cycle config ---

    pub fn get_cycle_config(&self) -> Result<Option<MacroCycleConfig>> {
        let config = self
            .conn
            .query_row(
                &format!("SELECT {CYCLE_COLUMNS} FROM macro_cycle_config WHERE id = 1"),
                [],
                Self::cycle_config_from_row,
            )
            .optional()?;
        Ok(config)
    }

    pub fn get_or_create_cycle_config(&self) -> Result<MacroCycleConfig> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO macro_cycle_config (id, updated_at) VALUES (1, ?1)",
            params![now],
        )?;
        self.get_cycle_config()?
            .context("Cycle config not found after create")
    }

    pub fn save_cycle_config(&self, config: &MacroCycleConfig) -> Result<MacroCycleConfig> {
        validate_cycle_config(config)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO macro_cycle_config
                (id, enabled, pattern_type, marked_days, day_targets, locked_days,
                 redistribution_start_day, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                pattern_type = excluded.pattern_type,
                marked_days = excluded.marked_days,
                day_targets = excluded.day_targets,
                locked_days = excluded.locked_days,
                redistribution_start_day = excluded.redistribution_start_day,
                updated_at = excluded.updated_at",
            params![
                config.enabled,
                config.pattern_type.as_str(),
                serde_json::to_string(&config.marked_days)?,
                serde_json::to_string(&config.day_targets)?,
                serde_json::to_string(&config.locked_days)?,
                config.redistribution_start_day,
                now,
            ],
        )?;
        self.get_cycle_config()?
            .context("Cycle config not found after save")
    }

    // --- Macro overrides ---

    fn delete_override_row(conn: &Connection, date: NaiveDate) -> Result<usize> {
        let rows = conn.execute(
            "DELETE FROM macro_cycle_overrides WHERE date = ?1",
            params![date.format(DATE_FORMAT).to_string()],
        )?;
        Ok(rows)
    }

    fn insert_override_row(conn: &Connection, date: NaiveDate, targets: &DayTargets) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO macro_cycle_overrides (uuid, date, calories, protein, carbs, fat, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid,
                date.format(DATE_FORMAT).to_string(),
                targets.calories,
                targets.protein,
                targets.carbs,
                targets.fat,
                now
            ],
        )?;
        Ok(())
    }

    pub fn get_override(&self, date: NaiveDate) -> Result<Option<MacroOverride>> {
        let date_str = date.format(DATE_FORMAT).to_string();
        let o = self
            .conn
            .query_row(
                &format!("SELECT {OVERRIDE_COLUMNS} FROM macro_cycle_overrides WHERE date = ?1"),
                params![date_str],
                Self::override_from_row,
            )
            .optional()?;
        Ok(o)
    }

    /// Replace any override for `date` with a new row.
    pub fn set_override(&self, date: NaiveDate, targets: &DayTargets) -> Result<MacroOverride> {
        validate_day_targets(targets)?;
        let tx = self.conn.unchecked_transaction()?;
        Self::delete_override_row(&tx, date)?;
        Self::insert_override_row(&tx, date, targets)?;
        tx.commit()?;
        self.get_override(date)?
            .context("Override not found after insert")
    }

    pub fn clear_override(&self, date: NaiveDate) -> Result<bool> {
        Ok(Self::delete_override_row(&self.conn, date)? > 0)
    }

    /// Overrides ordered by date, optionally only those on or after `from`.
    pub fn list_overrides(&self, from: Option<NaiveDate>) -> Result<Vec<MacroOverride>> {
        let base = format!("SELECT {OVERRIDE_COLUMNS} FROM macro_cycle_overrides");
        let overrides = match from {
            Some(date) => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{base} WHERE date >= ?1 ORDER BY date"))?;
                stmt.query_map(
                    params![date.format(DATE_FORMAT).to_string()],
                    Self::override_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!("{base} ORDER BY date"))?;
                stmt.query_map([], Self::override_from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(overrides)
    }

    /// Replace the overrides for every date in `items` as a single unit.
    ///
    /// Every existing row for an input date is deleted first, then one row is
    /// inserted per item, so a date repeated in `items` violates the unique
    /// constraint. If any row fails to write, nothing from the batch is
    /// persisted and the previous overrides for those dates remain.
    pub fn save_redistribution_overrides(&self, items: &[DatedTargets]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for item in items {
            Self::delete_override_row(&tx, item.date)?;
        }
        for item in items {
            Self::insert_override_row(&tx, item.date, &item.targets)
                .with_context(|| format!("Failed to save override for {}", item.date))?;
        }
        tx.commit()?;
        info!(count = items.len(), "saved redistribution overrides");
        Ok(items.len())
    }

    // --- User Settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM user_settings WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM user_settings WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}

impl TargetSource for Database {
    fn override_for(&self, date: NaiveDate) -> Result<Option<MacroOverride>> {
        self.get_override(date)
    }

    fn cycle_config(&self) -> Result<Option<MacroCycleConfig>> {
        self.get_cycle_config()
    }
}
