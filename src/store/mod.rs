//! Persistent document store (spec §6).
//!
//! The spec's external interface names this a Mongo-style keyed-collection
//! store with per-collection TTL. The teacher pack has no MongoDB driver
//! anywhere; `rusqlite` is its only persistence crate (see
//! `signals/db_storage.rs`). This module backs every named collection with a
//! `rusqlite` table, preserving the composite keys and TTLs verbatim (see
//! DESIGN.md Open Question #1).

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::domain::{Candle, Position, Tag, Trader, Window, WindowPerformance};
use crate::error::{PipelineError, Result};
use crate::events::PositionRawPayload;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS tracked_traders (
    eth TEXT PRIMARY KEY,
    display_name TEXT,
    score REAL NOT NULL,
    tags_json TEXT NOT NULL,
    active INTEGER NOT NULL,
    added_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    account_value REAL NOT NULL,
    window_json TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_tracked_traders_score ON tracked_traders(score DESC);
CREATE INDEX IF NOT EXISTS idx_tracked_traders_active ON tracked_traders(active);

CREATE TABLE IF NOT EXISTS trader_positions (
    eth TEXT NOT NULL,
    coin TEXT NOT NULL,
    t INTEGER NOT NULL,
    szi REAL NOT NULL,
    ep REAL NOT NULL,
    mp REAL NOT NULL,
    upnl REAL NOT NULL,
    lev INTEGER NOT NULL,
    liquidation_price REAL,
    position_value REAL NOT NULL,
    PRIMARY KEY (eth, coin, t)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS trader_scores (
    eth TEXT NOT NULL,
    t INTEGER NOT NULL,
    score REAL NOT NULL,
    PRIMARY KEY (eth, t)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS candles (
    symbol TEXT NOT NULL,
    interval TEXT NOT NULL,
    t INTEGER NOT NULL,
    o REAL NOT NULL,
    h REAL NOT NULL,
    l REAL NOT NULL,
    c REAL NOT NULL,
    v REAL NOT NULL,
    PRIMARY KEY (symbol, interval, t)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS signals (
    symbol TEXT NOT NULL,
    t INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    PRIMARY KEY (symbol, t)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS trader_signals (
    eth TEXT NOT NULL,
    t INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    PRIMARY KEY (eth, t)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS leaderboard_history (
    t INTEGER PRIMARY KEY,
    payload_json TEXT NOT NULL
) WITHOUT ROWID;
"#;

/// The collection names fixed by spec §6, used for TTL sweeps.
pub struct Retention {
    pub positions_days: i64,
    pub scores_days: i64,
    pub candles_days: i64,
    pub signals_days: i64,
    pub leaderboard_days: i64,
}

impl From<&StorageConfig> for Retention {
    fn from(c: &StorageConfig) -> Self {
        Self {
            positions_days: c.retention_positions_days,
            scores_days: c.retention_scores_days,
            candles_days: c.retention_candles_days,
            signals_days: c.retention_signals_days,
            leaderboard_days: c.retention_leaderboard_days,
        }
    }
}

/// The Scraper's exclusive store: tracked traders, positions, candles,
/// scores, signals, leaderboard history (spec §3 Ownership).
pub struct DocumentStore {
    conn: Mutex<Connection>,
    retention: Retention,
}

fn sqlite_path_from_url(url: &str) -> String {
    url.strip_prefix("sqlite://").unwrap_or(url).to_string()
}

impl DocumentStore {
    pub fn open(storage: &StorageConfig) -> Result<Self> {
        let path = sqlite_path_from_url(&storage.mongo_url);
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&path, flags)
            .map_err(|e| PipelineError::Storage(format!("open {path}: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!(path = %path, "document store initialized");
        Ok(Self {
            conn: Mutex::new(conn),
            retention: Retention::from(storage),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retention: Retention {
                positions_days: 30,
                scores_days: 90,
                candles_days: 30,
                signals_days: 30,
                leaderboard_days: 90,
            },
        })
    }

    // -- tracked_traders ---------------------------------------------------

    pub fn upsert_trader(&self, trader: &Trader) -> Result<()> {
        let tags_json = serde_json::to_string(&trader.tags)?;
        let window_json = serde_json::to_string(&trader.window_performance)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tracked_traders
                (eth, display_name, score, tags_json, active, added_at, updated_at, account_value, window_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(eth) DO UPDATE SET
                display_name = excluded.display_name,
                score = excluded.score,
                tags_json = excluded.tags_json,
                active = excluded.active,
                updated_at = excluded.updated_at,
                account_value = excluded.account_value,
                window_json = excluded.window_json",
            params![
                trader.eth,
                trader.display_name,
                trader.score,
                tags_json,
                trader.active as i64,
                trader.added_at,
                trader.updated_at,
                trader.account_value,
                window_json,
            ],
        )?;
        Ok(())
    }

    /// Mark a trader inactive while retaining its row (spec §4.2 delta
    /// semantics: removals persist `active=false` but retain history).
    pub fn deactivate_trader(&self, eth: &str, updated_at: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE tracked_traders SET active = 0, updated_at = ?2 WHERE eth = ?1",
            params![eth, updated_at],
        )?;
        Ok(())
    }

    /// Appends one historical `(eth, t)` score snapshot (spec §6
    /// `trader_scores`, 90-day TTL), called once per ranked row on every
    /// leaderboard refresh.
    pub fn store_score(&self, eth: &str, t: i64, score: f64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO trader_scores (eth, t, score) VALUES (?1, ?2, ?3)",
            params![eth, t, score],
        )?;
        Ok(())
    }

    pub fn get_trader(&self, eth: &str) -> Result<Option<Trader>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT eth, display_name, score, tags_json, active, added_at, updated_at, account_value, window_json
                 FROM tracked_traders WHERE eth = ?1",
                params![eth],
                Self::row_to_trader,
            )
            .ok();
        Ok(row)
    }

    pub fn active_traders(&self) -> Result<Vec<Trader>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT eth, display_name, score, tags_json, active, added_at, updated_at, account_value, window_json
             FROM tracked_traders WHERE active = 1 ORDER BY score DESC",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_trader)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn row_to_trader(row: &rusqlite::Row) -> rusqlite::Result<Trader> {
        let tags_json: String = row.get(3)?;
        let window_json: String = row.get(8)?;
        let tags: Vec<Tag> = serde_json::from_str(&tags_json).unwrap_or_default();
        let window_performance: std::collections::HashMap<Window, WindowPerformance> =
            serde_json::from_str(&window_json).unwrap_or_default();
        Ok(Trader {
            eth: row.get(0)?,
            display_name: row.get(1)?,
            score: row.get(2)?,
            tags,
            active: row.get::<_, i64>(4)? != 0,
            added_at: row.get(5)?,
            updated_at: row.get(6)?,
            account_value: row.get(7)?,
            window_performance,
        })
    }

    // -- trader_positions ----------------------------------------------------

    pub fn upsert_position(&self, p: &PositionRawPayload) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO trader_positions
                (eth, coin, t, szi, ep, mp, upnl, lev, liquidation_price, position_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)",
            params![
                p.address,
                p.coin,
                p.t,
                p.szi,
                p.ep,
                p.mp,
                p.upnl,
                p.lev,
                p.szi.abs() * p.mp,
            ],
        )?;
        Ok(())
    }

    /// Last persisted `(szi, lev, ep)` for the event-driven dedup (spec
    /// §4.1), independent of the in-memory session state so a freshly
    /// restarted manager still dedups correctly.
    pub fn last_position_key(&self, eth: &str, coin: &str) -> Result<Option<(f64, u32, f64)>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT szi, lev, ep FROM trader_positions
                 WHERE eth = ?1 AND coin = ?2 ORDER BY t DESC LIMIT 1",
                params![eth, coin],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .ok();
        Ok(row)
    }

    /// Latest persisted snapshot per `(eth, coin)`, used by the bootstrap
    /// snapshot endpoint (spec §4.3) to catch up a freshly started Signal
    /// System.
    pub fn latest_positions(&self) -> Result<Vec<Position>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT p.eth, p.coin, p.szi, p.ep, p.mp, p.upnl, p.lev, p.liquidation_price, p.position_value, p.t
             FROM trader_positions p
             INNER JOIN (
                 SELECT eth, coin, MAX(t) AS max_t FROM trader_positions GROUP BY eth, coin
             ) latest ON p.eth = latest.eth AND p.coin = latest.coin AND p.t = latest.max_t",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Position {
                    eth: row.get(0)?,
                    coin: row.get(1)?,
                    szi: row.get(2)?,
                    ep: row.get(3)?,
                    mp: row.get(4)?,
                    upnl: row.get(5)?,
                    lev: row.get(6)?,
                    liquidation_price: row.get(7)?,
                    position_value: row.get(8)?,
                    t: row.get(9)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // -- candles ---------------------------------------------------------

    pub fn upsert_candle(&self, symbol: &str, interval: &str, candle: &Candle) -> Result<()> {
        let conn = self.conn.lock();
        let existing: Option<Candle> = conn
            .query_row(
                "SELECT t, o, h, l, c, v FROM candles WHERE symbol = ?1 AND interval = ?2 AND t = ?3",
                params![symbol, interval, candle.t],
                |row| {
                    Ok(Candle {
                        t: row.get(0)?,
                        o: row.get(1)?,
                        h: row.get(2)?,
                        l: row.get(3)?,
                        c: row.get(4)?,
                        v: row.get(5)?,
                    })
                },
            )
            .ok();

        let merged = match existing {
            Some(prev) => prev.merge(candle),
            None => *candle,
        };

        conn.execute(
            "INSERT OR REPLACE INTO candles (symbol, interval, t, o, h, l, c, v)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![symbol, interval, merged.t, merged.o, merged.h, merged.l, merged.c, merged.v],
        )?;
        Ok(())
    }

    pub fn latest_candle(&self, symbol: &str, interval: &str, t: i64) -> Result<Option<Candle>> {
        let conn = self.conn.lock();
        let candle = conn
            .query_row(
                "SELECT t, o, h, l, c, v FROM candles WHERE symbol = ?1 AND interval = ?2 AND t = ?3",
                params![symbol, interval, t],
                |row| {
                    Ok(Candle {
                        t: row.get(0)?,
                        o: row.get(1)?,
                        h: row.get(2)?,
                        l: row.get(3)?,
                        c: row.get(4)?,
                        v: row.get(5)?,
                    })
                },
            )
            .ok();
        Ok(candle)
    }

    // -- signals / trader_signals / leaderboard_history --------------------

    pub fn store_signal<T: serde::Serialize>(&self, symbol: &str, t: i64, payload: &T) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO signals (symbol, t, payload_json) VALUES (?1, ?2, ?3)",
            params![symbol, t, json],
        )?;
        Ok(())
    }

    pub fn store_trader_signal<T: serde::Serialize>(&self, eth: &str, t: i64, payload: &T) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO trader_signals (eth, t, payload_json) VALUES (?1, ?2, ?3)",
            params![eth, t, json],
        )?;
        Ok(())
    }

    pub fn archive_leaderboard(&self, t: i64, payload_json: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO leaderboard_history (t, payload_json) VALUES (?1, ?2)",
            params![t, payload_json],
        )?;
        Ok(())
    }

    /// TTL sweep over every collection, invoked on the scheduler tick
    /// (spec §6 per-collection retention).
    pub fn prune_expired(&self, now: i64) -> Result<()> {
        let conn = self.conn.lock();
        let day = 86_400;
        let cutoffs = [
            ("trader_positions", now - self.retention.positions_days * day),
            ("trader_scores", now - self.retention.scores_days * day),
            ("candles", now - self.retention.candles_days * day),
            ("signals", now - self.retention.signals_days * day),
            ("trader_signals", now - self.retention.signals_days * day),
            ("leaderboard_history", now - self.retention.leaderboard_days * day),
        ];
        for (table, cutoff) in cutoffs {
            let deleted = conn
                .execute(&format!("DELETE FROM {table} WHERE t < ?1"), params![cutoff])
                .unwrap_or_else(|e| {
                    warn!("prune {table} failed: {e}");
                    0
                });
            if deleted > 0 {
                info!(table, deleted, "ttl sweep pruned rows");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_trader(eth: &str, score: f64, active: bool) -> Trader {
        Trader {
            eth: eth.to_string(),
            display_name: None,
            score,
            tags: vec![Tag::Whale],
            active,
            added_at: 0,
            updated_at: 0,
            account_value: 15_000_000.0,
            window_performance: HashMap::new(),
        }
    }

    #[test]
    fn upsert_and_fetch_trader_roundtrips() {
        let store = DocumentStore::open_in_memory().unwrap();
        let t = sample_trader("0x1111111111111111111111111111111111111111", 91.5, true);
        store.upsert_trader(&t).unwrap();
        let fetched = store.get_trader(&t.eth).unwrap().unwrap();
        assert_eq!(fetched.score, 91.5);
        assert_eq!(fetched.tags, vec![Tag::Whale]);
    }

    #[test]
    fn deactivate_retains_history() {
        let store = DocumentStore::open_in_memory().unwrap();
        let t = sample_trader("0x2222222222222222222222222222222222222222", 40.0, true);
        store.upsert_trader(&t).unwrap();
        store.deactivate_trader(&t.eth, 100).unwrap();
        let fetched = store.get_trader(&t.eth).unwrap().unwrap();
        assert!(!fetched.active);
        assert_eq!(fetched.score, 40.0);
    }

    #[test]
    fn active_traders_excludes_inactive() {
        let store = DocumentStore::open_in_memory().unwrap();
        store
            .upsert_trader(&sample_trader("0x3333333333333333333333333333333333333a", 90.0, true))
            .unwrap();
        store
            .upsert_trader(&sample_trader("0x4444444444444444444444444444444444444b", 30.0, false))
            .unwrap();
        let active = store.active_traders().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].score, 90.0);
    }

    #[test]
    fn candle_replay_overwrites_in_progress_bucket() {
        let store = DocumentStore::open_in_memory().unwrap();
        let first = Candle { t: 36_000, o: 100.0, h: 101.0, l: 99.0, c: 100.0, v: 1.0 };
        let second = Candle { t: 36_000, o: 100.0, h: 103.0, l: 99.0, c: 102.0, v: 3.0 };
        store.upsert_candle("BTC", "1h", &first).unwrap();
        store.upsert_candle("BTC", "1h", &second).unwrap();

        let conn = store.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM candles WHERE symbol='BTC' AND interval='1h'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let (h, c): (f64, f64) = conn
            .query_row("SELECT h, c FROM candles WHERE symbol='BTC' AND interval='1h'", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!((h, c), (103.0, 102.0));
    }

    #[test]
    fn position_idempotence_keeps_one_row_per_t() {
        let store = DocumentStore::open_in_memory().unwrap();
        let p = PositionRawPayload {
            address: "0x5555555555555555555555555555555555555c".into(),
            coin: "BTC".into(),
            szi: 10.0,
            ep: 60_000.0,
            mp: 60_100.0,
            upnl: 1_000.0,
            lev: 5,
            t: 1000,
        };
        store.upsert_position(&p).unwrap();
        store.upsert_position(&p).unwrap();

        let conn = store.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM trader_positions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
