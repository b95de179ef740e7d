//! Embedded SQLite store for accepted headers and the tip marker.
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bitcoin::{
    hashes::{sha256d, Hash},
    BlockHash,
};
use rusqlite::{params, Connection};
use std::{path::PathBuf, str::FromStr};
use tokio::task;

use crate::{header::HEADER_SIZE, store::Store};

/// Two tables:
///   headers(seq INTEGER PRIMARY KEY AUTOINCREMENT, hash TEXT UNIQUE, raw BLOB)
///   state(key TEXT PRIMARY KEY, value TEXT NOT NULL)
///
/// State keys:
///  - tip_height : u32 decimal string
///  - tip_hash   : display-hex BlockHash
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Creates/initializes the SQLite file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let conn = Connection::open(&path)
            .with_context(|| format!("open sqlite at {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS headers (
                seq  INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL UNIQUE,
                raw  BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { path })
    }

    fn kv_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
        let mut stmt = conn.prepare("SELECT value FROM state WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            let v: String = row.get(0)?;
            Ok(Some(v))
        } else {
            Ok(None)
        }
    }

    fn kv_set(conn: &Connection, key: &str, val: &str) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO state(key,value) VALUES(?1,?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, val],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_header(&self, raw: [u8; HEADER_SIZE]) -> anyhow::Result<()> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let hash = BlockHash::from_raw_hash(sha256d::Hash::hash(&raw));
            conn.execute(
                "INSERT OR IGNORE INTO headers(hash, raw) VALUES(?1, ?2)",
                params![hash.to_string(), &raw[..]],
            )
            .with_context(|| format!("insert header {hash}"))?;
            Ok(())
        })
        .await?
    }

    async fn load_headers(&self) -> anyhow::Result<Vec<[u8; HEADER_SIZE]>> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let mut stmt = conn.prepare("SELECT raw FROM headers ORDER BY seq")?;
            let blobs = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            blobs
                .into_iter()
                .map(|blob| {
                    <[u8; HEADER_SIZE]>::try_from(blob.as_slice())
                        .map_err(|_| anyhow!("stored header has {} bytes", blob.len()))
                })
                .collect()
        })
        .await?
    }

    async fn header_count(&self) -> anyhow::Result<u64> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM headers", [], |row| row.get(0))?;
            Ok(u64::try_from(n)?)
        })
        .await?
    }

    async fn load_tip(&self) -> anyhow::Result<Option<(u32, BlockHash)>> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let h = Self::kv_get(&conn, "tip_height")?;
            let hh = Self::kv_get(&conn, "tip_hash")?;
            match (h, hh) {
                (Some(hs), Some(hh)) => {
                    let height: u32 = hs.parse().context("parse tip_height")?;
                    let hash = BlockHash::from_str(&hh).context("parse tip_hash")?;
                    Ok(Some((height, hash)))
                }
                _ => Ok(None),
            }
        })
        .await?
    }

    async fn save_tip(&self, height: u32, hash: BlockHash) -> anyhow::Result<()> {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            let tx = conn.unchecked_transaction()?;
            Self::kv_set(&conn, "tip_height", &height.to_string())?;
            Self::kv_set(&conn, "tip_hash", &hash.to_string())?;
            tx.commit()?;
            Ok(())
        })
        .await?
    }
}
