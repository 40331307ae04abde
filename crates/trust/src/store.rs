//! Peer store with optional SQLite persistence.
//!
//! The in-memory map is authoritative; when a database is attached every
//! mutation is written through so a restart reloads the same peer set and
//! update log.

use crate::error::{TrustError, TrustResult};
use crate::level::TrustLevel;
use crate::peer::PeerRecord;
use crate::update::TrustUpdate;
use rusqlite::{params, Connection};
use sovra_core::KeyDirectory;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Store of trusted peers, queryable by the routing layer for signing keys.
pub struct TrustStore {
    peers: HashMap<String, PeerRecord>,
    db: Option<Mutex<Connection>>,
}

impl TrustStore {
    /// Volatile store with no persistence.
    pub fn in_memory() -> Self {
        Self {
            peers: HashMap::new(),
            db: None,
        }
    }

    /// Open (or create) a persistent store at the given path and load the
    /// saved peer set.
    pub fn open<P: AsRef<Path>>(path: P) -> TrustResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        let peers = Self::load_peers(&conn)?;
        Ok(Self {
            peers,
            db: Some(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> TrustResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS peers (
                node_id TEXT PRIMARY KEY,
                signing_key TEXT NOT NULL,
                exchange_key TEXT NOT NULL,
                level INTEGER NOT NULL,
                added_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_update_id TEXT NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS trust_log (
                id TEXT PRIMARY KEY,
                signer_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    fn load_peers(conn: &Connection) -> TrustResult<HashMap<String, PeerRecord>> {
        let mut stmt = conn.prepare(
            "SELECT node_id, signing_key, exchange_key, level, added_at, updated_at,
                    last_update_id, metadata
             FROM peers",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u8>(3)?,
                row.get::<_, u64>(4)?,
                row.get::<_, u64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut peers = HashMap::new();
        for row in rows {
            let (node_id, signing_hex, exchange_hex, level, added_at, updated_at, last_id, meta) =
                row?;
            let record = PeerRecord {
                node_id: node_id.clone(),
                signing_key: decode_key(&signing_hex)?,
                exchange_key: decode_key(&exchange_hex)?,
                level: TrustLevel::from_u8(level),
                added_at,
                updated_at,
                last_update_id: last_id,
                metadata: serde_json::from_str(&meta)?,
            };
            peers.insert(node_id, record);
        }
        Ok(peers)
    }

    /// Insert or replace a peer record.
    pub fn upsert_peer(&mut self, record: PeerRecord) -> TrustResult<()> {
        if let Some(db) = &self.db {
            let conn = db.lock().map_err(|_| poisoned())?;
            conn.execute(
                "INSERT OR REPLACE INTO peers
                 (node_id, signing_key, exchange_key, level, added_at, updated_at,
                  last_update_id, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.node_id,
                    hex::encode(record.signing_key),
                    hex::encode(record.exchange_key),
                    record.level.as_u8(),
                    record.added_at,
                    record.updated_at,
                    record.last_update_id,
                    serde_json::to_string(&record.metadata)?,
                ],
            )?;
        }
        self.peers.insert(record.node_id.clone(), record);
        Ok(())
    }

    /// Remove a peer. Returns the record if it existed.
    pub fn remove_peer(&mut self, node_id: &str) -> TrustResult<Option<PeerRecord>> {
        if let Some(db) = &self.db {
            let conn = db.lock().map_err(|_| poisoned())?;
            conn.execute("DELETE FROM peers WHERE node_id = ?1", params![node_id])?;
        }
        Ok(self.peers.remove(node_id))
    }

    pub fn get(&self, node_id: &str) -> Option<&PeerRecord> {
        self.peers.get(node_id)
    }

    /// Trust level for a node; unknown peers are `Unknown`.
    pub fn level_of(&self, node_id: &str) -> TrustLevel {
        self.peers
            .get(node_id)
            .map(|record| record.level)
            .unwrap_or(TrustLevel::Unknown)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Append an update to the persistent log.
    pub fn persist_update(&self, update: &TrustUpdate) -> TrustResult<()> {
        if let Some(db) = &self.db {
            let conn = db.lock().map_err(|_| poisoned())?;
            conn.execute(
                "INSERT OR IGNORE INTO trust_log (id, signer_id, sequence, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    update.id,
                    update.signer_id,
                    update.sequence,
                    serde_json::to_string(update)?,
                    update.timestamp,
                ],
            )?;
        }
        Ok(())
    }

    /// Remove an evicted update from the persistent log.
    pub fn delete_update(&self, update_id: &str) -> TrustResult<()> {
        if let Some(db) = &self.db {
            let conn = db.lock().map_err(|_| poisoned())?;
            conn.execute("DELETE FROM trust_log WHERE id = ?1", params![update_id])?;
        }
        Ok(())
    }

    /// Load the persisted update log, oldest first.
    pub fn load_log(&self) -> TrustResult<Vec<TrustUpdate>> {
        let Some(db) = &self.db else {
            return Ok(Vec::new());
        };
        let conn = db.lock().map_err(|_| poisoned())?;
        let mut stmt =
            conn.prepare("SELECT body FROM trust_log ORDER BY created_at ASC, id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut updates = Vec::new();
        for row in rows {
            updates.push(serde_json::from_str(&row?)?);
        }
        Ok(updates)
    }
}

impl KeyDirectory for TrustStore {
    fn signing_key_for(&self, node_id: &str) -> Option<[u8; 32]> {
        self.peers.get(node_id).map(|record| record.signing_key)
    }
}

fn decode_key(hex_str: &str) -> TrustResult<[u8; 32]> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| TrustError::Malformed(format!("bad key encoding: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| TrustError::Malformed("key is not 32 bytes".to_string()))
}

fn poisoned() -> TrustError {
    TrustError::Malformed("store lock poisoned".to_string())
}
