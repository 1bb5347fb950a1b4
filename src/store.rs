use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::catalog::now_iso;
use crate::delta::{self, Delta};
use crate::migrate::{self, Persisted};

const DB_FILE: &str = "eval360.sqlite3";
const STATE_KEY: &str = "delta";

/// Local durable storage for the user delta. Load never fails (absence and
/// corruption both mean "no user changes yet"); save reports success as a
/// bool so a failed write never interrupts the in-memory session.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(workspace: &Path) -> anyhow::Result<Store> {
        std::fs::create_dir_all(workspace)?;
        let conn = Connection::open(workspace.join(DB_FILE))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS app_state(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Store { conn })
    }

    fn load_raw(&self) -> Option<serde_json::Value> {
        let text: Option<String> = match self
            .conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?",
                [STATE_KEY],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => {
                warn!("state read failed: {e}");
                None
            }
        };
        let text = text?;
        match serde_json::from_str(&text) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("persisted state is not valid JSON, starting from seed: {e}");
                None
            }
        }
    }

    /// Read the persisted delta. Legacy full-catalog documents (old web
    /// client dumps imported into the workspace) are normalized and rediffed
    /// against the seed.
    pub fn load_delta(&self) -> Delta {
        let Some(raw) = self.load_raw() else {
            return Delta::default();
        };
        match migrate::decode_persisted(&raw) {
            Persisted::Delta(d) => d,
            Persisted::Legacy(catalog) => delta::extract(&catalog),
        }
    }

    pub fn save_delta(&self, delta: &Delta) -> bool {
        let doc = migrate::encode_delta(delta);
        let text = match serde_json::to_string(&doc) {
            Ok(t) => t,
            Err(e) => {
                warn!("delta encoding failed: {e}");
                return false;
            }
        };
        let result = self.conn.execute(
            "INSERT INTO app_state(key, value, updated_at) VALUES(?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            (STATE_KEY, &text, now_iso()),
        );
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("delta save failed: {e}");
                false
            }
        }
    }

    /// Seed a workspace from a raw legacy document (e.g. a localStorage dump
    /// dropped in by hand). Test and tooling convenience.
    #[cfg(test)]
    pub fn save_raw(&self, raw: &serde_json::Value) -> bool {
        let text = raw.to_string();
        self.conn
            .execute(
                "INSERT INTO app_state(key, value, updated_at) VALUES(?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                (STATE_KEY, &text, now_iso()),
            )
            .is_ok()
    }
}
