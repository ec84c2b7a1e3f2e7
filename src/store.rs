//! Relational persistence layer for items, attributes, and secrets.
//!
//! Backed by a single SQLite file accessed through one guarded connection.
//! Every mutation is a single statement (or, where several statements must
//! land together, a transaction) so readers never observe a partial write.
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error;

pub struct Store {
    conn: Mutex<Connection>,
}

/// Metadata row shared by every item: label plus creation/modification time.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMetadata {
    pub label: String,
    pub created: u64,
    pub modified: u64,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, error::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| error::Error::Crypto(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, error::Error> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, error::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;

        Ok(store)
    }

    fn migrate(&self) -> Result<(), error::Error> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                object    TEXT PRIMARY KEY,
                label     TEXT NOT NULL,
                created   INTEGER NOT NULL,
                modified  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS attributes (
                object    TEXT NOT NULL,
                attribute TEXT NOT NULL,
                value     TEXT NOT NULL,
                FOREIGN KEY (object) REFERENCES items(object) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_attributes_object ON attributes(object);
            CREATE INDEX IF NOT EXISTS idx_attributes_lookup ON attributes(attribute, value);

            CREATE TABLE IF NOT EXISTS secrets (
                object       TEXT PRIMARY KEY,
                secret       BLOB NOT NULL,
                content_type TEXT NOT NULL,
                FOREIGN KEY (object) REFERENCES items(object) ON DELETE CASCADE
            );",
        )?;

        Ok(())
    }

    fn now() -> u64 {
        time::SystemTime::now()
            .duration_since(time::SystemTime::UNIX_EPOCH)
            .expect("current SystemTime before UNIX EPOCH")
            .as_secs()
    }

    /// Inserts one item row, its attribute rows, and its secret row atomically.
    pub fn add_item<'a, I>(
        &self,
        object: &str,
        label: &str,
        attributes: I,
        secret: &[u8],
        content_type: &str,
    ) -> Result<(), error::Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let now = Self::now();
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO items (object, label, created, modified) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(object) DO UPDATE SET label = excluded.label, modified = excluded.modified",
            params![object, label, now],
        )?;

        tx.execute("DELETE FROM attributes WHERE object = ?1", params![object])?;
        for (key, value) in attributes {
            tx.execute(
                "INSERT INTO attributes (object, attribute, value) VALUES (?1, ?2, ?3)",
                params![object, key, value],
            )?;
        }

        tx.execute(
            "INSERT INTO secrets (object, secret, content_type) VALUES (?1, ?2, ?3)
             ON CONFLICT(object) DO UPDATE SET secret = excluded.secret, content_type = excluded.content_type",
            params![object, secret, content_type],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Returns the set of object paths whose attributes are a superset of
    /// `match_attrs`: an N-way intersection of per-(key,value) selections.
    pub fn find_items(&self, match_attrs: &HashMap<String, String>) -> Result<HashSet<String>, error::Error> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        let mut result: Option<HashSet<String>> = None;
        for (key, value) in match_attrs {
            let mut stmt = conn.prepare(
                "SELECT object FROM attributes WHERE attribute = ?1 AND value = ?2",
            )?;
            let matches: HashSet<String> = stmt
                .query_map(params![key, value], |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            result = Some(match result {
                None => matches,
                Some(acc) => acc.intersection(&matches).cloned().collect(),
            });
        }

        Ok(result.unwrap_or_default())
    }

    pub fn get_metadata(&self, object: &str) -> Result<Option<ItemMetadata>, error::Error> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let metadata = conn
            .query_row(
                "SELECT label, created, modified FROM items WHERE object = ?1",
                params![object],
                |row| {
                    Ok(ItemMetadata {
                        label: row.get(0)?,
                        created: row.get(1)?,
                        modified: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(metadata)
    }

    /// Updates the label only. `modified` is deliberately left untouched.
    pub fn set_metadata_label(&self, object: &str, label: &str) -> Result<(), error::Error> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE items SET label = ?2 WHERE object = ?1",
            params![object, label],
        )?;
        Ok(())
    }

    pub fn get_attributes(&self, object: &str) -> Result<HashMap<String, String>, error::Error> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt =
            conn.prepare("SELECT attribute, value FROM attributes WHERE object = ?1")?;
        let attrs = stmt
            .query_map(params![object], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashMap<String, String>, _>>()?;
        Ok(attrs)
    }

    /// Full replace: deletes all existing attribute rows then inserts the new ones.
    pub fn set_attributes(
        &self,
        object: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<(), error::Error> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM attributes WHERE object = ?1", params![object])?;
        for (key, value) in attributes {
            tx.execute(
                "INSERT INTO attributes (object, attribute, value) VALUES (?1, ?2, ?3)",
                params![object, key, value],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_secret(&self, object: &str) -> Result<Option<(Vec<u8>, String)>, error::Error> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let secret = conn
            .query_row(
                "SELECT secret, content_type FROM secrets WHERE object = ?1",
                params![object],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(secret)
    }

    pub fn set_secret(&self, object: &str, secret: &[u8], content_type: &str) -> Result<(), error::Error> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE secrets SET secret = ?2, content_type = ?3 WHERE object = ?1",
            params![object, secret, content_type],
        )?;
        Ok(())
    }

    /// Deletes rows from all three relations for the given object path, atomically.
    pub fn delete_item(&self, object: &str) -> Result<(), error::Error> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM secrets WHERE object = ?1", params![object])?;
        tx.execute("DELETE FROM attributes WHERE object = ?1", params![object])?;
        tx.execute("DELETE FROM items WHERE object = ?1", params![object])?;

        tx.commit()?;
        Ok(())
    }

    pub fn item_exists(&self, object: &str) -> Result<bool, error::Error> {
        Ok(self.get_metadata(object)?.is_some())
    }

    /// Returns every object path with a metadata row, so a fresh process can
    /// re-register bus objects for items persisted by a previous run.
    pub fn all_items(&self) -> Result<Vec<String>, error::Error> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT object FROM items")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }
}
