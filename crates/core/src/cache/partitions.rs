//! Named cache partitions and their stored responses.
//!
//! A partition is a named key-value store mapping a request identity to a
//! stored response. Partition names embed a version tag so that a new
//! version can discard everything the previous one wrote.

use super::connection::CacheDb;
use super::hash::compute_request_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, types::Type};

/// The pair of partition names owned by one cache version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePartitions {
    pub version: String,
    pub shell: String,
    pub runtime: String,
}

impl CachePartitions {
    /// Partition names for a version tag: `shell-<version>` and `runtime-<version>`.
    pub fn for_version(version: &str) -> Self {
        Self { version: version.to_string(), shell: format!("shell-{version}"), runtime: format!("runtime-{version}") }
    }

    /// Whether `name` is one of the two partitions of this version.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.shell || name == self.runtime
    }
}

/// A response as persisted in a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Request identity key, see [`compute_request_key`].
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// RFC 3339 timestamp of the write.
    pub stored_at: String,
}

impl StoredResponse {
    /// Build a stored response for a request identity, stamped with the current time.
    pub fn new(method: &str, url: &str, status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            key: compute_request_key(method, url),
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            status,
            headers,
            body,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// First header value with the given (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn insert_entry(conn: &rusqlite::Connection, partition: &str, entry: &StoredResponse) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&entry.headers)?;
    conn.execute(
        "INSERT INTO entries (partition, key, method, url, status, headers_json, body, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(partition, key) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            partition,
            &entry.key,
            &entry.method,
            &entry.url,
            entry.status,
            headers_json,
            &entry.body,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

fn ensure_partition(conn: &rusqlite::Connection, name: &str) -> Result<bool, Error> {
    let created = conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(created == 1)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredResponse> {
    let headers_json: String = row.get(4)?;
    let headers = serde_json::from_str(&headers_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(StoredResponse {
        key: row.get(0)?,
        method: row.get(1)?,
        url: row.get(2)?,
        status: row.get(3)?,
        headers,
        body: row.get(5)?,
        stored_at: row.get(6)?,
    })
}

impl CacheDb {
    /// Create a partition if it does not exist yet.
    ///
    /// Returns true if the partition was created by this call.
    pub async fn open_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> { ensure_partition(conn, &name) })
            .await
            .map_err(Error::from)
    }

    /// Names of all existing partitions, sorted.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition together with all its entries.
    ///
    /// Returns true if the partition existed.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or overwrite one entry, creating the partition on demand.
    ///
    /// Last write wins: an existing entry for the same identity is replaced.
    pub async fn put_entry(&self, partition: &str, entry: &StoredResponse) -> Result<(), Error> {
        let partition = partition.to_string();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_partition(&tx, &partition)?;
                insert_entry(&tx, &partition, &entry)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Write a batch of entries in one transaction: either all land or none do.
    pub async fn put_entries(&self, partition: &str, entries: Vec<StoredResponse>) -> Result<(), Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_partition(&tx, &partition)?;
                for entry in &entries {
                    insert_entry(&tx, &partition, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry for a request identity (method + canonical URL).
    ///
    /// Returns None if the partition or the entry doesn't exist.
    pub async fn match_entry(&self, partition: &str, method: &str, url: &str) -> Result<Option<StoredResponse>, Error> {
        self.get_entry(partition, &compute_request_key(method, url)).await
    }

    /// Get an entry by its identity key.
    pub async fn get_entry(&self, partition: &str, key: &str) -> Result<Option<StoredResponse>, Error> {
        let partition = partition.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let entry = conn
                    .query_row(
                        "SELECT key, method, url, status, headers_json, body, stored_at
                         FROM entries WHERE partition = ?1 AND key = ?2",
                        params![partition, key],
                        row_to_entry,
                    )
                    .optional()?;
                Ok(entry)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs stored in a partition, sorted.
    pub async fn entry_urls(&self, partition: &str) -> Result<Vec<String>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE partition = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![partition], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a partition.
    pub async fn entry_count(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(url: &str, body: &str) -> StoredResponse {
        StoredResponse::new(
            "GET",
            url,
            200,
            vec![("content-type".to_string(), "text/html".to_string())],
            body.as_bytes().to_vec(),
        )
    }

    #[test]
    fn test_partition_names_for_version() {
        let partitions = CachePartitions::for_version("v2");
        assert_eq!(partitions.shell, "shell-v2");
        assert_eq!(partitions.runtime, "runtime-v2");
        assert!(partitions.is_current("runtime-v2"));
        assert!(!partitions.is_current("runtime-v1"));
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let entry = make_entry("https://example.com/", "<html></html>");
        assert_eq!(entry.header("Content-Type"), Some("text/html"));
        assert_eq!(entry.header("etag"), None);
    }

    #[tokio::test]
    async fn test_put_and_match_round_trip() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("https://example.com/", "<html>home</html>");

        db.put_entry("runtime-v1", &entry).await.unwrap();

        let found = db
            .match_entry("runtime-v1", "GET", "https://example.com/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, entry);
    }

    #[tokio::test]
    async fn test_match_is_scoped_to_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("runtime-v1", &make_entry("https://example.com/", "a"))
            .await
            .unwrap();

        let other = db
            .match_entry("shell-v1", "GET", "https://example.com/")
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_last_write_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("runtime-v1", &make_entry("https://example.com/a.css", "old"))
            .await
            .unwrap();
        db.put_entry("runtime-v1", &make_entry("https://example.com/a.css", "new"))
            .await
            .unwrap();

        let found = db
            .match_entry("runtime-v1", "GET", "https://example.com/a.css")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.body, b"new");
        assert_eq!(db.entry_count("runtime-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_entries_batch_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let batch = vec![make_entry("https://example.com/", "home"), make_entry("https://example.com/offline.html", "off")];

        db.put_entries("shell-v1", batch.clone()).await.unwrap();
        db.put_entries("shell-v1", batch).await.unwrap();

        let urls = db.entry_urls("shell-v1").await.unwrap();
        assert_eq!(urls, vec!["https://example.com/", "https://example.com/offline.html"]);
    }

    #[tokio::test]
    async fn test_delete_partition_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("runtime-v1", &make_entry("https://example.com/", "a"))
            .await
            .unwrap();
        assert!(db.open_partition("runtime-v2").await.unwrap());
        assert!(!db.open_partition("runtime-v2").await.unwrap());

        assert!(db.delete_partition("runtime-v1").await.unwrap());
        assert!(!db.delete_partition("runtime-v1").await.unwrap());

        assert_eq!(db.partition_names().await.unwrap(), vec!["runtime-v2"]);
        assert_eq!(db.entry_count("runtime-v1").await.unwrap(), 0);
    }
}
