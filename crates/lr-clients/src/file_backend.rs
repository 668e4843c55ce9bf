//! File-backed client directory.
//!
//! The client list lives in a JSON file of the form
//! `{"clients": [record, ...]}`. It's loaded on construction and
//! reloaded lazily on lookup whenever the file's mtime has advanced —
//! never eagerly, so a directory with no traffic never re-reads a file
//! that hasn't changed.

use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;

use lr_types::ClientRecord;
use lr_utils::crypto::constant_time_eq;

use crate::ClientDirectory;

#[derive(Deserialize)]
struct ClientFile {
    clients: Vec<ClientRecord>,
}

struct Snapshot {
    records: Vec<ClientRecord>,
    loaded_mtime: Option<SystemTime>,
}

pub struct FileDirectory {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl FileDirectory {
    /// Load `path` for the first time. Returns an error only if the file
    /// is missing or malformed at startup — later reload failures are
    /// logged and the stale snapshot is kept in place.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();
        let (records, mtime) = read_file(&path)?;
        Ok(FileDirectory {
            path,
            snapshot: RwLock::new(Snapshot {
                records,
                loaded_mtime: mtime,
            }),
        })
    }

    /// Reload from disk if the file's mtime has advanced since the last
    /// load. No-op (and cheap: one `stat` call) otherwise.
    fn reload_if_changed(&self) {
        let current_mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();

        let needs_reload = {
            let snapshot = self.snapshot.read();
            current_mtime.is_some() && current_mtime != snapshot.loaded_mtime
        };

        if !needs_reload {
            return;
        }

        match read_file(&self.path) {
            Ok((records, mtime)) => {
                let mut snapshot = self.snapshot.write();
                snapshot.records = records;
                snapshot.loaded_mtime = mtime;
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "client directory reload failed, keeping stale snapshot");
            }
        }
    }
}

fn read_file(path: &PathBuf) -> Result<(Vec<ClientRecord>, Option<SystemTime>), String> {
    let mtime = fs::metadata(path).and_then(|m| m.modified()).ok();
    let contents = fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    let parsed: ClientFile =
        serde_json::from_str(&contents).map_err(|e| format!("parsing {}: {e}", path.display()))?;
    Ok((parsed.clients, mtime))
}

#[async_trait]
impl ClientDirectory for FileDirectory {
    async fn lookup(&self, api_key: &str) -> Option<ClientRecord> {
        self.reload_if_changed();

        // Scan every record and compare in constant time, keeping the
        // last match rather than returning on first hit — a key's
        // position in the file must not be observable via timing.
        let snapshot = self.snapshot.read();
        let mut found: Option<ClientRecord> = None;
        for record in snapshot.records.iter() {
            if constant_time_eq(&record.api_key, api_key) {
                found = Some(record.clone());
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_clients(dir: &tempfile::TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("clients.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(json.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn finds_active_client_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_clients(
            &dir,
            r#"{"clients": [{"client_id": "c1", "api_key": "key-1", "provider": "openai", "rate_limit_rpm": 60}]}"#,
        );
        let directory = FileDirectory::load(&path).unwrap();
        let found = directory.lookup("key-1").await.unwrap();
        assert_eq!(found.client_id, "c1");
    }

    #[tokio::test]
    async fn unknown_key_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_clients(&dir, r#"{"clients": []}"#);
        let directory = FileDirectory::load(&path).unwrap();
        assert!(directory.lookup("nope").await.is_none());
    }

    #[tokio::test]
    async fn last_match_wins_on_duplicate_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_clients(
            &dir,
            r#"{"clients": [
                {"client_id": "first", "api_key": "dup", "provider": "openai", "rate_limit_rpm": 60},
                {"client_id": "second", "api_key": "dup", "provider": "openai", "rate_limit_rpm": 60}
            ]}"#,
        );
        let directory = FileDirectory::load(&path).unwrap();
        let found = directory.lookup("dup").await.unwrap();
        assert_eq!(found.client_id, "second");
    }

    #[tokio::test]
    async fn reloads_after_mtime_advances() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_clients(
            &dir,
            r#"{"clients": [{"client_id": "c1", "api_key": "key-1", "provider": "openai", "rate_limit_rpm": 60}]}"#,
        );
        let directory = FileDirectory::load(&path).unwrap();
        assert!(directory.lookup("key-2").await.is_none());

        // Force the mtime forward; some filesystems have 1s resolution.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let mut file = fs::OpenOptions::new().write(true).truncate(true).open(&path).unwrap();
        file.write_all(
            br#"{"clients": [{"client_id": "c2", "api_key": "key-2", "provider": "openai", "rate_limit_rpm": 60}]}"#,
        )
        .unwrap();
        drop(file);

        let found = directory.lookup("key-2").await.unwrap();
        assert_eq!(found.client_id, "c2");
    }
}
