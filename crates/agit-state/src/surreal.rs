//! Embedded SurrealDB implementation of the [`ObjectStore`] contract.
//!
//! Two variants behind one type:
//! - durable: SurrealKV database under `<root>/.agit/repo.db`
//! - ephemeral: the in-memory engine, addressed as `":memory:"`
//!
//! Tables:
//! - `objects(hash, data)` - content-addressed payloads, base64-encoded
//! - `refs(name, value)` - branch refs and HEAD
//! - `audit(event_id, ts, agent, action, msg, commit_hash, seq)`
//!
//! Object and ref rows use the hash/name as the record id, so lookups are
//! keyed reads rather than table scans. Audit rows carry a monotonically
//! increasing `seq` that is recovered from the table on reopen, which keeps
//! the log totally ordered across process restarts.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use surrealdb::engine::local::{Db, Mem, SurrealKv};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StateError;
use crate::object_id::ObjectId;
use crate::store::{AuditAction, AuditRecord, ObjectStore};
use crate::Result;

/// Path sentinel selecting the in-memory variant.
pub const MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectRow {
    hash: String,
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefRow {
    name: String,
    value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditRow {
    event_id: String,
    ts: String,
    agent: String,
    action: AuditAction,
    msg: String,
    commit_hash: Option<String>,
    seq: u64,
}

impl AuditRow {
    fn from_record(record: &AuditRecord, seq: u64) -> Self {
        AuditRow {
            event_id: record.event_id.to_string(),
            ts: record.timestamp.clone(),
            agent: record.agent_id.clone(),
            action: record.action,
            msg: record.message.clone(),
            commit_hash: record.commit_id.map(|id| id.to_hex()),
            seq,
        }
    }

    fn into_record(self) -> Result<AuditRecord> {
        let commit_id = match self.commit_hash {
            Some(hex) => Some(hex.parse::<ObjectId>()?),
            None => None,
        };
        Ok(AuditRecord {
            event_id: self
                .event_id
                .parse()
                .map_err(|e| StateError::Serialization(format!("bad audit event id: {e}")))?,
            timestamp: self.ts,
            agent_id: self.agent,
            action: self.action,
            message: self.msg,
            commit_id,
        })
    }
}

/// Embedded store handle for one repository.
pub struct SurrealStore {
    db: Surreal<Db>,
    root: Option<PathBuf>,
    next_audit_seq: AtomicU64,
}

impl SurrealStore {
    /// Open (or create) the store for `path`.
    ///
    /// `":memory:"` selects the ephemeral engine; anything else is treated
    /// as the repository root directory and backs `<path>/.agit/repo.db`.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn open(path: &str) -> Result<Self> {
        let (db, root) = if path == MEMORY_PATH {
            debug!("opening in-memory store");
            let db = Surreal::new::<Mem>(())
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;
            (db, None)
        } else {
            let root = PathBuf::from(path);
            let agit_dir = root.join(".agit");
            std::fs::create_dir_all(&agit_dir)?;
            let db_path = agit_dir.join("repo.db");
            debug!(db_path = %db_path.display(), "opening durable store");
            let db = Surreal::new::<SurrealKv>(db_path.to_string_lossy().into_owned())
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;
            (db, Some(root))
        };

        db.use_ns("agit")
            .use_db("repo")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        let store = SurrealStore {
            db,
            root,
            next_audit_seq: AtomicU64::new(1),
        };
        store.init_schema().await?;
        store.recover_audit_seq().await?;

        info!("store opened");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let schema = r#"
            DEFINE TABLE IF NOT EXISTS objects SCHEMAFULL;
            DEFINE FIELD IF NOT EXISTS hash ON objects TYPE string;
            DEFINE FIELD IF NOT EXISTS data ON objects TYPE string;

            DEFINE TABLE IF NOT EXISTS refs SCHEMAFULL;
            DEFINE FIELD IF NOT EXISTS name ON refs TYPE string;
            DEFINE FIELD IF NOT EXISTS value ON refs TYPE string;

            DEFINE TABLE IF NOT EXISTS audit SCHEMAFULL;
            DEFINE FIELD IF NOT EXISTS event_id ON audit TYPE string;
            DEFINE FIELD IF NOT EXISTS ts ON audit TYPE string;
            DEFINE FIELD IF NOT EXISTS agent ON audit TYPE string;
            DEFINE FIELD IF NOT EXISTS action ON audit TYPE string;
            DEFINE FIELD IF NOT EXISTS msg ON audit TYPE string;
            DEFINE FIELD IF NOT EXISTS commit_hash ON audit TYPE option<string>;
            DEFINE FIELD IF NOT EXISTS seq ON audit TYPE int;
            DEFINE INDEX IF NOT EXISTS idx_audit_seq ON audit FIELDS seq;
        "#;

        self.db
            .query(schema)
            .await
            .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
        Ok(())
    }

    async fn recover_audit_seq(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct SeqRow {
            seq: u64,
        }

        let mut result = self
            .db
            .query("SELECT seq FROM audit ORDER BY seq DESC LIMIT 1")
            .await?;
        let rows: Vec<SeqRow> = result.take(0)?;
        if let Some(last) = rows.into_iter().next() {
            self.next_audit_seq.store(last.seq + 1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for SurrealStore {
    #[instrument(skip_all, fields(id = %id.short()))]
    async fn put(&self, id: &ObjectId, bytes: &[u8]) -> Result<()> {
        if self.contains(id).await? {
            return Ok(());
        }

        let hex = id.to_hex();
        let row = ObjectRow {
            hash: hex.clone(),
            data: BASE64.encode(bytes),
        };
        let created: std::result::Result<Option<ObjectRow>, surrealdb::Error> =
            self.db.create(("objects", hex)).content(row).await;

        match created {
            Ok(_) => Ok(()),
            // A concurrent writer may have won the race; the payload is
            // identical by content addressing, so that is a success.
            Err(e) => {
                if self.contains(id).await? {
                    Ok(())
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<Vec<u8>>> {
        let row: Option<ObjectRow> = self.db.select(("objects", id.to_hex())).await?;
        match row {
            Some(row) => {
                let bytes = BASE64.decode(row.data).map_err(|e| StateError::InvalidPayload {
                    id: id.to_hex(),
                    detail: e.to_string(),
                })?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    async fn contains(&self, id: &ObjectId) -> Result<bool> {
        let row: Option<ObjectRow> = self.db.select(("objects", id.to_hex())).await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn set_ref(&self, name: &str, value: &str) -> Result<()> {
        let row = RefRow {
            name: name.to_string(),
            value: value.to_string(),
        };
        let _: Option<RefRow> = self.db.upsert(("refs", name)).content(row).await?;
        debug!("ref updated");
        Ok(())
    }

    async fn get_ref(&self, name: &str) -> Result<Option<String>> {
        let row: Option<RefRow> = self.db.select(("refs", name)).await?;
        Ok(row.map(|r| r.value))
    }

    async fn list_refs(&self) -> Result<HashMap<String, String>> {
        let rows: Vec<RefRow> = self.db.select("refs").await?;
        Ok(rows.into_iter().map(|r| (r.name, r.value)).collect())
    }

    async fn delete_ref(&self, name: &str) -> Result<()> {
        let _: Option<RefRow> = self.db.delete(("refs", name)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(action = %record.action))]
    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        let seq = self.next_audit_seq.fetch_add(1, Ordering::SeqCst);
        let row = AuditRow::from_record(record, seq);
        let _: Option<AuditRow> = self.db.create("audit").content(row).await?;
        Ok(())
    }

    async fn read_audit(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let mut result = self
            .db
            .query(format!(
                "SELECT * FROM audit ORDER BY seq DESC LIMIT {limit}"
            ))
            .await?;
        let rows: Vec<AuditRow> = result.take(0)?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }

    async fn object_ids(&self) -> Result<Vec<ObjectId>> {
        #[derive(Deserialize)]
        struct HashRow {
            hash: String,
        }

        let mut result = self.db.query("SELECT hash FROM objects").await?;
        let rows: Vec<HashRow> = result.take(0)?;
        rows.into_iter().map(|r| r.hash.parse()).collect()
    }

    async fn delete_objects(&self, ids: &HashSet<ObjectId>) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            let gone: Option<ObjectRow> = self.db.delete(("objects", id.to_hex())).await?;
            if gone.is_some() {
                removed += 1;
            }
        }
        debug!(removed, "objects swept");
        Ok(removed)
    }

    fn root_path(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mem_store() -> SurrealStore {
        SurrealStore::open(MEMORY_PATH).await.unwrap()
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = mem_store().await;
        let bytes = br#"{"memory":{},"world_state":{}}"#.to_vec();
        let id = ObjectId::for_bytes(&bytes);

        store.put(&id, &bytes).await.unwrap();
        assert!(store.contains(&id).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap(), Some(bytes));
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = mem_store().await;
        let bytes = b"payload".to_vec();
        let id = ObjectId::for_bytes(&bytes);

        store.put(&id, &bytes).await.unwrap();
        store.put(&id, &bytes).await.unwrap();
        assert_eq!(store.object_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_object_is_none() {
        let store = mem_store().await;
        let id = ObjectId::for_bytes(b"never stored");
        assert_eq!(store.get(&id).await.unwrap(), None);
        assert!(!store.contains(&id).await.unwrap());
    }

    #[tokio::test]
    async fn refs_set_get_list_delete() {
        let store = mem_store().await;

        store.set_ref("HEAD", "main").await.unwrap();
        store.set_ref("main", "abc123").await.unwrap();
        store.set_ref("main", "def456").await.unwrap();

        assert_eq!(store.get_ref("main").await.unwrap(), Some("def456".into()));
        let refs = store.list_refs().await.unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs["HEAD"], "main");

        store.delete_ref("main").await.unwrap();
        assert_eq!(store.get_ref("main").await.unwrap(), None);
    }

    #[tokio::test]
    async fn audit_is_ordered_newest_first() {
        let store = mem_store().await;

        for i in 0..5 {
            let rec = AuditRecord::new("tester", AuditAction::Commit, &format!("msg {i}"), None);
            store.append_audit(&rec).await.unwrap();
        }

        let recent = store.read_audit(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "msg 4");
        assert_eq!(recent[2].message, "msg 2");
    }

    #[tokio::test]
    async fn delete_objects_reports_count() {
        let store = mem_store().await;
        let a = ObjectId::for_bytes(b"a");
        let b = ObjectId::for_bytes(b"b");
        store.put(&a, b"a").await.unwrap();
        store.put(&b, b"b").await.unwrap();

        let mut doomed = HashSet::new();
        doomed.insert(a);
        doomed.insert(ObjectId::for_bytes(b"not stored"));

        assert_eq!(store.delete_objects(&doomed).await.unwrap(), 1);
        assert!(!store.contains(&a).await.unwrap());
        assert!(store.contains(&b).await.unwrap());
    }

    #[tokio::test]
    async fn durable_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().into_owned();

        let bytes = b"durable".to_vec();
        let id = ObjectId::for_bytes(&bytes);
        {
            let store = SurrealStore::open(&path).await.unwrap();
            store.put(&id, &bytes).await.unwrap();
            store.set_ref("main", &id.to_hex()).await.unwrap();
            let rec = AuditRecord::new("tester", AuditAction::Commit, "first", Some(id));
            store.append_audit(&rec).await.unwrap();
        }

        let store = SurrealStore::open(&path).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(bytes));
        assert_eq!(store.get_ref("main").await.unwrap(), Some(id.to_hex()));

        // Sequence numbering continues after the recovered entry.
        let rec = AuditRecord::new("tester", AuditAction::Gc, "second", None);
        store.append_audit(&rec).await.unwrap();
        let audit = store.read_audit(10).await.unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].message, "second");
        assert_eq!(audit[1].message, "first");
    }
}
