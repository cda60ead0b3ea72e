//! Document store on SQLite.
//!
//! A [`Cluster`] is an r2d2 pool over one SQLite database. All documents
//! live in one `documents` table keyed by bucket, scope, collection and
//! document key, so every [`Collection`] is its own keyed namespace.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OpenFlags, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{Credentials, StorageConfig};
use crate::error::{Result, ResultExt, StorageError};

pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

pub const SESSIONS_COLLECTION: &str = "sessions";
pub const PEERS_COLLECTION: &str = "peers";
pub const UPDATE_STATES_COLLECTION: &str = "update_states";

pub const MEMORY_CONNECTION_STRING: &str = "sqlite::memory:";

/// Startup DB Pragmas
pub const STARTUP_SQL: &str = r##"
        PRAGMA main.synchronous = NORMAL;
        PRAGMA journal_size_limit = 32768;
        PRAGMA temp_store = 2; -- use memory, not temp files
        PRAGMA main.cache_size = 20000; -- 80MB max cache size per conn
        PRAGMA busy_timeout = 5000;
        pragma mmap_size = 0; -- disable mmap (default)
        "##;

const CREATE_DOCUMENTS_SQL: &str = r##"
        create table if not exists documents (
            bucket text not null,
            scope text not null,
            collection text not null,
            docKey text not null,
            content blob not null,
            format text not null,
            updatedAt TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            primary key (bucket, scope, collection, docKey)
        );
        "##;

/// Where the database lives, parsed from a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Memory,
    File(PathBuf),
}

impl Endpoint {
    /// Accepts `sqlite::memory:`, `sqlite://<path>` or a bare path.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let trimmed = connection_string.trim();
        if trimmed == MEMORY_CONNECTION_STRING {
            return Ok(Endpoint::Memory);
        }
        let path = match trimmed.strip_prefix("sqlite://") {
            Some(path) => path,
            None if trimmed.contains("://") => {
                return Err(StorageError::InvalidConnectionString(connection_string.to_string()))
            }
            None => trimmed,
        };
        if path.is_empty() {
            return Err(StorageError::InvalidConnectionString(connection_string.to_string()));
        }
        Ok(Endpoint::File(PathBuf::from(path)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Memory => f.write_str(MEMORY_CONNECTION_STRING),
            Endpoint::File(path) => write!(f, "sqlite://{}", path.display()),
        }
    }
}

pub fn build_pool(endpoint: &Endpoint, ready_timeout: Duration) -> Result<SqlitePool> {
    // r2d2 panics on a zero connection timeout
    if ready_timeout.is_zero() {
        return Err(StorageError::InvalidReadyTimeout(ready_timeout));
    }
    let manager = match endpoint {
        Endpoint::Memory => SqliteConnectionManager::memory(),
        Endpoint::File(path) => SqliteConnectionManager::file(path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE),
    }
    .with_init(|c| c.execute_batch(STARTUP_SQL));

    let mut builder = r2d2::Pool::builder().connection_timeout(ready_timeout);
    if *endpoint == Endpoint::Memory {
        // every connection to :memory: is a fresh database, so keep exactly one alive
        builder = builder
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None);
    }
    // build blocks until min_idle connections are open or the timeout expires
    Ok(builder.build(manager)?)
}

/// Connection to the document store.
#[derive(Clone)]
pub struct Cluster {
    pool: SqlitePool,
    endpoint: Endpoint,
}

impl Cluster {
    /// Connect and wait until the store answers, or fail after `ready_timeout`.
    pub fn connect(
        connection_string: &str,
        credentials: &Credentials,
        ready_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = Endpoint::parse(connection_string)?;
        let pool = build_pool(&endpoint, ready_timeout)
            .context(|| format!("connect to document store {endpoint}"))?;
        let cluster = Cluster { pool, endpoint };
        cluster.wait_until_ready(ready_timeout).context(|| "wait ready".to_string())?;
        cluster.init_sqlite()?;
        info!("connected to document store {} as {}", cluster.endpoint, credentials.username);
        Ok(cluster)
    }

    fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let conn = self.pool.get_timeout(timeout)?;
        conn.query_row("select 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn init_sqlite(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(CREATE_DOCUMENTS_SQL)
            .context(|| "create documents table".to_string())?;
        debug!("documents table ready");
        Ok(())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn bucket(&self, name: &str) -> Result<Bucket> {
        validate_name(name)?;
        Ok(Bucket {
            pool: self.pool.clone(),
            name: name.to_string(),
        })
    }
}

pub struct Bucket {
    pool: SqlitePool,
    name: String,
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self, name: &str) -> Result<Scope> {
        validate_name(name)?;
        Ok(Scope {
            pool: self.pool.clone(),
            bucket: self.name.clone(),
            name: name.to_string(),
        })
    }
}

pub struct Scope {
    pool: SqlitePool,
    bucket: String,
    name: String,
}

impl Scope {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self, name: &str) -> Result<Collection> {
        validate_name(name)?;
        Ok(Collection {
            pool: self.pool.clone(),
            bucket: self.bucket.clone(),
            scope: self.name.clone(),
            name: name.to_string(),
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Binary,
}

impl DocumentFormat {
    fn as_str(self) -> &'static str {
        match self {
            DocumentFormat::Json => "json",
            DocumentFormat::Binary => "binary",
        }
    }
}

impl ToSql for DocumentFormat {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for DocumentFormat {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "json" => Ok(DocumentFormat::Json),
            "binary" => Ok(DocumentFormat::Binary),
            other => Err(FromSqlError::Other(
                format!("unknown document format {other:?}").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: Vec<u8>,
    pub format: DocumentFormat,
}

impl Document {
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.content)?)
    }
}

/// Keyed document namespace.
#[derive(Clone)]
pub struct Collection {
    pool: SqlitePool,
    bucket: String,
    scope: String,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    pub fn get(&self, key: &str) -> Result<Option<Document>> {
        let conn = self.conn()?;
        let doc = conn
            .query_row(
                "select content, format from documents
                where bucket = ?1 and scope = ?2 and collection = ?3 and docKey = ?4",
                params![self.bucket, self.scope, self.name, key],
                |row| {
                    Ok(Document {
                        content: row.get(0)?,
                        format: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(doc)
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "select 1 from documents
                where bucket = ?1 and scope = ?2 and collection = ?3 and docKey = ?4",
                params![self.bucket, self.scope, self.name, key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn upsert(&self, key: &str, content: &[u8], format: DocumentFormat) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r##"INSERT INTO documents (bucket, scope, collection, docKey, content, format)
            values (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(bucket, scope, collection, docKey) DO UPDATE SET
            content = excluded.content, format = excluded.format,
            updatedAt = CURRENT_TIMESTAMP"##,
            params![self.bucket, self.scope, self.name, key, content, format],
        )?;
        Ok(())
    }

    pub fn upsert_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let content = serde_json::to_vec(value)?;
        self.upsert(key, &content, DocumentFormat::Json)
    }

    pub fn upsert_binary(&self, key: &str, content: &[u8]) -> Result<()> {
        self.upsert(key, content, DocumentFormat::Binary)
    }

    /// Returns `false` when there was nothing to remove.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let cnt = conn.execute(
            "delete from documents
            where bucket = ?1 and scope = ?2 and collection = ?3 and docKey = ?4",
            params![self.bucket, self.scope, self.name, key],
        )?;
        Ok(cnt > 0)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "select docKey from documents
            where bucket = ?1 and scope = ?2 and collection = ?3 order by docKey",
        )?;
        let keys = stmt
            .query_map(params![self.bucket, self.scope, self.name], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

/// The three collections the client state lives in.
#[derive(Clone)]
pub struct Storages {
    pub cluster: Cluster,
    pub sessions: Collection,
    pub peers: Collection,
    pub updates: Collection,
}

impl Storages {
    /// Connect to the cluster and resolve the session, peer and update-state collections.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let cluster = Cluster::connect(
            &config.connection_string,
            &config.credentials,
            config.ready_timeout,
        )?;
        let scope = cluster.bucket(&config.bucket)?.scope(&config.scope)?;
        Ok(Storages {
            sessions: scope.collection(SESSIONS_COLLECTION)?,
            peers: scope.collection(PEERS_COLLECTION)?,
            updates: scope.collection(UPDATE_STATES_COLLECTION)?,
            cluster,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn memory_scope() -> Scope {
        let cluster = Cluster::connect(
            MEMORY_CONNECTION_STRING,
            &Credentials::new("tester", "secret"),
            Duration::from_secs(5),
        )
        .unwrap();
        cluster.bucket("bucket").unwrap().scope("scope").unwrap()
    }

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(Endpoint::parse("sqlite::memory:").unwrap(), Endpoint::Memory);
        assert_eq!(
            Endpoint::parse("sqlite:///tmp/state.db").unwrap(),
            Endpoint::File(PathBuf::from("/tmp/state.db"))
        );
        assert_eq!(
            Endpoint::parse("state.db").unwrap(),
            Endpoint::File(PathBuf::from("state.db"))
        );
        assert!(matches!(
            Endpoint::parse("couchbase://localhost"),
            Err(StorageError::InvalidConnectionString(_))
        ));
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("sqlite://").is_err());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let scope = memory_scope();
        assert!(matches!(scope.collection("drop table"), Err(StorageError::InvalidName(_))));
        assert!(matches!(scope.collection(""), Err(StorageError::InvalidName(_))));
        assert!(matches!(scope.collection("a\"b"), Err(StorageError::InvalidName(_))));
        assert!(scope.collection("update_states").is_ok());
    }

    #[test]
    fn test_upsert_get_remove() {
        let coll = memory_scope().collection("docs").unwrap();
        assert_eq!(coll.get("k").unwrap(), None);
        assert!(!coll.exists("k").unwrap());

        coll.upsert_binary("k", &[1, 2, 3]).unwrap();
        let doc = coll.get("k").unwrap().unwrap();
        assert_eq!(doc.content, vec![1, 2, 3]);
        assert_eq!(doc.format, DocumentFormat::Binary);

        coll.upsert_json("k", &serde_json::json!({"seq": 1})).unwrap();
        let doc = coll.get("k").unwrap().unwrap();
        assert_eq!(doc.format, DocumentFormat::Json);
        let value: serde_json::Value = doc.decode_json().unwrap();
        assert_eq!(value["seq"], 1);

        assert!(coll.remove("k").unwrap());
        assert!(!coll.remove("k").unwrap());
        assert_eq!(coll.get("k").unwrap(), None);
    }

    #[test]
    fn test_collections_are_separate_namespaces() {
        let scope = memory_scope();
        let a = scope.collection("a").unwrap();
        let b = scope.collection("b").unwrap();
        a.upsert_binary("same", b"in a").unwrap();
        assert_eq!(b.get("same").unwrap(), None);
        b.upsert_binary("same", b"in b").unwrap();
        assert_eq!(a.get("same").unwrap().unwrap().content, b"in a".to_vec());
        assert_eq!(a.keys().unwrap(), vec!["same".to_string()]);
    }

    #[test]
    fn test_underscored_names_do_not_collide() {
        let cluster = Cluster::connect(
            MEMORY_CONNECTION_STRING,
            &Credentials::new("tester", "secret"),
            Duration::from_secs(5),
        )
        .unwrap();
        let left = cluster.bucket("a_").unwrap().scope("b").unwrap().collection("peers").unwrap();
        let right = cluster.bucket("a").unwrap().scope("_b").unwrap().collection("peers").unwrap();
        left.upsert_binary("1", b"from a_ / b").unwrap();
        assert_eq!(right.get("1").unwrap(), None);
        assert!(right.keys().unwrap().is_empty());
        assert_eq!(left.get("1").unwrap().unwrap().content, b"from a_ / b".to_vec());
    }

    #[test]
    fn test_zero_ready_timeout_is_an_error() {
        let err = build_pool(&Endpoint::Memory, Duration::ZERO).err().unwrap();
        assert!(matches!(err, StorageError::InvalidReadyTimeout(_)));
    }

    #[test]
    fn test_file_database_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let conn_str = format!("sqlite://{}", dir.path().join("docs.db").display());
        let creds = Credentials::new("tester", "secret");
        {
            let cluster = Cluster::connect(&conn_str, &creds, Duration::from_secs(5)).unwrap();
            let coll = cluster.bucket("b").unwrap().scope("s").unwrap().collection("c").unwrap();
            coll.upsert_binary("1", b"kept").unwrap();
        }
        let cluster = Cluster::connect(&conn_str, &creds, Duration::from_secs(5)).unwrap();
        let coll = cluster.bucket("b").unwrap().scope("s").unwrap().collection("c").unwrap();
        assert_eq!(coll.get("1").unwrap().unwrap().content, b"kept".to_vec());
    }

    #[test]
    fn test_unreachable_database_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let conn_str = format!("sqlite://{}", dir.path().join("missing/dir/docs.db").display());
        let err = Cluster::connect(
            &conn_str,
            &Credentials::new("tester", "secret"),
            Duration::from_millis(200),
        )
        .err()
        .unwrap();
        assert!(err.to_string().starts_with("connect to document store"));
        assert!(matches!(err.root(), StorageError::Pool(_)));
    }
}
